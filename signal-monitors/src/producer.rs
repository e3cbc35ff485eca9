//! The monitor execution contract.

use async_trait::async_trait;
use common::Signal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One unit of work a monitor performs per cadence tick.
///
/// Implementations fetch their data, analyze it and return zero or more
/// signals. Every kind of failure is reported the same way, through the
/// returned error; the scheduler retries on the next tick regardless.
///
/// A call must be idempotent and bounded in time: network I/O inside a cycle
/// has to carry its own timeout so a dead endpoint cannot hold the monitor's
/// loop forever.
#[async_trait]
pub trait SignalProducer: Send + Sync {
    async fn run_cycle(&self) -> anyhow::Result<Vec<Signal>>;
}

/// Registration entry for one monitor. Immutable once built.
#[derive(Clone)]
pub struct MonitorSpec {
    name: String,
    cadence: Duration,
    producer: Arc<dyn SignalProducer>,
    enabled: bool,
}

impl MonitorSpec {
    pub fn new(
        name: impl Into<String>,
        cadence: Duration,
        producer: impl SignalProducer + 'static,
    ) -> Self {
        Self::from_shared(name, cadence, Arc::new(producer))
    }

    pub fn from_shared(
        name: impl Into<String>,
        cadence: Duration,
        producer: Arc<dyn SignalProducer>,
    ) -> Self {
        Self {
            name: name.into(),
            cadence,
            producer,
            enabled: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait between the end of one cycle and the start of the next
    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    pub fn producer(&self) -> &Arc<dyn SignalProducer> {
        &self.producer
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl fmt::Debug for MonitorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorSpec")
            .field("name", &self.name)
            .field("cadence", &self.cadence)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;

    #[async_trait]
    impl SignalProducer for Quiet {
        async fn run_cycle(&self) -> anyhow::Result<Vec<Signal>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_spec_accessors() {
        let spec = MonitorSpec::new("quiet", Duration::from_secs(30), Quiet);
        assert_eq!(spec.name(), "quiet");
        assert_eq!(spec.cadence(), Duration::from_secs(30));
        assert!(spec.is_enabled());
        assert!(spec.producer().run_cycle().await.unwrap().is_empty());

        let spec = spec.with_enabled(false);
        assert!(!spec.is_enabled());
        assert!(format!("{:?}", spec).contains("quiet"));
    }
}
