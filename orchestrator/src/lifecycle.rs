//! Lifecycle controller - startup / shutdown of the whole orchestrator

use crate::config::OrchestratorConfig;
use crate::stream::{DecisionStream, StreamHandle};
use crate::supervisor::{ShutdownReport, Supervisor};
use common::ConfigError;
use signal_monitors::{MonitorRegistry, SignalSink};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swarm::DecisionProvider;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Idle,
    Running,
    Stopped,
}

struct Inner {
    phase: LifecyclePhase,
    stream: Option<StreamHandle>,
}

pub struct Lifecycle {
    supervisor: Arc<Supervisor>,
    stream: Arc<DecisionStream>,
    grace: Duration,
    inner: Mutex<Inner>,
}

impl Lifecycle {
    pub fn new(supervisor: Arc<Supervisor>, stream: Arc<DecisionStream>, grace: Duration) -> Self {
        Self {
            supervisor,
            stream,
            grace,
            inner: Mutex::new(Inner {
                phase: LifecyclePhase::Idle,
                stream: None,
            }),
        }
    }

    /// Build the registry and both loops from configuration
    pub fn from_config(
        config: &OrchestratorConfig,
        sink: Arc<dyn SignalSink>,
        provider: Arc<dyn DecisionProvider>,
    ) -> Result<Self, ConfigError> {
        let registry: MonitorRegistry = config.monitors.build_registry()?;
        let supervisor = Arc::new(Supervisor::new(registry, sink, &config.supervisor));
        let stream = Arc::new(DecisionStream::new(provider, config.stream.clone()));
        Ok(Self::new(
            supervisor,
            stream,
            Duration::from_secs(config.supervisor.shutdown_grace_secs),
        ))
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    pub fn stream(&self) -> &Arc<DecisionStream> {
        &self.stream
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.lock().phase
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the monitor loops and the stream loop, then return.
    ///
    /// Only the first call does anything; a stopped lifecycle is not
    /// restarted.
    pub fn startup(&self) -> LifecyclePhase {
        let mut inner = self.lock();
        if inner.phase != LifecyclePhase::Idle {
            return inner.phase;
        }

        info!("🚀 Starting OmniTrade orchestrator");
        let monitors = self.supervisor.start_all();
        inner.stream = Some(self.stream.start());
        inner.phase = LifecyclePhase::Running;
        info!("✅ Orchestrator running: {} monitors, decision stream live", monitors);
        inner.phase
    }

    /// Stop monitors, then the stream. Safe to call any number of times and
    /// on a lifecycle that never started; only the first call after startup
    /// returns a report.
    pub async fn shutdown(&self) -> Option<ShutdownReport> {
        let stream = {
            let mut inner = self.lock();
            let was = inner.phase;
            inner.phase = LifecyclePhase::Stopped;
            if was != LifecyclePhase::Running {
                return None;
            }
            inner.stream.take()
        };

        info!("Shutting down OmniTrade orchestrator...");
        let report = self.supervisor.stop_all().await;
        if let Some(handle) = stream {
            handle.stop(self.grace).await;
        }
        info!("👋 Orchestrator stopped");
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::MonitorPhase;
    use crate::supervisor::SupervisorConfig;
    use crate::stream::StreamConfig;
    use async_trait::async_trait;
    use common::{Decision, MarketState, Signal};
    use signal_monitors::{MonitorSpec, SignalProducer, SignalTape};

    struct Tick;

    #[async_trait]
    impl SignalProducer for Tick {
        async fn run_cycle(&self) -> anyhow::Result<Vec<Signal>> {
            Ok(vec![Signal::new("tick", "NEUTRAL", 1.0)])
        }
    }

    struct Holding;

    #[async_trait]
    impl DecisionProvider for Holding {
        async fn get_decision(&self, _state: &MarketState) -> anyhow::Result<Decision> {
            Ok(Decision::hold())
        }
    }

    fn lifecycle(tape: Arc<SignalTape>) -> Lifecycle {
        let registry = MonitorRegistry::new(vec![MonitorSpec::new(
            "tick",
            Duration::from_secs(1),
            Tick,
        )])
        .unwrap();
        let supervisor = Arc::new(Supervisor::new(registry, tape, &SupervisorConfig::default()));
        let stream = Arc::new(DecisionStream::new(Arc::new(Holding), StreamConfig::default()));
        Lifecycle::new(supervisor, stream, Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_and_shutdown_are_idempotent() {
        let tape = Arc::new(SignalTape::new(100));
        let lifecycle = lifecycle(tape.clone());
        let mut subscriber = lifecycle.stream().subscribe();

        assert_eq!(lifecycle.startup(), LifecyclePhase::Running);
        assert_eq!(lifecycle.startup(), LifecyclePhase::Running);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(tape.len(), 2);
        assert!(subscriber.next().await.is_some());

        let report = lifecycle.shutdown().await.unwrap();
        assert_eq!(report.stopped, vec!["tick".to_string()]);
        assert_eq!(lifecycle.supervisor().count_in_phase(MonitorPhase::Running), 0);
        assert!(lifecycle.stream().subscribers().is_empty());

        assert!(lifecycle.shutdown().await.is_none());
        assert_eq!(lifecycle.startup(), LifecyclePhase::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_before_startup() {
        let lifecycle = lifecycle(Arc::new(SignalTape::new(10)));
        assert!(lifecycle.shutdown().await.is_none());
        assert_eq!(lifecycle.phase(), LifecyclePhase::Stopped);
    }

    #[tokio::test]
    async fn test_from_config_rejects_bad_monitor_config() {
        let mut config = OrchestratorConfig::default();
        config.monitors.gas_watcher.cadence_secs = 0;

        let result = Lifecycle::from_config(
            &config,
            Arc::new(SignalTape::new(10)),
            Arc::new(Holding),
        );
        assert!(matches!(result, Err(ConfigError::ZeroCadence(_))));
    }
}
