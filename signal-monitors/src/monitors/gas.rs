//! Network fee spike watcher.

use crate::http::{build_client, get_json};
use crate::producer::SignalProducer;
use anyhow::Result;
use async_trait::async_trait;
use common::Signal;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const MONITOR_NAME: &str = "gas_watcher";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub enabled: bool,
    pub cadence_secs: u64,
    pub request_timeout_secs: u64,
    pub api_url: String,
    /// Current / previous fee ratio that counts as a spike
    pub spike_ratio: f64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cadence_secs: 30,
            request_timeout_secs: 10,
            api_url: "https://mempool.space/api/v1/fees/recommended".to_string(),
            spike_ratio: 2.0,
        }
    }
}

#[async_trait]
pub trait GasPriceSource: Send + Sync {
    async fn fastest_fee(&self) -> Result<f64>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendedFees {
    fastest_fee: f64,
}

pub struct MempoolClient {
    client: Client,
    api_url: String,
}

impl MempoolClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            api_url: api_url.into(),
        })
    }
}

#[async_trait]
impl GasPriceSource for MempoolClient {
    async fn fastest_fee(&self) -> Result<f64> {
        let fees: RecommendedFees = get_json(&self.client, &self.api_url, &[]).await?;
        Ok(fees.fastest_fee)
    }
}

/// Ratio of current to previous fee when it reaches `spike_ratio`
pub fn detect_spike(previous: Option<f64>, current: f64, spike_ratio: f64) -> Option<f64> {
    let previous = previous.filter(|p| *p > 0.0)?;
    let ratio = current / previous;
    (ratio >= spike_ratio).then_some(ratio)
}

/// Keeps the last observed fee between cycles
pub struct GasWatcher<S = MempoolClient> {
    source: S,
    spike_ratio: f64,
    last_fee: Mutex<Option<f64>>,
}

impl GasWatcher<MempoolClient> {
    pub fn from_config(config: &GasConfig) -> Result<Self> {
        let client = MempoolClient::new(
            config.api_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(client, config))
    }
}

impl<S: GasPriceSource> GasWatcher<S> {
    pub fn new(source: S, config: &GasConfig) -> Self {
        Self {
            source,
            spike_ratio: config.spike_ratio,
            last_fee: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<S: GasPriceSource> SignalProducer for GasWatcher<S> {
    async fn run_cycle(&self) -> Result<Vec<Signal>> {
        let current = self.source.fastest_fee().await?;
        let mut last_fee = self.last_fee.lock().await;
        let previous = *last_fee;
        // a zero reading never becomes the baseline
        if current > 0.0 {
            *last_fee = Some(current);
        }
        debug!("Fastest fee {} (previous {:?})", current, previous);

        let Some(ratio) = detect_spike(previous, current, self.spike_ratio) else {
            return Ok(Vec::new());
        };

        warn!(
            "🚨 NETWORK ALERT: fees spiked {:.1}x (previous: {:?}, now: {})",
            ratio, previous, current
        );
        Ok(vec![Signal::new(MONITOR_NAME, "GAS_SPIKE", ratio)
            .with_metadata(json!({ "previous_fee": previous, "current_fee": current }))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Readings(std::sync::Mutex<VecDeque<f64>>);

    #[async_trait]
    impl GasPriceSource for Readings {
        async fn fastest_fee(&self) -> Result<f64> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no more readings"))
        }
    }

    #[test]
    fn test_detect_spike() {
        assert_eq!(detect_spike(None, 50.0, 2.0), None);
        assert_eq!(detect_spike(Some(0.0), 50.0, 2.0), None);
        assert_eq!(detect_spike(Some(20.0), 30.0, 2.0), None);
        assert_eq!(detect_spike(Some(20.0), 40.0, 2.0), Some(2.0));
    }

    #[tokio::test]
    async fn test_watcher_remembers_previous_reading() {
        let source = Readings(std::sync::Mutex::new(VecDeque::from(vec![10.0, 12.0, 30.0])));
        let watcher = GasWatcher::new(source, &GasConfig::default());

        assert!(watcher.run_cycle().await.unwrap().is_empty());
        assert!(watcher.run_cycle().await.unwrap().is_empty());

        let signals = watcher.run_cycle().await.unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].label, "GAS_SPIKE");
        assert!((signals[0].magnitude - 2.5).abs() < 1e-9);

        // a failed fetch leaves the last reading untouched
        assert!(watcher.run_cycle().await.is_err());
        assert_eq!(*watcher.last_fee.lock().await, Some(30.0));
    }

    #[tokio::test]
    async fn test_zero_reading_keeps_baseline() {
        let source = Readings(std::sync::Mutex::new(VecDeque::from(vec![10.0, 0.0, 30.0])));
        let watcher = GasWatcher::new(source, &GasConfig::default());

        assert!(watcher.run_cycle().await.unwrap().is_empty());
        assert!(watcher.run_cycle().await.unwrap().is_empty());
        assert_eq!(*watcher.last_fee.lock().await, Some(10.0));

        let signals = watcher.run_cycle().await.unwrap();
        assert_eq!(signals.len(), 1);
        assert!((signals[0].magnitude - 3.0).abs() < 1e-9);
    }
}
