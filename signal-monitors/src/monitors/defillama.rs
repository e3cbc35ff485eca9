//! DeFiLlama fundamental tracker: flags protocols whose TVL jumped sharply
//! day over day.

use super::FetchTally;
use crate::http::{build_client, get_json};
use crate::producer::SignalProducer;
use anyhow::Result;
use async_trait::async_trait;
use common::Signal;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

pub const MONITOR_NAME: &str = "defillama";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefiLlamaConfig {
    pub enabled: bool,
    pub cadence_secs: u64,
    pub request_timeout_secs: u64,
    pub base_url: String,
    pub protocols: Vec<String>,
    /// Day-over-day TVL increase (percent) that counts as a spike
    pub tvl_spike_pct: f64,
}

impl Default for DefiLlamaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cadence_secs: 86_400,
            request_timeout_secs: 20,
            base_url: "https://api.llama.fi".to_string(),
            protocols: vec![
                "aave-v3".to_string(),
                "uniswap-v3".to_string(),
                "lido".to_string(),
                "makerdao".to_string(),
            ],
            tvl_spike_pct: 20.0,
        }
    }
}

/// `/protocol/{slug}` payload, trimmed to what the analysis reads
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolSnapshot {
    pub name: String,
    #[serde(default)]
    pub tvl: Vec<TvlPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TvlPoint {
    pub date: i64,
    #[serde(rename = "totalLiquidityUSD")]
    pub total_liquidity_usd: f64,
}

#[async_trait]
pub trait ProtocolSource: Send + Sync {
    async fn fetch_protocol(&self, slug: &str) -> Result<ProtocolSnapshot>;
}

/// DeFiLlama free API client
pub struct DefiLlamaClient {
    client: Client,
    base_url: String,
}

impl DefiLlamaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ProtocolSource for DefiLlamaClient {
    async fn fetch_protocol(&self, slug: &str) -> Result<ProtocolSnapshot> {
        let url = format!("{}/protocol/{}", self.base_url.trim_end_matches('/'), slug);
        get_json(&self.client, &url, &[]).await
    }
}

/// Result of the TVL health check for one protocol
#[derive(Debug, Clone, PartialEq)]
pub struct TvlHealth {
    pub protocol: String,
    pub tvl_change_pct: f64,
    pub label: &'static str,
}

/// Compare the two most recent daily TVL points.
///
/// Returns `None` when there is not enough history or the previous TVL is
/// zero (no meaningful percentage).
pub fn analyze_health(snapshot: &ProtocolSnapshot, tvl_spike_pct: f64) -> Option<TvlHealth> {
    let [.., prev, now] = snapshot.tvl.as_slice() else {
        return None;
    };
    if prev.total_liquidity_usd <= 0.0 {
        return None;
    }

    let tvl_change_pct =
        (now.total_liquidity_usd - prev.total_liquidity_usd) / prev.total_liquidity_usd * 100.0;

    let label = if tvl_change_pct > tvl_spike_pct {
        "UNDERVALUED"
    } else {
        "NEUTRAL"
    };

    Some(TvlHealth {
        protocol: snapshot.name.clone(),
        tvl_change_pct,
        label,
    })
}

/// Scans the watched protocols once per cycle
pub struct DefiLlamaTracker<S = DefiLlamaClient> {
    source: S,
    protocols: Vec<String>,
    tvl_spike_pct: f64,
}

impl DefiLlamaTracker<DefiLlamaClient> {
    pub fn from_config(config: &DefiLlamaConfig) -> Result<Self> {
        let client = DefiLlamaClient::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(client, config))
    }
}

impl<S: ProtocolSource> DefiLlamaTracker<S> {
    pub fn new(source: S, config: &DefiLlamaConfig) -> Self {
        Self {
            source,
            protocols: config.protocols.clone(),
            tvl_spike_pct: config.tvl_spike_pct,
        }
    }
}

#[async_trait]
impl<S: ProtocolSource> SignalProducer for DefiLlamaTracker<S> {
    async fn run_cycle(&self) -> Result<Vec<Signal>> {
        info!("Running DeFiLlama fundamental scan...");
        let mut tally = FetchTally::default();
        let mut signals = Vec::new();

        for slug in &self.protocols {
            let snapshot = match self.source.fetch_protocol(slug).await {
                Ok(snapshot) => {
                    tally.ok();
                    snapshot
                }
                Err(e) => {
                    tally.failed(MONITOR_NAME, slug, e);
                    continue;
                }
            };

            match analyze_health(&snapshot, self.tvl_spike_pct) {
                Some(health) if health.label != "NEUTRAL" => {
                    info!(
                        "ALPHA ALERT: {} TVL moved {:.2}% in 24h",
                        health.protocol, health.tvl_change_pct
                    );
                    signals.push(
                        Signal::new(
                            format!("{}/{}", MONITOR_NAME, slug),
                            health.label,
                            health.tvl_change_pct,
                        )
                        .with_metadata(json!({ "protocol": health.protocol })),
                    );
                }
                Some(_) => {}
                None => debug!("Not enough TVL history for {}", slug),
            }
        }

        tally.finish(MONITOR_NAME)?;
        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::HashMap;

    fn snapshot(name: &str, tvl: &[f64]) -> ProtocolSnapshot {
        ProtocolSnapshot {
            name: name.to_string(),
            tvl: tvl
                .iter()
                .enumerate()
                .map(|(i, v)| TvlPoint {
                    date: 1_700_000_000 + i as i64 * 86_400,
                    total_liquidity_usd: *v,
                })
                .collect(),
        }
    }

    struct StaticSource(HashMap<String, ProtocolSnapshot>);

    #[async_trait]
    impl ProtocolSource for StaticSource {
        async fn fetch_protocol(&self, slug: &str) -> Result<ProtocolSnapshot> {
            self.0
                .get(slug)
                .cloned()
                .ok_or_else(|| anyhow!("404 for {}", slug))
        }
    }

    #[test]
    fn test_analyze_health_spike() {
        let health = analyze_health(&snapshot("Lido", &[90.0, 100.0, 125.0]), 20.0).unwrap();
        assert_eq!(health.label, "UNDERVALUED");
        assert!((health.tvl_change_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_analyze_health_flat() {
        let health = analyze_health(&snapshot("Aave V3", &[100.0, 105.0]), 20.0).unwrap();
        assert_eq!(health.label, "NEUTRAL");
    }

    #[test]
    fn test_analyze_health_insufficient_history() {
        assert!(analyze_health(&snapshot("Maker", &[100.0]), 20.0).is_none());
        assert!(analyze_health(&snapshot("Maker", &[0.0, 50.0]), 20.0).is_none());
    }

    #[test]
    fn test_snapshot_deserializes_api_shape() {
        let raw = r#"{"name":"Lido","tvl":[{"date":1700000000,"totalLiquidityUSD":1.5e10}],"chains":["Ethereum"]}"#;
        let snapshot: ProtocolSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.tvl.len(), 1);
        assert_eq!(snapshot.tvl[0].total_liquidity_usd, 1.5e10);
    }

    #[tokio::test]
    async fn test_cycle_emits_only_spikes_and_skips_failures() {
        let mut data = HashMap::new();
        data.insert("lido".to_string(), snapshot("Lido", &[100.0, 130.0]));
        data.insert("aave-v3".to_string(), snapshot("Aave V3", &[100.0, 101.0]));

        let tracker = DefiLlamaTracker::new(StaticSource(data), &DefiLlamaConfig::default());
        let signals = tracker.run_cycle().await.unwrap();

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].source, "defillama/lido");
        assert_eq!(signals[0].label, "UNDERVALUED");
    }

    #[tokio::test]
    async fn test_cycle_fails_when_every_fetch_fails() {
        let tracker =
            DefiLlamaTracker::new(StaticSource(HashMap::new()), &DefiLlamaConfig::default());
        assert!(tracker.run_cycle().await.is_err());
    }
}
