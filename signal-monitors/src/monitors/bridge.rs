//! L2 bridge balance watcher. A rising bridge balance means capital is
//! rotating into that L2.

use super::FetchTally;
use crate::http::build_client;
use crate::producer::SignalProducer;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use common::Signal;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

pub const MONITOR_NAME: &str = "bridge_watcher";

const WEI_PER_ETH: f64 = 1e18;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub enabled: bool,
    pub cadence_secs: u64,
    pub request_timeout_secs: u64,
    pub rpc_url: String,
    /// Bridge name → contract address on Ethereum mainnet
    pub bridges: BTreeMap<String, String>,
    /// Balance increase (ETH) between two readings that counts as an inflow
    pub whale_threshold_eth: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let bridges = [
            ("Arbitrum", "0x4Dbd4fc535Ac27206064B68FfCf82747f9692144"),
            ("Optimism", "0x99C9fc46f92E8a1c0dEC1b1747d7109ca542c038"),
            ("Base", "0x49048044D57e1C92A77f79988d21Fa8fAF74E97e"),
        ]
        .into_iter()
        .map(|(name, addr)| (name.to_string(), addr.to_string()))
        .collect();

        Self {
            enabled: true,
            cadence_secs: 60,
            request_timeout_secs: 10,
            rpc_url: "https://eth.public-rpc.com".to_string(),
            bridges,
            whale_threshold_eth: 500.0,
        }
    }
}

#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Native balance in wei
    async fn balance_wei(&self, address: &str) -> Result<u128>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Minimal Ethereum JSON-RPC client for `eth_getBalance`
pub struct JsonRpcBalanceClient {
    client: Client,
    rpc_url: String,
}

impl JsonRpcBalanceClient {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            rpc_url: rpc_url.into(),
        })
    }
}

#[async_trait]
impl BalanceSource for JsonRpcBalanceClient {
    async fn balance_wei(&self, address: &str) -> Result<u128> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getBalance",
            "params": [address, "latest"],
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .context("eth_getBalance request failed")?;

        if !response.status().is_success() {
            bail!("RPC endpoint returned {}", response.status());
        }

        let body: RpcResponse = response.json().await.context("malformed RPC response")?;
        match (body.result, body.error) {
            (_, Some(err)) => Err(anyhow!("RPC error {}: {}", err.code, err.message)),
            (Some(hex), None) => parse_hex_quantity(&hex),
            (None, None) => Err(anyhow!("RPC response has neither result nor error")),
        }
    }
}

/// Parse an Ethereum hex quantity such as `0x1bc16d674ec80000`
pub fn parse_hex_quantity(value: &str) -> Result<u128> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("quantity {} is missing 0x prefix", value))?;
    if digits.is_empty() {
        bail!("empty hex quantity");
    }
    u128::from_str_radix(digits, 16).with_context(|| format!("invalid hex quantity {}", value))
}

/// Balance increase in ETH when it reaches the threshold
pub fn detect_inflow(previous_eth: Option<f64>, current_eth: f64, threshold_eth: f64) -> Option<f64> {
    let delta = current_eth - previous_eth?;
    (delta >= threshold_eth).then_some(delta)
}

pub struct BridgeWatcher<S = JsonRpcBalanceClient> {
    source: S,
    bridges: BTreeMap<String, String>,
    whale_threshold_eth: f64,
    last_balances: Mutex<HashMap<String, f64>>,
}

impl BridgeWatcher<JsonRpcBalanceClient> {
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let client = JsonRpcBalanceClient::new(
            config.rpc_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(client, config))
    }
}

impl<S: BalanceSource> BridgeWatcher<S> {
    pub fn new(source: S, config: &BridgeConfig) -> Self {
        Self {
            source,
            bridges: config.bridges.clone(),
            whale_threshold_eth: config.whale_threshold_eth,
            last_balances: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<S: BalanceSource> SignalProducer for BridgeWatcher<S> {
    async fn run_cycle(&self) -> Result<Vec<Signal>> {
        info!("Scanning L2 bridges for rotation...");
        let mut tally = FetchTally::default();
        let mut signals = Vec::new();
        let mut last_balances = self.last_balances.lock().await;

        for (name, address) in &self.bridges {
            let balance_eth = match self.source.balance_wei(address).await {
                Ok(wei) => {
                    tally.ok();
                    wei as f64 / WEI_PER_ETH
                }
                Err(e) => {
                    tally.failed(MONITOR_NAME, name, e);
                    continue;
                }
            };

            info!("L2 Bridge {}: TVL {:.2} ETH", name, balance_eth);
            let previous = last_balances.insert(name.clone(), balance_eth);

            if let Some(delta) = detect_inflow(previous, balance_eth, self.whale_threshold_eth) {
                info!("🌉 Massive inflow into {}: +{:.2} ETH", name, delta);
                signals.push(
                    Signal::new(format!("{}/{}", MONITOR_NAME, name), "BRIDGE_INFLOW", delta)
                        .with_metadata(json!({ "balance_eth": balance_eth, "address": address })),
                );
            }
        }

        tally.finish(MONITOR_NAME)?;
        Ok(signals)
    }
}
