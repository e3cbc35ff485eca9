//! Per-monitor configuration and registry assembly.
//!
//! Thresholds live here rather than in the analysis code so they can be
//! tuned from the config file.

use crate::monitors::bridge::{self, BridgeConfig, BridgeWatcher};
use crate::monitors::defillama::{self, DefiLlamaConfig, DefiLlamaTracker};
use crate::monitors::funding::{self, FundingArbScanner, FundingConfig};
use crate::monitors::gas::{self, GasConfig, GasWatcher};
use crate::monitors::news::{self, NewsConfig, NewsTrader};
use crate::monitors::options::{self, OptionsConfig, OptionsSentiment};
use crate::producer::{MonitorSpec, SignalProducer};
use crate::registry::MonitorRegistry;
use common::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// `[monitors]` section of the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorsConfig {
    pub defillama: DefiLlamaConfig,
    pub options_sentiment: OptionsConfig,
    pub funding_arb: FundingConfig,
    pub gas_watcher: GasConfig,
    pub bridge_watcher: BridgeConfig,
    pub news_trader: NewsConfig,
}

impl MonitorsConfig {
    /// Build the monitor set from configuration.
    ///
    /// Disabled monitors are still registered (so they show up in
    /// introspection) but never scheduled.
    pub fn build_registry(&self) -> Result<MonitorRegistry, ConfigError> {
        let specs = vec![
            spec(
                defillama::MONITOR_NAME,
                self.defillama.enabled,
                self.defillama.cadence_secs,
                self.defillama.request_timeout_secs,
                || DefiLlamaTracker::from_config(&self.defillama),
            )?,
            spec(
                options::MONITOR_NAME,
                self.options_sentiment.enabled,
                self.options_sentiment.cadence_secs,
                self.options_sentiment.request_timeout_secs,
                || OptionsSentiment::from_config(&self.options_sentiment),
            )?,
            spec(
                funding::MONITOR_NAME,
                self.funding_arb.enabled,
                self.funding_arb.cadence_secs,
                self.funding_arb.request_timeout_secs,
                || FundingArbScanner::from_config(&self.funding_arb),
            )?,
            spec(
                gas::MONITOR_NAME,
                self.gas_watcher.enabled,
                self.gas_watcher.cadence_secs,
                self.gas_watcher.request_timeout_secs,
                || GasWatcher::from_config(&self.gas_watcher),
            )?,
            spec(
                bridge::MONITOR_NAME,
                self.bridge_watcher.enabled,
                self.bridge_watcher.cadence_secs,
                self.bridge_watcher.request_timeout_secs,
                || BridgeWatcher::from_config(&self.bridge_watcher),
            )?,
            spec(
                news::MONITOR_NAME,
                self.news_trader.enabled,
                self.news_trader.cadence_secs,
                self.news_trader.request_timeout_secs,
                || NewsTrader::from_config(&self.news_trader),
            )?,
        ];

        let registry = MonitorRegistry::new(specs)?;
        info!(
            "Monitor registry built: {} registered, {} enabled",
            registry.len(),
            registry.enabled().count()
        );
        Ok(registry)
    }
}

fn spec<P, F>(
    name: &str,
    enabled: bool,
    cadence_secs: u64,
    request_timeout_secs: u64,
    build: F,
) -> Result<MonitorSpec, ConfigError>
where
    P: SignalProducer + 'static,
    F: FnOnce() -> anyhow::Result<P>,
{
    if request_timeout_secs == 0 {
        return Err(ConfigError::Invalid(format!(
            "monitors.{}.request_timeout_secs must be positive",
            name
        )));
    }

    let producer = build().map_err(|e| ConfigError::Invalid(format!("{}: {:#}", name, e)))?;
    Ok(MonitorSpec::new(name, Duration::from_secs(cadence_secs), producer).with_enabled(enabled))
}
