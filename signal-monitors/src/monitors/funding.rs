//! Perpetual funding-rate scanner for delta-neutral carry trades.

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

pub const MONITOR_NAME: &str = "funding_arb";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundingConfig {
    pub enabled: bool,
    pub cadence_secs: u64,
    pub request_timeout_secs: u64,
    pub base_url: String,
    /// Per-period funding rate (fraction) above which carry is worth it
    pub min_funding_rate: f64,
    pub payments_per_day: f64,
    pub max_opportunities: usize,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cadence_secs: 14_400,
            request_timeout_secs: 20,
            base_url: "https://fapi.binance.com".to_string(),
            min_funding_rate: 0.001, // 0.1% per 8h
            payments_per_day: 3.0,
            max_opportunities: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundingRate {
    pub symbol: String,
    pub rate: f64,
}

#[async_trait]
pub trait FundingRateSource: Send + Sync {
    async fn funding_rates(&self) -> Result<Vec<FundingRate>>;
}

/// Binance USDⓈ-M futures premium index entry. Rates come back as strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndex {
    symbol: String,
    #[serde(default)]
    last_funding_rate: String,
}

pub struct BinanceFundingClient {
    client: Client,
    base_url: String,
}

impl BinanceFundingClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl FundingRateSource for BinanceFundingClient {
    async fn funding_rates(&self) -> Result<Vec<FundingRate>> {
        let url = format!("{}/fapi/v1/premiumIndex", self.base_url.trim_end_matches('/'));
        let entries: Vec<PremiumIndex> = get_json(&self.client, &url, &[]).await?;

        Ok(entries
            .into_iter()
            .filter_map(|entry| match entry.last_funding_rate.parse::<f64>() {
                Ok(rate) => Some(FundingRate { symbol: entry.symbol, rate }),
                Err(_) => {
                    debug!("Skipping {} with unparsable funding rate", entry.symbol);
                    None
                }
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundingOpportunity {
    pub symbol: String,
    /// Funding per period, in percent
    pub funding_rate_pct: f64,
    pub annualized_apr: f64,
}

/// Symbols paying more than the threshold, best APR first, capped at
/// `max_opportunities`.
pub fn scan_opportunities(rates: &[FundingRate], config: &FundingConfig) -> Vec<FundingOpportunity> {
    let mut opportunities: Vec<FundingOpportunity> = rates
        .iter()
        .filter(|r| r.rate.is_finite() && r.rate > config.min_funding_rate)
        .map(|r| FundingOpportunity {
            symbol: r.symbol.clone(),
            funding_rate_pct: r.rate * 100.0,
            annualized_apr: r.rate * config.payments_per_day * 365.0 * 100.0,
        })
        .collect();

    opportunities.sort_by(|a, b| {
        b.annualized_apr
            .partial_cmp(&a.annualized_apr)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    opportunities.truncate(config.max_opportunities);
    opportunities
}

pub struct FundingArbScanner<S = BinanceFundingClient> {
    source: S,
    config: FundingConfig,
}

impl FundingArbScanner<BinanceFundingClient> {
    pub fn from_config(config: &FundingConfig) -> Result<Self> {
        let client = BinanceFundingClient::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(client, config))
    }
}

impl<S: FundingRateSource> FundingArbScanner<S> {
    pub fn new(source: S, config: &FundingConfig) -> Self {
        Self {
            source,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl<S: FundingRateSource> SignalProducer for FundingArbScanner<S> {
    async fn run_cycle(&self) -> Result<Vec<Signal>> {
        info!("Scanning for delta-neutral funding arbitrage...");
        let rates = self.source.funding_rates().await?;

        Ok(scan_opportunities(&rates, &self.config)
            .into_iter()
            .map(|opp| {
                info!(
                    "ARB FOUND: {} | Rate: {:.4}% | APR: {:.1}%",
                    opp.symbol, opp.funding_rate_pct, opp.annualized_apr
                );
                Signal::new(
                    format!("{}/{}", MONITOR_NAME, opp.symbol),
                    "DELTA_NEUTRAL_CARRY",
                    opp.annualized_apr,
                )
                .with_metadata(json!({
                    "funding_rate_pct": opp.funding_rate_pct,
                    "action": format!("BUY SPOT {0} + SHORT PERP {0}", opp.symbol),
                }))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(symbol: &str, rate: f64) -> FundingRate {
        FundingRate { symbol: symbol.to_string(), rate }
    }

    struct FixedRates(Vec<FundingRate>);

    #[async_trait]
    impl FundingRateSource for FixedRates {
        async fn funding_rates(&self) -> Result<Vec<FundingRate>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_scan_filters_sorts_and_caps() {
        let config = FundingConfig { max_opportunities: 2, ..Default::default() };
        let rates = vec![
            rate("BTCUSDT", 0.0001),
            rate("PEPEUSDT", 0.002),
            rate("WIFUSDT", 0.003),
            rate("DOGEUSDT", 0.0015),
            rate("NANUSDT", f64::NAN),
        ];

        let opps = scan_opportunities(&rates, &config);
        assert_eq!(opps.len(), 2);
        assert_eq!(opps[0].symbol, "WIFUSDT");
        assert_eq!(opps[1].symbol, "PEPEUSDT");
        assert!((opps[0].annualized_apr - 0.003 * 3.0 * 365.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_is_strict() {
        let opps = scan_opportunities(&[rate("ETHUSDT", 0.001)], &FundingConfig::default());
        assert!(opps.is_empty());
    }

    #[test]
    fn test_premium_index_decoding() {
        let raw = r#"[{"symbol":"BTCUSDT","markPrice":"65000.1","lastFundingRate":"0.00010000"}]"#;
        let entries: Vec<PremiumIndex> = serde_json::from_str(raw).unwrap();
        assert_eq!(entries[0].last_funding_rate.parse::<f64>().unwrap(), 0.0001);
    }

    #[tokio::test]
    async fn test_cycle_builds_carry_signals() {
        let scanner = FundingArbScanner::new(
            FixedRates(vec![rate("WIFUSDT", 0.003)]),
            &FundingConfig::default(),
        );
        let signals = scanner.run_cycle().await.unwrap();

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].label, "DELTA_NEUTRAL_CARRY");
        assert_eq!(signals[0].metadata["action"], "BUY SPOT WIFUSDT + SHORT PERP WIFUSDT");
    }
}
