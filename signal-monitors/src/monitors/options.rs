//! Options market sentiment from Deribit public book summaries.

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
use tracing::info;

pub const MONITOR_NAME: &str = "options_sentiment";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    pub enabled: bool,
    pub cadence_secs: u64,
    pub request_timeout_secs: u64,
    pub base_url: String,
    pub currencies: Vec<String>,
    /// Put/call ratio above which the market reads as fearful
    pub bearish_pcr: f64,
    /// Put/call ratio below which the market reads as greedy
    pub bullish_pcr: f64,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cadence_secs: 3_600,
            request_timeout_secs: 15,
            base_url: "https://www.deribit.com/api/v2/public".to_string(),
            currencies: vec!["BTC".to_string(), "ETH".to_string()],
            bearish_pcr: 1.0,
            bullish_pcr: 0.6,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookSummary {
    pub instrument_name: String,
    #[serde(default)]
    pub open_interest: f64,
    #[serde(default)]
    pub mark_iv: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DeribitResponse {
    result: Vec<BookSummary>,
}

#[async_trait]
pub trait OptionsBookSource: Send + Sync {
    async fn book_summary(&self, currency: &str) -> Result<Vec<BookSummary>>;
}

pub struct DeribitClient {
    client: Client,
    base_url: String,
}

impl DeribitClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl OptionsBookSource for DeribitClient {
    async fn book_summary(&self, currency: &str) -> Result<Vec<BookSummary>> {
        let url = format!(
            "{}/get_book_summary_by_currency",
            self.base_url.trim_end_matches('/')
        );
        let response: DeribitResponse = get_json(
            &self.client,
            &url,
            &[("currency", currency), ("kind", "option")],
        )
        .await?;
        Ok(response.result)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionsReading {
    pub currency: String,
    pub pc_ratio: f64,
    pub implied_volatility: f64,
    pub label: &'static str,
}

/// Put/call open-interest ratio plus mean mark IV.
///
/// Instruments are classified by their `-P` / `-C` suffix. With no call open
/// interest the ratio is pinned to 1.0. Returns `None` for an empty book.
pub fn calculate_sentiment(
    currency: &str,
    book: &[BookSummary],
    bearish_pcr: f64,
    bullish_pcr: f64,
) -> Option<OptionsReading> {
    if book.is_empty() {
        return None;
    }

    let mut put_oi = 0.0;
    let mut call_oi = 0.0;
    let mut iv_sum = 0.0;
    let mut iv_count = 0usize;

    for instrument in book {
        if instrument.instrument_name.ends_with('P') {
            put_oi += instrument.open_interest;
        } else if instrument.instrument_name.ends_with('C') {
            call_oi += instrument.open_interest;
        }

        if let Some(iv) = instrument.mark_iv.filter(|iv| *iv > 0.0) {
            iv_sum += iv;
            iv_count += 1;
        }
    }

    let implied_volatility = if iv_count > 0 { iv_sum / iv_count as f64 } else { 0.0 };
    let pc_ratio = if call_oi > 0.0 { put_oi / call_oi } else { 1.0 };

    let label = if pc_ratio > bearish_pcr {
        "BEARISH"
    } else if pc_ratio < bullish_pcr {
        "BULLISH"
    } else {
        "NEUTRAL"
    };

    Some(OptionsReading {
        currency: currency.to_string(),
        pc_ratio,
        implied_volatility,
        label,
    })
}

pub struct OptionsSentiment<S = DeribitClient> {
    source: S,
    currencies: Vec<String>,
    bearish_pcr: f64,
    bullish_pcr: f64,
}

impl OptionsSentiment<DeribitClient> {
    pub fn from_config(config: &OptionsConfig) -> Result<Self> {
        let client = DeribitClient::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(client, config))
    }
}

impl<S: OptionsBookSource> OptionsSentiment<S> {
    pub fn new(source: S, config: &OptionsConfig) -> Self {
        Self {
            source,
            currencies: config.currencies.clone(),
            bearish_pcr: config.bearish_pcr,
            bullish_pcr: config.bullish_pcr,
        }
    }
}

#[async_trait]
impl<S: OptionsBookSource> SignalProducer for OptionsSentiment<S> {
    async fn run_cycle(&self) -> Result<Vec<Signal>> {
        let mut tally = FetchTally::default();
        let mut signals = Vec::new();

        for currency in &self.currencies {
            let book = match self.source.book_summary(currency).await {
                Ok(book) => {
                    tally.ok();
                    book
                }
                Err(e) => {
                    tally.failed(MONITOR_NAME, currency, e);
                    continue;
                }
            };

            let Some(reading) =
                calculate_sentiment(currency, &book, self.bearish_pcr, self.bullish_pcr)
            else {
                info!("OPTIONS [{}]: no data", currency);
                continue;
            };

            info!(
                "OPTIONS ALPHA [{}]: PCR={:.2} | Avg IV={:.2}% | Sentiment={}",
                reading.currency, reading.pc_ratio, reading.implied_volatility, reading.label
            );
            signals.push(
                Signal::new(
                    format!("{}/{}", MONITOR_NAME, reading.currency),
                    reading.label,
                    reading.pc_ratio,
                )
                .with_metadata(json!({ "implied_volatility": reading.implied_volatility })),
            );
        }

        tally.finish(MONITOR_NAME)?;
        Ok(signals)
    }
}
