//! Macro event trading off a scraped economic calendar.
//!
//! Released high-impact events are compared against their forecast. Cooler
//! CPI and weaker payrolls read as risk-on.

use crate::http::build_client;
use crate::producer::SignalProducer;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use common::Signal;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

pub const MONITOR_NAME: &str = "news_trader";

/// The calendar page refuses non-browser agents
const BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub enabled: bool,
    pub cadence_secs: u64,
    pub request_timeout_secs: u64,
    pub calendar_url: String,
    /// An event is tracked when its title contains any of these
    pub high_impact_keywords: Vec<String>,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cadence_secs: 300,
            request_timeout_secs: 15,
            calendar_url: "https://www.investing.com/economic-calendar/".to_string(),
            high_impact_keywords: vec![
                "CPI".to_string(),
                "GDP".to_string(),
                "Nonfarm Payrolls".to_string(),
                "Fed Interest Rate Decision".to_string(),
            ],
        }
    }
}

#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Raw calendar page HTML
    async fn fetch_calendar(&self) -> Result<String>;
}

pub struct CalendarClient {
    client: Client,
    url: String,
}

impl CalendarClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl CalendarSource for CalendarClient {
    async fn fetch_calendar(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .header(USER_AGENT, BROWSER_AGENT)
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.url))?;

        if !response.status().is_success() {
            return Err(anyhow!("{} returned {}", self.url, response.status()));
        }

        response
            .text()
            .await
            .with_context(|| format!("unreadable body from {}", self.url))
    }
}

/// A released calendar row
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub title: String,
    pub actual: String,
    pub forecast: String,
}

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {}: {:?}", css, e))
}

fn cell_text(row: &ElementRef<'_>, cell: &Selector) -> Option<String> {
    row.select(cell)
        .next()
        .map(|td| td.text().collect::<String>().trim().to_string())
}

/// Extract high-impact rows whose title matches a keyword and whose actual
/// figure has been published. Rows missing a cell are skipped.
pub fn parse_calendar(html: &str, keywords: &[String]) -> Result<Vec<CalendarEvent>> {
    let rows = selector("tr.js-event-item")?;
    let sentiment = selector("td.sentiment")?;
    let event = selector("td.event")?;
    let act = selector("td.act")?;
    let fore = selector("td.fore")?;

    let document = Html::parse_document(html);
    let mut events = Vec::new();

    for row in document.select(&rows) {
        let high_impact = row
            .select(&sentiment)
            .next()
            .is_some_and(|td| td.html().to_lowercase().contains("high"));
        if !high_impact {
            continue;
        }

        let Some(title) = cell_text(&row, &event) else {
            continue;
        };
        if !keywords.iter().any(|k| title.contains(k.as_str())) {
            continue;
        }

        let (Some(actual), Some(forecast)) = (cell_text(&row, &act), cell_text(&row, &fore))
        else {
            continue;
        };
        if actual.is_empty() || actual == "&nbsp;" || forecast.is_empty() {
            continue;
        }

        events.push(CalendarEvent {
            title,
            actual,
            forecast,
        });
    }

    Ok(events)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewsReading {
    pub label: &'static str,
    pub reason: &'static str,
    /// Actual minus forecast
    pub surprise: f64,
}

fn parse_figure(raw: &str) -> Option<f64> {
    raw.replace(['%', 'K'], "").trim().parse().ok()
}

/// Trade direction for a released figure.
///
/// CPI under forecast is BUY, over is SELL, in line is nothing. Payrolls
/// over forecast is SELL, otherwise BUY. Other events and unparseable
/// figures give `None`.
pub fn analyze_event(title: &str, actual: &str, forecast: &str) -> Option<NewsReading> {
    let act = parse_figure(actual)?;
    let fore = parse_figure(forecast)?;

    let (label, reason) = if title.contains("CPI") {
        if act < fore {
            ("BUY", "Inflation Cooling")
        } else if act > fore {
            ("SELL", "Inflation Hot")
        } else {
            return None;
        }
    } else if title.contains("Nonfarm") {
        if act > fore {
            ("SELL", "Strong USD")
        } else {
            ("BUY", "Weak USD")
        }
    } else {
        return None;
    };

    Some(NewsReading {
        label,
        reason,
        surprise: act - fore,
    })
}

pub struct NewsTrader<S = CalendarClient> {
    source: S,
    keywords: Vec<String>,
}

impl NewsTrader<CalendarClient> {
    pub fn from_config(config: &NewsConfig) -> Result<Self> {
        let client = CalendarClient::new(
            config.calendar_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(client, config))
    }
}

impl<S: CalendarSource> NewsTrader<S> {
    pub fn new(source: S, config: &NewsConfig) -> Self {
        Self {
            source,
            keywords: config.high_impact_keywords.clone(),
        }
    }
}

#[async_trait]
impl<S: CalendarSource> SignalProducer for NewsTrader<S> {
    async fn run_cycle(&self) -> Result<Vec<Signal>> {
        debug!("Running economic event scanner");
        let html = self.source.fetch_calendar().await?;
        let events = parse_calendar(&html, &self.keywords)?;

        let mut signals = Vec::new();
        for event in events {
            let Some(reading) = analyze_event(&event.title, &event.actual, &event.forecast) else {
                continue;
            };

            info!(
                "📰 NEWS ALPHA: {} | Act: {} vs Fore: {} -> {} ({})",
                event.title, event.actual, event.forecast, reading.label, reading.reason
            );
            signals.push(
                Signal::new(MONITOR_NAME, reading.label, reading.surprise).with_metadata(json!({
                    "event": event.title,
                    "actual": event.actual,
                    "forecast": event.forecast,
                    "reason": reading.reason,
                })),
            );
        }

        Ok(signals)
    }
}
