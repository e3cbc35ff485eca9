//! Concrete monitors.
//!
//! Each monitor pairs a fetcher trait (with an HTTP implementation) and a
//! pure analysis function driven by configured thresholds.

pub mod bridge;
pub mod defillama;
pub mod funding;
pub mod gas;
pub mod news;
pub mod options;

pub use bridge::{BridgeWatcher, JsonRpcBalanceClient};
pub use defillama::{DefiLlamaClient, DefiLlamaTracker};
pub use funding::{BinanceFundingClient, FundingArbScanner};
pub use gas::{GasWatcher, MempoolClient};
pub use news::{CalendarClient, NewsTrader};
pub use options::{DeribitClient, OptionsSentiment};

use anyhow::{anyhow, Result};
use tracing::warn;

/// Tracks per-item fetches within one cycle. A cycle only fails when every
/// item failed; partial failures are logged and skipped.
#[derive(Debug, Default)]
pub(crate) struct FetchTally {
    attempted: usize,
    failed: usize,
    last_error: Option<anyhow::Error>,
}

impl FetchTally {
    pub(crate) fn ok(&mut self) {
        self.attempted += 1;
    }

    pub(crate) fn failed(&mut self, monitor: &str, item: &str, error: anyhow::Error) {
        warn!("{}: fetch for {} failed, skipping: {:#}", monitor, item, error);
        self.attempted += 1;
        self.failed += 1;
        self.last_error = Some(error);
    }

    pub(crate) fn finish(self, monitor: &str) -> Result<()> {
        if self.attempted > 0 && self.failed == self.attempted {
            let cause = self
                .last_error
                .unwrap_or_else(|| anyhow!("unknown fetch error"));
            return Err(cause.context(format!(
                "{}: all {} fetches failed",
                monitor, self.attempted
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_partial_failure_is_ok() {
        let mut tally = FetchTally::default();
        tally.ok();
        tally.failed("defillama", "lido", anyhow!("timeout"));
        assert!(tally.finish("defillama").is_ok());
    }

    #[test]
    fn test_tally_total_failure_is_error() {
        let mut tally = FetchTally::default();
        tally.failed("options_sentiment", "BTC", anyhow!("503"));
        tally.failed("options_sentiment", "ETH", anyhow!("503"));

        let err = tally.finish("options_sentiment").unwrap_err();
        assert!(format!("{:#}", err).contains("all 2 fetches failed"));
    }

    #[test]
    fn test_tally_nothing_attempted() {
        assert!(FetchTally::default().finish("empty").is_ok());
    }
}
