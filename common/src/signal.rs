use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A categorical reading produced by one monitor cycle.
///
/// Signals are built once and then only handed out by reference or cloned;
/// there are no mutating methods after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    /// Monitor (or protocol / symbol within it) that produced the reading
    pub source: String,
    /// Categorical classification, e.g. `BEARISH` or `GAS_SPIKE`
    pub label: String,
    /// Score backing the label (percentage change, ratio, APR, ...)
    pub magnitude: f64,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl Signal {
    pub fn new(source: impl Into<String>, label: impl Into<String>, magnitude: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            label: label.into(),
            magnitude,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach free-form metadata. Consumes the builder so it can only be
    /// used before the signal is emitted.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Rough directional reading of the label, used by consumers that only
    /// care about bullish vs bearish flow.
    pub fn bias(&self) -> i8 {
        const BULLISH: [&str; 4] = ["BULLISH", "UNDERVALUED", "BUY", "BRIDGE_INFLOW"];
        const BEARISH: [&str; 3] = ["BEARISH", "SELL", "GAS_SPIKE"];

        let label = self.label.to_ascii_uppercase();
        if BULLISH.iter().any(|k| label.contains(k)) {
            1
        } else if BEARISH.iter().any(|k| label.contains(k)) {
            -1
        } else {
            0
        }
    }
}
