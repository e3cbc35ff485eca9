//! Aggregator query and answer types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trade action proposed by an agent or by the swarm as a whole
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
    #[default]
    Hold,
}

/// Open position held by the portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub size: f64,
    pub entry_price: f64,
}

/// Market state handed to the aggregator on every stream tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketState {
    pub orderbook_features: Vec<f64>,
    pub ohlcv_features: Vec<f64>,
    pub portfolio_value: f64,
    pub positions: Vec<Position>,
}

impl Default for MarketState {
    fn default() -> Self {
        Self {
            orderbook_features: vec![0.5; 10],
            ohlcv_features: vec![0.5; 10],
            portfolio_value: 10_000.0,
            positions: Vec::new(),
        }
    }
}

/// One agent's vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDecision {
    pub action: TradeAction,
    pub confidence: f64, // 0.0 to 1.0
}

/// Aggregated swarm decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: TradeAction,
    pub confidence: f64, // 0.0 to 1.0
    pub active_agents: usize,
    pub agent_decisions: BTreeMap<String, AgentDecision>,
}

impl Decision {
    /// Safe default used whenever no usable answer is available
    pub fn hold() -> Self {
        Self {
            action: TradeAction::Hold,
            confidence: 0.0,
            active_agents: 0,
            agent_decisions: BTreeMap::new(),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        let confidence_ok = |c: f64| c.is_finite() && (0.0..=1.0).contains(&c);

        confidence_ok(self.confidence)
            && self.agent_decisions.values().all(|d| confidence_ok(d.confidence))
    }

    /// Degrade a malformed decision to `hold()` instead of passing it on.
    pub fn sanitize(self) -> Self {
        if self.is_well_formed() {
            self
        } else {
            Self::hold()
        }
    }
}
