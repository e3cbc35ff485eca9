//! Capability traits for agents and for the aggregator as a whole.

use async_trait::async_trait;
use common::{AgentDecision, Decision, MarketState};

/// A single voting agent
#[async_trait]
pub trait TradingAgent: Send + Sync {
    /// Stable name, used as the key in `Decision::agent_decisions`
    fn name(&self) -> &str;

    /// Vote on the current market state
    async fn decide(&self, state: &MarketState) -> anyhow::Result<AgentDecision>;
}

/// Anything able to answer a market-state query with a decision.
///
/// The stream treats an error from `get_decision` like a malformed answer
/// and falls back to `Decision::hold()`.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn get_decision(&self, state: &MarketState) -> anyhow::Result<Decision>;
}
