//! Decision Swarm
//!
//! Multi-agent decision aggregator queried by the decision stream:
//! - `TradingAgent` trait implemented by every voting agent
//! - `SwarmManager`, which polls all agents and majority-votes an action
//! - built-in agents reading order-book, OHLCV and monitor signal flow

pub mod agent;
pub mod agents;
pub mod manager;

pub use agent::{DecisionProvider, TradingAgent};
pub use agents::{MomentumAgent, OrderbookImbalanceAgent, SignalFlowAgent};
pub use manager::{SwarmConfig, SwarmManager};

// Re-export common types for convenience
pub use common::{AgentDecision, Decision, MarketState, TradeAction};
