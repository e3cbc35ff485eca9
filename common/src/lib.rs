//! Shared types for the OmniTrade signal orchestrator.
//!
//! - `Signal`: the immutable output of one monitor cycle
//! - `MarketState` / `Decision`: the aggregator query and its answer
//! - the error taxonomy shared by every crate in the workspace

pub mod decision;
pub mod error;
pub mod signal;

pub use decision::{AgentDecision, Decision, MarketState, Position, TradeAction};
pub use error::{AdminError, ConfigError, CycleError, DeliveryError};
pub use signal::Signal;
