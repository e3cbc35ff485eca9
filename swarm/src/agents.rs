//! Built-in voting agents.

use super::agent::TradingAgent;
use anyhow::{bail, Result};
use async_trait::async_trait;
use common::{AgentDecision, MarketState, TradeAction};
use signal_monitors::SignalTape;
use std::sync::Arc;

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Votes on bid/ask pressure. Order-book features are normalised so that
/// 0.5 means balanced; values above lean to the bid side.
#[derive(Debug, Clone)]
pub struct OrderbookImbalanceAgent {
    /// Minimum deviation from 0.5 before the agent takes a side
    pub threshold: f64,
}

impl Default for OrderbookImbalanceAgent {
    fn default() -> Self {
        Self { threshold: 0.05 }
    }
}

#[async_trait]
impl TradingAgent for OrderbookImbalanceAgent {
    fn name(&self) -> &str {
        "orderbook_imbalance"
    }

    async fn decide(&self, state: &MarketState) -> Result<AgentDecision> {
        if state.orderbook_features.is_empty() {
            bail!("no order-book features");
        }

        let deviation = mean(&state.orderbook_features) - 0.5;
        let action = if deviation > self.threshold {
            TradeAction::Buy
        } else if deviation < -self.threshold {
            TradeAction::Sell
        } else {
            TradeAction::Hold
        };

        let confidence = match action {
            TradeAction::Hold => 1.0 - (deviation.abs() * 2.0).min(1.0),
            _ => (deviation.abs() * 2.0).min(1.0),
        };

        Ok(AgentDecision { action, confidence })
    }
}

/// Compares the recent half of the OHLCV window with the older half
#[derive(Debug, Clone)]
pub struct MomentumAgent {
    /// Relative change between halves before the agent takes a side
    pub threshold: f64,
}

impl Default for MomentumAgent {
    fn default() -> Self {
        Self { threshold: 0.02 }
    }
}

#[async_trait]
impl TradingAgent for MomentumAgent {
    fn name(&self) -> &str {
        "momentum"
    }

    async fn decide(&self, state: &MarketState) -> Result<AgentDecision> {
        let features = &state.ohlcv_features;
        if features.len() < 2 {
            bail!("need at least two OHLCV features, got {}", features.len());
        }

        let (older, recent) = features.split_at(features.len() / 2);
        let base = mean(older);
        if base == 0.0 {
            bail!("OHLCV baseline is zero");
        }

        let change = (mean(recent) - base) / base.abs();
        let action = if change > self.threshold {
            TradeAction::Buy
        } else if change < -self.threshold {
            TradeAction::Sell
        } else {
            TradeAction::Hold
        };

        // saturates towards 1.0 as the move grows past the threshold
        let confidence = change.abs() / (change.abs() + self.threshold);
        let confidence = match action {
            TradeAction::Hold => 1.0 - confidence,
            _ => confidence,
        };

        Ok(AgentDecision { action, confidence })
    }
}

/// Reads the direction of recent monitor signals off the signal tape
pub struct SignalFlowAgent {
    tape: Arc<SignalTape>,
    window: usize,
}

impl SignalFlowAgent {
    pub fn new(tape: Arc<SignalTape>, window: usize) -> Self {
        Self { tape, window }
    }
}

#[async_trait]
impl TradingAgent for SignalFlowAgent {
    fn name(&self) -> &str {
        "signal_flow"
    }

    async fn decide(&self, _state: &MarketState) -> Result<AgentDecision> {
        let recent = self.tape.recent(self.window);
        if recent.is_empty() {
            return Ok(AgentDecision { action: TradeAction::Hold, confidence: 0.0 });
        }

        let net: i64 = recent.iter().map(|s| i64::from(s.bias())).sum();
        let action = match net {
            n if n > 0 => TradeAction::Buy,
            n if n < 0 => TradeAction::Sell,
            _ => TradeAction::Hold,
        };

        Ok(AgentDecision {
            action,
            confidence: net.unsigned_abs() as f64 / recent.len() as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Signal;
    use signal_monitors::SignalSink;

    fn state(orderbook: Vec<f64>, ohlcv: Vec<f64>) -> MarketState {
        MarketState {
            orderbook_features: orderbook,
            ohlcv_features: ohlcv,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_orderbook_balanced_holds() {
        let decision = OrderbookImbalanceAgent::default()
            .decide(&MarketState::default())
            .await
            .unwrap();
        assert_eq!(decision.action, TradeAction::Hold);
        assert_eq!(decision.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_orderbook_bid_pressure_buys() {
        let decision = OrderbookImbalanceAgent::default()
            .decide(&state(vec![0.8; 4], vec![]))
            .await
            .unwrap();
        assert_eq!(decision.action, TradeAction::Buy);
        assert!((decision.confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_orderbook_requires_features() {
        assert!(OrderbookImbalanceAgent::default()
            .decide(&state(vec![], vec![]))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_momentum_downtrend_sells() {
        let decision = MomentumAgent::default()
            .decide(&state(vec![], vec![1.0, 1.0, 0.9, 0.9]))
            .await
            .unwrap();
        assert_eq!(decision.action, TradeAction::Sell);
        assert!(decision.confidence > 0.5 && decision.confidence <= 1.0);
    }

    #[tokio::test]
    async fn test_momentum_rejects_short_window() {
        assert!(MomentumAgent::default().decide(&state(vec![], vec![1.0])).await.is_err());
    }

    #[tokio::test]
    async fn test_signal_flow_follows_tape() {
        let tape = Arc::new(SignalTape::new(16));
        let agent = SignalFlowAgent::new(tape.clone(), 10);

        let empty = agent.decide(&MarketState::default()).await.unwrap();
        assert_eq!(empty.action, TradeAction::Hold);

        tape.emit(&Signal::new("options/BTC", "BEARISH", 1.3));
        tape.emit(&Signal::new("gas_watcher", "GAS_SPIKE", 2.1));
        tape.emit(&Signal::new("defillama/lido", "UNDERVALUED", 25.0));
        tape.emit(&Signal::new("funding_arb/WIFUSDT", "DELTA_NEUTRAL_CARRY", 300.0));

        let decision = agent.decide(&MarketState::default()).await.unwrap();
        assert_eq!(decision.action, TradeAction::Sell);
        assert!((decision.confidence - 0.25).abs() < 1e-9);
    }
}
