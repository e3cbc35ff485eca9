//! Swarm Manager - polls every agent and aggregates their votes
//!
//! Agents are queried concurrently with a per-agent timeout. An agent that
//! errors, times out or answers with an out-of-range confidence simply sits
//! the round out.

use super::agent::{DecisionProvider, TradingAgent};
use anyhow::Result;
use async_trait::async_trait;
use common::{AgentDecision, Decision, MarketState, TradeAction};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the swarm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Per-agent answer deadline (milliseconds)
    pub agent_timeout_ms: u64,
    /// How many recent monitor signals the signal-flow agent reads
    pub signal_window: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            agent_timeout_ms: 500,
            signal_window: 50,
        }
    }
}

pub struct SwarmManager {
    agents: Vec<Arc<dyn TradingAgent>>,
    agent_timeout: Duration,
}

impl SwarmManager {
    pub fn new(config: &SwarmConfig) -> Self {
        Self {
            agents: Vec::new(),
            agent_timeout: Duration::from_millis(config.agent_timeout_ms),
        }
    }

    pub fn with_agent(mut self, agent: Arc<dyn TradingAgent>) -> Self {
        info!("Adding agent to swarm: {}", agent.name());
        self.agents.push(agent);
        self
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    async fn poll_agent(&self, agent: &dyn TradingAgent, state: &MarketState) -> Option<AgentDecision> {
        match tokio::time::timeout(self.agent_timeout, agent.decide(state)).await {
            Ok(Ok(decision)) if (0.0..=1.0).contains(&decision.confidence) => Some(decision),
            Ok(Ok(decision)) => {
                warn!(
                    "Agent {} returned out-of-range confidence {}",
                    agent.name(),
                    decision.confidence
                );
                None
            }
            Ok(Err(e)) => {
                warn!("Agent {} failed: {:#}", agent.name(), e);
                None
            }
            Err(_) => {
                warn!("Agent {} timed out after {:?}", agent.name(), self.agent_timeout);
                None
            }
        }
    }
}

/// Majority vote over the answering agents.
///
/// A tie for first place resolves to `Hold`. Confidence is the mean
/// confidence of the agents that voted for the resulting action (0.0 when
/// none did).
pub fn aggregate(votes: BTreeMap<String, AgentDecision>) -> Decision {
    if votes.is_empty() {
        return Decision::hold();
    }

    let mut tally: BTreeMap<TradeAction, (usize, f64)> = BTreeMap::new();
    for vote in votes.values() {
        let entry = tally.entry(vote.action).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += vote.confidence;
    }

    let top = tally.values().map(|(count, _)| *count).max().unwrap_or(0);
    let mut leaders = tally.iter().filter(|(_, (count, _))| *count == top);
    let action = match (leaders.next(), leaders.next()) {
        (Some((action, _)), None) => *action,
        _ => TradeAction::Hold,
    };

    let confidence = tally
        .get(&action)
        .map(|(count, sum)| sum / *count as f64)
        .unwrap_or(0.0);

    Decision {
        action,
        confidence,
        active_agents: votes.len(),
        agent_decisions: votes,
    }
}

#[async_trait]
impl DecisionProvider for SwarmManager {
    async fn get_decision(&self, state: &MarketState) -> Result<Decision> {
        let answers = join_all(self.agents.iter().map(|agent| async move {
            let decision = self.poll_agent(agent.as_ref(), state).await;
            (agent.name().to_string(), decision)
        }))
        .await;

        let votes: BTreeMap<String, AgentDecision> = answers
            .into_iter()
            .filter_map(|(name, decision)| decision.map(|d| (name, d)))
            .collect();

        let decision = aggregate(votes);
        debug!(
            "Swarm decision: {:?} ({:.2}) from {} agents",
            decision.action, decision.confidence, decision.active_agents
        );
        Ok(decision)
    }
}
