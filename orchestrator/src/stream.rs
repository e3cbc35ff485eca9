//! Decision Stream - fixed-interval broadcast of aggregator snapshots
//!
//! Every tick the stream asks the `DecisionProvider` for a decision, wraps
//! it into a `DecisionSnapshot`, serializes it once and hands the same
//! payload to every connected subscriber.
//!
//! Each subscriber owns a `watch` slot, so a slow consumer only ever sees
//! the newest snapshot: anything it missed is overwritten, never queued.

use common::{AgentDecision, Decision, DeliveryError, MarketState, TradeAction};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use swarm::DecisionProvider;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Configuration for the decision stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Tick interval (milliseconds)
    pub interval_ms: u64,
    /// Upper bound on one aggregator call (milliseconds)
    pub decision_timeout_ms: u64,
    /// Profit/loss figure reported until real accounting is wired in
    pub placeholder_pnl: f64,
    /// Market state sent to the aggregator every tick
    pub market_state: MarketState,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            decision_timeout_ms: 800,
            placeholder_pnl: 0.0,
            market_state: MarketState::default(),
        }
    }
}

/// What subscribers receive each tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSnapshot {
    pub pnl: f64,
    pub active_agents: usize,
    pub signals: SnapshotSignals,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSignals {
    pub action: TradeAction,
    pub confidence: f64,
    pub agent_decisions: BTreeMap<String, AgentDecision>,
}

impl DecisionSnapshot {
    pub fn new(decision: Decision, pnl: f64) -> Self {
        Self {
            pnl,
            active_agents: decision.active_agents,
            signals: SnapshotSignals {
                action: decision.action,
                confidence: decision.confidence,
                agent_decisions: decision.agent_decisions,
            },
            timestamp: chrono::Utc::now(),
        }
    }
}

type Slot = watch::Sender<Option<Arc<str>>>;

/// Connected subscribers, safe to mutate while a broadcast is iterating
#[derive(Default)]
pub struct SubscriberSet {
    slots: DashMap<Uuid, Slot>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscriber {
        let (tx, rx) = watch::channel(None);
        let id = Uuid::new_v4();
        self.slots.insert(id, tx);
        debug!("Subscriber {} connected ({} total)", id, self.slots.len());
        Subscriber { id, rx }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        if self.slots.remove(&id).is_some() {
            debug!("Subscriber {} disconnected ({} left)", id, self.slots.len());
        }
    }

    /// Overwrite every subscriber's slot with `payload`.
    ///
    /// A subscriber whose receiving side is gone is removed on the spot;
    /// the rest are unaffected. Returns the number of successful deliveries.
    pub fn broadcast(&self, payload: Arc<str>) -> usize {
        let mut delivered = 0;
        let mut gone = Vec::new();

        for entry in self.slots.iter() {
            match entry.value().send(Some(payload.clone())) {
                Ok(()) => delivered += 1,
                Err(_) => gone.push(*entry.key()),
            }
        }

        // removal must wait until the iterator has released its shard locks
        for id in gone {
            self.slots.remove(&id);
            info!("{}, dropped from stream", DeliveryError::Disconnected(id));
        }
        delivered
    }

    /// Drop every subscriber; their `next()` calls resolve to `None`
    pub fn clear(&self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Receiving side of one subscription
pub struct Subscriber {
    id: Uuid,
    rx: watch::Receiver<Option<Arc<str>>>,
}

impl Subscriber {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next unseen snapshot. `None` once the stream has
    /// dropped this subscriber.
    pub async fn next(&mut self) -> Option<Arc<str>> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}

pub struct DecisionStream {
    provider: Arc<dyn DecisionProvider>,
    config: StreamConfig,
    subscribers: SubscriberSet,
}

impl DecisionStream {
    pub fn new(provider: Arc<dyn DecisionProvider>, config: StreamConfig) -> Self {
        Self {
            provider,
            config,
            subscribers: SubscriberSet::new(),
        }
    }

    pub fn subscribers(&self) -> &SubscriberSet {
        &self.subscribers
    }

    pub fn subscribe(&self) -> Subscriber {
        self.subscribers.subscribe()
    }

    /// Ask the aggregator, degrading errors, timeouts and malformed answers
    /// to `Decision::hold()`.
    pub async fn current_decision(&self) -> Decision {
        let deadline = Duration::from_millis(self.config.decision_timeout_ms);
        let query = self.provider.get_decision(&self.config.market_state);

        match tokio::time::timeout(deadline, query).await {
            Ok(Ok(decision)) => {
                if !decision.is_well_formed() {
                    warn!("Aggregator returned a malformed decision, holding");
                }
                decision.sanitize()
            }
            Ok(Err(e)) => {
                warn!("Aggregator failed: {:#}, holding", e);
                Decision::hold()
            }
            Err(_) => {
                warn!("Aggregator did not answer within {:?}, holding", deadline);
                Decision::hold()
            }
        }
    }

    /// One tick: query, wrap, serialize once, fan out
    pub async fn tick(&self) -> usize {
        let decision = self.current_decision().await;
        let snapshot = DecisionSnapshot::new(decision, self.config.placeholder_pnl);

        let payload: Arc<str> = match serde_json::to_string(&snapshot) {
            Ok(json) => json.into(),
            Err(e) => {
                error!("Failed to serialize decision snapshot: {}", e);
                return 0;
            }
        };

        self.subscribers.broadcast(payload)
    }

    /// Spawn the tick loop. Must be called inside a tokio runtime.
    pub fn start(self: &Arc<Self>) -> StreamHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let stream = self.clone();
        let period = Duration::from_millis(self.config.interval_ms);

        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let delivered = stream.tick().await;
                        debug!("Decision snapshot delivered to {} subscribers", delivered);
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!("Decision stream stopped");
        });

        info!("📺 Decision stream started (interval {:?})", period);
        StreamHandle {
            stream: self.clone(),
            shutdown: shutdown_tx,
            join,
        }
    }
}

/// Handle to a running stream loop
pub struct StreamHandle {
    stream: Arc<DecisionStream>,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl StreamHandle {
    /// Stop ticking and disconnect every subscriber. Returns `false` if the
    /// loop did not finish within `grace`.
    pub async fn stop(self, grace: Duration) -> bool {
        self.shutdown.send_replace(true);
        let finished = match tokio::time::timeout(grace, self.join).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Decision stream task ended abnormally: {}", e);
                true
            }
            Err(_) => {
                warn!("Decision stream still busy after {:?}, abandoning", grace);
                false
            }
        };
        self.stream.subscribers.clear();
        finished
    }
}
