//! Destinations for emitted signals.

use common::Signal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Receives every signal a monitor emits. Emission is one-way; sinks get a
/// shared reference and never hand anything back to the producer.
pub trait SignalSink: Send + Sync {
    fn emit(&self, signal: &Signal);
}

/// Writes each signal to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl SignalSink for LogSink {
    fn emit(&self, signal: &Signal) {
        info!(
            "📡 Signal from {}: {} ({:.4})",
            signal.source, signal.label, signal.magnitude
        );
    }
}

/// In-process event bus backed by a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Signal>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }
}

impl SignalSink for BroadcastSink {
    fn emit(&self, signal: &Signal) {
        if self.tx.send(signal.clone()).is_err() {
            debug!("No subscribers for signal from {}", signal.source);
        }
    }
}

/// Forwards each signal to several sinks in registration order
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn SignalSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn SignalSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl SignalSink for FanoutSink {
    fn emit(&self, signal: &Signal) {
        for sink in &self.sinks {
            sink.emit(signal);
        }
    }
}

/// Bounded ring of the most recent signals, newest last
#[derive(Debug)]
pub struct SignalTape {
    capacity: usize,
    entries: Mutex<VecDeque<Signal>>,
}

impl SignalTape {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Up to `limit` signals, newest first
    pub fn recent(&self, limit: usize) -> Vec<Signal> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SignalSink for SignalTape {
    fn emit(&self, signal: &Signal) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(signal.clone());
    }
}
