//! Supervisor - one isolated, repeating execution context per monitor
//!
//! The supervisor owns the `MonitorRegistry` and, on `start_all`, spawns a
//! tokio task per enabled spec running [`run_forever`]. Monitors share no
//! mutable state: each task owns its `RunState` sender, the supervisor only
//! keeps the receiving side for snapshots.

use crate::isolation::{run_forever, MonitorPhase, RunState};
use serde::{Deserialize, Serialize};
use signal_monitors::{MonitorRegistry, SignalSink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Configuration for the supervisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How long `stop_all` waits for in-flight cycles before abandoning them
    pub shutdown_grace_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 10,
        }
    }
}

/// Read-only view of one monitor's run state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStateSnapshot {
    pub name: String,
    pub cadence_secs: f64,
    pub enabled: bool,
    #[serde(flatten)]
    pub state: RunState,
}

/// Outcome of `stop_all`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShutdownReport {
    pub stopped: Vec<String>,
    pub abandoned: Vec<String>,
}

struct MonitorHandle {
    name: String,
    state: watch::Receiver<RunState>,
    join: JoinHandle<()>,
}

pub struct Supervisor {
    registry: MonitorRegistry,
    sink: Arc<dyn SignalSink>,
    grace: Duration,
    started: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    // receivers outlive the tasks so snapshots survive shutdown
    states: Mutex<Vec<(String, watch::Receiver<RunState>)>>,
    handles: Mutex<Vec<MonitorHandle>>,
}

impl Supervisor {
    pub fn new(registry: MonitorRegistry, sink: Arc<dyn SignalSink>, config: &SupervisorConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            registry,
            sink,
            grace: Duration::from_secs(config.shutdown_grace_secs),
            started: AtomicBool::new(false),
            shutdown_tx,
            states: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    /// Spawn exactly one execution context per enabled monitor.
    ///
    /// Returns the number of contexts spawned. Calling it again is a no-op,
    /// as is starting an empty registry. Must be called inside a tokio
    /// runtime.
    pub fn start_all(&self) -> usize {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Supervisor already started, ignoring start_all");
            return 0;
        }

        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());

        for spec in self.registry.enabled() {
            let name = spec.name().to_string();
            let cadence = spec.cadence();
            let producer = spec.producer().clone();
            let sink = self.sink.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            let (state_tx, state_rx) = watch::channel(RunState::default());

            let task_name = name.clone();
            let join = tokio::spawn(async move {
                run_forever(&task_name, cadence, shutdown_rx, state_tx, move || {
                    let producer = producer.clone();
                    let sink = sink.clone();
                    async move {
                        let signals = producer.run_cycle().await?;
                        for signal in &signals {
                            sink.emit(signal);
                        }
                        Ok(signals.len())
                    }
                })
                .await;
            });

            info!("Started monitor {} (cadence {:?})", name, cadence);
            states.push((name.clone(), state_rx.clone()));
            handles.push(MonitorHandle { name, state: state_rx, join });
        }

        let count = handles.len();
        if count == 0 {
            info!("No enabled monitors to start");
        } else {
            info!("✅ Supervisor running {} monitors", count);
        }
        count
    }

    /// Ask every context to stop, then wait up to the grace period.
    ///
    /// Contexts still running a cycle when the grace period runs out are
    /// logged as abandoned and left to finish on their own. A context that
    /// is not mid-cycle is always reported as stopped. A second call
    /// returns an empty report.
    pub async fn stop_all(&self) -> ShutdownReport {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(|e| e.into_inner()));
        let mut report = ShutdownReport::default();
        if handles.is_empty() {
            return report;
        }

        info!("Stopping {} monitors (grace {:?})", handles.len(), self.grace);
        self.shutdown_tx.send_replace(true);
        let deadline = Instant::now() + self.grace;
        // give sleeping loops a chance to observe the stop before any deadline check
        tokio::task::yield_now().await;

        for mut handle in handles {
            let joined = match tokio::time::timeout_at(deadline, &mut handle.join).await {
                Ok(joined) => joined,
                Err(_) => {
                    let phase = handle.state.borrow().phase;
                    if phase == MonitorPhase::Running {
                        warn!(
                            "Monitor {} still running a cycle after grace period, abandoning",
                            handle.name
                        );
                        report.abandoned.push(handle.name);
                        continue;
                    }
                    // not in a cycle: the loop exits at its next checkpoint
                    (&mut handle.join).await
                }
            };

            if let Err(e) = joined {
                error!("Monitor {} task ended abnormally: {}", handle.name, e);
            }
            report.stopped.push(handle.name);
        }

        info!(
            "Supervisor stopped: {} stopped, {} abandoned",
            report.stopped.len(),
            report.abandoned.len()
        );
        report
    }

    /// Current run state of every registered monitor. Monitors that were
    /// never started (disabled, or before `start_all`) report `Idle`.
    pub fn snapshots(&self) -> Vec<RunStateSnapshot> {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());

        self.registry
            .specs()
            .iter()
            .map(|spec| {
                let state = states
                    .iter()
                    .find(|(name, _)| name == spec.name())
                    .map(|(_, rx)| rx.borrow().clone())
                    .unwrap_or_default();

                RunStateSnapshot {
                    name: spec.name().to_string(),
                    cadence_secs: spec.cadence().as_secs_f64(),
                    enabled: spec.is_enabled(),
                    state,
                }
            })
            .collect()
    }

    pub fn snapshot(&self, name: &str) -> Option<RunStateSnapshot> {
        self.snapshots().into_iter().find(|s| s.name == name)
    }

    /// Number of monitors currently in the given phase
    pub fn count_in_phase(&self, phase: MonitorPhase) -> usize {
        self.snapshots()
            .iter()
            .filter(|s| s.state.phase == phase)
            .count()
    }
}
