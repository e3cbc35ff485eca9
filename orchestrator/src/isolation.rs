//! Run-forever-with-isolation primitive.
//!
//! One call to [`run_forever`] drives one monitor for the lifetime of the
//! process: wait the cadence, run the cycle, record the outcome, repeat.
//! A failed or panicking cycle is logged and counted; it never ends the
//! loop and never reaches another monitor.

use chrono::{DateTime, Utc};
use common::CycleError;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Per-monitor state machine:
/// `Idle → Sleeping → Running → Sleeping → … → Stopping → Stopped`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    #[default]
    Idle,
    Sleeping,
    Running,
    Stopping,
    Stopped,
}

/// Written only by the monitor's own loop; everyone else reads snapshots
/// through a `watch::Receiver`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunState {
    pub phase: MonitorPhase,
    /// Start of the most recent cycle
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub total_cycles: u64,
    pub total_failures: u64,
    pub signals_emitted: u64,
}

/// Await a cycle future, turning both errors and panics into `CycleError`
pub async fn guarded<F, T>(cycle: F) -> Result<T, CycleError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(cycle).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CycleError::Failed(e)),
        Err(panic) => Err(CycleError::Panicked(panic_message(panic))),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Drive `cycle` every `cadence` until `shutdown` flips to `true`.
///
/// The cadence is measured from the end of the previous cycle, so a slow
/// cycle pushes the next one back but never causes one to be skipped.
/// A stop request cuts the cadence wait short, but is only acted on at the
/// `Sleeping → Running` checkpoint: an in-flight cycle always completes.
///
/// `cycle` resolves to the number of signals it emitted.
pub async fn run_forever<F, Fut>(
    name: &str,
    cadence: Duration,
    mut shutdown: watch::Receiver<bool>,
    state: watch::Sender<RunState>,
    mut cycle: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<usize>>,
{
    debug!("Monitor {} loop started (cadence {:?})", name, cadence);

    loop {
        state.send_modify(|s| s.phase = MonitorPhase::Sleeping);

        let sender_gone = tokio::select! {
            _ = tokio::time::sleep(cadence) => false,
            changed = shutdown.changed() => changed.is_err(),
        };
        if sender_gone || *shutdown.borrow() {
            break;
        }

        state.send_modify(|s| {
            s.phase = MonitorPhase::Running;
            s.last_run_at = Some(Utc::now());
        });
        let started = Instant::now();
        let outcome = guarded(cycle()).await;
        let elapsed = started.elapsed();

        state.send_modify(|s| {
            s.last_duration_ms = Some(elapsed.as_millis() as u64);
            s.total_cycles += 1;

            match &outcome {
                Ok(emitted) => {
                    s.consecutive_failures = 0;
                    s.last_error = None;
                    s.signals_emitted += *emitted as u64;
                }
                Err(e) => {
                    s.consecutive_failures += 1;
                    s.total_failures += 1;
                    s.last_error = Some(e.to_string());
                    error!(
                        "Monitor {} cycle failed ({} in a row): {}",
                        name, s.consecutive_failures, e
                    );
                }
            }
        });

        if let Ok(emitted) = outcome {
            debug!("Monitor {} emitted {} signals in {:?}", name, emitted, elapsed);
        }
    }

    state.send_modify(|s| s.phase = MonitorPhase::Stopping);
    info!("Monitor {} loop stopping", name);
    state.send_modify(|s| s.phase = MonitorPhase::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_guarded_passes_value_through() {
        assert_eq!(guarded(async { Ok(3) }).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_guarded_wraps_error() {
        let err = guarded(async { Err::<(), _>(anyhow!("bad payload")) })
            .await
            .unwrap_err();
        assert!(matches!(err, CycleError::Failed(_)));
        assert_eq!(err.to_string(), "bad payload");
    }

    #[tokio::test]
    async fn test_guarded_catches_panic() {
        let err = guarded(async {
            if true {
                panic!("index out of bounds");
            }
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "cycle panicked: index out of bounds");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence_is_measured_from_cycle_end() {
        let cadence = Duration::from_secs(10);
        let work = Duration::from_secs(3);
        let starts = Arc::new(Mutex::new(Vec::new()));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(RunState::default());

        let recorded = starts.clone();
        let handle = tokio::spawn(async move {
            run_forever("slow", cadence, shutdown_rx, state_tx, move || {
                let recorded = recorded.clone();
                async move {
                    recorded.lock().unwrap().push(Instant::now());
                    tokio::time::sleep(work).await;
                    Ok(0)
                }
            })
            .await
        });

        tokio::time::sleep(Duration::from_secs(60)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let starts = starts.lock().unwrap();
        assert!(starts.len() >= 4);
        for pair in starts.windows(2) {
            assert_eq!(pair[1] - pair[0], cadence + work);
        }
        assert_eq!(state_rx.borrow().phase, MonitorPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_counted_and_loop_continues() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(RunState::default());

        let counter = calls.clone();
        let handle = tokio::spawn(async move {
            run_forever("flaky", Duration::from_secs(1), shutdown_rx, state_tx, move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(anyhow!("upstream 503"))
                    } else {
                        Ok(2)
                    }
                }
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        {
            let state = state_rx.borrow();
            assert_eq!(state.consecutive_failures, 3);
            assert_eq!(state.last_error.as_deref(), Some("upstream 503"));
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        {
            let state = state_rx.borrow();
            assert_eq!(state.consecutive_failures, 0);
            assert_eq!(state.total_failures, 3);
            assert_eq!(state.total_cycles, 4);
            assert_eq!(state.signals_emitted, 2);
            assert!(state.last_error.is_none());
        }

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_run_at_marks_cycle_start() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(RunState::default());
        let seen_inside = Arc::new(Mutex::new(None));

        let recorded = seen_inside.clone();
        let handle = tokio::spawn(async move {
            run_forever("slow", Duration::from_secs(1), shutdown_rx, state_tx, move || {
                let recorded = recorded.clone();
                async move {
                    *recorded.lock().unwrap() = Some(Utc::now());
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(0)
                }
            })
            .await
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        {
            let state = state_rx.borrow();
            assert_eq!(state.phase, MonitorPhase::Running);
            assert_eq!(state.total_cycles, 0);
            let started_at = state.last_run_at.unwrap();
            assert!(started_at <= seen_inside.lock().unwrap().unwrap());
        }

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(state_rx.borrow().total_cycles, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_shutdown_sender_stops_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(RunState::default());
        drop(shutdown_tx);

        let counter = calls.clone();
        run_forever("orphan", Duration::from_secs(1), shutdown_rx, state_tx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(0) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(state_rx.borrow().phase, MonitorPhase::Stopped);
    }
}
