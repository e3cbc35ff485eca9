//! OmniTrade Orchestrator
//!
//! Runs every registered monitor on its own cadence, fully isolated from
//! the others, and streams aggregator decisions to connected dashboards:
//! - `isolation`: the run-forever-with-isolation loop and per-monitor `RunState`
//! - `supervisor`: one execution context per monitor, bounded shutdown
//! - `stream`: fixed-interval, last-value-wins decision broadcast
//! - `scaling`: worker-pool scale control with a replica floor
//! - `lifecycle`: idempotent startup / shutdown of all of the above
//! - `server`: HTTP and WebSocket surface

pub mod config;
pub mod isolation;
pub mod lifecycle;
pub mod scaling;
pub mod server;
pub mod stream;
pub mod supervisor;

pub use config::{OrchestratorConfig, ServerConfig, SignalsConfig};
pub use isolation::{run_forever, MonitorPhase, RunState};
pub use lifecycle::{Lifecycle, LifecyclePhase};
pub use scaling::{CommandProcessManager, ProcessManager, ScaleController, ScaleReceipt, ScalingConfig};
pub use server::{router, AppState};
pub use stream::{DecisionSnapshot, DecisionStream, StreamConfig, StreamHandle, Subscriber, SubscriberSet};
pub use supervisor::{RunStateSnapshot, ShutdownReport, Supervisor, SupervisorConfig};
