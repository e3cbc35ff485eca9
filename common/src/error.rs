//! Error taxonomy shared across the workspace.
//!
//! Only `ConfigError` and `AdminError` ever reach a caller. `CycleError`
//! and `DeliveryError` are contained where they happen and only show up in
//! logs and run-state snapshots.

use thiserror::Error;
use uuid::Uuid;

/// Invalid monitor registration or configuration; blocks startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("monitor name must not be empty")]
    EmptyName,

    #[error("duplicate monitor name: {0}")]
    DuplicateMonitor(String),

    #[error("monitor {0} has a zero cadence")]
    ZeroCadence(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },
}

/// Any failure inside a monitor cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("{0:#}")]
    Failed(anyhow::Error),

    #[error("cycle panicked: {0}")]
    Panicked(String),
}

/// Failure delivering a snapshot to one stream subscriber
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("subscriber {0} disconnected")]
    Disconnected(Uuid),
}

/// Rejected scale request or process-manager failure; never retried
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("requested {requested} replicas, minimum is {minimum}")]
    BelowMinimum { requested: u32, minimum: u32 },

    #[error("failed to launch process manager `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("process manager exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("process manager did not answer within {0:?}")]
    TimedOut(std::time::Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ConfigError::DuplicateMonitor("gas_watcher".to_string());
        assert_eq!(err.to_string(), "duplicate monitor name: gas_watcher");

        let err = AdminError::BelowMinimum { requested: 2, minimum: 4 };
        assert_eq!(err.to_string(), "requested 2 replicas, minimum is 4");
    }

    #[test]
    fn test_cycle_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection reset").context("fetch deribit summary");
        let err = CycleError::Failed(inner);
        assert_eq!(err.to_string(), "fetch deribit summary: connection reset");
    }
}
