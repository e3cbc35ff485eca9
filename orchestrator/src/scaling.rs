//! Scale control for the external worker pool
//!
//! A scale request is checked against the replica floor before anything is
//! sent to the process manager. Failures come back to the caller as
//! `AdminError` and are never retried here.

use async_trait::async_trait;
use common::AdminError;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};

/// Configuration for scale control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Requests below this replica count are rejected
    pub min_replicas: u32,
    /// Process manager executable
    pub program: String,
    /// Arguments placed before the app name and replica count
    pub args: Vec<String>,
    /// Worker application managed by the process manager
    pub app_name: String,
    /// Upper bound on one process-manager invocation (seconds)
    pub timeout_secs: u64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_replicas: 4,
            program: "pm2".to_string(),
            args: vec!["scale".to_string()],
            app_name: "omnitrade-worker".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Result of an accepted scale request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleReceipt {
    pub replicas: u32,
    pub command: String,
    pub output: String,
}

/// Something able to resize the worker pool
#[async_trait]
pub trait ProcessManager: Send + Sync {
    async fn scale(&self, replicas: u32) -> Result<ScaleReceipt, AdminError>;
}

/// Shells out to a process manager such as `pm2`
pub struct CommandProcessManager {
    program: String,
    args: Vec<String>,
    app_name: String,
    timeout: Duration,
}

impl CommandProcessManager {
    pub fn from_config(config: &ScalingConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            app_name: config.app_name.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn command_line(&self, replicas: u32) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.push(self.app_name.clone());
        parts.push(replicas.to_string());
        parts.join(" ")
    }
}

#[async_trait]
impl ProcessManager for CommandProcessManager {
    async fn scale(&self, replicas: u32) -> Result<ScaleReceipt, AdminError> {
        let command = self.command_line(replicas);
        info!("Issuing scale command: {}", command);

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.app_name)
            .arg(replicas.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AdminError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AdminError::TimedOut(self.timeout))?
            .map_err(|source| AdminError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(AdminError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(ScaleReceipt {
            replicas,
            command,
            output: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        })
    }
}

pub struct ScaleController {
    min_replicas: u32,
    manager: Arc<dyn ProcessManager>,
}

impl ScaleController {
    pub fn new(min_replicas: u32, manager: Arc<dyn ProcessManager>) -> Self {
        Self { min_replicas, manager }
    }

    pub fn from_config(config: &ScalingConfig) -> Self {
        Self::new(
            config.min_replicas,
            Arc::new(CommandProcessManager::from_config(config)),
        )
    }

    pub fn min_replicas(&self) -> u32 {
        self.min_replicas
    }

    /// Validate against the floor, then issue exactly one scale command
    pub async fn request(&self, replicas: u32) -> Result<ScaleReceipt, AdminError> {
        if replicas < self.min_replicas {
            let err = AdminError::BelowMinimum {
                requested: replicas,
                minimum: self.min_replicas,
            };
            warn!("Scale request rejected: {}", err);
            return Err(err);
        }

        match self.manager.scale(replicas).await {
            Ok(receipt) => {
                info!("✅ Worker pool scaled to {} replicas", replicas);
                Ok(receipt)
            }
            Err(e) => {
                error!("Scale to {} replicas failed: {}", replicas, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingManager {
        calls: Mutex<Vec<u32>>,
        fail: bool,
    }

    #[async_trait]
    impl ProcessManager for RecordingManager {
        async fn scale(&self, replicas: u32) -> Result<ScaleReceipt, AdminError> {
            self.calls.lock().unwrap().push(replicas);
            if self.fail {
                return Err(AdminError::CommandFailed {
                    status: "exit status: 1".to_string(),
                    stderr: "app not found".to_string(),
                });
            }
            Ok(ScaleReceipt {
                replicas,
                command: format!("fake scale {}", replicas),
                output: String::new(),
            })
        }
    }

    fn controller(manager: &Arc<RecordingManager>) -> ScaleController {
        ScaleController::new(4, manager.clone())
    }

    #[tokio::test]
    async fn test_below_floor_never_reaches_process_manager() {
        let manager = Arc::new(RecordingManager::default());
        let err = controller(&manager).request(2).await.unwrap_err();

        assert!(matches!(
            err,
            AdminError::BelowMinimum { requested: 2, minimum: 4 }
        ));
        assert!(manager.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_floor_is_inclusive() {
        let manager = Arc::new(RecordingManager::default());
        let receipt = controller(&manager).request(4).await.unwrap();

        assert_eq!(receipt.replicas, 4);
        assert_eq!(*manager.calls.lock().unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn test_failure_is_surfaced_without_retry() {
        let manager = Arc::new(RecordingManager {
            fail: true,
            ..Default::default()
        });
        let err = controller(&manager).request(8).await.unwrap_err();

        assert!(matches!(err, AdminError::CommandFailed { .. }));
        assert_eq!(manager.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_default_command_line() {
        let manager = CommandProcessManager::from_config(&ScalingConfig::default());
        assert_eq!(manager.command_line(6), "pm2 scale omnitrade-worker 6");
    }

    fn shell_config(program: &str, app_name: &str, timeout_secs: u64) -> ScalingConfig {
        ScalingConfig {
            program: program.to_string(),
            args: Vec::new(),
            app_name: app_name.to_string(),
            timeout_secs,
            ..Default::default()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_exit_status_is_checked() {
        let ok = CommandProcessManager::from_config(&shell_config("true", "worker", 5));
        assert_eq!(ok.scale(6).await.unwrap().command, "true worker 6");

        let failing = CommandProcessManager::from_config(&shell_config("false", "worker", 5));
        assert!(matches!(
            failing.scale(6).await.unwrap_err(),
            AdminError::CommandFailed { .. }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_command_times_out() {
        // runs `sleep 30 6`
        let manager = CommandProcessManager::from_config(&shell_config("sleep", "30", 1));
        assert!(matches!(
            manager.scale(6).await.unwrap_err(),
            AdminError::TimedOut(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let manager = CommandProcessManager::from_config(&shell_config(
            "omnitrade-no-such-process-manager",
            "worker",
            5,
        ));
        assert!(matches!(
            manager.scale(6).await.unwrap_err(),
            AdminError::Spawn { .. }
        ));
    }
}
