//! Orchestrator configuration, loaded from a single TOML file.
//!
//! Every section is `#[serde(default)]`, so an empty file (or no file at
//! all) yields the built-in defaults.

use crate::scaling::ScalingConfig;
use crate::stream::StreamConfig;
use crate::supervisor::SupervisorConfig;
use common::ConfigError;
use serde::{Deserialize, Serialize};
use signal_monitors::MonitorsConfig;
use std::net::SocketAddr;
use std::path::Path;
use swarm::SwarmConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub supervisor: SupervisorConfig,
    pub scaling: ScalingConfig,
    pub swarm: SwarmConfig,
    pub signals: SignalsConfig,
    pub monitors: MonitorsConfig,
}

/// HTTP / WebSocket listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

/// In-memory signal tape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    /// Number of recent signals kept for `/signals` and the swarm
    pub tape_capacity: usize,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self { tape_capacity: 500 }
    }
}

impl OrchestratorConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str::<Self>(&content)
            .map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })
            .and_then(Self::validated)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str::<Self>(content)
            .map_err(|e| ConfigError::Parse {
                path: "<inline>".to_string(),
                message: e.to_string(),
            })
            .and_then(Self::validated)
    }

    fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// Reject values that would stall or spin a loop
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(value: u64, key: &str) -> Result<(), ConfigError> {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", key)));
            }
            Ok(())
        }

        self.bind_addr()?;
        positive(self.stream.interval_ms, "stream.interval_ms")?;
        positive(self.stream.decision_timeout_ms, "stream.decision_timeout_ms")?;
        positive(self.supervisor.shutdown_grace_secs, "supervisor.shutdown_grace_secs")?;
        positive(self.scaling.timeout_secs, "scaling.timeout_secs")?;
        positive(self.swarm.agent_timeout_ms, "swarm.agent_timeout_ms")?;
        positive(self.signals.tape_capacity as u64, "signals.tape_capacity")?;

        if self.stream.decision_timeout_ms >= self.stream.interval_ms {
            return Err(ConfigError::Invalid(format!(
                "stream.decision_timeout_ms ({}) must be shorter than stream.interval_ms ({})",
                self.stream.decision_timeout_ms, self.stream.interval_ms
            )));
        }
        if !self.stream.placeholder_pnl.is_finite() {
            return Err(ConfigError::Invalid(
                "stream.placeholder_pnl must be a finite number".to_string(),
            ));
        }
        if self.scaling.program.trim().is_empty() {
            return Err(ConfigError::Invalid("scaling.program must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind.parse().map_err(|e| {
            ConfigError::Invalid(format!("server.bind `{}`: {}", self.server.bind, e))
        })
    }
}
