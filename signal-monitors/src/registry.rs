//! Validated, fixed set of monitors assembled once at startup.

use super::producer::MonitorSpec;
use common::ConfigError;
use std::collections::HashSet;
use tracing::debug;

/// The monitor set owned by the supervisor.
///
/// Construction is the only place specs are checked: names must be unique
/// and non-empty, cadences strictly positive. After that the set never
/// changes.
#[derive(Debug, Clone, Default)]
pub struct MonitorRegistry {
    specs: Vec<MonitorSpec>,
}

impl MonitorRegistry {
    pub fn new(specs: Vec<MonitorSpec>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();

        for spec in &specs {
            if spec.name().trim().is_empty() {
                return Err(ConfigError::EmptyName);
            }
            if spec.cadence().is_zero() {
                return Err(ConfigError::ZeroCadence(spec.name().to_string()));
            }
            if !seen.insert(spec.name()) {
                return Err(ConfigError::DuplicateMonitor(spec.name().to_string()));
            }
            debug!("Registered monitor {} (cadence {:?})", spec.name(), spec.cadence());
        }

        Ok(Self { specs })
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn specs(&self) -> &[MonitorSpec] {
        &self.specs
    }

    pub fn enabled(&self) -> impl Iterator<Item = &MonitorSpec> {
        self.specs.iter().filter(|spec| spec.is_enabled())
    }

    pub fn get(&self, name: &str) -> Option<&MonitorSpec> {
        self.specs.iter().find(|spec| spec.name() == name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Collects specs and validates them all at once in `build`
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    specs: Vec<MonitorSpec>,
}

impl RegistryBuilder {
    pub fn register(mut self, spec: MonitorSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn build(self) -> Result<MonitorRegistry, ConfigError> {
        MonitorRegistry::new(self.specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::SignalProducer;
    use async_trait::async_trait;
    use common::Signal;
    use std::time::Duration;

    struct Noop;

    #[async_trait]
    impl SignalProducer for Noop {
        async fn run_cycle(&self) -> anyhow::Result<Vec<Signal>> {
            Ok(Vec::new())
        }
    }

    fn spec(name: &str, secs: u64) -> MonitorSpec {
        MonitorSpec::new(name, Duration::from_secs(secs), Noop)
    }

    #[test]
    fn test_registry_accepts_valid_specs() {
        let registry = MonitorRegistry::builder()
            .register(spec("gas_watcher", 30))
            .register(spec("defillama", 86_400).with_enabled(false))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.enabled().count(), 1);
        assert!(registry.get("defillama").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_registry_rejects_duplicate_names() {
        let err = MonitorRegistry::new(vec![spec("gas_watcher", 30), spec("gas_watcher", 60)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateMonitor(name) if name == "gas_watcher"));
    }

    #[test]
    fn test_registry_rejects_zero_cadence() {
        let err = MonitorRegistry::new(vec![spec("funding_arb", 0)]).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroCadence(name) if name == "funding_arb"));
    }

    #[test]
    fn test_registry_rejects_empty_name() {
        let err = MonitorRegistry::new(vec![spec("  ", 10)]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyName));
    }

    #[test]
    fn test_empty_registry() {
        let registry = MonitorRegistry::new(Vec::new()).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.enabled().count(), 0);
    }
}
