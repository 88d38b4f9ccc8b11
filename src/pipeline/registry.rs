//! Operation registry: string key to factory closure.
//!
//! Populated at startup (see [`crate::pipeline::nodes::register_builtin`]) and
//! used to build operations by name, e.g. from configuration.

use crate::error::{EngineError, Result, ResultExt};
use crate::pipeline::operation::{Operation, OperationSettings};
use crate::pipeline::options::ConfigValue;
use crate::pipeline::process::Process;
use crate::pipeline::processor::ExecutionMode;
use std::collections::HashMap;
use std::time::Duration;

pub type OperationFactory = Box<dyn Fn(&OperationSpec) -> Result<Box<dyn Process>> + Send + Sync>;

/// Everything needed to instantiate a registered operation.
#[derive(Debug, Clone, Default)]
pub struct OperationSpec {
    pub settings: OperationSettings,
    /// Applied in order through `Operation::set_option` after construction.
    pub options: Vec<(String, ConfigValue)>,
}

impl OperationSpec {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            settings: OperationSettings::with_mode(mode),
            options: Vec::new(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.settings.queue_capacity = capacity;
        self
    }

    pub fn with_emit_recheck(mut self, interval: Duration) -> Self {
        self.settings.emit_recheck = interval;
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.options.push((name.into(), value.into()));
        self
    }

    pub fn option(&self, name: &str) -> Option<&ConfigValue> {
        self.options
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

#[derive(Default)]
pub struct OperationRegistry {
    factories: HashMap<String, OperationFactory>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, key: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&OperationSpec) -> Result<Box<dyn Process>> + Send + Sync + 'static,
    {
        let key = key.into();
        if self.factories.contains_key(&key) {
            return Err(EngineError::Registry(format!(
                "operation '{}' is already registered",
                key
            )));
        }
        tracing::debug!("Registered operation '{}'", key);
        self.factories.insert(key, Box::new(factory));
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Build the operation registered under `key` and apply the spec's options.
    pub fn create(&self, key: &str, spec: &OperationSpec) -> Result<Operation> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| EngineError::Registry(format!("unknown operation '{}'", key)))?;
        let logic = factory(spec).with_context(|| format!("creating '{}'", key))?;
        let operation = Operation::with_settings(logic, spec.settings.clone());
        for (name, value) in &spec.options {
            operation
                .set_option(name, value.clone())
                .with_context(|| format!("configuring '{}'", key))?;
        }
        Ok(operation)
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::nodes::{register_builtin, CounterSource};
    use crate::pipeline::operation::QUEUE_CAPACITY_OPTION;

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = OperationRegistry::new();
        registry
            .register("counter", |_| Ok(Box::new(CounterSource::new())))
            .unwrap();
        let err = registry
            .register("counter", |_| Ok(Box::new(CounterSource::new())))
            .unwrap_err();
        assert!(matches!(err, EngineError::Registry(_)));
    }

    #[test]
    fn test_builtin_keys() {
        let mut registry = OperationRegistry::new();
        register_builtin(&mut registry).unwrap();
        assert_eq!(
            registry.keys(),
            vec!["counter_source", "recorder_sink", "splitter", "sum_sink"]
        );
        assert!(registry.contains("splitter"));
        assert!(!registry.contains("camera"));
    }

    #[test]
    fn test_create_applies_options() {
        let mut registry = OperationRegistry::new();
        register_builtin(&mut registry).unwrap();

        let spec = OperationSpec::new(ExecutionMode::Threaded)
            .with_capacity(4)
            .with_option("end", 9i64);
        let op = registry.create("counter_source", &spec).unwrap();
        assert_eq!(op.mode(), ExecutionMode::Threaded);
        assert_eq!(op.option("end"), Some(ConfigValue::Int(9)));
        assert_eq!(op.option(QUEUE_CAPACITY_OPTION), Some(ConfigValue::Int(4)));
    }

    #[test]
    fn test_create_unknown_key_or_option() {
        let mut registry = OperationRegistry::new();
        register_builtin(&mut registry).unwrap();

        assert!(registry
            .create("camera", &OperationSpec::default())
            .is_err());
        let spec = OperationSpec::default().with_option("bogus", 1i64);
        let err = registry.create("sum_sink", &spec).unwrap_err();
        assert!(err.to_string().contains("configuring 'sum_sink'"));
    }
}
