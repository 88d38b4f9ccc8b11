//! Per-operation options.
//!
//! Each processing hook keeps its settings in an ordinary struct and exposes
//! them through an [`OptionTable`]: a name, a write policy and a pair of
//! typed accessor functions per option. The operation checks the policy
//! against its current state before calling the setter.

use crate::error::{EngineError, Result};
use crate::pipeline::state::OperationState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Floats accept integer values too.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Int(_) => "int",
            ConfigValue::Float(_) => "float",
            ConfigValue::String(_) => "string",
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(v) => write!(f, "{}", v),
            ConfigValue::Int(v) => write!(f, "{}", v),
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::String(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::String(v.to_string())
    }
}

/// States in which an option may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProtection {
    Always,
    WhenStoppedOrPaused,
    WhenStopped,
}

impl WriteProtection {
    pub fn allows(self, state: OperationState) -> bool {
        match self {
            WriteProtection::Always => true,
            WriteProtection::WhenStoppedOrPaused => {
                matches!(state, OperationState::Stopped | OperationState::Paused)
            }
            WriteProtection::WhenStopped => state == OperationState::Stopped,
        }
    }
}

pub type OptionSetter<T> = fn(&mut T, &ConfigValue) -> std::result::Result<(), String>;
pub type OptionGetter<T> = fn(&T) -> ConfigValue;

struct OptionEntry<T> {
    name: &'static str,
    policy: WriteProtection,
    get: OptionGetter<T>,
    set: OptionSetter<T>,
}

/// Dispatch table from option name to typed accessors on `T`.
pub struct OptionTable<T> {
    entries: Vec<OptionEntry<T>>,
}

impl<T> OptionTable<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with(
        mut self,
        name: &'static str,
        policy: WriteProtection,
        get: OptionGetter<T>,
        set: OptionSetter<T>,
    ) -> Self {
        self.entries.push(OptionEntry {
            name,
            policy,
            get,
            set,
        });
        self
    }

    fn entry(&self, name: &str) -> Option<&OptionEntry<T>> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn policy(&self, name: &str) -> Option<WriteProtection> {
        self.entry(name).map(|e| e.policy)
    }

    pub fn get(&self, target: &T, name: &str) -> Option<ConfigValue> {
        self.entry(name).map(|e| (e.get)(target))
    }

    /// Apply `value` through the named setter. Policy is not checked here.
    pub fn set(&self, target: &mut T, name: &str, value: &ConfigValue) -> Result<()> {
        let entry = self.entry(name).ok_or_else(|| EngineError::OptionValue {
            name: name.to_string(),
            message: "no such option".to_string(),
        })?;
        (entry.set)(target, value).map_err(|message| EngineError::OptionValue {
            name: name.to_string(),
            message,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }
}

impl<T> Default for OptionTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Setter helper: require an integer within `min..=max`.
pub fn int_in_range(value: &ConfigValue, min: i64, max: i64) -> std::result::Result<i64, String> {
    let v = value
        .as_int()
        .ok_or_else(|| format!("expected int, got {}", value.type_name()))?;
    if v < min || v > max {
        return Err(format!("{} is outside {}..={}", v, min, max));
    }
    Ok(v)
}
