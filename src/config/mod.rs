//! Configuration module for pipegraph-rs
//!
//! Engine-wide defaults (queue capacity, execution mode, emit recheck
//! interval), logging setup and the parameters of the demo graph. Files are
//! read as TOML or JSON depending on their extension.
//!
//! # Example
//!
//! ```toml
//! [engine]
//! queue_capacity = 4
//! default_mode = "threaded"
//!
//! [logging]
//! filter = "debug"
//! file = "pipegraph.log"
//! ```

use crate::error::{EngineError, Result};
use crate::pipeline::processor::ExecutionMode;
use crate::pipeline::queue::{DEFAULT_QUEUE_CAPACITY, MIN_QUEUE_CAPACITY};
use crate::pipeline::registry::OperationSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default wake-up interval of a blocked emitter, in milliseconds
pub const DEFAULT_EMIT_RECHECK_MS: u64 = 50;

/// Default number of integers emitted by the demo source
pub const DEFAULT_DEMO_COUNT: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

// ==================== Engine Settings ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Capacity of every input queue
    pub queue_capacity: usize,

    /// Execution mode used when a spec does not pick one
    pub default_mode: ExecutionMode,

    /// How often a blocked emitter re-checks for interruption
    pub emit_recheck_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            default_mode: ExecutionMode::default(),
            emit_recheck_ms: DEFAULT_EMIT_RECHECK_MS,
        }
    }
}

// ==================== Logging Settings ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub filter: String,

    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            file: None,
        }
    }
}

// ==================== Demo Settings ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    pub count: i64,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            count: DEFAULT_DEMO_COUNT,
        }
    }
}

// ==================== Engine Config ====================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSettings,
    pub logging: LoggingSettings,
    pub demo: DemoSettings,
}

impl EngineConfig {
    /// Load a configuration file. `.json` files are parsed as JSON,
    /// everything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = match ConfigFormat::from_path(path) {
            ConfigFormat::Json => serde_json::from_str(&content)
                .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?,
            ConfigFormat::Toml => toml::from_str(&content)
                .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save in the format implied by the file extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = match ConfigFormat::from_path(path) {
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?,
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)
            .map_err(|e| EngineError::Config(format!("Failed to write config: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.queue_capacity < MIN_QUEUE_CAPACITY {
            return Err(EngineError::Config(format!(
                "queue_capacity must be at least {}, got {}",
                MIN_QUEUE_CAPACITY, self.engine.queue_capacity
            )));
        }
        if self.engine.emit_recheck_ms == 0 {
            return Err(EngineError::Config(
                "emit_recheck_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn emit_recheck(&self) -> Duration {
        Duration::from_millis(self.engine.emit_recheck_ms)
    }

    /// An operation spec carrying the engine defaults
    pub fn operation_spec(&self) -> OperationSpec {
        OperationSpec::new(self.engine.default_mode)
            .with_capacity(self.engine.queue_capacity)
            .with_emit_recheck(self.emit_recheck())
    }
}
