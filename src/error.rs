//! Error handling for the pipegraph engine
//!
//! This module defines the crate-wide error type and a Result alias used by
//! graph construction, validation and scheduling. Errors raised from inside a
//! processing hook use [`ProcessError`](crate::pipeline::ProcessError) instead
//! and are converted at the processor boundary.

use crate::pipeline::id::GroupId;
use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Objects in a synchronization group could not be aligned
    #[error("Synchronization error in group {group} of '{operation}': {message}\n{dump}")]
    Sync {
        operation: String,
        group: GroupId,
        message: String,
        /// Contents of the offending queues, one socket per line
        dump: String,
    },

    /// A command was issued in a state that does not accept it
    #[error("Operation '{operation}' cannot {action} while {state}")]
    InvalidState {
        operation: String,
        action: &'static str,
        state: String,
    },

    /// Validation of a single operation failed
    #[error("Check failed for '{operation}': {message}")]
    Check { operation: String, message: String },

    /// Validation of several operations failed
    #[error("Check failed for {} operation(s):\n{}", .0.len(), join_errors(.0))]
    CheckAll(Vec<EngineError>),

    /// Errors related to socket wiring
    #[error("Connection error: {0}")]
    Connection(String),

    /// A value that may not be emitted by user code
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Option lookups and write protection
    #[error("Unknown option '{name}' on '{operation}'")]
    UnknownOption { operation: String, name: String },

    #[error("Option '{name}' on '{operation}' is write protected while {state}")]
    OptionProtected {
        operation: String,
        name: String,
        state: String,
    },

    #[error("Invalid value for option '{name}': {message}")]
    OptionValue { name: String, message: String },

    /// Errors related to the operation registry
    #[error("Registry error: {0}")]
    Registry(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// The blocking call was aborted by `interrupt()`
    #[error("Interrupted")]
    Interrupted,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

fn join_errors(errors: &[EngineError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

impl EngineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EngineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error (or the error it wraps) is an interruption
    pub fn is_interrupted(&self) -> bool {
        match self {
            EngineError::Interrupted => true,
            EngineError::WithContext { source, .. } => source.is_interrupted(),
            _ => false,
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
