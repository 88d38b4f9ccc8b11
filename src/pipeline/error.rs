//! Signals a processing hook can raise.
//!
//! Only `Failed` is a fault. The other variants are orderly outcomes that the
//! processor turns into state changes and control tags.

use crate::error::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    /// End of data: stop and send Stop downstream.
    #[error("Finished")]
    Finished,

    /// Orderly suspension: pause and send Pause downstream.
    #[error("Paused")]
    Paused,

    /// The round was aborted by `interrupt()`.
    #[error("Interrupted")]
    Interrupted,

    /// A fault. Reported to observers; the owning compound stops the graph.
    #[error("{0}")]
    Failed(String),
}

impl ProcessError {
    pub fn failed(message: impl Into<String>) -> Self {
        ProcessError::Failed(message.into())
    }

    #[inline]
    pub fn is_fault(&self) -> bool {
        matches!(self, ProcessError::Failed(_))
    }
}

impl From<EngineError> for ProcessError {
    fn from(err: EngineError) -> Self {
        if err.is_interrupted() {
            ProcessError::Interrupted
        } else {
            ProcessError::Failed(err.to_string())
        }
    }
}

pub type ProcessResult = std::result::Result<(), ProcessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_interrupt_maps_to_interrupted() {
        let err: ProcessError = EngineError::Interrupted.with_context("emit").into();
        assert!(matches!(err, ProcessError::Interrupted));
        assert!(!err.is_fault());
    }

    #[test]
    fn test_engine_error_maps_to_fault() {
        let err: ProcessError = EngineError::InvalidValue("Stop".into()).into();
        assert!(err.is_fault());
        assert_eq!(err.to_string(), "Invalid value: Stop");
    }
}
