//! # pipegraph-rs: data-driven pipeline execution engine
//!
//! Operations are wired output-to-input through bounded socket queues and run
//! either inline (on the thread that delivers their input) or on a dedicated
//! worker thread. Inputs can be organized in synchronization groups so that
//! objects arriving on different branches are processed together, and control
//! tags (Stop, Pause, Resume) travel through the graph behind the data.
//!
//! ## Architecture
//!
//! - **Sockets**: bounded queues with backpressure and fan-out
//! - **Flow control**: per-operation controllers deciding when a round may run
//! - **Processors**: inline or threaded drivers of the state machine
//! - **Compounds**: operation groups with an aggregated state
//!
//! ## Example
//!
//! ```ignore
//! use pipegraph_rs::pipeline::{connect, nodes::{CounterSource, SumSink}, ExecutionMode, Operation};
//!
//! let source = Operation::new(CounterSource::with_range(1, 5), ExecutionMode::Threaded);
//! let sink = SumSink::new();
//! let total = sink.handle();
//! let sink = Operation::new(sink, ExecutionMode::Inline);
//! connect(&source.outputs()[0], &sink.inputs()[0])?;
//!
//! sink.check(true)?;
//! source.check(true)?;
//! sink.start()?;
//! source.start()?;
//! ```

pub mod config;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{EngineError, Result, ResultExt};
pub use pipeline::{
    connect, disconnect, Compound, ExecutionMode, Operation, OperationEvent, OperationRegistry,
    OperationState, ProcessError, Schedulable, Value,
};
