//! Built-in operations.
//!
//! Small, dependency free building blocks used by the demo binary, the
//! integration tests and the benchmarks.

pub mod counter_source;
pub mod recorder_sink;
pub mod splitter;
pub mod sum_sink;

pub use counter_source::CounterSource;
pub use recorder_sink::{RecordEntry, RecorderSink, Recording};
pub use splitter::Splitter;
pub use sum_sink::{SumHandle, SumSink};

use crate::error::Result;
use crate::pipeline::registry::OperationRegistry;

/// Register every built-in operation under its canonical key.
pub fn register_builtin(registry: &mut OperationRegistry) -> Result<()> {
    registry.register("counter_source", |_| Ok(Box::new(CounterSource::new())))?;
    registry.register("splitter", |_| Ok(Box::new(Splitter::new())))?;
    registry.register("sum_sink", |_| Ok(Box::new(SumSink::new())))?;
    registry.register("recorder_sink", |_| Ok(Box::new(RecorderSink::new())))?;
    Ok(())
}
