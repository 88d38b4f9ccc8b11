//! Test graph builders

use pipegraph_rs::pipeline::nodes::{CounterSource, RecorderSink, Recording, SumHandle, SumSink};
use pipegraph_rs::pipeline::{ConfigValue, ExecutionMode, Operation};
use pipegraph_rs::connect;

/// A counter source wired into a sum sink
pub struct SumGraph {
    pub source: Operation,
    pub sink: Operation,
    pub total: SumHandle,
}

impl SumGraph {
    pub fn new(start: i64, end: i64, sink_mode: ExecutionMode) -> Self {
        let source = Operation::new(CounterSource::with_range(start, end), ExecutionMode::Threaded);
        let sum = SumSink::new();
        let total = sum.handle();
        let sink = Operation::new(sum, sink_mode);
        connect(&source.outputs()[0], &sink.inputs()[0]).unwrap();
        Self { source, sink, total }
    }

    /// Throttle the source so tests can act while it runs
    pub fn interval_ms(self, interval: i64) -> Self {
        self.source
            .set_option("interval_ms", ConfigValue::Int(interval))
            .unwrap();
        self
    }

    /// Check and start consumers first, then the producer
    pub fn start(&self) {
        self.sink.check(true).unwrap();
        self.source.check(true).unwrap();
        self.sink.start().unwrap();
        self.source.start().unwrap();
    }
}

/// Builder for a recorder with custom grouped inputs
pub struct RecorderBuilder {
    inputs: Vec<(String, i32)>,
    mode: ExecutionMode,
}

impl RecorderBuilder {
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            mode: ExecutionMode::Inline,
        }
    }

    pub fn input(mut self, name: &str, group: i32) -> Self {
        self.inputs.push((name.to_string(), group));
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build_with(
        self,
        configure: impl FnOnce(RecorderSink) -> RecorderSink,
    ) -> (Operation, Recording) {
        let inputs: Vec<(&str, i32)> = if self.inputs.is_empty() {
            vec![("in", 0)]
        } else {
            self.inputs.iter().map(|(n, g)| (n.as_str(), *g)).collect()
        };
        let recorder = configure(RecorderSink::with_inputs(&inputs));
        let recording = recorder.recording();
        (Operation::new(recorder, self.mode), recording)
    }

    pub fn build(self) -> (Operation, Recording) {
        self.build_with(|r| r)
    }
}

impl Default for RecorderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_builder_defaults_to_single_input() {
        let (op, _recording) = RecorderBuilder::new().build();
        assert_eq!(op.inputs().len(), 1);
        assert_eq!(op.inputs()[0].name(), "in");
        assert_eq!(op.mode(), ExecutionMode::Inline);
    }
}
