//! SumSink — accumulates integer payloads.

use crate::pipeline::error::{ProcessError, ProcessResult};
use crate::pipeline::options::{ConfigValue, WriteProtection};
use crate::pipeline::process::{Process, ProcessContext};
use crate::pipeline::socket::SocketDescriptor;
use crate::pipeline::sync::lock;
use std::sync::{Arc, Mutex};

static SOCKETS: &[SocketDescriptor] = &[SocketDescriptor::input("in")];

#[derive(Debug, Default)]
struct SumState {
    total: i64,
    values: Vec<i64>,
    stopped: bool,
}

/// Shared read access to a [`SumSink`]'s accumulated state.
#[derive(Debug, Clone, Default)]
pub struct SumHandle {
    state: Arc<Mutex<SumState>>,
}

impl SumHandle {
    pub fn total(&self) -> i64 {
        lock(&self.state).total
    }

    pub fn count(&self) -> usize {
        lock(&self.state).values.len()
    }

    /// Every value seen, in arrival order.
    pub fn values(&self) -> Vec<i64> {
        lock(&self.state).values.clone()
    }

    /// Whether the Stop tag reached the sink.
    pub fn saw_stop(&self) -> bool {
        lock(&self.state).stopped
    }
}

pub struct SumSink {
    handle: SumHandle,
}

impl SumSink {
    pub fn new() -> Self {
        Self {
            handle: SumHandle::default(),
        }
    }

    pub fn handle(&self) -> SumHandle {
        self.handle.clone()
    }
}

impl Default for SumSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for SumSink {
    fn name(&self) -> &str {
        "sum_sink"
    }

    fn sockets(&self) -> &[SocketDescriptor] {
        SOCKETS
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> ProcessResult {
        let value = ctx
            .input_as::<i64>(0)
            .ok_or_else(|| ProcessError::failed("sum_sink expects i64 payloads"))?;
        let mut state = lock(&self.handle.state);
        state.total += value;
        state.values.push(value);
        Ok(())
    }

    fn on_stopped(&mut self, _ctx: &mut ProcessContext<'_>) {
        let mut state = lock(&self.handle.state);
        state.stopped = true;
        tracing::info!(
            "sum_sink finished: {} value(s), total {}",
            state.values.len(),
            state.total
        );
    }

    fn check(&mut self, reset: bool) -> Result<(), String> {
        if reset {
            *lock(&self.handle.state) = SumState::default();
        }
        Ok(())
    }

    // `total` and `count` are read-only.
    fn option_policy(&self, _name: &str) -> Option<WriteProtection> {
        None
    }

    fn option(&self, name: &str) -> Option<ConfigValue> {
        match name {
            "total" => Some(ConfigValue::Int(self.handle.total())),
            "count" => Some(ConfigValue::Int(self.handle.count() as i64)),
            _ => None,
        }
    }
}
