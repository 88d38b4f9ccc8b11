//! Operations: a processing hook plus its sockets, state and processor.
//!
//! `Operation` is a cheap handle; clones refer to the same operation. The
//! operation lock (`OperationInner::core`) serializes `process`, option access
//! and sync-event delivery. Socket queues have their own locks, always taken
//! after the operation lock.

use crate::error::{EngineError, Result};
use crate::pipeline::flow::FlowController;
use crate::pipeline::id::OperationId;
use crate::pipeline::options::{int_in_range, ConfigValue, WriteProtection};
use crate::pipeline::process::Process;
use crate::pipeline::processor::{ExecutionMode, Processor};
use crate::pipeline::queue::DEFAULT_QUEUE_CAPACITY;
use crate::pipeline::socket::{
    disconnect, disconnect_output, InputListener, InputSocket, OutputSocket, SocketDirection,
    DEFAULT_EMIT_RECHECK,
};
use crate::pipeline::state::{OperationEvent, OperationState, StateCell};
use crate::pipeline::sync::lock;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Engine-level option present on every operation.
pub const QUEUE_CAPACITY_OPTION: &str = "queue_capacity";

const MAX_QUEUE_CAPACITY: i64 = 1 << 16;

/// Construction-time settings of an operation.
#[derive(Debug, Clone)]
pub struct OperationSettings {
    pub mode: ExecutionMode,
    pub queue_capacity: usize,
    /// How often a blocked emitter re-checks its receivers.
    pub emit_recheck: Duration,
}

impl Default for OperationSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Inline,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            emit_recheck: DEFAULT_EMIT_RECHECK,
        }
    }
}

impl OperationSettings {
    pub fn with_mode(mode: ExecutionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

/// State guarded by the operation lock.
pub(crate) struct OperationCore {
    pub logic: Box<dyn Process>,
    pub flow: Option<FlowController>,
    pub checked: bool,
    /// Set by `start()` from Paused until the resumption completes.
    pub resuming: bool,
    /// Paused by a Pause tag from upstream rather than by the hook or a
    /// command; resumption then waits for the matching Resume tag.
    pub upstream_paused: bool,
    pub queue_capacity: usize,
}

pub(crate) struct OperationInner {
    pub id: OperationId,
    pub name: String,
    pub inputs: Vec<Arc<InputSocket>>,
    pub outputs: Vec<Arc<OutputSocket>>,
    pub state: StateCell,
    /// Shared with every output so blocked emissions can be aborted.
    pub interrupted: Arc<AtomicBool>,
    pub core: Mutex<OperationCore>,
    pub processor: Processor,
}

impl OperationInner {
    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// State change requested by the processing side; ignored once interrupted.
    pub fn advance(&self, to: OperationState) {
        if !self.is_interrupted() {
            self.state.set(to);
        }
    }

    /// Report a fault and stop without forwarding Stop.
    pub fn fail(&self, message: String) {
        tracing::error!("Operation '{}' failed: {}", self.name, message);
        self.state.report_error(message);
        self.advance(OperationState::Stopping);
        self.advance(OperationState::Stopped);
    }

    fn disconnect_all(&self) {
        for input in &self.inputs {
            disconnect(input);
        }
        for output in &self.outputs {
            disconnect_output(output);
        }
    }
}

impl InputListener for OperationInner {
    fn input_ready(&self) {
        self.processor.input_ready(self);
    }
}

impl Drop for OperationInner {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

/// Handle to an operation.
#[derive(Clone)]
pub struct Operation {
    inner: Arc<OperationInner>,
}

impl Operation {
    pub fn new(logic: impl Process + 'static, mode: ExecutionMode) -> Self {
        Self::with_settings(Box::new(logic), OperationSettings::with_mode(mode))
    }

    pub fn with_settings(logic: Box<dyn Process>, settings: OperationSettings) -> Self {
        let id = OperationId::next();
        let name = logic.name().to_string();
        let descriptors = logic.sockets().to_vec();
        let interrupted = Arc::new(AtomicBool::new(false));
        let capacity = settings.queue_capacity;

        let inner = Arc::new_cyclic(|weak: &Weak<OperationInner>| {
            let listener: Weak<dyn InputListener> = weak.clone();
            let inputs = descriptors
                .iter()
                .filter(|d| d.direction == SocketDirection::Input)
                .map(|d| InputSocket::owned(d, capacity, listener.clone()))
                .collect();
            let outputs = descriptors
                .iter()
                .filter(|d| d.direction == SocketDirection::Output)
                .map(|d| OutputSocket::owned(d, interrupted.clone(), settings.emit_recheck))
                .collect();

            OperationInner {
                id,
                name: name.clone(),
                inputs,
                outputs,
                state: StateCell::new(id, name.clone()),
                interrupted: interrupted.clone(),
                core: Mutex::new(OperationCore {
                    logic,
                    flow: None,
                    checked: false,
                    resuming: false,
                    upstream_paused: false,
                    queue_capacity: capacity,
                }),
                processor: Processor::new(settings.mode),
            }
        });

        tracing::debug!(
            "Created operation '{}' ({}, {} inputs, {} outputs)",
            inner.name,
            settings.mode,
            inner.inputs.len(),
            inner.outputs.len()
        );
        Self { inner }
    }

    pub fn id(&self) -> OperationId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn mode(&self) -> ExecutionMode {
        self.inner.processor.mode()
    }

    pub fn state(&self) -> OperationState {
        self.inner.state.get()
    }

    pub fn inputs(&self) -> &[Arc<InputSocket>] {
        &self.inner.inputs
    }

    pub fn outputs(&self) -> &[Arc<OutputSocket>] {
        &self.inner.outputs
    }

    pub fn input(&self, name: &str) -> Option<Arc<InputSocket>> {
        self.inner.inputs.iter().find(|i| i.name() == name).cloned()
    }

    pub fn output(&self, name: &str) -> Option<Arc<OutputSocket>> {
        self.inner.outputs.iter().find(|o| o.name() == name).cloned()
    }

    /// Name of the flow controller chosen by the last check, if any.
    pub fn flow_controller_kind(&self) -> Option<&'static str> {
        lock(&self.inner.core).flow.as_ref().map(|f| f.kind_name())
    }

    /// Validate wiring and settings and prepare the flow controller.
    ///
    /// `reset` clears queues, counters and flow levels; without it queued
    /// data and counters survive.
    pub fn check(&self, reset: bool) -> Result<()> {
        let inner = &self.inner;
        let state = inner.state.get();
        if !matches!(state, OperationState::Stopped | OperationState::Paused) {
            return Err(self.invalid_state("check", state));
        }

        let mut core = lock(&inner.core);
        for input in &inner.inputs {
            if !input.is_optional() && !input.is_connected() {
                return Err(EngineError::Check {
                    operation: inner.name.clone(),
                    message: format!("input '{}' is not connected", input.name()),
                });
            }
        }
        core.logic
            .check(reset)
            .map_err(|message| EngineError::Check {
                operation: inner.name.clone(),
                message,
            })?;

        if reset {
            for input in &inner.inputs {
                input.reset();
            }
            for output in &inner.outputs {
                output.reset_flow();
            }
        }
        if reset || core.flow.is_none() || !core.checked {
            let relations = core.logic.group_relations();
            core.flow = FlowController::build(&inner.name, &inner.inputs, &inner.outputs, &relations)?;
        }
        core.checked = true;
        tracing::debug!("Checked '{}' (reset: {})", inner.name, reset);
        Ok(())
    }

    /// Start from Stopped (after `check`) or resume from Paused.
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;
        {
            let mut core = lock(&inner.core);
            let state = inner.state.get();
            match state {
                OperationState::Stopped => {
                    if !core.checked {
                        return Err(EngineError::InvalidState {
                            operation: inner.name.clone(),
                            action: "start",
                            state: "unchecked".to_string(),
                        });
                    }
                    core.checked = false;
                    core.resuming = false;
                    core.upstream_paused = false;
                    inner.interrupted.store(false, Ordering::Release);
                }
                OperationState::Paused => core.resuming = true,
                other => return Err(self.invalid_state("start", other)),
            }
            inner.state.set(OperationState::Starting);
        }
        tracing::info!("Starting operation '{}'", inner.name);
        inner.processor.start(inner)
    }

    /// Request an orderly pause. Operations with connected inputs reach
    /// Paused when the Pause tag arrives from upstream.
    pub fn pause(&self) -> Result<()> {
        let inner = &self.inner;
        let result = inner.state.transition(
            |s| {
                matches!(
                    s,
                    OperationState::Starting | OperationState::Running | OperationState::Pausing
                )
            },
            OperationState::Pausing,
        );
        match result {
            Ok(_) => {
                inner.processor.pause(inner);
                Ok(())
            }
            Err(OperationState::Paused) => Ok(()),
            Err(state) => Err(self.invalid_state("pause", state)),
        }
    }

    /// Request an orderly stop. Operations with connected inputs reach
    /// Stopped when the Stop tag arrives from upstream.
    pub fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        let result = inner.state.transition(
            |s| !matches!(s, OperationState::Stopped | OperationState::Interrupted),
            OperationState::Stopping,
        );
        if result.is_ok() {
            inner.processor.stop(inner);
        }
        Ok(())
    }

    /// Abort immediately. Unblocks every wait the operation may be parked on
    /// and resolves to Stopped; in-flight data is discarded.
    pub fn interrupt(&self) {
        let inner = &self.inner;
        if inner.state.get() == OperationState::Stopped {
            return;
        }
        inner.interrupted.store(true, Ordering::Release);
        for output in &inner.outputs {
            output.wake();
        }
        inner.state.set(OperationState::Interrupted);
        tracing::info!("Interrupted operation '{}'", inner.name);
        inner.processor.interrupt(inner);
    }

    /// Block until the operation reaches `state`. Returns false on timeout.
    pub fn wait_for_state(&self, state: OperationState, timeout: Duration) -> bool {
        self.inner.state.wait_for(state, timeout)
    }

    pub fn subscribe(&self) -> Receiver<OperationEvent> {
        self.inner.state.subscribe()
    }

    pub(crate) fn observe(&self, sender: Sender<OperationEvent>) {
        self.inner.state.observe(sender);
    }

    pub fn set_option(&self, name: &str, value: ConfigValue) -> Result<()> {
        let inner = &self.inner;
        let mut core = lock(&inner.core);
        let state = inner.state.get();

        let policy = if name == QUEUE_CAPACITY_OPTION {
            Some(WriteProtection::WhenStopped)
        } else {
            core.logic.option_policy(name)
        };
        let policy = policy.ok_or_else(|| EngineError::UnknownOption {
            operation: inner.name.clone(),
            name: name.to_string(),
        })?;
        if !policy.allows(state) {
            return Err(EngineError::OptionProtected {
                operation: inner.name.clone(),
                name: name.to_string(),
                state: state.to_string(),
            });
        }

        if name == QUEUE_CAPACITY_OPTION {
            let capacity = int_in_range(&value, 2, MAX_QUEUE_CAPACITY).map_err(|message| {
                EngineError::OptionValue {
                    name: name.to_string(),
                    message,
                }
            })? as usize;
            for input in &inner.inputs {
                input.set_capacity(capacity);
            }
            core.queue_capacity = capacity;
            return Ok(());
        }
        core.logic.set_option(name, &value)?;
        tracing::debug!("Set option '{}' on '{}' to {}", name, inner.name, value);
        Ok(())
    }

    pub fn option(&self, name: &str) -> Option<ConfigValue> {
        let core = lock(&self.inner.core);
        if name == QUEUE_CAPACITY_OPTION {
            return Some(ConfigValue::Int(core.queue_capacity as i64));
        }
        core.logic.option(name)
    }

    /// Wait for a threaded operation's worker to exit. No-op for inline ones.
    pub fn join(&self) {
        self.inner.processor.join();
    }

    /// Sever every connection of this operation's sockets.
    pub fn disconnect_all(&self) {
        self.inner.disconnect_all();
    }

    fn invalid_state(&self, action: &'static str, state: OperationState) -> EngineError {
        EngineError::InvalidState {
            operation: self.inner.name.clone(),
            action,
            state: state.to_string(),
        }
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}
