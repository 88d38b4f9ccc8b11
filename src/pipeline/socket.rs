//! Input and output sockets.
//!
//! An output socket fans out to any number of input sockets; an input socket
//! is connected to at most one output. Emission is blocking: `emit` returns
//! only after every connected input accepted the value. Inputs never block;
//! a full input refuses the value and the output waits for a `release`.
//!
//! Connections are held weakly in both directions so that dropping an
//! operation (which owns its sockets) severs its connections.

use crate::error::{EngineError, Result};
use crate::pipeline::id::GroupId;
use crate::pipeline::queue::{SocketQueue, DEFAULT_QUEUE_CAPACITY};
use crate::pipeline::sync::{lock, wait_timeout};
use crate::pipeline::value::{Value, ValueKind};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

/// Default interval after which a blocked emitter re-checks its receivers even
/// without a release notification.
pub const DEFAULT_EMIT_RECHECK: Duration = Duration::from_millis(50);

/// Whether a socket is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketDirection {
    Input,
    Output,
}

/// Static descriptor for a socket declared by a processing hook.
#[derive(Debug, Clone)]
pub struct SocketDescriptor {
    pub name: Cow<'static, str>,
    pub direction: SocketDirection,
    pub group: i32,
    pub optional: bool,
}

impl SocketDescriptor {
    pub const fn input(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            direction: SocketDirection::Input,
            group: 0,
            optional: false,
        }
    }

    pub const fn output(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            direction: SocketDirection::Output,
            group: 0,
            optional: false,
        }
    }

    /// Input descriptor with a name chosen at runtime.
    pub fn named_input(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            direction: SocketDirection::Input,
            group: 0,
            optional: false,
        }
    }

    pub const fn in_group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }

    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Receives notifications when one of its input sockets accepted a value.
pub(crate) trait InputListener: Send + Sync {
    fn input_ready(&self);
}

// ── Input side ──

/// Receiving end of a connection. Owns the bounded queue.
pub struct InputSocket {
    name: String,
    group: AtomicI32,
    optional: bool,
    queue: Mutex<SocketQueue>,
    output: Mutex<Weak<OutputSocket>>,
    listener: Option<Weak<dyn InputListener>>,
}

impl InputSocket {
    /// Create a standalone input, not owned by any operation.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_capacity(name, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            group: AtomicI32::new(0),
            optional: false,
            queue: Mutex::new(SocketQueue::new(capacity)),
            output: Mutex::new(Weak::new()),
            listener: None,
        })
    }

    pub(crate) fn owned(
        descriptor: &SocketDescriptor,
        capacity: usize,
        listener: Weak<dyn InputListener>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: descriptor.name.to_string(),
            group: AtomicI32::new(descriptor.group),
            optional: descriptor.optional,
            queue: Mutex::new(SocketQueue::new(capacity)),
            output: Mutex::new(Weak::new()),
            listener: Some(listener),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_id(&self) -> GroupId {
        GroupId(self.group.load(Ordering::Relaxed))
    }

    /// Move this input to another synchronization group. Takes effect at the
    /// owning operation's next `check(true)`.
    pub fn set_group_id(&self, group: GroupId) {
        self.group.store(group.0, Ordering::Relaxed);
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// The output this input is wired to, if it is still alive.
    pub fn connected_output(&self) -> Option<Arc<OutputSocket>> {
        lock(&self.output).upgrade()
    }

    pub fn is_connected(&self) -> bool {
        self.connected_output().is_some()
    }

    /// Offer a value. Never blocks: returns false without enqueuing when the
    /// queue is full. An accepted value wakes the owning operation.
    pub fn try_receive(&self, value: Value) -> bool {
        if !self.accept(value) {
            return false;
        }
        self.notify_listener();
        true
    }

    /// Enqueue without waking the owner.
    pub(crate) fn accept(&self, value: Value) -> bool {
        lock(&self.queue).try_push(value).is_ok()
    }

    pub(crate) fn notify_listener(&self) {
        if let Some(listener) = self.listener.as_ref().and_then(Weak::upgrade) {
            listener.input_ready();
        }
    }

    pub fn has_room(&self) -> bool {
        !lock(&self.queue).is_full()
    }

    /// Consume the head value, making it the current object, and tell the
    /// connected output that room became available.
    pub fn release(&self) -> bool {
        let released = lock(&self.queue).release();
        self.notify_output();
        released
    }

    /// The object currently released for processing.
    pub fn current(&self) -> Option<Value> {
        lock(&self.queue).current().cloned()
    }

    pub fn head(&self) -> Option<Value> {
        lock(&self.queue).head().cloned()
    }

    pub fn head_kind(&self) -> Option<ValueKind> {
        lock(&self.queue).head().map(Value::kind)
    }

    pub fn peek(&self, index: usize) -> Option<Value> {
        lock(&self.queue).peek(index).cloned()
    }

    /// Reorder waiting values; see [`SocketQueue::jump`].
    pub fn jump(&self, from: usize, to: usize) -> bool {
        lock(&self.queue).jump(from, to)
    }

    pub(crate) fn find(&self, kind: ValueKind) -> Option<usize> {
        lock(&self.queue).find(kind)
    }

    pub(crate) fn find_control(&self) -> Option<(usize, ValueKind)> {
        lock(&self.queue).find_control()
    }

    /// Number of values waiting behind the current slot.
    pub fn pending(&self) -> usize {
        lock(&self.queue).pending()
    }

    pub fn capacity(&self) -> usize {
        lock(&self.queue).capacity()
    }

    pub(crate) fn set_capacity(&self, capacity: usize) {
        lock(&self.queue).set_capacity(capacity);
        self.notify_output();
    }

    /// Drop every queued value and unblock the sender.
    pub fn reset(&self) {
        lock(&self.queue).clear();
        self.notify_output();
    }

    pub fn describe_queue(&self) -> String {
        format!("{}: {}", self.name, lock(&self.queue).describe())
    }

    fn notify_output(&self) {
        if let Some(output) = self.connected_output() {
            output.notify_released();
        }
    }
}

impl std::fmt::Debug for InputSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSocket")
            .field("name", &self.name)
            .field("group", &self.group_id())
            .field("connected", &self.is_connected())
            .finish()
    }
}

// ── Output side ──

/// Cumulative structural state of an output, replayed on resume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputFlowState {
    /// Net number of GroupStart minus GroupEnd tags emitted.
    pub flow_level: i32,
    /// Number of objects this output lags behind its inputs.
    pub delay: i32,
}

#[derive(Debug, Default)]
struct FlowBookkeeping {
    state: OutputFlowState,
    paused: Option<OutputFlowState>,
}

/// Sending end of zero or more connections.
pub struct OutputSocket {
    name: String,
    group: AtomicI32,
    inputs: Mutex<Vec<Weak<InputSocket>>>,
    /// Release generation counter; bumped on every receiver release.
    pending: Mutex<u64>,
    pending_cv: Condvar,
    flow: Mutex<FlowBookkeeping>,
    interrupted: Arc<AtomicBool>,
    recheck: Duration,
}

impl OutputSocket {
    /// Create a standalone output with its own interrupt flag.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(
            name.into(),
            0,
            Arc::new(AtomicBool::new(false)),
            DEFAULT_EMIT_RECHECK,
        ))
    }

    pub(crate) fn owned(
        descriptor: &SocketDescriptor,
        interrupted: Arc<AtomicBool>,
        recheck: Duration,
    ) -> Arc<Self> {
        Arc::new(Self::build(
            descriptor.name.to_string(),
            descriptor.group,
            interrupted,
            recheck,
        ))
    }

    fn build(name: String, group: i32, interrupted: Arc<AtomicBool>, recheck: Duration) -> Self {
        Self {
            name,
            group: AtomicI32::new(group),
            inputs: Mutex::new(Vec::new()),
            pending: Mutex::new(0),
            pending_cv: Condvar::new(),
            flow: Mutex::new(FlowBookkeeping::default()),
            interrupted,
            recheck,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_id(&self) -> GroupId {
        GroupId(self.group.load(Ordering::Relaxed))
    }

    /// Synchronize this output with another input group.
    pub fn set_group_id(&self, group: GroupId) {
        self.group.store(group.0, Ordering::Relaxed);
    }

    /// Live inputs in connection order.
    pub fn connected_inputs(&self) -> Vec<Arc<InputSocket>> {
        let mut inputs = lock(&self.inputs);
        let before = inputs.len();
        inputs.retain(|w| w.strong_count() > 0);
        if inputs.len() != before {
            tracing::warn!(
                "Output '{}' dropped {} dead connection(s)",
                self.name,
                before - inputs.len()
            );
        }
        inputs.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inputs).iter().any(|w| w.strong_count() > 0)
    }

    /// Send `value` to every connected input, blocking until all of them
    /// have room. Fails with [`EngineError::Interrupted`] if the owner is
    /// interrupted while waiting.
    pub fn emit(&self, value: Value) -> Result<()> {
        let targets = self.connected_inputs();
        let mut delivered = vec![false; targets.len()];

        loop {
            if self.is_interrupted() {
                return Err(EngineError::Interrupted);
            }
            let generation = *lock(&self.pending);

            let ready = targets
                .iter()
                .zip(&delivered)
                .all(|(input, done)| *done || input.has_room());
            if ready {
                for (input, done) in targets.iter().zip(delivered.iter_mut()) {
                    if !*done {
                        *done = input.accept(value.clone());
                    }
                }
                if delivered.iter().all(|d| *d) {
                    break;
                }
                // A receiver shrank under us; wait for the rest.
                continue;
            }

            let guard = lock(&self.pending);
            if *guard == generation && !self.is_interrupted() {
                drop(wait_timeout(&self.pending_cv, guard, self.recheck));
            }
        }

        self.record_flow(&value);
        for input in &targets {
            input.notify_listener();
        }
        Ok(())
    }

    /// Open a nested group on this output.
    pub fn start_many(&self) -> Result<()> {
        self.emit(Value::GroupStart)
    }

    /// Close the innermost nested group on this output.
    pub fn end_many(&self) -> Result<()> {
        self.emit(Value::GroupEnd)
    }

    /// Annotate how many objects this output lags behind its inputs.
    pub fn set_delay(&self, delay: i32) {
        lock(&self.flow).state.delay = delay;
    }

    pub fn flow_state(&self) -> OutputFlowState {
        lock(&self.flow).state
    }

    /// Flow state captured by the last emitted Pause tag.
    pub fn paused_state(&self) -> Option<OutputFlowState> {
        lock(&self.flow).paused
    }

    /// Emit a Resume tag carrying the flow state captured at pause time.
    pub fn emit_resume(&self) -> Result<()> {
        let captured = {
            let flow = lock(&self.flow);
            flow.paused.unwrap_or(flow.state)
        };
        self.emit(Value::Resume {
            flow_level: captured.flow_level,
            delay: captured.delay,
        })
    }

    /// Forget accumulated flow state (check with reset).
    pub fn reset_flow(&self) {
        let mut flow = lock(&self.flow);
        flow.state.flow_level = 0;
        flow.paused = None;
    }

    fn record_flow(&self, value: &Value) {
        let mut flow = lock(&self.flow);
        match value {
            Value::GroupStart | Value::GroupEnd => {
                flow.state.flow_level += value.flow_delta();
            }
            Value::Pause => {
                flow.paused = Some(flow.state);
            }
            Value::Resume { .. } => {
                flow.paused = None;
            }
            _ => {}
        }
    }

    pub(crate) fn notify_released(&self) {
        let mut generation = lock(&self.pending);
        *generation = generation.wrapping_add(1);
        self.pending_cv.notify_all();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Abort a blocked emission. Owned outputs share the flag with their
    /// operation, so this is normally driven by `Operation::interrupt`.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.notify_released();
    }

    pub(crate) fn wake(&self) {
        self.notify_released();
    }
}

impl std::fmt::Debug for OutputSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSocket")
            .field("name", &self.name)
            .field("group", &self.group_id())
            .field("connections", &lock(&self.inputs).len())
            .finish()
    }
}

// ── Connection graph ──

/// Wire `output` to `input`. An input accepts only one output.
pub fn connect(output: &Arc<OutputSocket>, input: &Arc<InputSocket>) -> Result<()> {
    let mut current = lock(&input.output);
    if let Some(existing) = current.upgrade() {
        if Arc::ptr_eq(&existing, output) {
            return Ok(());
        }
        return Err(EngineError::Connection(format!(
            "input '{}' is already connected to output '{}'",
            input.name(),
            existing.name()
        )));
    }
    *current = Arc::downgrade(output);
    lock(&output.inputs).push(Arc::downgrade(input));
    drop(current);

    tracing::debug!("Connected '{}' -> '{}'", output.name(), input.name());
    output.notify_released();
    Ok(())
}

/// Sever the connection of `input`, if any. Returns true if one existed.
pub fn disconnect(input: &Arc<InputSocket>) -> bool {
    let mut current = lock(&input.output);
    let previous = std::mem::take(&mut *current);
    drop(current);

    match previous.upgrade() {
        Some(output) => {
            lock(&output.inputs).retain(|w| !std::ptr::eq(w.as_ptr(), Arc::as_ptr(input)));
            tracing::debug!("Disconnected '{}' -> '{}'", output.name(), input.name());
            // A sender blocked on this input may proceed now.
            output.notify_released();
            true
        }
        None => false,
    }
}

/// Sever every connection of `output`.
pub fn disconnect_output(output: &Arc<OutputSocket>) {
    for input in output.connected_inputs() {
        disconnect(&input);
    }
    lock(&output.inputs).clear();
}
