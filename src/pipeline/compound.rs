//! Compounds: graphs of operations scheduled as one unit.
//!
//! A compound owns its children and derives its own state from theirs. Child
//! state changes arrive as [`OperationEvent`]s on a channel drained by a
//! monitor thread, so aggregation never runs on a child's thread and never
//! re-enters a child.

use crate::error::{EngineError, Result};
use crate::pipeline::id::OperationId;
use crate::pipeline::operation::Operation;
use crate::pipeline::socket::{connect, InputSocket, OutputSocket};
use crate::pipeline::state::{OperationEvent, OperationState, StateCell};
use crate::pipeline::sync::lock;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

const MONITOR_POLL: Duration = Duration::from_millis(100);

/// Anything a compound can own and drive.
pub trait Schedulable: Send + Sync {
    fn id(&self) -> OperationId;
    fn name(&self) -> &str;
    fn state(&self) -> OperationState;
    fn check(&self, reset: bool) -> Result<()>;
    fn start(&self) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn interrupt(&self);
    /// Register a channel that receives this item's events.
    fn observe(&self, sender: Sender<OperationEvent>);
    /// Wait for any worker threads to exit.
    fn join(&self) {}
}

impl Schedulable for Operation {
    fn id(&self) -> OperationId {
        Operation::id(self)
    }

    fn name(&self) -> &str {
        Operation::name(self)
    }

    fn state(&self) -> OperationState {
        Operation::state(self)
    }

    fn check(&self, reset: bool) -> Result<()> {
        Operation::check(self, reset)
    }

    fn start(&self) -> Result<()> {
        Operation::start(self)
    }

    fn pause(&self) -> Result<()> {
        Operation::pause(self)
    }

    fn stop(&self) -> Result<()> {
        Operation::stop(self)
    }

    fn interrupt(&self) {
        Operation::interrupt(self)
    }

    fn observe(&self, sender: Sender<OperationEvent>) {
        Operation::observe(self, sender)
    }

    fn join(&self) {
        Operation::join(self)
    }
}

#[derive(Debug)]
struct ChildTrack {
    name: String,
    last: OperationState,
    has_run: bool,
}

enum ExposedInput {
    Alias(Arc<InputSocket>),
    Proxy(Vec<Arc<InputSocket>>),
}

impl ExposedInput {
    fn targets(&self) -> Vec<Arc<InputSocket>> {
        match self {
            ExposedInput::Alias(input) => vec![input.clone()],
            ExposedInput::Proxy(inputs) => inputs.clone(),
        }
    }
}

struct CompoundInner {
    id: OperationId,
    name: String,
    state: StateCell,
    children: Mutex<Vec<Box<dyn Schedulable>>>,
    tracks: Mutex<HashMap<OperationId, ChildTrack>>,
    events: Sender<OperationEvent>,
    inputs: Mutex<BTreeMap<String, ExposedInput>>,
    outputs: Mutex<BTreeMap<String, Arc<OutputSocket>>>,
}

/// Handle to a compound. Clones refer to the same compound.
#[derive(Clone)]
pub struct Compound {
    inner: Arc<CompoundInner>,
}

impl Compound {
    pub fn new(name: impl Into<String>) -> Self {
        let id = OperationId::next();
        let name = name.into();
        let (tx, rx) = unbounded();
        let inner = Arc::new(CompoundInner {
            id,
            name: name.clone(),
            state: StateCell::new(id, name.clone()),
            children: Mutex::new(Vec::new()),
            tracks: Mutex::new(HashMap::new()),
            events: tx,
            inputs: Mutex::new(BTreeMap::new()),
            outputs: Mutex::new(BTreeMap::new()),
        });

        let weak = Arc::downgrade(&inner);
        let spawned = std::thread::Builder::new()
            .name(format!("compound-{}", name))
            .spawn(move || monitor(weak, rx));
        if let Err(err) = spawned {
            tracing::error!("Failed to spawn monitor for compound '{}': {}", name, err);
        }
        Self { inner }
    }

    pub fn id(&self) -> OperationId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> OperationState {
        self.inner.state.get()
    }

    /// Take ownership of a child. Only allowed while stopped.
    pub fn add(&self, child: impl Schedulable + 'static) -> Result<OperationId> {
        let state = self.state();
        if state != OperationState::Stopped {
            return Err(EngineError::InvalidState {
                operation: self.inner.name.clone(),
                action: "add children",
                state: state.to_string(),
            });
        }
        let id = child.id();
        lock(&self.inner.tracks).insert(
            id,
            ChildTrack {
                name: child.name().to_string(),
                last: child.state(),
                has_run: false,
            },
        );
        child.observe(self.inner.events.clone());
        tracing::debug!("Compound '{}' adopted '{}'", self.inner.name, child.name());
        lock(&self.inner.children).push(Box::new(child));
        Ok(id)
    }

    pub fn child_count(&self) -> usize {
        lock(&self.inner.children).len()
    }

    /// Last state reported by a child, as seen by the compound.
    pub fn child_state(&self, id: OperationId) -> Option<OperationState> {
        lock(&self.inner.tracks).get(&id).map(|t| t.last)
    }

    /// Validate every child, collecting all failures.
    pub fn check(&self, reset: bool) -> Result<()> {
        let state = self.state();
        if !matches!(state, OperationState::Stopped | OperationState::Paused) {
            return Err(self.invalid_state("check", state));
        }
        let errors: Vec<EngineError> = lock(&self.inner.children)
            .iter()
            .filter_map(|child| child.check(reset).err())
            .collect();
        if errors.is_empty() {
            tracing::debug!("Compound '{}' checked", self.inner.name);
            Ok(())
        } else {
            tracing::error!(
                "Compound '{}' failed check with {} error(s)",
                self.inner.name,
                errors.len()
            );
            Err(EngineError::CheckAll(errors))
        }
    }

    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;
        {
            let mut tracks = lock(&inner.tracks);
            let state = inner.state.get();
            if !matches!(state, OperationState::Stopped | OperationState::Paused) {
                return Err(self.invalid_state("start", state));
            }
            for track in tracks.values_mut() {
                track.has_run = false;
            }
            inner.state.set(OperationState::Starting);
        }
        tracing::info!("Starting compound '{}'", inner.name);

        let failure = lock(&inner.children)
            .iter()
            .find_map(|child| child.start().err());
        if let Some(err) = failure {
            tracing::error!("Compound '{}' failed to start: {}", inner.name, err);
            self.interrupt();
            return Err(err);
        }
        inner.reevaluate();
        Ok(())
    }

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
            Ok(_) => {}
            Err(OperationState::Paused) => return Ok(()),
            Err(state) => return Err(self.invalid_state("pause", state)),
        }
        for child in lock(&inner.children).iter() {
            if child.state().is_active() {
                if let Err(err) = child.pause() {
                    tracing::warn!("Pausing '{}' failed: {}", child.name(), err);
                }
            }
        }
        inner.reevaluate();
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        let result = inner.state.transition(
            |s| !matches!(s, OperationState::Stopped | OperationState::Interrupted),
            OperationState::Stopping,
        );
        if result.is_err() {
            return Ok(());
        }
        for child in lock(&inner.children).iter() {
            if let Err(err) = child.stop() {
                tracing::warn!("Stopping '{}' failed: {}", child.name(), err);
            }
        }
        inner.reevaluate();
        Ok(())
    }

    pub fn interrupt(&self) {
        self.inner.interrupt_all();
    }

    pub fn wait_for_state(&self, state: OperationState, timeout: Duration) -> bool {
        self.inner.state.wait_for(state, timeout)
    }

    pub fn subscribe(&self) -> Receiver<OperationEvent> {
        self.inner.state.subscribe()
    }

    /// Wait for every threaded child's worker to exit.
    pub fn join(&self) {
        for child in lock(&self.inner.children).iter() {
            child.join();
        }
    }

    // ── Exposed sockets ──

    /// Expose child inputs under `alias`. One target makes an alias of that
    /// input; several make a proxy that fans the connected output out to all.
    pub fn expose_input(&self, alias: impl Into<String>, targets: Vec<Arc<InputSocket>>) -> Result<()> {
        let alias = alias.into();
        let exposed = match targets.len() {
            0 => {
                return Err(EngineError::Connection(format!(
                    "input alias '{}' of '{}' has no target",
                    alias, self.inner.name
                )))
            }
            1 => ExposedInput::Alias(targets[0].clone()),
            _ => ExposedInput::Proxy(targets),
        };
        let mut inputs = lock(&self.inner.inputs);
        if inputs.contains_key(&alias) {
            return Err(EngineError::Connection(format!(
                "input alias '{}' already exists on '{}'",
                alias, self.inner.name
            )));
        }
        inputs.insert(alias, exposed);
        Ok(())
    }

    pub fn expose_output(&self, alias: impl Into<String>, source: Arc<OutputSocket>) -> Result<()> {
        let alias = alias.into();
        let mut outputs = lock(&self.inner.outputs);
        if outputs.contains_key(&alias) {
            return Err(EngineError::Connection(format!(
                "output alias '{}' already exists on '{}'",
                alias, self.inner.name
            )));
        }
        outputs.insert(alias, source);
        Ok(())
    }

    /// The aliased input. `None` for unknown aliases and for proxies.
    pub fn input(&self, alias: &str) -> Option<Arc<InputSocket>> {
        match lock(&self.inner.inputs).get(alias) {
            Some(ExposedInput::Alias(input)) => Some(input.clone()),
            _ => None,
        }
    }

    pub fn input_targets(&self, alias: &str) -> Vec<Arc<InputSocket>> {
        lock(&self.inner.inputs)
            .get(alias)
            .map(ExposedInput::targets)
            .unwrap_or_default()
    }

    pub fn is_proxy(&self, alias: &str) -> bool {
        matches!(lock(&self.inner.inputs).get(alias), Some(ExposedInput::Proxy(_)))
    }

    pub fn output(&self, alias: &str) -> Option<Arc<OutputSocket>> {
        lock(&self.inner.outputs).get(alias).cloned()
    }

    /// Wire an external output to every target behind `alias`.
    pub fn connect_output_to(&self, alias: &str, output: &Arc<OutputSocket>) -> Result<()> {
        let targets = self.input_targets(alias);
        if targets.is_empty() {
            return Err(EngineError::Connection(format!(
                "'{}' has no input alias '{}'",
                self.inner.name, alias
            )));
        }
        for target in &targets {
            connect(output, target)?;
        }
        Ok(())
    }

    fn invalid_state(&self, action: &'static str, state: OperationState) -> EngineError {
        EngineError::InvalidState {
            operation: self.inner.name.clone(),
            action,
            state: state.to_string(),
        }
    }
}

impl Schedulable for Compound {
    fn id(&self) -> OperationId {
        Compound::id(self)
    }

    fn name(&self) -> &str {
        Compound::name(self)
    }

    fn state(&self) -> OperationState {
        Compound::state(self)
    }

    fn check(&self, reset: bool) -> Result<()> {
        Compound::check(self, reset)
    }

    fn start(&self) -> Result<()> {
        Compound::start(self)
    }

    fn pause(&self) -> Result<()> {
        Compound::pause(self)
    }

    fn stop(&self) -> Result<()> {
        Compound::stop(self)
    }

    fn interrupt(&self) {
        Compound::interrupt(self)
    }

    fn observe(&self, sender: Sender<OperationEvent>) {
        self.inner.state.observe(sender)
    }

    fn join(&self) {
        Compound::join(self)
    }
}

impl std::fmt::Debug for Compound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compound")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("children", &self.child_count())
            .finish()
    }
}

impl CompoundInner {
    fn interrupt_all(&self) {
        if self.state.get() == OperationState::Stopped {
            return;
        }
        self.state.set(OperationState::Interrupted);
        tracing::info!("Interrupting compound '{}'", self.name);
        for child in lock(&self.children).iter() {
            child.interrupt();
        }
        self.reevaluate();
    }

    fn on_child_event(&self, event: OperationEvent) {
        match event {
            OperationEvent::StateChanged { id, to, .. } => {
                {
                    let mut tracks = lock(&self.tracks);
                    if let Some(track) = tracks.get_mut(&id) {
                        track.last = to;
                        if to == OperationState::Running {
                            track.has_run = true;
                        }
                    }
                }
                self.reevaluate();
            }
            OperationEvent::Error { name, message, .. } => {
                tracing::error!(
                    "Compound '{}' stopping after error in '{}': {}",
                    self.name,
                    name,
                    message
                );
                self.state.report_error(format!("{}: {}", name, message));
                self.interrupt_all();
            }
        }
    }

    /// Derive the compound state from the tracked child states.
    fn reevaluate(&self) {
        let tracks = lock(&self.tracks);
        let all = |pred: &dyn Fn(&ChildTrack) -> bool| tracks.values().all(pred);
        let all_stopped = all(&|t| t.last == OperationState::Stopped);
        let all_settled = all(&|t| {
            matches!(t.last, OperationState::Paused | OperationState::Stopped)
        });

        match self.state.get() {
            OperationState::Starting => {
                if all(&|t| t.has_run) {
                    self.state.set(OperationState::Running);
                    tracing::info!("Compound '{}' running", self.name);
                    if all_stopped {
                        self.finish();
                    }
                }
            }
            OperationState::Running => {
                if all_stopped {
                    self.finish();
                } else if all_settled {
                    self.state.set(OperationState::Paused);
                }
            }
            OperationState::Pausing => {
                if all_stopped {
                    self.finish();
                } else if all_settled {
                    self.state.set(OperationState::Paused);
                    tracing::info!("Compound '{}' paused", self.name);
                }
            }
            OperationState::Paused | OperationState::Stopping | OperationState::Interrupted => {
                if all_stopped {
                    self.finish();
                }
            }
            OperationState::Stopped => {}
        }
        let pending: Vec<_> = tracks
            .values()
            .filter(|t| t.last != OperationState::Stopped)
            .map(|t| t.name.as_str())
            .collect();
        tracing::trace!("Compound '{}' waiting on {:?}", self.name, pending);
    }

    fn finish(&self) {
        if self.state.get() != OperationState::Interrupted {
            self.state.set(OperationState::Stopping);
        }
        self.state.set(OperationState::Stopped);
        tracing::info!("Compound '{}' stopped", self.name);
    }
}

fn monitor(inner: Weak<CompoundInner>, events: Receiver<OperationEvent>) {
    loop {
        match events.recv_timeout(MONITOR_POLL) {
            Ok(event) => match inner.upgrade() {
                Some(inner) => inner.on_child_event(event),
                None => break,
            },
            Err(RecvTimeoutError::Timeout) => {
                if inner.strong_count() == 0 {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
