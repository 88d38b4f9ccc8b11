//! Operation states and state-change observation.

use crate::pipeline::id::OperationId;
use crate::pipeline::sync::{lock, wait_timeout};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fmt;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Execution state shared by operations and compounds.
///
/// ```text
/// Stopped -> Starting -> Running -> Pausing -> Paused
///                               \-> Stopping -> Stopped
/// any non-stopped state -> Interrupted -> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperationState {
    #[default]
    Stopped,
    Starting,
    Running,
    Pausing,
    Paused,
    Stopping,
    Interrupted,
}

impl OperationState {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationState::Stopped => "stopped",
            OperationState::Starting => "starting",
            OperationState::Running => "running",
            OperationState::Pausing => "pausing",
            OperationState::Paused => "paused",
            OperationState::Stopping => "stopping",
            OperationState::Interrupted => "interrupted",
        }
    }

    /// States in which processing rounds may run.
    #[inline]
    pub fn is_active(self) -> bool {
        !matches!(self, OperationState::Stopped | OperationState::Interrupted)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification sent to observers of an operation or compound.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationEvent {
    StateChanged {
        id: OperationId,
        name: String,
        from: OperationState,
        to: OperationState,
    },
    Error {
        id: OperationId,
        name: String,
        message: String,
    },
}

impl OperationEvent {
    pub fn id(&self) -> OperationId {
        match self {
            OperationEvent::StateChanged { id, .. } | OperationEvent::Error { id, .. } => *id,
        }
    }
}

/// State plus its wait condition and observer list.
///
/// Events are sent while the state lock is held so observers see them in
/// mutation order. Sending on an unbounded channel never blocks and never
/// runs observer code on the mutating thread.
pub(crate) struct StateCell {
    id: OperationId,
    name: String,
    state: Mutex<OperationState>,
    changed: Condvar,
    observers: Mutex<Vec<Sender<OperationEvent>>>,
}

impl StateCell {
    pub fn new(id: OperationId, name: String) -> Self {
        Self {
            id,
            name,
            state: Mutex::new(OperationState::Stopped),
            changed: Condvar::new(),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self) -> OperationState {
        *lock(&self.state)
    }

    /// Unconditionally move to `to`. Returns the previous state.
    pub fn set(&self, to: OperationState) -> OperationState {
        let mut state = lock(&self.state);
        let from = *state;
        if from != to {
            *state = to;
            tracing::debug!("'{}' {} -> {}", self.name, from, to);
            self.publish(OperationEvent::StateChanged {
                id: self.id,
                name: self.name.clone(),
                from,
                to,
            });
            self.changed.notify_all();
        }
        from
    }

    /// Move to `to` only if the current state satisfies `allowed`.
    pub fn transition(
        &self,
        allowed: impl FnOnce(OperationState) -> bool,
        to: OperationState,
    ) -> Result<OperationState, OperationState> {
        let mut state = lock(&self.state);
        let from = *state;
        if !allowed(from) {
            return Err(from);
        }
        if from != to {
            *state = to;
            tracing::debug!("'{}' {} -> {}", self.name, from, to);
            self.publish(OperationEvent::StateChanged {
                id: self.id,
                name: self.name.clone(),
                from,
                to,
            });
            self.changed.notify_all();
        }
        Ok(from)
    }

    pub fn report_error(&self, message: String) {
        let _state = lock(&self.state);
        self.publish(OperationEvent::Error {
            id: self.id,
            name: self.name.clone(),
            message,
        });
    }

    pub fn observe(&self, sender: Sender<OperationEvent>) {
        lock(&self.observers).push(sender);
    }

    pub fn subscribe(&self) -> Receiver<OperationEvent> {
        let (tx, rx) = unbounded();
        self.observe(tx);
        rx
    }

    /// Block until the state equals `target`. Returns false on timeout.
    pub fn wait_for(&self, target: OperationState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.state);
        while *state != target {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = wait_timeout(&self.changed, state, deadline - now);
        }
        true
    }

    fn publish(&self, event: OperationEvent) {
        let mut observers = lock(&self.observers);
        observers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
