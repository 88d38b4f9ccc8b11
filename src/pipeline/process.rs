//! User-supplied processing logic.
//!
//! An operation wraps one [`Process`] implementation. The engine calls
//! `process` once per processable round, with the round's objects released
//! into the current slot of each input in the active group.

use crate::error::{EngineError, Result};
use crate::pipeline::error::{ProcessError, ProcessResult};
use crate::pipeline::id::GroupId;
use crate::pipeline::options::{ConfigValue, WriteProtection};
use crate::pipeline::socket::{InputSocket, OutputSocket, SocketDescriptor};
use crate::pipeline::value::Value;
use std::any::Any;
use std::sync::Arc;

/// Structural event delivered through [`Process::on_sync_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncEventKind {
    /// A GroupStart tag was consumed on every input of the group.
    StartInput,
    /// A GroupEnd tag was consumed on every input of the group.
    EndInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncEvent {
    pub kind: SyncEventKind,
    pub group: GroupId,
}

/// Parent/child link between two synchronization groups.
///
/// The child group carries nested data: for every object the parent
/// processes, the child sees a GroupStart, any number of objects and a
/// GroupEnd. With `strict` set, the child may only process after the parent
/// processed the object it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRelation {
    pub parent: GroupId,
    pub child: GroupId,
    pub strict: bool,
}

impl GroupRelation {
    pub fn strict(parent: impl Into<GroupId>, child: impl Into<GroupId>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
            strict: true,
        }
    }

    pub fn loose(parent: impl Into<GroupId>, child: impl Into<GroupId>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
            strict: false,
        }
    }
}

/// Processing logic plugged into an operation.
pub trait Process: Send {
    fn name(&self) -> &str;

    /// Sockets the operation creates for this logic, inputs and outputs in
    /// declaration order.
    fn sockets(&self) -> &[SocketDescriptor];

    /// Run one round. May emit, and may end the round with a signal.
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> ProcessResult;

    /// Called for every structural event before the next round.
    fn on_sync_event(&mut self, _kind: SyncEventKind, _group: GroupId) {}

    /// Called before Stop is sent downstream.
    fn on_stopped(&mut self, _ctx: &mut ProcessContext<'_>) {}

    /// Called before Pause is sent downstream.
    fn on_paused(&mut self, _ctx: &mut ProcessContext<'_>) {}

    /// Called before Resume is sent downstream.
    fn on_resumed(&mut self, _ctx: &mut ProcessContext<'_>) {}

    /// Validate settings. `reset` asks the logic to clear its counters.
    fn check(&mut self, _reset: bool) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Parent/child relations among this logic's input groups.
    fn group_relations(&self) -> Vec<GroupRelation> {
        Vec::new()
    }

    fn option_policy(&self, _name: &str) -> Option<WriteProtection> {
        None
    }

    fn option(&self, _name: &str) -> Option<ConfigValue> {
        None
    }

    fn set_option(&mut self, name: &str, _value: &ConfigValue) -> Result<()> {
        Err(EngineError::OptionValue {
            name: name.to_string(),
            message: "no such option".to_string(),
        })
    }
}

/// View of an operation's sockets handed to processing hooks.
pub struct ProcessContext<'a> {
    name: &'a str,
    inputs: &'a [Arc<InputSocket>],
    outputs: &'a [Arc<OutputSocket>],
    active_group: GroupId,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(
        name: &'a str,
        inputs: &'a [Arc<InputSocket>],
        outputs: &'a [Arc<OutputSocket>],
        active_group: GroupId,
    ) -> Self {
        Self {
            name,
            inputs,
            outputs,
            active_group,
        }
    }

    pub fn operation_name(&self) -> &str {
        self.name
    }

    /// Group whose inputs were released for this round.
    pub fn active_group(&self) -> GroupId {
        self.active_group
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Current object of input `index`.
    pub fn input(&self, index: usize) -> Option<Value> {
        self.inputs.get(index).and_then(|i| i.current())
    }

    /// Current object of input `index`, cloned out as `T`.
    pub fn input_as<T: Any + Clone>(&self, index: usize) -> Option<T> {
        self.input(index).and_then(|v| v.downcast_ref::<T>().cloned())
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|i| i.name() == name)
    }

    /// Indices of the inputs belonging to `group`.
    pub fn inputs_in_group(&self, group: GroupId) -> Vec<usize> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, i)| i.group_id() == group)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Emit on output `index`. Stop, Pause and Resume are reserved for the
    /// engine; emitting them fails the round.
    pub fn emit(&self, index: usize, value: Value) -> ProcessResult {
        if matches!(value, Value::Stop | Value::Pause | Value::Resume { .. }) {
            return Err(EngineError::InvalidValue(format!(
                "'{}' may not emit {:?} tags",
                self.name,
                value.kind()
            ))
            .into());
        }
        self.output(index)?.emit(value).map_err(ProcessError::from)
    }

    pub fn emit_payload<T: Any + Send + Sync>(&self, index: usize, value: T) -> ProcessResult {
        self.emit(index, Value::payload(value))
    }

    /// Open a nested group on output `index`.
    pub fn start_many(&self, index: usize) -> ProcessResult {
        self.output(index)?.start_many().map_err(ProcessError::from)
    }

    pub fn end_many(&self, index: usize) -> ProcessResult {
        self.output(index)?.end_many().map_err(ProcessError::from)
    }

    pub fn set_delay(&self, index: usize, delay: i32) -> ProcessResult {
        self.output(index)?.set_delay(delay);
        Ok(())
    }

    pub fn is_interrupted(&self) -> bool {
        self.outputs.first().is_some_and(|o| o.is_interrupted())
    }

    fn output(&self, index: usize) -> std::result::Result<&Arc<OutputSocket>, ProcessError> {
        self.outputs.get(index).ok_or_else(|| {
            ProcessError::failed(format!("'{}' has no output {}", self.name, index))
        })
    }
}
