//! Synchronization groups.
//!
//! A group is the set of inputs of one operation that share a group id, plus
//! the outputs synchronized to them. All member inputs advance together: a
//! round needs one object at the head of every member queue.

use crate::error::{EngineError, Result};
use crate::pipeline::id::GroupId;
use crate::pipeline::socket::{InputSocket, OutputSocket};
use crate::pipeline::value::{KindMask, Value, ValueKind};
use std::sync::Arc;

/// Classification of a group's queue heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heads {
    /// At least one member queue is empty.
    Empty,
    /// Every head is this kind.
    Uniform(ValueKind),
}

pub struct SyncGroup {
    pub id: GroupId,
    pub(crate) inputs: Vec<Arc<InputSocket>>,
    pub(crate) outputs: Vec<Arc<OutputSocket>>,
    /// Net GroupStart minus GroupEnd consumed by this group.
    pub level: i32,
    pub(crate) parent: Option<usize>,
    pub(crate) strict: bool,
    pub(crate) children: Vec<usize>,
    /// Parent side: processed an object whose children are not yet done.
    pub(crate) activated: bool,
    /// Child side: the parent is waiting for this group to return to its level.
    pub(crate) expecting: bool,
}

impl SyncGroup {
    pub fn new(id: GroupId, inputs: Vec<Arc<InputSocket>>, outputs: Vec<Arc<OutputSocket>>) -> Self {
        Self {
            id,
            inputs,
            outputs,
            level: 0,
            parent: None,
            strict: false,
            children: Vec::new(),
            activated: false,
            expecting: false,
        }
    }

    pub fn inputs(&self) -> &[Arc<InputSocket>] {
        &self.inputs
    }

    pub fn depth(&self, groups: &[SyncGroup]) -> usize {
        let mut depth = 0;
        let mut cursor = self.parent;
        while let Some(p) = cursor {
            depth += 1;
            cursor = groups[p].parent;
        }
        depth
    }

    fn mask(&self) -> Option<KindMask> {
        let mut mask = KindMask::EMPTY;
        for input in &self.inputs {
            mask.insert(input.head_kind()?);
        }
        Some(mask)
    }

    /// Classify the heads, promoting a buried Pause or Resume when the heads
    /// mix it with payloads. Any other mixture is a synchronization error.
    pub fn inspect(&self, operation: &str) -> Result<Heads> {
        let Some(mask) = self.mask() else {
            return Ok(Heads::Empty);
        };

        const UNIFORM: [ValueKind; 6] = [
            ValueKind::Payload,
            ValueKind::GroupStart,
            ValueKind::GroupEnd,
            ValueKind::Stop,
            ValueKind::Pause,
            ValueKind::Resume,
        ];
        if let Some(kind) = UNIFORM.iter().copied().find(|k| mask.is_only(*k)) {
            return Ok(Heads::Uniform(kind));
        }

        for tag in [ValueKind::Pause, ValueKind::Resume] {
            let mut pair = KindMask::EMPTY;
            pair.insert(ValueKind::Payload);
            pair.insert(tag);
            if mask == pair {
                return Ok(if self.promote(tag) {
                    Heads::Uniform(tag)
                } else {
                    Heads::Empty
                });
            }
        }

        Err(self.sync_error(operation, format!("mixed objects at queue heads {:?}", mask)))
    }

    /// Bring the first `tag` in every queue to the head. Nothing moves unless
    /// every queue holds one.
    fn promote(&self, tag: ValueKind) -> bool {
        let positions: Vec<Option<usize>> = self.inputs.iter().map(|i| i.find(tag)).collect();
        if positions.iter().any(Option::is_none) {
            return false;
        }
        for (input, at) in self.inputs.iter().zip(positions.into_iter().flatten()) {
            if at != 0 {
                input.jump(at, 0);
            }
        }
        true
    }

    pub fn release_all(&self) {
        for input in &self.inputs {
            input.release();
        }
    }

    /// Send a structural tag to every output synchronized to this group.
    pub fn forward(&self, value: &Value) -> Result<()> {
        for output in &self.outputs {
            output.emit(value.clone())?;
        }
        Ok(())
    }

    pub fn dump(&self) -> String {
        self.inputs
            .iter()
            .map(|i| i.describe_queue())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn sync_error(&self, operation: &str, message: String) -> EngineError {
        tracing::error!(
            "Synchronization error in group {} of '{}': {}",
            self.id,
            operation,
            message
        );
        EngineError::Sync {
            operation: operation.to_string(),
            group: self.id,
            message,
            dump: self.dump(),
        }
    }
}

impl std::fmt::Debug for SyncGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncGroup")
            .field("id", &self.id)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("level", &self.level)
            .field("parent", &self.parent)
            .finish()
    }
}
