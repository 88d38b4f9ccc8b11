use super::{consume_structural, SyncGroup, Verdict};
use crate::error::Result;
use crate::pipeline::process::SyncEvent;
use crate::pipeline::value::ValueKind;

/// Controller for an operation with exactly one connected input.
///
/// Processable iff the head is a payload. Structural tags are forwarded
/// unchanged to the outputs sharing the input's group id.
pub struct OneInputFlowController {
    group: SyncGroup,
}

impl OneInputFlowController {
    pub fn new(group: SyncGroup) -> Self {
        debug_assert_eq!(group.inputs.len(), 1);
        Self { group }
    }

    pub fn next(&mut self, events: &mut Vec<SyncEvent>) -> Result<Verdict> {
        let Some(kind) = self.group.inputs[0].head_kind() else {
            return Ok(Verdict::NotReady);
        };
        match kind {
            ValueKind::Payload => {
                self.group.release_all();
                Ok(Verdict::Processable(self.group.id))
            }
            ValueKind::GroupStart | ValueKind::GroupEnd => {
                events.push(consume_structural(&mut self.group, kind)?);
                Ok(Verdict::Synchronized)
            }
            control => {
                self.group.release_all();
                Ok(Verdict::for_control(control).unwrap_or(Verdict::Synchronized))
            }
        }
    }

    pub fn level(&self) -> i32 {
        self.group.level
    }

    pub(super) fn group(&self) -> &SyncGroup {
        &self.group
    }
}
