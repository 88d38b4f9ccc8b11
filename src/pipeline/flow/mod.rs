//! Flow control: deciding whether an operation may run a processing round.
//!
//! The controller inspects the heads of the operation's connected inputs,
//! grouped by synchronization group, and returns a [`Verdict`]. Structural
//! tags (GroupStart/GroupEnd) are consumed here and forwarded to the outputs
//! synchronized to the group; control tags (Stop/Pause/Resume) are consumed
//! here and turned into verdicts that the processor acts on.
//!
//! Three strategies, chosen at check time:
//! - [`OneInputFlowController`] for a single connected input,
//! - [`OneGroupFlowController`] for several inputs in one group,
//! - [`DefaultFlowController`] for several groups, optionally related.

mod default;
mod group;
mod one_group;
mod one_input;

pub use default::DefaultFlowController;
pub use group::{Heads, SyncGroup};
pub use one_group::OneGroupFlowController;
pub use one_input::OneInputFlowController;

use crate::error::{EngineError, Result};
use crate::pipeline::id::GroupId;
use crate::pipeline::process::{GroupRelation, SyncEvent, SyncEventKind};
use crate::pipeline::socket::{InputSocket, OutputSocket};
use crate::pipeline::value::{Value, ValueKind};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of one flow-control step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing can be done until more input arrives.
    NotReady,
    /// Heads of this group were released; run `process`.
    Processable(GroupId),
    /// A structural tag was consumed; deliver events and ask again.
    Synchronized,
    /// Stop consumed on every group.
    Finished,
    /// Pause consumed on every group.
    Paused,
    /// Resume consumed on every group.
    Resumed,
}

impl Verdict {
    pub(crate) fn for_control(kind: ValueKind) -> Option<Verdict> {
        match kind {
            ValueKind::Stop => Some(Verdict::Finished),
            ValueKind::Pause => Some(Verdict::Paused),
            ValueKind::Resume => Some(Verdict::Resumed),
            _ => None,
        }
    }
}

enum Strategy {
    OneInput(OneInputFlowController),
    OneGroup(OneGroupFlowController),
    Default(DefaultFlowController),
}

pub struct FlowController {
    operation: String,
    strategy: Strategy,
    /// Outputs not synchronized to any input group.
    ungrouped: Vec<Arc<OutputSocket>>,
    events: Vec<SyncEvent>,
    active_group: GroupId,
}

impl FlowController {
    /// Build a controller from the connected inputs. Returns `None` when no
    /// input is connected (a producer).
    pub fn build(
        operation: &str,
        inputs: &[Arc<InputSocket>],
        outputs: &[Arc<OutputSocket>],
        relations: &[GroupRelation],
    ) -> Result<Option<Self>> {
        let mut by_group: BTreeMap<GroupId, Vec<Arc<InputSocket>>> = BTreeMap::new();
        for input in inputs.iter().filter(|i| i.is_connected()) {
            by_group.entry(input.group_id()).or_default().push(input.clone());
        }
        if by_group.is_empty() {
            return Ok(None);
        }

        let mut groups: Vec<SyncGroup> = by_group
            .into_iter()
            .map(|(id, members)| {
                let synced = outputs
                    .iter()
                    .filter(|o| o.group_id() == id)
                    .cloned()
                    .collect();
                SyncGroup::new(id, members, synced)
            })
            .collect();
        let ungrouped = outputs
            .iter()
            .filter(|o| !groups.iter().any(|g| g.id == o.group_id()))
            .cloned()
            .collect();

        link_groups(operation, &mut groups, relations)?;

        let strategy = if groups.len() == 1 && groups[0].parent.is_none() {
            let group = groups.remove(0);
            if group.inputs.len() == 1 {
                Strategy::OneInput(OneInputFlowController::new(group))
            } else {
                Strategy::OneGroup(OneGroupFlowController::new(group))
            }
        } else {
            Strategy::Default(DefaultFlowController::new(groups))
        };

        let controller = Self {
            operation: operation.to_string(),
            strategy,
            ungrouped,
            events: Vec::new(),
            active_group: GroupId::DEFAULT,
        };
        tracing::debug!("'{}' uses {}", operation, controller.kind_name());
        Ok(Some(controller))
    }

    /// Take one step.
    pub fn next(&mut self) -> Result<Verdict> {
        let verdict = match &mut self.strategy {
            Strategy::OneInput(c) => c.next(&mut self.events),
            Strategy::OneGroup(c) => c.next(&self.operation, &mut self.events),
            Strategy::Default(c) => c.next(&self.operation, &mut self.events),
        }?;
        if let Verdict::Processable(group) = verdict {
            self.active_group = group;
        }
        tracing::trace!("'{}' flow verdict {:?}", self.operation, verdict);
        Ok(verdict)
    }

    /// Take one step on behalf of a suspended operation.
    ///
    /// Payloads and structural tags stay queued. A control tag is consumed
    /// only when every connected queue holds one of the same kind; a Pause or
    /// Resume overtakes the data waiting in front of it, a Stop must already
    /// be at the head.
    pub fn next_control(&mut self) -> Verdict {
        let inputs: Vec<&Arc<InputSocket>> = match &self.strategy {
            Strategy::OneInput(c) => c.group().inputs.iter().collect(),
            Strategy::OneGroup(c) => c.group().inputs.iter().collect(),
            Strategy::Default(c) => c.groups().iter().flat_map(|g| g.inputs.iter()).collect(),
        };

        let mut tag = None;
        let mut positions = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let Some((at, kind)) = input.find_control() else {
                return Verdict::NotReady;
            };
            if tag.is_some_and(|t| t != kind) || (kind == ValueKind::Stop && at != 0) {
                return Verdict::NotReady;
            }
            tag = Some(kind);
            positions.push(at);
        }
        let Some(tag) = tag else {
            return Verdict::NotReady;
        };

        for (input, at) in inputs.iter().zip(positions) {
            if at != 0 {
                input.jump(at, 0);
            }
            input.release();
        }
        let verdict = Verdict::for_control(tag).unwrap_or(Verdict::NotReady);
        tracing::trace!("'{}' suspended flow verdict {:?}", self.operation, verdict);
        verdict
    }

    /// Structural events produced since the last call.
    pub fn take_events(&mut self) -> Vec<SyncEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn active_group(&self) -> GroupId {
        self.active_group
    }

    pub fn kind_name(&self) -> &'static str {
        match self.strategy {
            Strategy::OneInput(_) => "OneInputFlowController",
            Strategy::OneGroup(_) => "OneGroupFlowController",
            Strategy::Default(_) => "DefaultFlowController",
        }
    }

    pub fn ungrouped_outputs(&self) -> &[Arc<OutputSocket>] {
        &self.ungrouped
    }
}

impl std::fmt::Debug for FlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowController")
            .field("operation", &self.operation)
            .field("kind", &self.kind_name())
            .field("active_group", &self.active_group)
            .finish()
    }
}

fn link_groups(operation: &str, groups: &mut [SyncGroup], relations: &[GroupRelation]) -> Result<()> {
    let check_error = |message: String| EngineError::Check {
        operation: operation.to_string(),
        message,
    };

    for relation in relations {
        let parent = groups.iter().position(|g| g.id == relation.parent);
        let child = groups.iter().position(|g| g.id == relation.child);
        let (Some(parent), Some(child)) = (parent, child) else {
            tracing::debug!(
                "'{}' ignores relation {} -> {}: group has no connected input",
                operation,
                relation.parent,
                relation.child
            );
            continue;
        };
        if parent == child {
            return Err(check_error(format!(
                "group {} cannot be its own parent",
                relation.parent
            )));
        }
        if groups[child].parent.is_some() {
            return Err(check_error(format!(
                "group {} has more than one parent",
                relation.child
            )));
        }
        groups[child].parent = Some(parent);
        groups[child].strict = relation.strict;
        groups[parent].children.push(child);
    }

    // A parent chain longer than the group count means a cycle.
    for (index, group) in groups.iter().enumerate() {
        let mut cursor = group.parent;
        let mut steps = 0;
        while let Some(p) = cursor {
            steps += 1;
            if steps > groups.len() {
                return Err(check_error(format!(
                    "group relations form a cycle through group {}",
                    groups[index].id
                )));
            }
            cursor = groups[p].parent;
        }
    }
    Ok(())
}

/// Consume a GroupStart or GroupEnd on every member of `group`.
pub(crate) fn consume_structural(group: &mut SyncGroup, kind: ValueKind) -> Result<SyncEvent> {
    let (value, event) = match kind {
        ValueKind::GroupStart => (Value::GroupStart, SyncEventKind::StartInput),
        _ => (Value::GroupEnd, SyncEventKind::EndInput),
    };
    group.forward(&value)?;
    group.release_all();
    group.level += value.flow_delta();
    Ok(SyncEvent {
        kind: event,
        group: group.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::socket::connect;

    fn wired(names: &[(&str, i32)]) -> (Vec<Arc<OutputSocket>>, Vec<Arc<InputSocket>>) {
        let mut senders = Vec::new();
        let mut inputs = Vec::new();
        for (name, group) in names {
            let out = OutputSocket::new(format!("src_{}", name));
            let input = InputSocket::with_capacity(*name, 4);
            input.set_group_id(GroupId(*group));
            connect(&out, &input).unwrap();
            senders.push(out);
            inputs.push(input);
        }
        (senders, inputs)
    }

    #[test]
    fn test_no_connected_input_means_producer() {
        let inputs = vec![InputSocket::new("in")];
        let built = FlowController::build("op", &inputs, &[], &[]).unwrap();
        assert!(built.is_none());
    }

    #[test]
    fn test_strategy_selection() {
        let (_s1, one) = wired(&[("a", 0)]);
        let c = FlowController::build("op", &one, &[], &[]).unwrap().unwrap();
        assert_eq!(c.kind_name(), "OneInputFlowController");

        let (_s2, two) = wired(&[("a", 0), ("b", 0)]);
        let c = FlowController::build("op", &two, &[], &[]).unwrap().unwrap();
        assert_eq!(c.kind_name(), "OneGroupFlowController");

        let (_s3, split) = wired(&[("a", 0), ("b", 1)]);
        let c = FlowController::build("op", &split, &[], &[]).unwrap().unwrap();
        assert_eq!(c.kind_name(), "DefaultFlowController");
    }

    #[test]
    fn test_unconnected_inputs_are_ignored() {
        let (_senders, mut inputs) = wired(&[("a", 0)]);
        inputs.push(InputSocket::new("loose"));
        let c = FlowController::build("op", &inputs, &[], &[])
            .unwrap()
            .unwrap();
        assert_eq!(c.kind_name(), "OneInputFlowController");
    }

    #[test]
    fn test_suspended_step_leaves_payloads_queued() {
        let (_senders, inputs) = wired(&[("a", 0), ("b", 1)]);
        let mut c = FlowController::build("op", &inputs, &[], &[])
            .unwrap()
            .unwrap();
        for input in &inputs {
            input.try_receive(Value::payload(1i64));
        }
        assert_eq!(c.next_control(), Verdict::NotReady);
        assert_eq!(inputs[0].pending(), 1);

        // Resume on one queue only is not enough.
        inputs[0].try_receive(Value::Resume {
            flow_level: 0,
            delay: 0,
        });
        assert_eq!(c.next_control(), Verdict::NotReady);

        inputs[1].try_receive(Value::Resume {
            flow_level: 0,
            delay: 0,
        });
        assert_eq!(c.next_control(), Verdict::Resumed);
        for input in &inputs {
            assert_eq!(input.pending(), 1);
            assert_eq!(input.head_kind(), Some(ValueKind::Payload));
        }
    }

    #[test]
    fn test_suspended_step_needs_stop_at_head() {
        let (_senders, inputs) = wired(&[("a", 0)]);
        let mut c = FlowController::build("op", &inputs, &[], &[])
            .unwrap()
            .unwrap();
        inputs[0].try_receive(Value::payload(1i64));
        inputs[0].try_receive(Value::Stop);
        assert_eq!(c.next_control(), Verdict::NotReady);

        inputs[0].release();
        assert_eq!(c.next_control(), Verdict::Finished);
    }

    #[test]
    fn test_relation_cycle_is_rejected() {
        let (_senders, inputs) = wired(&[("a", 0), ("b", 1)]);
        let relations = [GroupRelation::strict(0, 1), GroupRelation::strict(1, 0)];
        let err = FlowController::build("op", &inputs, &[], &relations).unwrap_err();
        assert!(matches!(err, EngineError::Check { .. }));
    }

    #[test]
    fn test_ungrouped_outputs() {
        let (_senders, inputs) = wired(&[("a", 0)]);
        let synced = OutputSocket::new("synced");
        let other = OutputSocket::new("other");
        other.set_group_id(GroupId(9));
        let outputs = vec![synced, other];
        let c = FlowController::build("op", &inputs, &outputs, &[])
            .unwrap()
            .unwrap();
        assert_eq!(c.ungrouped_outputs().len(), 1);
        assert_eq!(c.ungrouped_outputs()[0].name(), "other");
    }
}
