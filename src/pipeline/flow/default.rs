use super::{consume_structural, Heads, SyncGroup, Verdict};
use crate::error::Result;
use crate::pipeline::process::{SyncEvent, SyncEventKind};
use crate::pipeline::value::ValueKind;

/// Controller for several synchronization groups, possibly arranged in a
/// parent/child forest.
///
/// Each step first consumes pending GroupStart tags, shallowest group first,
/// so a parent always learns about a new group before its descendants run.
/// Everything else is scanned deepest group first, so ready children are
/// preferred over their ancestors.
///
/// Control tags are consumed per group; a group holding one is frozen until
/// every group consumed the same tag, at which point the verdict fires.
pub struct DefaultFlowController {
    groups: Vec<SyncGroup>,
    shallow_first: Vec<usize>,
    deep_first: Vec<usize>,
    marks: Vec<Option<ValueKind>>,
    /// EndInput events waiting for the remaining siblings to finish.
    held: Vec<SyncEvent>,
}

impl DefaultFlowController {
    pub fn new(groups: Vec<SyncGroup>) -> Self {
        let mut shallow_first: Vec<usize> = (0..groups.len()).collect();
        shallow_first.sort_by_key(|&g| groups[g].depth(&groups));
        let mut deep_first = shallow_first.clone();
        deep_first.reverse();
        let marks = vec![None; groups.len()];
        Self {
            groups,
            shallow_first,
            deep_first,
            marks,
            held: Vec::new(),
        }
    }

    pub fn groups(&self) -> &[SyncGroup] {
        &self.groups
    }

    pub fn next(&mut self, operation: &str, events: &mut Vec<SyncEvent>) -> Result<Verdict> {
        for i in 0..self.shallow_first.len() {
            let g = self.shallow_first[i];
            if self.marks[g].is_some() {
                continue;
            }
            if self.groups[g].inspect(operation)? == Heads::Uniform(ValueKind::GroupStart) {
                events.push(consume_structural(&mut self.groups[g], ValueKind::GroupStart)?);
                return Ok(Verdict::Synchronized);
            }
        }

        for i in 0..self.deep_first.len() {
            let g = self.deep_first[i];
            if self.marks[g].is_some() {
                continue;
            }
            match self.groups[g].inspect(operation)? {
                Heads::Empty => {}
                Heads::Uniform(ValueKind::Payload) => {
                    if self.can_process(operation, g)? {
                        self.activate(g);
                        return Ok(Verdict::Processable(self.groups[g].id));
                    }
                }
                Heads::Uniform(ValueKind::GroupStart) => {
                    events.push(consume_structural(&mut self.groups[g], ValueKind::GroupStart)?);
                    return Ok(Verdict::Synchronized);
                }
                Heads::Uniform(ValueKind::GroupEnd) => {
                    self.end(g, events)?;
                    return Ok(Verdict::Synchronized);
                }
                Heads::Uniform(control) => {
                    self.groups[g].release_all();
                    self.marks[g] = Some(control);
                    return self.settle(operation, g);
                }
            }
        }
        Ok(Verdict::NotReady)
    }

    fn can_process(&self, operation: &str, g: usize) -> Result<bool> {
        let group = &self.groups[g];
        if let Some(p) = group.parent {
            let parent = &self.groups[p];
            if group.level <= parent.level {
                return Err(group.sync_error(
                    operation,
                    format!(
                        "level {} of group {} does not exceed level {} of parent group {}",
                        group.level, group.id, parent.level, parent.id
                    ),
                ));
            }
            if group.strict && !parent.activated {
                return Ok(false);
            }
        }
        let waiting_on_child = group
            .children
            .iter()
            .any(|&c| self.groups[c].strict && self.groups[c].expecting);
        Ok(!waiting_on_child)
    }

    fn activate(&mut self, g: usize) {
        self.groups[g].release_all();
        if self.groups[g].children.is_empty() {
            return;
        }
        self.groups[g].activated = true;
        for c in self.groups[g].children.clone() {
            self.groups[c].expecting = true;
        }
    }

    fn end(&mut self, g: usize, events: &mut Vec<SyncEvent>) -> Result<()> {
        let event = consume_structural(&mut self.groups[g], ValueKind::GroupEnd)?;
        debug_assert_eq!(event.kind, SyncEventKind::EndInput);

        let Some(p) = self.groups[g].parent else {
            events.push(event);
            return Ok(());
        };
        if self.groups[g].level != self.groups[p].level {
            events.push(event);
            return Ok(());
        }

        self.groups[g].expecting = false;
        self.held.push(event);
        let siblings_done = self.groups[p]
            .children
            .iter()
            .all(|&c| !self.groups[c].expecting);
        if siblings_done {
            self.groups[p].activated = false;
            events.append(&mut self.held);
        }
        Ok(())
    }

    fn settle(&mut self, operation: &str, g: usize) -> Result<Verdict> {
        let Some(tag) = self.marks[g] else {
            return Ok(Verdict::Synchronized);
        };
        if let Some(other) = self.marks.iter().flatten().find(|m| **m != tag) {
            return Err(self.groups[g].sync_error(
                operation,
                format!("control tag {:?} conflicts with {:?} on another group", tag, other),
            ));
        }
        if self.marks.iter().all(Option::is_some) {
            self.marks.iter_mut().for_each(|m| *m = None);
            return Ok(Verdict::for_control(tag).unwrap_or(Verdict::Synchronized));
        }
        Ok(Verdict::Synchronized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::pipeline::id::GroupId;
    use crate::pipeline::socket::InputSocket;
    use crate::pipeline::value::Value;
    use std::sync::Arc;

    struct Fixture {
        controller: DefaultFlowController,
        parent: Arc<InputSocket>,
        child: Arc<InputSocket>,
        events: Vec<SyncEvent>,
    }

    impl Fixture {
        fn new(strict: bool) -> Self {
            let parent = InputSocket::with_capacity("parent", 8);
            let child = InputSocket::with_capacity("child", 8);
            child.set_group_id(GroupId(1));
            let mut groups = vec![
                SyncGroup::new(GroupId(0), vec![parent.clone()], Vec::new()),
                SyncGroup::new(GroupId(1), vec![child.clone()], Vec::new()),
            ];
            groups[1].parent = Some(0);
            groups[1].strict = strict;
            groups[0].children.push(1);
            Self {
                controller: DefaultFlowController::new(groups),
                parent,
                child,
                events: Vec::new(),
            }
        }

        fn step(&mut self) -> Result<Verdict> {
            self.controller.next("op", &mut self.events)
        }
    }

    #[test]
    fn test_strict_child_waits_for_parent() {
        let mut f = Fixture::new(true);
        f.child.try_receive(Value::GroupStart);
        f.child.try_receive(Value::payload(10i64));

        assert_eq!(f.step().unwrap(), Verdict::Synchronized);
        // Child is nested but the parent has not processed yet.
        assert_eq!(f.step().unwrap(), Verdict::NotReady);

        f.parent.try_receive(Value::payload(1i64));
        assert_eq!(f.step().unwrap(), Verdict::Processable(GroupId(0)));
        assert_eq!(f.step().unwrap(), Verdict::Processable(GroupId(1)));
    }

    #[test]
    fn test_strict_parent_waits_for_children_to_finish() {
        let mut f = Fixture::new(true);
        f.parent.try_receive(Value::payload(1i64));
        f.parent.try_receive(Value::payload(2i64));
        f.child.try_receive(Value::GroupStart);

        assert_eq!(f.step().unwrap(), Verdict::Synchronized);
        assert_eq!(f.step().unwrap(), Verdict::Processable(GroupId(0)));
        // Second parent object must wait for the child's GroupEnd.
        assert_eq!(f.step().unwrap(), Verdict::NotReady);

        f.child.try_receive(Value::payload(10i64));
        f.child.try_receive(Value::GroupEnd);
        assert_eq!(f.step().unwrap(), Verdict::Processable(GroupId(1)));
        assert_eq!(f.step().unwrap(), Verdict::Synchronized);
        assert_eq!(f.step().unwrap(), Verdict::Processable(GroupId(0)));

        let kinds: Vec<_> = f.events.iter().map(|e| (e.kind, e.group)).collect();
        assert_eq!(
            kinds,
            vec![
                (SyncEventKind::StartInput, GroupId(1)),
                (SyncEventKind::EndInput, GroupId(1)),
            ]
        );
    }

    #[test]
    fn test_loose_child_level_must_exceed_parent() {
        let mut f = Fixture::new(false);
        // Payload without an enclosing GroupStart: the child is not nested.
        f.child.try_receive(Value::payload(10i64));
        match f.step() {
            Err(EngineError::Sync { group, dump, .. }) => {
                assert_eq!(group, GroupId(1));
                assert!(dump.contains("child"));
            }
            other => panic!("expected sync error, got {:?}", other),
        }
    }

    #[test]
    fn test_loose_child_runs_without_parent() {
        let mut f = Fixture::new(false);
        f.child.try_receive(Value::GroupStart);
        f.child.try_receive(Value::payload(10i64));
        assert_eq!(f.step().unwrap(), Verdict::Synchronized);
        assert_eq!(f.step().unwrap(), Verdict::Processable(GroupId(1)));
    }

    #[test]
    fn test_control_tag_fires_once_all_groups_agree() {
        let mut f = Fixture::new(false);
        f.parent.try_receive(Value::Stop);
        assert_eq!(f.step().unwrap(), Verdict::Synchronized);
        assert_eq!(f.step().unwrap(), Verdict::NotReady);

        f.child.try_receive(Value::Stop);
        assert_eq!(f.step().unwrap(), Verdict::Finished);
    }

    #[test]
    fn test_conflicting_control_tags() {
        let mut f = Fixture::new(false);
        f.parent.try_receive(Value::Stop);
        f.child.try_receive(Value::Pause);
        assert!(f.step().is_ok());
        assert!(matches!(f.step(), Err(EngineError::Sync { .. })));
    }

    #[test]
    fn test_end_input_bubbles_after_all_siblings() {
        let parent = InputSocket::with_capacity("parent", 8);
        let a = InputSocket::with_capacity("a", 8);
        let b = InputSocket::with_capacity("b", 8);
        a.set_group_id(GroupId(1));
        b.set_group_id(GroupId(2));
        let mut groups = vec![
            SyncGroup::new(GroupId(0), vec![parent.clone()], Vec::new()),
            SyncGroup::new(GroupId(1), vec![a.clone()], Vec::new()),
            SyncGroup::new(GroupId(2), vec![b.clone()], Vec::new()),
        ];
        for c in [1, 2] {
            groups[c].parent = Some(0);
            groups[c].strict = true;
            groups[0].children.push(c);
        }
        let mut controller = DefaultFlowController::new(groups);
        let mut events = Vec::new();

        parent.try_receive(Value::payload(1i64));
        a.try_receive(Value::GroupStart);
        b.try_receive(Value::GroupStart);

        // Two starts, then the parent round.
        assert_eq!(controller.next("op", &mut events).unwrap(), Verdict::Synchronized);
        assert_eq!(controller.next("op", &mut events).unwrap(), Verdict::Synchronized);
        assert_eq!(
            controller.next("op", &mut events).unwrap(),
            Verdict::Processable(GroupId(0))
        );

        // Group 1 returns; its EndInput is held until group 2 returns too.
        a.try_receive(Value::GroupEnd);
        assert_eq!(controller.next("op", &mut events).unwrap(), Verdict::Synchronized);
        assert!(!events.iter().any(|e| e.kind == SyncEventKind::EndInput));

        b.try_receive(Value::GroupEnd);
        assert_eq!(controller.next("op", &mut events).unwrap(), Verdict::Synchronized);
        let ends: Vec<_> = events
            .iter()
            .filter(|e| e.kind == SyncEventKind::EndInput)
            .map(|e| e.group)
            .collect();
        assert_eq!(ends, vec![GroupId(1), GroupId(2)]);
        assert!(!controller.groups()[0].activated);
    }
}
