use super::{consume_structural, Heads, SyncGroup, Verdict};
use crate::error::Result;
use crate::pipeline::process::SyncEvent;
use crate::pipeline::value::ValueKind;

/// Controller for several inputs that all share one group.
pub struct OneGroupFlowController {
    group: SyncGroup,
}

impl OneGroupFlowController {
    pub fn new(group: SyncGroup) -> Self {
        Self { group }
    }

    pub(super) fn group(&self) -> &SyncGroup {
        &self.group
    }

    pub fn next(&mut self, operation: &str, events: &mut Vec<SyncEvent>) -> Result<Verdict> {
        match self.group.inspect(operation)? {
            Heads::Empty => Ok(Verdict::NotReady),
            Heads::Uniform(ValueKind::Payload) => {
                self.group.release_all();
                Ok(Verdict::Processable(self.group.id))
            }
            Heads::Uniform(kind @ (ValueKind::GroupStart | ValueKind::GroupEnd)) => {
                events.push(consume_structural(&mut self.group, kind)?);
                Ok(Verdict::Synchronized)
            }
            Heads::Uniform(control) => {
                self.group.release_all();
                Ok(Verdict::for_control(control).unwrap_or(Verdict::Synchronized))
            }
        }
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

    fn controller() -> (OneGroupFlowController, Vec<Arc<InputSocket>>) {
        let inputs: Vec<_> = (0..2)
            .map(|i| InputSocket::with_capacity(format!("in{}", i), 4))
            .collect();
        let group = SyncGroup::new(GroupId::DEFAULT, inputs.clone(), Vec::new());
        (OneGroupFlowController::new(group), inputs)
    }

    #[test]
    fn test_waits_for_every_member() {
        let (mut c, inputs) = controller();
        let mut events = Vec::new();
        inputs[0].try_receive(Value::payload(1i64));
        assert_eq!(c.next("op", &mut events).unwrap(), Verdict::NotReady);

        inputs[1].try_receive(Value::payload(2i64));
        assert_eq!(
            c.next("op", &mut events).unwrap(),
            Verdict::Processable(GroupId::DEFAULT)
        );
        assert_eq!(inputs[0].current().unwrap().downcast_ref::<i64>(), Some(&1));
        assert_eq!(inputs[1].current().unwrap().downcast_ref::<i64>(), Some(&2));
    }

    #[test]
    fn test_pause_behind_payload_is_promoted() {
        let (mut c, inputs) = controller();
        let mut events = Vec::new();
        inputs[0].try_receive(Value::Pause);
        inputs[1].try_receive(Value::payload(1i64));
        inputs[1].try_receive(Value::Pause);

        assert_eq!(c.next("op", &mut events).unwrap(), Verdict::Paused);
        // The payload that was overtaken is still waiting.
        assert_eq!(inputs[1].head().unwrap().kind(), ValueKind::Payload);
    }

    #[test]
    fn test_payload_and_stop_is_a_sync_error() {
        let (mut c, inputs) = controller();
        let mut events = Vec::new();
        inputs[0].try_receive(Value::Stop);
        inputs[1].try_receive(Value::payload(1i64));

        let err = c.next("op", &mut events).unwrap_err();
        assert!(matches!(err, EngineError::Sync { .. }));
    }
}
