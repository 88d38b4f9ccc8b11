//! Bounded input-side socket queue.
//!
//! Slot layout: one "current" slot holding the object being processed (it may
//! be empty, but it always exists) followed by up to `capacity - 1` look-ahead
//! slots. New values enter at the back of the look-ahead; `release` moves the
//! head into the current slot, discarding what was there.

use crate::pipeline::value::{Value, ValueKind};
use std::collections::VecDeque;
use std::fmt::Write as _;

/// Default total number of slots (current + look-ahead).
pub const DEFAULT_QUEUE_CAPACITY: usize = 3;

/// Smallest legal capacity: one current slot and one look-ahead slot.
pub const MIN_QUEUE_CAPACITY: usize = 2;

#[derive(Debug)]
pub struct SocketQueue {
    current: Option<Value>,
    incoming: VecDeque<Value>,
    capacity: usize,
}

impl SocketQueue {
    /// Create a queue. Capacities below [`MIN_QUEUE_CAPACITY`] are raised to it.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_QUEUE_CAPACITY);
        Self {
            current: None,
            incoming: VecDeque::with_capacity(capacity - 1),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots in use, counting the current slot when occupied.
    #[inline]
    pub fn len(&self) -> usize {
        self.incoming.len() + usize::from(self.current.is_some())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of values waiting behind the current slot.
    #[inline]
    pub fn pending(&self) -> usize {
        self.incoming.len()
    }

    /// True when no further value can be accepted.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.incoming.len() >= self.capacity - 1
    }

    /// Append a value. Gives the value back when the queue is full.
    pub fn try_push(&mut self, value: Value) -> Result<(), Value> {
        if self.is_full() {
            return Err(value);
        }
        self.incoming.push_back(value);
        Ok(())
    }

    /// The object most recently released for processing.
    #[inline]
    pub fn current(&self) -> Option<&Value> {
        self.current.as_ref()
    }

    /// The oldest waiting value.
    #[inline]
    pub fn head(&self) -> Option<&Value> {
        self.incoming.front()
    }

    /// Look ahead `index` positions past the head.
    #[inline]
    pub fn peek(&self, index: usize) -> Option<&Value> {
        self.incoming.get(index)
    }

    /// Consume the head: it becomes the current object and the previous
    /// current object is dropped. Returns false if nothing was waiting.
    pub fn release(&mut self) -> bool {
        match self.incoming.pop_front() {
            Some(value) => {
                self.current = Some(value);
                true
            }
            None => {
                self.current = None;
                false
            }
        }
    }

    /// Move the waiting value at `from` to position `to`, shifting the values
    /// in between by one.
    pub fn jump(&mut self, from: usize, to: usize) -> bool {
        if from >= self.incoming.len() || to >= self.incoming.len() {
            return false;
        }
        if from != to {
            if let Some(value) = self.incoming.remove(from) {
                self.incoming.insert(to, value);
            }
        }
        true
    }

    /// Index of the first waiting value of `kind`.
    pub fn find(&self, kind: ValueKind) -> Option<usize> {
        self.incoming.iter().position(|v| v.kind() == kind)
    }

    /// Index and kind of the first waiting Stop, Pause or Resume.
    pub fn find_control(&self) -> Option<(usize, ValueKind)> {
        self.incoming.iter().enumerate().find_map(|(at, v)| match v.kind() {
            kind @ (ValueKind::Stop | ValueKind::Pause | ValueKind::Resume) => Some((at, kind)),
            _ => None,
        })
    }

    /// Change the number of slots. Waiting values beyond the new limit are
    /// kept until released; only new pushes see the smaller bound.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(MIN_QUEUE_CAPACITY);
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.incoming.clear();
    }

    /// One-line description of the queue contents for diagnostics.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "current={:?} waiting=[",
            self.current.as_ref().map(Value::kind)
        );
        for (i, value) in self.incoming.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{:?}", value.kind());
        }
        let _ = write!(out, "] capacity={}", self.capacity);
        out
    }
}

impl Default for SocketQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Value {
        Value::payload(v)
    }

    #[test]
    fn test_default_capacity_leaves_two_lookahead_slots() {
        let mut q = SocketQueue::default();
        assert!(q.try_push(int(1)).is_ok());
        assert!(q.try_push(int(2)).is_ok());
        assert!(q.is_full());
        assert!(q.try_push(int(3)).is_err());
    }

    #[test]
    fn test_release_moves_head_to_current() {
        let mut q = SocketQueue::new(3);
        q.try_push(int(1)).unwrap();
        q.try_push(int(2)).unwrap();

        assert!(q.release());
        assert_eq!(q.current().unwrap().downcast_ref::<i64>(), Some(&1));
        assert_eq!(q.head().unwrap().downcast_ref::<i64>(), Some(&2));
        assert!(!q.is_full());

        assert!(q.release());
        assert_eq!(q.current().unwrap().downcast_ref::<i64>(), Some(&2));
        assert!(!q.release());
        assert!(q.current().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn test_capacity_is_clamped() {
        let q = SocketQueue::new(0);
        assert_eq!(q.capacity(), MIN_QUEUE_CAPACITY);
    }

    #[test]
    fn test_jump_promotes_buried_tag() {
        let mut q = SocketQueue::new(5);
        q.try_push(int(1)).unwrap();
        q.try_push(int(2)).unwrap();
        q.try_push(Value::Pause).unwrap();

        let at = q.find(ValueKind::Pause).unwrap();
        assert_eq!(at, 2);
        assert!(q.jump(at, 0));
        assert_eq!(q.head().unwrap().kind(), ValueKind::Pause);
        assert_eq!(q.peek(1).unwrap().downcast_ref::<i64>(), Some(&1));
        assert_eq!(q.peek(2).unwrap().downcast_ref::<i64>(), Some(&2));
        assert!(!q.jump(3, 0));
    }

    #[test]
    fn test_describe() {
        let mut q = SocketQueue::new(3);
        q.try_push(int(1)).unwrap();
        q.try_push(Value::Stop).unwrap();
        assert_eq!(
            q.describe(),
            "current=None waiting=[Payload, Stop] capacity=3"
        );
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_queue_never_exceeds_capacity(
            capacity in 2usize..10,
            ops in prop::collection::vec(any::<bool>(), 0..200)
        ) {
            let mut q = SocketQueue::new(capacity);
            for push in ops {
                if push {
                    let was_full = q.is_full();
                    let accepted = q.try_push(Value::payload(0u8)).is_ok();
                    // Property: a push is refused exactly when the queue is full
                    prop_assert_eq!(accepted, !was_full);
                } else {
                    let before = q.pending();
                    q.release();
                    // Property: release frees exactly one waiting slot when one was taken
                    prop_assert_eq!(q.pending(), before.saturating_sub(1));
                }
                prop_assert!(q.len() <= capacity);
            }
        }
    }
}
