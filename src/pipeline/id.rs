//! Identity types for the pipeline system.
//!
//! Operations get a process-unique `OperationId` from an atomic counter.
//! Synchronization groups are plain signed numbers chosen by whoever declares
//! the sockets; inputs sharing a `GroupId` on one operation are synchronized.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_OPERATION_ID: AtomicU32 = AtomicU32::new(0);

/// Unique identity of an operation or compound.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub u32);

impl OperationId {
    pub const INVALID: OperationId = OperationId(u32::MAX);

    /// Allocate the next free id.
    pub fn next() -> Self {
        OperationId(NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "OperationId(INVALID)")
        } else {
            write!(f, "OperationId({})", self.0)
        }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Synchronization group number. Group 0 is the default for every socket.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GroupId(pub i32);

impl GroupId {
    pub const DEFAULT: GroupId = GroupId(0);
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for GroupId {
    fn from(value: i32) -> Self {
        GroupId(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_ids_are_unique() {
        let a = OperationId::next();
        let b = OperationId::next();
        assert_ne!(a, b);
        assert!(a.is_valid());
        assert!(!OperationId::INVALID.is_valid());
    }

    #[test]
    fn test_group_id_display() {
        assert_eq!(GroupId(-1).to_string(), "-1");
        assert_eq!(format!("{:?}", GroupId::DEFAULT), "GroupId(0)");
    }
}
