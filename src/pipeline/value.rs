//! Values flowing through sockets.
//!
//! A `Value` is either an ordinary payload or one of the control tags that
//! carry structural information through the graph. Values are copied by
//! value; payloads are reference counted so a copy never clones user data.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type-erased, shareable payload object.
#[derive(Clone)]
pub struct Payload {
    data: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            data: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the payload as `T` if that is its type.
    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.data.is::<T>()
    }

    /// Name of the wrapped type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload<{}>", self.type_name)
    }
}

/// Object or control tag held in a socket queue.
#[derive(Debug, Clone)]
pub enum Value {
    /// Ordinary data object.
    Payload(Payload),
    /// Opens a nested group (flow level +1).
    GroupStart,
    /// Closes a nested group (flow level -1).
    GroupEnd,
    /// End of data.
    Stop,
    /// Orderly suspension.
    Pause,
    /// Resumption, carrying the sender's flow state captured at pause time.
    Resume { flow_level: i32, delay: i32 },
}

impl Value {
    /// Wrap any shareable object as a payload value.
    pub fn payload<T: Any + Send + Sync>(value: T) -> Self {
        Value::Payload(Payload::new(value))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Payload(_) => ValueKind::Payload,
            Value::GroupStart => ValueKind::GroupStart,
            Value::GroupEnd => ValueKind::GroupEnd,
            Value::Stop => ValueKind::Stop,
            Value::Pause => ValueKind::Pause,
            Value::Resume { .. } => ValueKind::Resume,
        }
    }

    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Value::Payload(_))
    }

    #[inline]
    pub fn is_tag(&self) -> bool {
        !self.is_payload()
    }

    /// Signed change to the flow level caused by this value.
    pub fn flow_delta(&self) -> i32 {
        match self {
            Value::GroupStart => 1,
            Value::GroupEnd => -1,
            _ => 0,
        }
    }

    /// Borrow the payload as `T`. `None` for tags and mismatched types.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Payload(p) => p.downcast_ref::<T>(),
            _ => None,
        }
    }
}

/// Discriminant of a [`Value`], used for head classification and dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Payload,
    GroupStart,
    GroupEnd,
    Stop,
    Pause,
    Resume,
}

impl ValueKind {
    pub const fn bit(self) -> u8 {
        match self {
            ValueKind::Payload => 1,
            ValueKind::GroupStart => 1 << 1,
            ValueKind::GroupEnd => 1 << 2,
            ValueKind::Stop => 1 << 3,
            ValueKind::Pause => 1 << 4,
            ValueKind::Resume => 1 << 5,
        }
    }
}

/// Set of value kinds observed at the heads of a group's queues.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct KindMask(u8);

impl KindMask {
    pub const EMPTY: KindMask = KindMask(0);

    #[inline]
    pub fn insert(&mut self, kind: ValueKind) {
        self.0 |= kind.bit();
    }

    #[inline]
    pub fn contains(self, kind: ValueKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// True if every observed kind is `kind` (and at least one was observed).
    #[inline]
    pub fn is_only(self, kind: ValueKind) -> bool {
        self.0 == kind.bit()
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for KindMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds = [
            ValueKind::Payload,
            ValueKind::GroupStart,
            ValueKind::GroupEnd,
            ValueKind::Stop,
            ValueKind::Pause,
            ValueKind::Resume,
        ];
        f.debug_set()
            .entries(kinds.iter().filter(|k| self.contains(**k)))
            .finish()
    }
}
