//! Pipeline execution engine.
//!
//! Operations exchange [`Value`]s through bounded socket queues. Each
//! operation owns a [`Processor`] (inline or threaded) that drives a
//! [`FlowController`] over its inputs and calls the user [`Process`] hook
//! whenever a synchronized round is ready.
//!
//! # Architecture
//!
//! ```text
//! [Operation A] out ──► in [Operation B] out ──► in [Operation C]
//!       │                      │                       │
//!   Processor              Processor               Processor
//!  (threaded)               (inline)               (threaded)
//! ```
//!
//! Operations can be grouped in a [`Compound`], whose state is aggregated from
//! its children and which can itself be nested in another compound.
//!
//! # Design
//!
//! - **Backpressure** — queues are bounded; a blocked `emit` waits on the
//!   receiver releasing its head, and can be aborted by `interrupt()`.
//! - **Group synchronization** — inputs in the same group are consumed in
//!   lockstep; nested groups follow GroupStart/GroupEnd annotations.
//! - **Control tags** — Stop, Pause and Resume travel in-band behind data.

pub mod compound;
pub mod error;
pub mod flow;
pub mod id;
pub mod nodes;
pub mod operation;
pub mod options;
pub mod process;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod socket;
pub mod state;
pub(crate) mod sync;
pub mod value;

pub use compound::{Compound, Schedulable};
pub use error::{ProcessError, ProcessResult};
pub use flow::{FlowController, Verdict};
pub use id::{GroupId, OperationId};
pub use operation::{Operation, OperationSettings, QUEUE_CAPACITY_OPTION};
pub use options::{ConfigValue, OptionTable, WriteProtection};
pub use process::{GroupRelation, Process, ProcessContext, SyncEvent, SyncEventKind};
pub use processor::{ExecutionMode, Processor};
pub use queue::{SocketQueue, DEFAULT_QUEUE_CAPACITY, MIN_QUEUE_CAPACITY};
pub use registry::{OperationRegistry, OperationSpec};
pub use socket::{
    connect, disconnect, disconnect_output, InputSocket, OutputFlowState, OutputSocket,
    SocketDescriptor, SocketDirection,
};
pub use state::{OperationEvent, OperationState};
pub use value::{KindMask, Payload, Value, ValueKind};
