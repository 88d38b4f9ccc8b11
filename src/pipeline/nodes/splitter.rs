//! Splitter — turns every integer `n` into a nested group of `n` pieces.

use crate::pipeline::error::{ProcessError, ProcessResult};
use crate::pipeline::process::{Process, ProcessContext};
use crate::pipeline::socket::SocketDescriptor;

static SOCKETS: &[SocketDescriptor] = &[
    SocketDescriptor::input("in"),
    SocketDescriptor::output("out"),
];

/// For each input `n` emits GroupStart, the pieces `1..=n` and GroupEnd, so
/// downstream consumers see one nested group per input object.
#[derive(Debug, Default)]
pub struct Splitter {
    groups_emitted: u64,
}

impl Splitter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Process for Splitter {
    fn name(&self) -> &str {
        "splitter"
    }

    fn sockets(&self) -> &[SocketDescriptor] {
        SOCKETS
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> ProcessResult {
        let n = ctx
            .input_as::<i64>(0)
            .ok_or_else(|| ProcessError::failed("splitter expects i64 payloads"))?;
        ctx.start_many(0)?;
        for piece in 1..=n {
            ctx.emit_payload(0, piece)?;
        }
        ctx.end_many(0)?;
        self.groups_emitted += 1;
        Ok(())
    }

    fn check(&mut self, reset: bool) -> Result<(), String> {
        if reset {
            self.groups_emitted = 0;
        }
        Ok(())
    }
}
