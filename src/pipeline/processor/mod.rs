//! Execution strategies for operations.
//!
//! - [`SimpleProcessor`] runs rounds inline on whichever thread delivered the
//!   input (the upstream sender), under the operation lock.
//! - [`ThreadedProcessor`] owns one worker thread that sleeps on a condition
//!   variable until input arrives or a command is issued.
//!
//! Both share the round loop in this module: ask the flow controller for a
//! verdict, deliver structural events, run `process`, and translate its
//! signals and the control verdicts into state changes and tags.

mod simple;
mod threaded;

pub use simple::SimpleProcessor;
pub use threaded::ThreadedProcessor;

use crate::error::Result;
use crate::pipeline::error::ProcessError;
use crate::pipeline::flow::Verdict;
use crate::pipeline::id::GroupId;
use crate::pipeline::operation::{OperationCore, OperationInner};
use crate::pipeline::process::ProcessContext;
use crate::pipeline::state::OperationState;
use crate::pipeline::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How an operation runs its rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// On the sender's thread.
    #[default]
    Inline,
    /// On a dedicated worker thread.
    Threaded,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Inline => write!(f, "inline"),
            ExecutionMode::Threaded => write!(f, "threaded"),
        }
    }
}

pub enum Processor {
    Simple(SimpleProcessor),
    Threaded(ThreadedProcessor),
}

impl Processor {
    pub fn new(mode: ExecutionMode) -> Self {
        match mode {
            ExecutionMode::Inline => Processor::Simple(SimpleProcessor),
            ExecutionMode::Threaded => Processor::Threaded(ThreadedProcessor::new()),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        match self {
            Processor::Simple(_) => ExecutionMode::Inline,
            Processor::Threaded(_) => ExecutionMode::Threaded,
        }
    }

    pub(crate) fn input_ready(&self, inner: &OperationInner) {
        match self {
            Processor::Simple(p) => p.input_ready(inner),
            Processor::Threaded(p) => p.wake(),
        }
    }

    pub(crate) fn start(&self, inner: &Arc<OperationInner>) -> Result<()> {
        match self {
            Processor::Simple(p) => {
                p.start(inner);
                Ok(())
            }
            Processor::Threaded(p) => p.start(inner),
        }
    }

    pub(crate) fn pause(&self, inner: &OperationInner) {
        match self {
            Processor::Simple(p) => p.pause(inner),
            Processor::Threaded(p) => p.wake(),
        }
    }

    pub(crate) fn stop(&self, inner: &OperationInner) {
        match self {
            Processor::Simple(p) => p.stop(inner),
            Processor::Threaded(p) => p.wake(),
        }
    }

    pub(crate) fn interrupt(&self, inner: &OperationInner) {
        match self {
            Processor::Simple(_) => {
                inner.state.set(OperationState::Stopped);
            }
            Processor::Threaded(p) => p.interrupt(inner),
        }
    }

    pub(crate) fn join(&self) {
        if let Processor::Threaded(p) = self {
            p.join();
        }
    }
}

/// Run rounds until the flow controller has nothing more to offer.
///
/// A suspended operation holds its data: only control tags are consumed
/// until it resumes.
pub(crate) fn drain(inner: &OperationInner, core: &mut OperationCore) {
    loop {
        if inner.is_interrupted() || !inner.state.get().is_active() {
            return;
        }
        let suspended = is_suspended(inner, core);
        let Some(flow) = core.flow.as_mut() else {
            return;
        };
        let step = if suspended {
            Ok(flow.next_control())
        } else {
            flow.next()
        };
        let verdict = match step {
            Ok(verdict) => verdict,
            Err(err) if err.is_interrupted() => return,
            Err(err) => {
                inner.fail(err.to_string());
                return;
            }
        };
        for event in flow.take_events() {
            core.logic.on_sync_event(event.kind, event.group);
        }

        match verdict {
            Verdict::NotReady => return,
            Verdict::Synchronized => {}
            Verdict::Processable(group) => {
                if !run_round(inner, core, group) {
                    return;
                }
            }
            Verdict::Finished => {
                finish(inner, core);
                return;
            }
            Verdict::Paused => {
                core.upstream_paused = true;
                if !suspended {
                    pause(inner, core);
                }
            }
            Verdict::Resumed => resume(inner, core),
        }
    }
}

/// Paused, or restarted from Paused but still waiting for upstream's Resume.
fn is_suspended(inner: &OperationInner, core: &OperationCore) -> bool {
    match inner.state.get() {
        OperationState::Paused => true,
        OperationState::Starting => core.resuming && core.upstream_paused,
        _ => false,
    }
}

/// One step of an operation without connected inputs. Returns true when the
/// caller should step again without waiting.
pub(crate) fn produce(inner: &OperationInner, core: &mut OperationCore) -> bool {
    match inner.state.get() {
        OperationState::Starting => {
            enter_running(inner, core);
            true
        }
        OperationState::Running => run_round(inner, core, GroupId::DEFAULT),
        OperationState::Pausing => {
            pause(inner, core);
            false
        }
        OperationState::Stopping => {
            finish(inner, core);
            false
        }
        _ => false,
    }
}

/// Leave Starting. An operation that paused itself (a producer, or a hook
/// raising Paused) resumes at once and replays its flow state; one paused by
/// upstream waits for the Resume tag.
pub(crate) fn enter_running(inner: &OperationInner, core: &mut OperationCore) {
    if inner.state.get() != OperationState::Starting {
        return;
    }
    if !core.resuming {
        inner.advance(OperationState::Running);
    } else if core.flow.is_none() || !core.upstream_paused {
        resume(inner, core);
    }
}

/// Run `process` once. Returns false when the round ended the loop.
fn run_round(inner: &OperationInner, core: &mut OperationCore, group: GroupId) -> bool {
    let result = {
        let mut ctx = ProcessContext::new(&inner.name, &inner.inputs, &inner.outputs, group);
        core.logic.process(&mut ctx)
    };
    match result {
        Ok(()) => true,
        Err(ProcessError::Finished) => {
            finish(inner, core);
            false
        }
        Err(ProcessError::Paused) => {
            pause(inner, core);
            false
        }
        Err(ProcessError::Interrupted) => false,
        Err(ProcessError::Failed(message)) => {
            inner.fail(message);
            false
        }
    }
}

/// Orderly end: hook, Stop on every output, Stopped.
pub(crate) fn finish(inner: &OperationInner, core: &mut OperationCore) {
    if inner.is_interrupted() {
        return;
    }
    inner.advance(OperationState::Stopping);
    {
        let mut ctx = control_context(inner);
        core.logic.on_stopped(&mut ctx);
    }
    if broadcast(inner, || Value::Stop).is_err() {
        return;
    }
    core.resuming = false;
    core.upstream_paused = false;
    inner.advance(OperationState::Stopped);
    tracing::info!("Operation '{}' stopped", inner.name);
}

/// Orderly suspension: hook, Pause on every output, Paused.
pub(crate) fn pause(inner: &OperationInner, core: &mut OperationCore) {
    if inner.is_interrupted() {
        return;
    }
    inner.advance(OperationState::Pausing);
    {
        let mut ctx = control_context(inner);
        core.logic.on_paused(&mut ctx);
    }
    if broadcast(inner, || Value::Pause).is_err() {
        return;
    }
    inner.advance(OperationState::Paused);
    tracing::info!("Operation '{}' paused", inner.name);
}

/// Resumption: hook, Resume with the captured flow state, Running.
pub(crate) fn resume(inner: &OperationInner, core: &mut OperationCore) {
    if inner.is_interrupted() {
        return;
    }
    {
        let mut ctx = control_context(inner);
        core.logic.on_resumed(&mut ctx);
    }
    for output in &inner.outputs {
        if output.emit_resume().is_err() {
            return;
        }
    }
    core.resuming = false;
    core.upstream_paused = false;
    inner.advance(OperationState::Running);
    tracing::info!("Operation '{}' resumed", inner.name);
}

fn control_context(inner: &OperationInner) -> ProcessContext<'_> {
    ProcessContext::new(&inner.name, &inner.inputs, &inner.outputs, GroupId::DEFAULT)
}

fn broadcast(inner: &OperationInner, value: impl Fn() -> Value) -> Result<()> {
    for output in &inner.outputs {
        output.emit(value())?;
    }
    Ok(())
}
