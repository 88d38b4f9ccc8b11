use super::{drain, enter_running, produce};
use crate::error::Result;
use crate::pipeline::operation::OperationInner;
use crate::pipeline::state::OperationState;
use crate::pipeline::sync::{lock, wait};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

#[derive(Debug, Default)]
struct WorkerSignal {
    /// Input arrived or a command was issued since the worker last looked.
    pending: bool,
    /// A worker thread is inside its loop.
    running: bool,
}

/// Execution on one dedicated worker thread per operation.
///
/// The worker decides to exit while holding the signal lock, so a `start`
/// racing with a stopping worker either finds it still running and wakes it,
/// or finds it gone and spawns a new one.
#[derive(Debug, Default)]
pub struct ThreadedProcessor {
    signal: Mutex<WorkerSignal>,
    wake: Condvar,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn wake(&self) {
        let mut signal = lock(&self.signal);
        signal.pending = true;
        self.wake.notify_all();
    }

    pub(crate) fn start(&self, inner: &Arc<OperationInner>) -> Result<()> {
        let mut signal = lock(&self.signal);
        signal.pending = true;
        if signal.running {
            self.wake.notify_all();
            return Ok(());
        }

        let mut handle = lock(&self.handle);
        if let Some(previous) = handle.take() {
            if previous.join().is_err() {
                tracing::warn!("Previous worker of '{}' panicked", inner.name);
            }
        }
        let worker = inner.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("op-{}", inner.name))
            .spawn(move || run_worker(worker))?;
        *handle = Some(spawned);
        signal.running = true;
        Ok(())
    }

    pub(crate) fn interrupt(&self, inner: &OperationInner) {
        let mut signal = lock(&self.signal);
        if !signal.running {
            inner.state.set(OperationState::Stopped);
        }
        signal.pending = true;
        self.wake.notify_all();
    }

    /// Wait for the worker thread to exit.
    pub(crate) fn join(&self) {
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("Worker thread panicked");
            }
        }
    }
}

fn run_worker(inner: Arc<OperationInner>) {
    let crate::pipeline::processor::Processor::Threaded(processor) = &inner.processor else {
        return;
    };
    tracing::info!("Worker for '{}' started", inner.name);

    loop {
        let keep_going = if inner.is_interrupted() {
            false
        } else {
            let mut core = lock(&inner.core);
            if core.flow.is_none() {
                produce(&inner, &mut core)
            } else {
                enter_running(&inner, &mut core);
                drain(&inner, &mut core);
                false
            }
        };

        let mut signal = lock(&processor.signal);
        if inner.is_interrupted() || inner.state.get() == OperationState::Stopped {
            signal.running = false;
            inner.state.set(OperationState::Stopped);
            break;
        }
        if keep_going {
            continue;
        }
        while !signal.pending && !inner.is_interrupted() {
            signal = wait(&processor.wake, signal);
        }
        signal.pending = false;
    }

    tracing::info!("Worker for '{}' exited", inner.name);
}
