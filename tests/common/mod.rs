//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use pipegraph_rs::pipeline::OperationEvent;
use pipegraph_rs::OperationState;
use crossbeam_channel::Receiver;
use std::time::{Duration, Instant};

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds or `WAIT` elapses
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Collect the state transitions received so far, as `(from, to)` pairs
pub fn drain_transitions(events: &Receiver<OperationEvent>) -> Vec<(OperationState, OperationState)> {
    events
        .try_iter()
        .filter_map(|e| match e {
            OperationEvent::StateChanged { from, to, .. } => Some((from, to)),
            OperationEvent::Error { .. } => None,
        })
        .collect()
}

/// Wait for the first error event and return its message
pub fn next_error(events: &Receiver<OperationEvent>) -> Option<String> {
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        match events.recv_timeout(remaining) {
            Ok(OperationEvent::Error { message, .. }) => return Some(message),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}
