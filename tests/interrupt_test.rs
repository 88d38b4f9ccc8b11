//! Interrupt must unblock every wait an operation can be parked on

mod common;

use common::builders::RecorderBuilder;
use common::{wait_until, WAIT};
use pipegraph_rs::pipeline::nodes::CounterSource;
use pipegraph_rs::pipeline::{InputSocket, OutputSocket, Value, ValueKind};
use pipegraph_rs::{connect, ExecutionMode, Operation, OperationState};
use serial_test::serial;
use std::time::{Duration, Instant};

const PROMPT: Duration = Duration::from_secs(1);

#[test]
#[serial]
fn test_interrupt_wakes_idle_worker() {
    let feed = OutputSocket::new("feed");
    let (recorder, recording) = RecorderBuilder::new()
        .mode(ExecutionMode::Threaded)
        .build();
    connect(&feed, &recorder.inputs()[0]).unwrap();

    recorder.check(true).unwrap();
    recorder.start().unwrap();
    assert!(recorder.wait_for_state(OperationState::Running, WAIT));

    let begin = Instant::now();
    recorder.interrupt();
    assert!(recorder.wait_for_state(OperationState::Stopped, PROMPT));
    recorder.join();
    assert!(begin.elapsed() < PROMPT);
    assert!(recording.entries().is_empty());
}

#[test]
#[serial]
fn test_interrupt_aborts_blocked_emission() {
    let source = Operation::new(CounterSource::with_range(1, 1000), ExecutionMode::Threaded);
    // Nobody ever releases this queue, so the source blocks once it is full.
    let probe = InputSocket::with_capacity("probe", 3);
    connect(&source.outputs()[0], &probe).unwrap();

    source.check(true).unwrap();
    source.start().unwrap();
    assert!(wait_until(|| probe.pending() == 2));
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(source.state(), OperationState::Running);

    source.interrupt();
    assert!(source.wait_for_state(OperationState::Stopped, PROMPT));
    source.join();
    // In-flight data is discarded, no Stop tag is forwarded.
    assert_eq!(probe.pending(), 2);
    assert!((0..probe.pending()).all(|i| probe.peek(i).map(|v| v.kind()) == Some(ValueKind::Payload)));
}

#[test]
#[serial]
fn test_interrupt_inline_operation() {
    let feed = OutputSocket::new("feed");
    let (recorder, _recording) = RecorderBuilder::new().build();
    connect(&feed, &recorder.inputs()[0]).unwrap();

    recorder.check(true).unwrap();
    recorder.start().unwrap();
    assert_eq!(recorder.state(), OperationState::Running);

    let events = recorder.subscribe();
    recorder.interrupt();
    assert_eq!(recorder.state(), OperationState::Stopped);
    let transitions = common::drain_transitions(&events);
    assert_eq!(
        transitions,
        vec![
            (OperationState::Running, OperationState::Interrupted),
            (OperationState::Interrupted, OperationState::Stopped),
        ]
    );
}

#[test]
#[serial]
fn test_restart_after_interrupt_requires_check() {
    let feed = OutputSocket::new("feed");
    let (recorder, recording) = RecorderBuilder::new()
        .mode(ExecutionMode::Threaded)
        .build();
    connect(&feed, &recorder.inputs()[0]).unwrap();

    recorder.check(true).unwrap();
    recorder.start().unwrap();
    recorder.interrupt();
    assert!(recorder.wait_for_state(OperationState::Stopped, WAIT));
    assert!(recorder.start().is_err());

    recorder.check(true).unwrap();
    recorder.start().unwrap();
    assert!(recorder.wait_for_state(OperationState::Running, WAIT));

    feed.emit(Value::payload(7i64)).unwrap();
    assert!(wait_until(|| recording.values_of(0.into()) == vec![7]));

    // An orderly stop waits for the Stop tag from upstream.
    recorder.stop().unwrap();
    assert_eq!(recorder.state(), OperationState::Stopping);
    feed.emit(Value::Stop).unwrap();
    assert!(recorder.wait_for_state(OperationState::Stopped, WAIT));
    recorder.join();
}
