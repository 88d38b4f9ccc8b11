//! Aggregated compound state driven by real operations

mod common;

use common::builders::SumGraph;
use common::{drain_transitions, next_error, wait_until, WAIT};
use pipegraph_rs::pipeline::nodes::{CounterSource, SumSink};
use pipegraph_rs::{Compound, EngineError, ExecutionMode, Operation, OperationState};
use serial_test::serial;

fn compound_of(graph: &SumGraph) -> Compound {
    let compound = Compound::new("sum");
    compound.add(graph.sink.clone()).unwrap();
    compound.add(graph.source.clone()).unwrap();
    compound
}

#[test]
#[serial]
fn test_compound_reaches_running_then_stopped() {
    let graph = SumGraph::new(1, 5, ExecutionMode::Inline);
    let compound = compound_of(&graph);
    let events = compound.subscribe();

    compound.check(true).unwrap();
    compound.start().unwrap();
    assert!(compound.wait_for_state(OperationState::Stopped, WAIT));
    compound.join();

    let transitions = drain_transitions(&events);
    assert_eq!(
        transitions,
        vec![
            (OperationState::Stopped, OperationState::Starting),
            (OperationState::Starting, OperationState::Running),
            (OperationState::Running, OperationState::Stopping),
            (OperationState::Stopping, OperationState::Stopped),
        ]
    );
    assert_eq!(graph.total.total(), 15);
}

#[test]
#[serial]
fn test_check_collects_every_child_failure() {
    let compound = Compound::new("broken");
    // Two sinks with nothing connected to their required inputs.
    compound
        .add(Operation::new(SumSink::new(), ExecutionMode::Inline))
        .unwrap();
    compound
        .add(Operation::new(SumSink::new(), ExecutionMode::Inline))
        .unwrap();
    compound
        .add(Operation::new(CounterSource::new(), ExecutionMode::Threaded))
        .unwrap();

    match compound.check(true) {
        Err(EngineError::CheckAll(errors)) => assert_eq!(errors.len(), 2),
        other => panic!("expected aggregated check failure, got {:?}", other),
    }
    assert_eq!(compound.state(), OperationState::Stopped);
}

#[test]
#[serial]
fn test_children_cannot_be_added_while_running() {
    let graph = SumGraph::new(1, 1000, ExecutionMode::Inline).interval_ms(5);
    let compound = compound_of(&graph);
    compound.check(true).unwrap();
    compound.start().unwrap();
    assert!(compound.wait_for_state(OperationState::Running, WAIT));

    let late = Operation::new(CounterSource::new(), ExecutionMode::Threaded);
    assert!(matches!(
        compound.add(late),
        Err(EngineError::InvalidState { .. })
    ));

    compound.interrupt();
    assert!(compound.wait_for_state(OperationState::Stopped, WAIT));
    compound.join();
}

#[test]
#[serial]
fn test_compound_pause_and_resume() {
    let graph = SumGraph::new(1, 60, ExecutionMode::Inline).interval_ms(2);
    let compound = compound_of(&graph);
    compound.check(true).unwrap();
    compound.start().unwrap();
    assert!(wait_until(|| graph.total.count() >= 3));

    compound.pause().unwrap();
    assert!(compound.wait_for_state(OperationState::Paused, WAIT));
    assert_eq!(graph.source.state(), OperationState::Paused);
    assert_eq!(graph.sink.state(), OperationState::Paused);

    let seen = graph.total.count();
    std::thread::sleep(std::time::Duration::from_millis(30));
    assert_eq!(graph.total.count(), seen);

    compound.start().unwrap();
    assert!(compound.wait_for_state(OperationState::Stopped, WAIT));
    compound.join();

    let expected: Vec<i64> = (1..=60).collect();
    assert_eq!(graph.total.values(), expected);
}

#[test]
#[serial]
fn test_compound_stop_propagates_stop_tag() {
    let graph = SumGraph::new(1, 100_000, ExecutionMode::Inline).interval_ms(1);
    let compound = compound_of(&graph);
    compound.check(true).unwrap();
    compound.start().unwrap();
    assert!(wait_until(|| graph.total.count() >= 2));

    compound.stop().unwrap();
    assert!(compound.wait_for_state(OperationState::Stopped, WAIT));
    compound.join();
    assert!(graph.total.saw_stop());
    assert!(graph.total.count() < 100_000);
}

#[test]
#[serial]
fn test_child_fault_interrupts_the_compound() {
    let graph = SumGraph::new(1, 1000, ExecutionMode::Inline).interval_ms(1);
    // A sink that fails on its first payload.
    let faulty = Operation::new(
        pipegraph_rs::pipeline::nodes::RecorderSink::new(),
        ExecutionMode::Inline,
    );
    faulty
        .set_option("fail_on", pipegraph_rs::pipeline::ConfigValue::Int(1))
        .unwrap();
    pipegraph_rs::connect(&graph.source.outputs()[0], &faulty.inputs()[0]).unwrap();

    let compound = compound_of(&graph);
    compound.add(faulty.clone()).unwrap();
    let events = compound.subscribe();
    compound.check(true).unwrap();
    compound.start().unwrap();

    let message = next_error(&events).expect("compound forwards the child fault");
    assert!(message.contains("recorder_sink"));
    assert!(message.contains("refusing value 1"));

    assert!(compound.wait_for_state(OperationState::Stopped, WAIT));
    compound.join();
    assert_eq!(faulty.state(), OperationState::Stopped);
    assert_eq!(graph.source.state(), OperationState::Stopped);
}
