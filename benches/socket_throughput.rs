//! Benchmarks for value throughput through sockets and operations
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pipegraph_rs::pipeline::nodes::{CounterSource, SumSink};
use pipegraph_rs::pipeline::{InputSocket, OutputSocket, SocketQueue, Value};
use pipegraph_rs::{connect, ExecutionMode, Operation, OperationState};
use std::time::Duration;

fn bench_queue_push_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_push_release");

    for capacity in [3usize, 16, 256].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            capacity,
            |b, &capacity| {
                let mut queue = SocketQueue::new(capacity);
                b.iter(|| {
                    let _ = queue.try_push(Value::payload(black_box(42i64)));
                    black_box(queue.release());
                });
            },
        );
    }

    group.finish();
}

fn bench_emit_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit_fan_out");

    for receivers in [1usize, 4, 16].iter() {
        group.throughput(Throughput::Elements(*receivers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(receivers),
            receivers,
            |b, &receivers| {
                let output = OutputSocket::new("out");
                let inputs: Vec<_> = (0..receivers)
                    .map(|i| InputSocket::with_capacity(format!("in{}", i), 4))
                    .collect();
                for input in &inputs {
                    connect(&output, input).unwrap();
                }
                b.iter(|| {
                    output.emit(Value::payload(black_box(7i64))).unwrap();
                    for input in &inputs {
                        input.release();
                    }
                });
            },
        );
    }

    group.finish();
}

fn run_sum_graph(count: i64, sink_mode: ExecutionMode) -> i64 {
    let source = Operation::new(CounterSource::with_range(1, count), ExecutionMode::Threaded);
    let sum = SumSink::new();
    let total = sum.handle();
    let sink = Operation::new(sum, sink_mode);
    connect(&source.outputs()[0], &sink.inputs()[0]).unwrap();

    sink.check(true).unwrap();
    source.check(true).unwrap();
    sink.start().unwrap();
    source.start().unwrap();
    sink.wait_for_state(OperationState::Stopped, Duration::from_secs(30));
    source.join();
    sink.join();
    total.total()
}

fn bench_graph_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_throughput");
    group.sample_size(20);

    const COUNT: i64 = 10_000;
    group.throughput(Throughput::Elements(COUNT as u64));
    for mode in [ExecutionMode::Inline, ExecutionMode::Threaded] {
        group.bench_function(BenchmarkId::new("source_to_sum", mode), |b| {
            b.iter(|| black_box(run_sum_graph(COUNT, mode)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_queue_push_release,
    bench_emit_fan_out,
    bench_graph_throughput
);
criterion_main!(benches);
