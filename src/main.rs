//! pipegraph demo runner
//!
//! Builds a two-operation graph (`counter_source → sum_sink`) inside a
//! compound, runs it to completion and logs the sum. Takes an optional path
//! to a TOML or JSON configuration file.

use anyhow::{bail, Context};
use pipegraph_rs::{
    config::EngineConfig,
    pipeline::{
        nodes::register_builtin, Compound, ConfigValue, ExecutionMode, OperationRegistry,
        OperationState,
    },
};
use std::path::Path;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const RUN_TIMEOUT: Duration = Duration::from_secs(30);

fn init_logging(config: &EngineConfig) -> Option<WorkerGuard> {
    let (file_layer, guard) = match &config.logging.file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "pipegraph.log".into());
            let appender =
                tracing_appender::rolling::never(dir.unwrap_or_else(|| Path::new(".")), file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    guard
}

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => EngineConfig::default(),
    };
    let _log_guard = init_logging(&config);

    tracing::info!("Starting pipegraph demo");

    let mut registry = OperationRegistry::new();
    register_builtin(&mut registry)?;

    let base = config.operation_spec();
    let mut source_spec = base.clone().with_option("end", config.demo.count);
    source_spec.settings.mode = ExecutionMode::Threaded;
    let source = registry.create("counter_source", &source_spec)?;
    let sink = registry.create("sum_sink", &base)?;

    let source_out = source
        .output("out")
        .context("counter_source has no 'out' socket")?;
    let sink_in = sink.input("in").context("sum_sink has no 'in' socket")?;
    pipegraph_rs::connect(&source_out, &sink_in)?;

    let graph = Compound::new("demo");
    graph.add(sink.clone())?;
    graph.add(source.clone())?;
    graph.check(true)?;
    graph.start()?;

    if !graph.wait_for_state(OperationState::Stopped, RUN_TIMEOUT) {
        graph.interrupt();
        graph.join();
        bail!("demo graph did not finish within {:?}", RUN_TIMEOUT);
    }
    graph.join();

    match sink.option("total") {
        Some(ConfigValue::Int(total)) => {
            tracing::info!("Sum of 1..={} is {}", config.demo.count, total)
        }
        other => tracing::warn!("sum_sink reported no total: {:?}", other),
    }

    tracing::info!("Shutting down...");
    Ok(())
}
