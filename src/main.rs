mod config;
mod coordinator;
mod error;
mod monitor;
mod probe;
mod shutdown;
mod signals;
mod worker;

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::{Args, ProbeKind, RunConfig};
use coordinator::Coordinator;
use monitor::{Display, RenderMode};
use probe::{CommandProbe, SysinfoProbe, UsageProbe};

/// A hung probe command must not keep the process alive after the run is over.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_probe(kind: ProbeKind) -> Arc<dyn UsageProbe> {
    match kind {
        ProbeKind::Command => Arc::new(CommandProbe::for_current_platform()),
        ProbeKind::Native => Arc::new(SysinfoProbe::new()),
    }
}

fn main() -> ExitCode {
    let config = RunConfig::from(Args::parse());
    init_tracing();

    println!("Starting CPU stress test with {} workers", config.workers);
    match config.minutes() {
        Some(minutes) => println!("Test will run for {} minutes", minutes),
        None => println!("Test will run until interrupted (press Ctrl+C to stop)"),
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let stdout = io::stdout();
    let mode = RenderMode::for_terminal(stdout.is_terminal());
    let coordinator = Coordinator::new(
        config.clone(),
        build_probe(config.probe),
        Display::new(stdout, mode),
    );

    let summary = runtime.block_on(coordinator.run(signals::interrupted()));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    info!(
        workers = summary.workers_finished,
        batches = summary.batches,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        reason = ?summary.reason,
        "run summary"
    );

    println!("CPU stress test completed");
    ExitCode::SUCCESS
}
