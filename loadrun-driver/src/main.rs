//! Loadrun Driver
//!
//! Measurement driver that runs a load test as a Jenkins job on behalf of
//! an optimization loop and reports how long it took.
//!
//! Architecture:
//! - Configuration: YAML file plus environment overrides, token from a secret file
//! - Client: thin Jenkins API adapter (loadrun-client)
//! - Runner: the orchestration state machine (check, start, poll, stop)
//! - Protocol: stdin/stdout JSON exchange with the host driver
//!
//! One invocation is one measurement cycle: start the configured job unless
//! a run is already active, poll until the run ends, report the elapsed
//! time as the "time taken" metric. SIGINT/SIGTERM cancels the measurement,
//! stops the run if this process started it, and exits with the reserved
//! code 3. No state survives between invocations.

mod config;
mod protocol;
mod runner;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::runner::{CancelToken, LoadRunner, RunError};
use loadrun_client::JenkinsClient;
use loadrun_core::metrics::MeasureOutcome;

#[derive(Parser)]
#[command(name = "loadrun")]
#[command(version, about = "Jenkins load-test measurement driver", long_about = None)]
struct Cli {
    /// Print the supported metrics and exit
    #[arg(long)]
    describe: bool,

    /// Path to the driver configuration file
    #[arg(long, env = "LOADRUN_CONFIG", default_value = "./config.yaml")]
    config: PathBuf,

    /// Identifier of the application under measurement, passed by the host
    app_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout belongs to the protocol.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loadrun=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if cli.describe {
        return protocol::emit_describe();
    }

    let app_id = cli.app_id.context("no application id given")?;

    match measure(&cli.config, &app_id).await {
        Ok(outcome) => {
            protocol::emit_result(&outcome)?;
            Ok(())
        }
        Err(e) => {
            protocol::emit_failure(&format!("{:#}", e));
            Err(e)
        }
    }
}

/// One measurement cycle, minus the final result emission.
async fn measure(config_path: &Path, app_id: &str) -> Result<MeasureOutcome> {
    let input = protocol::read_input()?;
    let load = input
        .load_profile()
        .context("invalid control configuration in input: no load section")?;

    let config = Config::load(config_path)?;
    info!(job = %config.job, "measuring load run for {}", app_id);

    let client = Arc::new(JenkinsClient::new(&config.url, &config.user, &config.token));
    let runner = Arc::new(LoadRunner::new(&config, client, CancelToken::new()));

    let reporter =
        protocol::spawn_progress_reporter(Arc::clone(&runner), protocol::PROGRESS_INTERVAL);

    // Out-of-band cancellation: report the failed measurement first, then
    // stop the run if we own it, then leave with the reserved exit code.
    let run_result = tokio::select! {
        result = runner.run(load.total()) => result,
        signal = shutdown_signal() => {
            protocol::emit_failure(&format!("Exiting due to signal: {}", signal));
            runner.cancel().await;
            std::process::exit(protocol::CANCEL_EXIT_CODE);
        }
    };

    let elapsed = match run_result {
        Ok(elapsed) => elapsed,
        Err(RunError::Cancelled) => {
            protocol::emit_failure("measurement cancelled before the run completed");
            runner.cancel().await;
            std::process::exit(protocol::CANCEL_EXIT_CODE);
        }
    };

    reporter.abort();
    Ok(MeasureOutcome::time_taken(elapsed.as_secs_f64()))
}

async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        if let Ok(mut term) = signal(SignalKind::terminate()) {
            return tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            };
        }
    }

    let _ = tokio::signal::ctrl_c().await;
    "SIGINT"
}
