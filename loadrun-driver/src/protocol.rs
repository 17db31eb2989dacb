//! Host driver wire protocol
//!
//! stdout is the protocol channel: one JSON document per line. Progress
//! lines stream while the run is active and the outcome (or a failure
//! report) is the final line. Logs go to stderr so stdout stays machine
//! readable.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::debug;

use crate::runner::LoadRunner;
use loadrun_core::measure::MeasureInput;
use loadrun_core::metrics::{MeasureOutcome, Metric, supported_metrics};

/// Exit code reserved for measurements ended by cancellation.
pub const CANCEL_EXIT_CODE: i32 = 3;

/// Cadence of progress lines, independent of the run-status poll interval.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ProgressLine {
    progress: u8,
}

#[derive(Debug, Serialize)]
struct DescribeLine {
    metrics: BTreeMap<String, Metric>,
}

#[derive(Debug, Serialize)]
struct FailureLine<'a> {
    status: &'a str,
    message: &'a str,
}

/// Read the whole measurement input document from stdin.
pub fn read_input() -> Result<MeasureInput> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read measurement input from stdin")?;
    serde_json::from_str(&buffer).context("malformed measurement input")
}

/// Advertise the metrics this driver can produce.
pub fn emit_describe() -> Result<()> {
    print_line(&DescribeLine {
        metrics: supported_metrics(),
    })
}

/// Report the final outcome of a successful cycle.
pub fn emit_result(outcome: &MeasureOutcome) -> Result<()> {
    print_line(outcome)
}

/// Report a failed measurement.
///
/// Used on the cancellation path during shutdown, so it swallows its own
/// write errors.
pub fn emit_failure(message: &str) {
    let _ = print_line(&FailureLine {
        status: "failed",
        message,
    });
}

fn print_line(value: &impl Serialize) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value).context("failed to serialize protocol line")?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;
    Ok(())
}

/// Report progress to the host at a fixed cadence until aborted.
pub fn spawn_progress_reporter(
    runner: Arc<LoadRunner>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        // the first tick fires immediately; nothing to report yet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let progress = runner.progress();
            debug!(progress, "reporting progress");
            let _ = print_line(&ProgressLine { progress });
        }
    })
}
