//! Load-run orchestration
//!
//! The state machine behind one measurement cycle: check whether the job
//! already has a run in progress, start one if not, then poll at a fixed
//! interval until the run ends and report how long it took.
//!
//! Transient API failures are absorbed on the spot by a fixed-delay retry
//! with no attempt bound; they never fail the measurement. Cancellation
//! arrives out-of-band through a [`CancelToken`] and interrupts any wait,
//! including retry backoff.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use loadrun_client::{CiServer, Result as ClientResult};
use loadrun_core::job::{JobHandle, RunRef};

/// Errors the orchestrator can return.
///
/// Connectivity problems never appear here; they are retried away inside
/// the state machine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    /// The measurement was cancelled from outside before the run ended
    #[error("load run cancelled")]
    Cancelled,
}

/// Cooperative cancellation flag shared between the orchestrator and the
/// signal path.
///
/// Cheap to clone; all clones observe the same flag.
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the flag. Idempotent.
    pub fn cancel(&self) {
        // send_replace stores the value even when nobody is waiting yet
        self.tx.send_replace(true);
    }

    /// Completes once the flag is raised, immediately if it already is.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives one run of the configured CI job and measures its duration.
pub struct LoadRunner {
    client: Arc<dyn CiServer>,
    job_name: String,
    retry_timeout: Duration,
    poll_interval: Duration,
    /// Coarse completion estimate, 0-100, for external reporting only
    progress: AtomicU8,
    /// Run started by this process, if any. A pre-existing run is observed
    /// but never owned, so it is never stopped from here.
    active_run: Mutex<Option<RunRef>>,
    cancel: CancelToken,
}

impl LoadRunner {
    /// Creates a new runner for the configured job
    pub fn new(config: &Config, client: Arc<dyn CiServer>, cancel: CancelToken) -> Self {
        Self {
            client,
            job_name: config.job.clone(),
            retry_timeout: config.retry_timeout,
            poll_interval: config.poll_interval,
            progress: AtomicU8::new(0),
            active_run: Mutex::new(None),
            cancel,
        }
    }

    /// Current progress estimate, 0-100.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }

    /// Run the job once and return the elapsed wall-clock time.
    ///
    /// If a run is already in progress it is adopted instead of starting a
    /// second one; elapsed time then counts from the moment of detection,
    /// which undercounts the true run duration.
    pub async fn run(&self, expected: Duration) -> Result<Duration, RunError> {
        self.progress.store(0, Ordering::Relaxed);

        let job = self
            .retry("job lookup", || self.client.get_job(&self.job_name))
            .await?;
        info!(job = %job.name, "resolved job");

        let start = if self.check_running(&job).await? {
            info!("run already in progress, attaching");
            Instant::now()
        } else {
            let start = self.start_run(&job).await?;
            // Give the server a moment before the first status poll.
            if self.wait(self.poll_interval).await {
                return Err(RunError::Cancelled);
            }
            start
        };

        loop {
            self.progress
                .store(progress_pct(start.elapsed(), expected), Ordering::Relaxed);

            if !self.check_running(&job).await? {
                break;
            }

            debug!("run still active, next check in {:?}", self.poll_interval);
            if self.wait(self.poll_interval).await {
                return Err(RunError::Cancelled);
            }
        }

        // The run ended on its own; nothing left to stop.
        self.active_run.lock().unwrap().take();

        let elapsed = start.elapsed();
        info!("run finished after {:?}", elapsed);
        Ok(elapsed)
    }

    /// Cancel the measurement.
    ///
    /// Interrupts any wait inside [`run`](Self::run), then stops the active
    /// run if this process owns one. Taking the reference out of the slot
    /// means at most one stop request is ever issued per run.
    pub async fn cancel(&self) {
        self.cancel.cancel();

        let owned = self.active_run.lock().unwrap().take();
        if let Some(run) = owned {
            info!("stopping run we started");
            self.client.stop(&run).await;
        }
    }

    /// Start a new run, absorbing transient failures.
    ///
    /// A failed start request may still have started a run on the server.
    /// After each failure the job status is re-checked instead of blindly
    /// re-invoking, so the job is never started twice. A run detected that
    /// way is adopted without ownership.
    async fn start_run(&self, job: &JobHandle) -> Result<Instant, RunError> {
        loop {
            match self.client.invoke(job).await {
                Ok(run) => {
                    info!("run started");
                    *self.active_run.lock().unwrap() = Some(run);
                    return Ok(Instant::now());
                }
                Err(e) => {
                    warn!(
                        "start request failed: {}, checking status in {:?}",
                        e, self.retry_timeout
                    );
                    if self.wait(self.retry_timeout).await {
                        return Err(RunError::Cancelled);
                    }
                    if self.check_running(job).await? {
                        info!("run is active after failed start request, attaching");
                        return Ok(Instant::now());
                    }
                }
            }
        }
    }

    async fn check_running(&self, job: &JobHandle) -> Result<bool, RunError> {
        self.retry("status check", || self.client.is_running(job)).await
    }

    /// Fixed-delay retry with no attempt bound.
    ///
    /// Connectivity failures are absorbed here and never surface to the
    /// caller; only cancellation ends the loop early.
    async fn retry<T, F, Fut>(&self, what: &str, op: F) -> Result<T, RunError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("{} failed: {}, retrying in {:?}", what, e, self.retry_timeout);
                    if self.wait(self.retry_timeout).await {
                        return Err(RunError::Cancelled);
                    }
                }
            }
        }
    }

    /// Sleep that cancellation can interrupt. Returns true if cancelled.
    async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = time::sleep(duration) => false,
        }
    }
}

/// Progress as whole multiples of the expected duration, scaled to percent.
///
/// Truncation happens before scaling: the value reads 0 until one full
/// expected duration has elapsed, then jumps straight to the cap.
fn progress_pct(elapsed: Duration, expected: Duration) -> u8 {
    if expected.is_zero() {
        return 100;
    }
    let whole = (elapsed.as_secs_f64() / expected.as_secs_f64()) as u64;
    whole.saturating_mul(100).min(100) as u8
}
