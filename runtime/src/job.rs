//! Background jobs with explicit shutdown.
//!
//! A [`PeriodicJob`] runs a [`Job`] on a fixed interval until its
//! [`Shutdown`] is triggered. A failed run is logged and the schedule carries
//! on; missed ticks are skipped rather than replayed in a burst.
//!
//! ```ignore
//! let shutdown = Shutdown::new();
//! let sweeper = PeriodicJob::spawn(Arc::new(OtpSweeper::new(store)), Duration::from_secs(120), shutdown.subscribe());
//!
//! shutdown.trigger();
//! let stats = sweeper.join().await;
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Unit of recurring background work.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Job name for logging
    fn name(&self) -> &str;

    /// Run one pass of the job.
    ///
    /// Must be idempotent: the supervisor may run it again after a failure
    /// or an overlapping earlier pass.
    ///
    /// # Errors
    ///
    /// Returns error if this pass failed; the supervisor logs it and retries
    /// on the next tick.
    async fn run_once(&self) -> anyhow::Result<()>;
}

/// Sending half of a shutdown signal.
///
/// Cloning is cheap and every clone triggers the same signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    sender: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create an untriggered signal
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Get a listener for this signal
    #[must_use]
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }

    /// Notify every listener. Triggering twice is a no-op.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    /// Whether the signal has fired
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of a shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    receiver: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolves once shutdown is triggered or every sender is gone.
    pub async fn triggered(&mut self) {
        while !*self.receiver.borrow_and_update() {
            if self.receiver.changed().await.is_err() {
                return;
            }
        }
    }

    /// Whether the signal has fired
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Run counters returned when a job stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Passes that completed successfully
    pub completed: u64,
    /// Passes that returned an error
    pub failed: u64,
}

/// Shortest interval a job is scheduled at
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running periodic job.
#[derive(Debug)]
pub struct PeriodicJob {
    name: String,
    handle: JoinHandle<JobStats>,
}

impl PeriodicJob {
    /// Spawn `job` on the current runtime.
    ///
    /// The first pass runs immediately, then once per `interval`. A zero
    /// interval is raised to [`MIN_INTERVAL`].
    #[must_use]
    pub fn spawn<J: Job>(job: Arc<J>, interval: Duration, mut shutdown: ShutdownListener) -> Self {
        let name = job.name().to_string();
        let interval = if interval.is_zero() {
            tracing::warn!(job = %name, min = ?MIN_INTERVAL, "Zero job interval raised to minimum");
            MIN_INTERVAL
        } else {
            interval
        };
        tracing::info!(job = %name, interval = ?interval, "Starting periodic job");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut stats = JobStats::default();

            loop {
                tokio::select! {
                    biased;
                    () = shutdown.triggered() => break,
                    _ = ticker.tick() => {
                        match job.run_once().await {
                            Ok(()) => stats.completed += 1,
                            Err(error) => {
                                stats.failed += 1;
                                tracing::warn!(job = %job.name(), error = %error, "Periodic job run failed");
                                metrics::counter!("runtime.jobs.failed", "job" => job.name().to_string()).increment(1);
                            }
                        }
                    }
                }
            }

            tracing::info!(
                job = %job.name(),
                completed = stats.completed,
                failed = stats.failed,
                "Periodic job stopped"
            );
            stats
        });

        Self { name, handle }
    }

    /// Job name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the job to stop after shutdown was triggered.
    ///
    /// A job whose task panicked reports empty stats.
    pub async fn join(self) -> JobStats {
        match self.handle.await {
            Ok(stats) => stats,
            Err(error) => {
                tracing::error!(job = %self.name, error = %error, "Periodic job task aborted");
                JobStats::default()
            }
        }
    }
}
