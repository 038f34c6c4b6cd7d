//! Periodic background reclamation for Latchkey.
//!
//! A session store accumulates entries that nobody will ask for again:
//! users close the tab, tokens leak out of date. Something has to walk the
//! store every now and then and close what is left. This crate is that
//! something, kept apart from the store so it can be started, observed and
//! stopped on its own.
//!
//! # Loop shape
//!
//! ```text
//! spawn ──→ sleep(interval + jitter) ──→ sweep() ──→ sleep(interval) ──→ sweep() ...
//!                     │                                      │
//!                     └──────────── shutdown signal ─────────┴──→ stopped
//! ```
//!
//! The loop is an explicit task with a shutdown channel rather than a
//! function that sleeps and then calls itself. Each pass runs on Tokio's
//! blocking pool, because sweeping takes a synchronous lock and runs user
//! callbacks that may block.
//!
//! The task only holds a [`Weak`] reference to its target. When the last
//! strong reference to the store goes away the loop notices on its next
//! wake-up and exits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Sweep target
// ---------------------------------------------------------------------------

/// Something that can run one reclamation pass.
///
/// Implemented by session stores. The pass is synchronous: it takes the
/// store lock, collects garbage, releases the lock and closes what it
/// collected.
pub trait Sweep: Send + Sync + 'static {
    /// Runs a single pass and returns how many entries were reclaimed.
    fn sweep(&self) -> usize;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the reclamation loop.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Pause between passes. `None` disables the loop entirely; the owner
    /// is then expected to sweep manually.
    pub interval: Option<Duration>,
    /// Random delay (0..max) added before the *first* pass so that stores
    /// created at the same instant don't sweep in lockstep.
    pub initial_jitter: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Some(Duration::from_secs(60)),
            initial_jitter: Duration::ZERO,
        }
    }
}

impl SweepConfig {
    /// Sweep every `interval`, no jitter.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval: Some(interval),
            ..Default::default()
        }
    }

    /// No background loop.
    pub fn disabled() -> Self {
        Self {
            interval: None,
            ..Default::default()
        }
    }

    /// Builds a config from a number of seconds as found in property files.
    ///
    /// Negative values (and NaN) disable the loop. `0` is allowed and means
    /// "sweep back to back", which is only sensible in tests.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() || secs < 0.0 {
            return Self::disabled();
        }
        match Duration::try_from_secs_f64(secs) {
            Ok(interval) => Self::every(interval),
            Err(_) => {
                warn!(secs, "sweep interval out of range, disabling the loop");
                Self::disabled()
            }
        }
    }

    /// Sets the first-pass jitter.
    pub fn with_initial_jitter(mut self, jitter: Duration) -> Self {
        self.initial_jitter = jitter;
        self
    }

    /// Whether a background loop will be started.
    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    fn first_delay(&self, interval: Duration) -> Duration {
        let max_us = self.initial_jitter.as_micros() as u64;
        if max_us == 0 {
            return interval;
        }
        interval + Duration::from_micros(rand::rng().random_range(0..max_us))
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Counters updated by the loop after every pass.
#[derive(Debug, Default)]
struct SweepCounters {
    passes: AtomicU64,
    reclaimed: AtomicU64,
    overruns: AtomicU64,
    last_pass_us: AtomicU64,
}

impl SweepCounters {
    fn record(&self, reclaimed: usize, elapsed: Duration, overrun: bool) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.reclaimed.fetch_add(reclaimed as u64, Ordering::Relaxed);
        if overrun {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        self.last_pass_us
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SweepStats {
        SweepStats {
            passes: self.passes.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            last_pass: Duration::from_micros(self.last_pass_us.load(Ordering::Relaxed)),
        }
    }
}

/// Point-in-time copy of the loop's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepStats {
    /// Completed passes.
    pub passes: u64,
    /// Entries reclaimed across all passes.
    pub reclaimed: u64,
    /// Passes that took longer than the interval.
    pub overruns: u64,
    /// Wall-clock duration of the most recent pass.
    pub last_pass: Duration,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned when stopping the loop.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    /// `shutdown` was already called on this handle.
    #[error("sweeper already stopped")]
    AlreadyStopped,

    /// The loop task panicked or was aborted.
    #[error("sweeper task failed: {0}")]
    TaskFailed(String),
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owner's handle to a running reclamation loop.
///
/// Dropping the handle signals the loop to stop but does not wait for it.
/// Use [`shutdown`](Self::shutdown) for a deterministic stop.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    counters: Arc<SweepCounters>,
    interval: Duration,
}

impl SweepHandle {
    /// Starts the loop on the current Tokio runtime.
    ///
    /// Returns `None` when the config disables the loop. Must be called
    /// from within a runtime.
    pub fn spawn<S: Sweep>(target: Weak<S>, config: SweepConfig) -> Option<Self> {
        let interval = config.interval?;
        let first_delay = config.first_delay(interval);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(SweepCounters::default());

        info!(
            interval_ms = interval.as_millis() as u64,
            first_delay_ms = first_delay.as_millis() as u64,
            "sweeper started"
        );

        let task = tokio::spawn(run_loop(
            target,
            interval,
            first_delay,
            shutdown_rx,
            Arc::clone(&counters),
        ));

        Some(Self {
            shutdown_tx,
            task: Some(task),
            counters,
            interval,
        })
    }

    /// Counters as of now.
    pub fn stats(&self) -> SweepStats {
        self.counters.snapshot()
    }

    /// The configured pause between passes.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the loop task has exited (target dropped, stopped, or
    /// panicked).
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Asks the loop to stop without waiting for it.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stops the loop and waits for the task to finish.
    ///
    /// A pass that is already running completes first.
    pub async fn shutdown(&mut self) -> Result<(), SweepError> {
        let task = self.task.take().ok_or(SweepError::AlreadyStopped)?;
        self.signal_shutdown();
        task.await.map_err(|e| SweepError::TaskFailed(e.to_string()))
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.signal_shutdown();
    }
}

async fn run_loop<S: Sweep>(
    target: Weak<S>,
    interval: Duration,
    first_delay: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    counters: Arc<SweepCounters>,
) {
    let mut delay = first_delay;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => {
                debug!("sweeper received shutdown signal");
                break;
            }
        }
        delay = interval;

        let Some(target) = target.upgrade() else {
            debug!("sweep target dropped");
            break;
        };

        let started = Instant::now();
        let reclaimed = match tokio::task::spawn_blocking(move || target.sweep()).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "sweep pass panicked");
                0
            }
        };
        let elapsed = started.elapsed();
        let overrun = !interval.is_zero() && elapsed > interval;

        if overrun {
            warn!(
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                interval_ms = interval.as_secs_f64() * 1000.0,
                "sweep pass took longer than its interval"
            );
        }
        counters.record(reclaimed, elapsed, overrun);
        debug!(reclaimed, elapsed_us = elapsed.as_micros() as u64, "sweep pass finished");
    }

    info!("sweeper stopped");
}
