//! Integration tests for the reclamation loop.
//!
//! Uses `start_paused = true` so Tokio's clock auto-advances whenever the
//! runtime is idle: sleeping for a minute in a test returns immediately,
//! with every timer in between firing in order.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use latchkey_sweep::{Sweep, SweepConfig, SweepError, SweepHandle};

// =========================================================================
// Helpers
// =========================================================================

/// Counts passes and reports a fixed number of reclaimed entries.
#[derive(Default)]
struct CountingTarget {
    passes: AtomicUsize,
    per_pass: usize,
}

impl Sweep for CountingTarget {
    fn sweep(&self) -> usize {
        self.passes.fetch_add(1, Ordering::SeqCst);
        self.per_pass
    }
}

/// A pass that takes real time, for overrun detection.
struct SlowTarget;

impl Sweep for SlowTarget {
    fn sweep(&self) -> usize {
        std::thread::sleep(Duration::from_millis(20));
        0
    }
}

struct PanickingTarget;

impl Sweep for PanickingTarget {
    fn sweep(&self) -> usize {
        panic!("boom");
    }
}

async fn wait_for_passes(handle: &SweepHandle, passes: u64) {
    for _ in 0..1_000 {
        if handle.stats().passes >= passes {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("sweeper never reached {passes} passes");
}

// =========================================================================
// Spawning
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_spawn_disabled_config_returns_none() {
    let target = Arc::new(CountingTarget::default());

    let handle = SweepHandle::spawn(Arc::downgrade(&target), SweepConfig::disabled());

    assert!(handle.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_first_pass_waits_one_interval() {
    let target = Arc::new(CountingTarget::default());
    let handle = SweepHandle::spawn(
        Arc::downgrade(&target),
        SweepConfig::every(Duration::from_secs(5)),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(target.passes.load(Ordering::SeqCst), 0);

    wait_for_passes(&handle, 1).await;
    assert_eq!(target.passes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_passes_repeat_every_interval() {
    let target = Arc::new(CountingTarget {
        per_pass: 2,
        ..Default::default()
    });
    let handle = SweepHandle::spawn(
        Arc::downgrade(&target),
        SweepConfig::every(Duration::from_secs(1)),
    )
    .unwrap();

    wait_for_passes(&handle, 3).await;

    let stats = handle.stats();
    assert!(stats.passes >= 3);
    assert_eq!(stats.reclaimed, stats.passes * 2);
    assert_eq!(stats.overruns, 0);
    assert_eq!(handle.interval(), Duration::from_secs(1));
}

// =========================================================================
// Stopping
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_loop() {
    let target = Arc::new(CountingTarget::default());
    let mut handle = SweepHandle::spawn(
        Arc::downgrade(&target),
        SweepConfig::every(Duration::from_secs(1)),
    )
    .unwrap();
    wait_for_passes(&handle, 1).await;

    handle.shutdown().await.expect("clean shutdown");
    let passes = target.passes.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(handle.is_finished());
    assert_eq!(target.passes.load(Ordering::SeqCst), passes);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_twice_returns_already_stopped() {
    let target = Arc::new(CountingTarget::default());
    let mut handle = SweepHandle::spawn(
        Arc::downgrade(&target),
        SweepConfig::every(Duration::from_secs(1)),
    )
    .unwrap();

    handle.shutdown().await.unwrap();
    let second = handle.shutdown().await;

    assert!(matches!(second, Err(SweepError::AlreadyStopped)));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_target_ends_loop() {
    let target = Arc::new(CountingTarget::default());
    let handle = SweepHandle::spawn(
        Arc::downgrade(&target),
        SweepConfig::every(Duration::from_secs(1)),
    )
    .unwrap();

    drop(target);
    tokio::time::sleep(Duration::from_secs(2)).await;
    for _ in 0..100 {
        if handle.is_finished() {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert!(handle.is_finished());
    assert_eq!(handle.stats().passes, 0);
}

// =========================================================================
// Pass accounting
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_pass_counts_as_overrun() {
    let target = Arc::new(SlowTarget);
    let handle = SweepHandle::spawn(
        Arc::downgrade(&target),
        SweepConfig::every(Duration::from_millis(1)),
    )
    .unwrap();

    wait_for_passes(&handle, 1).await;

    let stats = handle.stats();
    assert!(stats.overruns >= 1);
    assert!(stats.last_pass >= Duration::from_millis(20));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_pass_does_not_kill_loop() {
    let target = Arc::new(PanickingTarget);
    let handle = SweepHandle::spawn(
        Arc::downgrade(&target),
        SweepConfig::every(Duration::from_secs(1)),
    )
    .unwrap();

    wait_for_passes(&handle, 2).await;

    assert!(!handle.is_finished());
    assert_eq!(handle.stats().reclaimed, 0);
}
