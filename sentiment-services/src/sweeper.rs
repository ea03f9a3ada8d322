//! Background cleanup for in-memory services
//!
//! The cache and the rate limiter never rely on readers to evict stale
//! state; each owns a sweeper task started explicitly at process start.
//! The task holds only a weak reference, so it ends on its own once the
//! service is dropped, and dropping the handle stops it immediately.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A service with periodically removable state
pub trait Sweep: Send + Sync + 'static {
    /// Remove stale state, returning how many items were dropped
    fn sweep(&self) -> usize;
}

/// Owner handle for a running sweeper; aborts the task when dropped
#[derive(Debug)]
pub struct SweeperHandle {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the sweeper now
    pub fn stop(self) {
        // Drop aborts the task
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawn a task calling `target.sweep()` every `every`
pub fn spawn_sweeper<T: Sweep>(target: &Arc<T>, every: Duration, name: &'static str) -> SweeperHandle {
    let weak: Weak<T> = Arc::downgrade(target);

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately
        interval.tick().await;

        info!("[SWEEPER:{}] started, interval {:?}", name, every);

        loop {
            interval.tick().await;

            let Some(target) = weak.upgrade() else {
                debug!("[SWEEPER:{}] owner dropped, stopping", name);
                break;
            };

            let removed = target.sweep();
            if removed > 0 {
                debug!("[SWEEPER:{}] removed {} stale entries", name, removed);
            }
        }
    });

    SweeperHandle { name, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        sweeps: AtomicUsize,
    }

    impl Sweep for Counter {
        fn sweep(&self) -> usize {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_on_interval() {
        let counter = Arc::new(Counter::default());
        let _handle = spawn_sweeper(&counter, Duration::from_secs(60), "test");

        tokio::time::sleep(Duration::from_secs(185)).await;
        assert_eq!(counter.sweeps.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_when_owner_dropped() {
        let counter = Arc::new(Counter::default());
        let handle = spawn_sweeper(&counter, Duration::from_secs(1), "test");

        drop(counter);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_sweeps() {
        let counter = Arc::new(Counter::default());
        let handle = spawn_sweeper(&counter, Duration::from_secs(1), "test");

        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.stop();
        let seen = counter.sweeps.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.sweeps.load(Ordering::SeqCst), seen);
    }
}
