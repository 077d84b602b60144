//! Background polling loop plumbing
//!
//! Both the resource monitor and the suspension manager run a fixed-interval
//! loop on a tokio task. The loop holds only a `Weak` reference to its owner
//! and listens on a broadcast shutdown channel, so stopping is cooperative and
//! bounded by one tick.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

struct LoopHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// Start/stop bookkeeping for one background loop
pub(crate) struct LoopController {
    name: &'static str,
    handle: Mutex<Option<LoopHandle>>,
}

impl LoopController {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: Mutex::new(None),
        }
    }

    /// Spawn the loop unless one is already running. Returns false without
    /// spawning when called outside a tokio runtime.
    pub(crate) fn start<T, F, Fut>(&self, owner: Weak<T>, period: Duration, tick: F) -> bool
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = guard.as_ref() {
            if !existing.task.is_finished() {
                debug!(worker = self.name, "Loop already running");
                return false;
            }
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(worker = self.name, error = %e, "No tokio runtime, loop not started");
                return false;
            }
        };

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let name = self.name;
        let task = runtime.spawn(run_loop(name, owner, period, shutdown_rx, tick));

        info!(worker = name, interval_ms = period.as_millis() as u64, "Started background loop");
        *guard = Some(LoopHandle {
            shutdown: shutdown_tx,
            task,
        });
        true
    }

    /// Signal the loop and wait for it to exit. No-op when idle.
    pub(crate) async fn stop(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(handle) = handle else {
            debug!(worker = self.name, "Loop not running");
            return;
        };

        // The receiver may already be gone if the owner was dropped.
        let _ = handle.shutdown.send(());
        if let Err(e) = handle.task.await {
            warn!(worker = self.name, error = %e, "Background loop ended abnormally");
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|h| !h.task.is_finished())
            .unwrap_or(false)
    }
}

async fn run_loop<T, F, Fut>(
    name: &'static str,
    owner: Weak<T>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
    tick: F,
) where
    F: Fn(Arc<T>) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(owner) = owner.upgrade() else {
                    debug!(worker = name, "Owner dropped, ending loop");
                    break;
                };
                tick(owner).await;
            }
            _ = shutdown.recv() => {
                info!(worker = name, "Shutting down background loop");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        ticks: AtomicUsize,
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_ends_loop() {
        let owner = Arc::new(Counter {
            ticks: AtomicUsize::new(0),
        });
        let controller = LoopController::new("test");

        let tick = |c: Arc<Counter>| async move {
            c.ticks.fetch_add(1, Ordering::SeqCst);
        };

        assert!(controller.start(Arc::downgrade(&owner), Duration::from_millis(5), tick));
        assert!(!controller.start(Arc::downgrade(&owner), Duration::from_millis(5), tick));
        assert!(controller.is_running());

        tokio::time::sleep(Duration::from_millis(30)).await;
        controller.stop().await;

        assert!(!controller.is_running());
        assert!(owner.ticks.load(Ordering::SeqCst) >= 1);

        // Stopping twice is harmless
        controller.stop().await;
    }

    #[test]
    fn test_start_outside_runtime_is_refused() {
        let owner = Arc::new(Counter {
            ticks: AtomicUsize::new(0),
        });
        let controller = LoopController::new("test");

        assert!(!controller.start(Arc::downgrade(&owner), Duration::from_millis(5), |_c| async {}));
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_loop_exits_when_owner_dropped() {
        let owner = Arc::new(Counter {
            ticks: AtomicUsize::new(0),
        });
        let controller = LoopController::new("test");
        controller.start(Arc::downgrade(&owner), Duration::from_millis(5), |_c| async {});

        drop(owner);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!controller.is_running());
    }
}
