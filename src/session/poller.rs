//! Cancellable periodic task
//!
//! Replaces manually cleared interval handles: `PeriodicTask::spawn` starts a
//! tokio task that runs one tick per period, and the returned handle exposes
//! `cancel()`. Ticks never overlap because the loop awaits each tick before
//! waiting for the next interval, and missed intervals are skipped rather
//! than queued.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// What the loop should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

/// Handle to a running periodic task.
pub struct PeriodicTask {
    name: &'static str,
    cancelled: Arc<AtomicBool>,
    cancel_tx: watch::Sender<bool>,
    ticks: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Start repeating `tick` every `period`. The first tick fires one period
    /// after spawning. Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickControl> + Send + 'static,
    {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let cancelled = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));

        let flag = Arc::clone(&cancelled);
        let counter = Arc::clone(&ticks);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                // A wake-up that raced with cancel() must not start a tick
                if flag.load(Ordering::Acquire) {
                    break;
                }

                counter.fetch_add(1, Ordering::Relaxed);
                if tick().await == TickControl::Stop {
                    break;
                }
            }
            log::debug!("[Poller] {} loop exited", name);
        });

        log::debug!("[Poller] {} armed (period {:?})", name, period);
        PeriodicTask {
            name,
            cancelled,
            cancel_tx,
            ticks,
            handle,
        }
    }

    /// Stop the loop. No tick starts after this returns; a tick already in
    /// flight runs to completion.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            let _ = self.cancel_tx.send(true);
            log::debug!("[Poller] {} cancelled after {} ticks", self.name, self.tick_count());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// True once the loop has exited (cancelled or stopped by its tick).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Number of ticks started so far.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_one_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let task = PeriodicTask::spawn("test", Duration::from_millis(500), move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                TickControl::Continue
            }
        });

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        task.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_cancel() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let task = PeriodicTask::spawn("test", Duration::from_millis(100), move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                TickControl::Continue
            }
        });

        tokio::time::sleep(Duration::from_millis(350)).await;
        task.cancel();
        let seen = count.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
        assert!(task.is_cancelled());
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ticks_never_overlap() {
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let (a, m) = (Arc::clone(&active), Arc::clone(&max_active));
        let task = PeriodicTask::spawn("test", Duration::from_millis(100), move || {
            let (a, m) = (Arc::clone(&a), Arc::clone(&m));
            async move {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                // Each tick takes longer than the period
                tokio::time::sleep(Duration::from_millis(350)).await;
                a.fetch_sub(1, Ordering::SeqCst);
                TickControl::Continue
            }
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        task.cancel();
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert!(task.tick_count() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_can_stop_the_loop() {
        let task = PeriodicTask::spawn("test", Duration::from_millis(10), || async {
            TickControl::Stop
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(task.is_finished());
        assert_eq!(task.tick_count(), 1);
    }
}
