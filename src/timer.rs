//! Cancellable timers for the bridge's scheduled work.
//!
//! Every timer is a spawned tokio task that sleeps and then sends an event
//! into the owner's event channel. The returned [`ScopedTask`] aborts the task
//! when dropped, so dropping the structure that owns a timer is enough to
//! guarantee it never fires afterwards.
//!
//! ```ignore
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let _tick = timer::every(Duration::from_millis(500), tx.clone(), Event::Sweep);
//! let once = timer::after(Duration::from_secs(5), tx, Event::Timeout { id });
//! drop(once); // cancelled, `Event::Timeout` is never sent
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Handle to a spawned task that is aborted when the handle is dropped.
#[derive(Debug)]
pub struct ScopedTask {
    handle: JoinHandle<()>,
}

impl ScopedTask {
    /// Spawn `future` on the current tokio runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }

    /// Abort the task now.
    pub fn cancel(self) {
        drop(self);
    }

    /// Returns `true` once the task has run to completion or was aborted.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// One-shot timer: sends `event` on `tx` after `delay`.
pub fn after<E>(delay: Duration, tx: UnboundedSender<E>, event: E) -> ScopedTask
where
    E: Send + 'static,
{
    ScopedTask::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tx.send(event);
    })
}

/// Repeating timer: sends a clone of `event` on `tx` every `period`.
///
/// The first tick fires one full period after the call. Ticks missed while
/// the runtime was busy are not burst-delivered. Stops on its own once the
/// receiving side is gone.
pub fn every<E>(period: Duration, tx: UnboundedSender<E>, event: E) -> ScopedTask
where
    E: Clone + Send + 'static,
{
    ScopedTask::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if tx.send(event.clone()).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_after_fires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let _timer = after(Duration::from_millis(1500), tx, "fired");

        assert_eq!(rx.recv().await, Some("fired"));
        assert!(start.elapsed() >= Duration::from_millis(1500));
        // Task finished and dropped its sender.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = after(Duration::from_millis(100), tx, ());
        timer.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert_eq!(result.unwrap(), None, "cancelled timer must not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_ticks_on_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let _ticker = every(Duration::from_millis(500), tx, 7u8);

        for n in 1..=3u32 {
            assert_eq!(rx.recv().await, Some(7));
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(500) * n);
            assert!(elapsed < Duration::from_millis(500) * (n + 1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let ticker = every(Duration::from_millis(10), tx, ());
        drop(rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ticker.is_finished());
    }
}
