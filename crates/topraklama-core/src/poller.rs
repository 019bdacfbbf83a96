//! Data Poller
//!
//! Runs one fetch operation immediately and then on a fixed cadence until
//! stopped. Failures are logged and counted; they never end the loop and
//! never reach other pollers.
//!
//! A poller has at most one fetch in flight. A tick that comes due while a
//! fetch is still running is skipped rather than queued.
//!
//! Stopping clears the poller's gate and aborts its task. The gate is held
//! while a fetch is started and while its result is delivered, so once
//! [`DataPoller::stop`] returns no fetch is started and no result reaches
//! the sink. A sink must not stop its own poller.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::FetchError;

/// Smallest cadence accepted; `tokio::time::interval` rejects zero
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Counters for one poller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Fetches started
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    invocations: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

struct Shared {
    name: String,
    active: Mutex<bool>,
    wake: Notify,
    counters: Counters,
}

impl Shared {
    fn gate(&self) -> MutexGuard<'_, bool> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a running poll loop; dropping it stops the loop
pub struct DataPoller {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl DataPoller {
    /// Start polling `fetch` every `interval`, handing each success to `sink`.
    ///
    /// The first fetch starts immediately. Must be called within a Tokio runtime.
    pub fn spawn<T, F, Fut, S>(
        name: impl Into<String>,
        interval: Duration,
        fetch: F,
        sink: S,
    ) -> Self
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
        S: FnMut(T) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            name: name.into(),
            active: Mutex::new(true),
            wake: Notify::new(),
            counters: Counters::default(),
        });
        let period = interval.max(MIN_INTERVAL);

        tracing::debug!(
            poller = %shared.name,
            interval_ms = period.as_millis() as u64,
            "starting poller"
        );

        let task = tokio::spawn(run(Arc::clone(&shared), period, fetch, sink));

        Self {
            shared,
            task: Some(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether the poll loop is still live.
    ///
    /// Does not take the gate, so it is safe to call from code a sink may wait on.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Request a poll now instead of waiting for the next tick.
    ///
    /// If a fetch is in flight, the extra poll starts after it completes.
    /// Repeated requests before that coalesce into one.
    pub fn trigger(&self) {
        if self.task.is_some() {
            self.shared.wake.notify_one();
        }
    }

    pub fn stats(&self) -> PollerStats {
        let c = &self.shared.counters;
        PollerStats {
            invocations: c.invocations.load(Ordering::Relaxed),
            successes: c.successes.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        }
    }

    /// Stop polling. Idempotent.
    pub fn stop(&mut self) {
        *self.shared.gate() = false;
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(poller = %self.shared.name, "poller stopped");
        }
    }
}

impl Drop for DataPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run<T, F, Fut, S>(shared: Arc<Shared>, period: Duration, mut fetch: F, mut sink: S)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
    S: FnMut(T),
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shared.wake.notified() => ticker.reset(),
        }

        let pending = {
            let active = shared.gate();
            if !*active {
                break;
            }
            shared.counters.invocations.fetch_add(1, Ordering::Relaxed);
            fetch()
        };

        let outcome = pending.await;

        let active = shared.gate();
        if !*active {
            break;
        }
        match outcome {
            Ok(value) => {
                shared.counters.successes.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(poller = %shared.name, "poll succeeded");
                sink(value);
            }
            Err(e) => {
                shared.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    poller = %shared.name,
                    error = %e,
                    "poll failed, retrying on next tick"
                );
            }
        }
        drop(active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_immediately_then_on_cadence() {
        let delivered = counter();
        let sink_count = Arc::clone(&delivered);

        let poller = DataPoller::spawn(
            "cadence",
            Duration::from_secs(5),
            || async { Ok::<_, FetchError>(1u32) },
            move |_| {
                sink_count.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(12_400)).await;
        // t = 0, 5, 10
        assert_eq!(delivered.load(Ordering::SeqCst), 3);
        assert_eq!(poller.stats().invocations, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_polling() {
        let calls = counter();
        let fetch_calls = Arc::clone(&calls);
        let delivered = counter();
        let sink_count = Arc::clone(&delivered);

        let poller = DataPoller::spawn(
            "flaky",
            Duration::from_secs(1),
            move || {
                let n = fetch_calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n % 2 == 0 {
                        Err(FetchError::Status(503))
                    } else {
                        Ok(n)
                    }
                }
            },
            move |_| {
                sink_count.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let stats = poller.stats();
        assert_eq!(stats.invocations, 4);
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.successes, 2);
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        assert!(poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_never_overlaps() {
        let in_flight = counter();
        let max_in_flight = counter();
        let (fetch_in_flight, fetch_max) = (Arc::clone(&in_flight), Arc::clone(&max_in_flight));

        let poller = DataPoller::spawn(
            "slow",
            Duration::from_secs(5),
            move || {
                let in_flight = Arc::clone(&fetch_in_flight);
                let max = Arc::clone(&fetch_max);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(12)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, FetchError>(())
                }
            },
            |_| {},
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        let stats = poller.stats();
        assert!(stats.invocations >= 4, "only {} invocations", stats.invocations);
        assert!(stats.invocations <= 6, "{} invocations", stats.invocations);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_final_and_idempotent() {
        let delivered = counter();
        let sink_count = Arc::clone(&delivered);

        let mut poller = DataPoller::spawn(
            "stoppable",
            Duration::from_secs(1),
            || async { Ok::<_, FetchError>(()) },
            move |_| {
                sink_count.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        poller.stop();
        let at_stop = delivered.load(Ordering::SeqCst);
        assert_eq!(at_stop, 3);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), at_stop);
        assert!(!poller.is_running());

        poller.stop();
        poller.trigger();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), at_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_in_flight_at_stop_is_dropped() {
        let delivered = counter();
        let sink_count = Arc::clone(&delivered);

        let mut poller = DataPoller::spawn(
            "in-flight",
            Duration::from_secs(5),
            || async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Ok::<_, FetchError>(())
            },
            move |_| {
                sink_count.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(poller.stats().invocations, 1);
        poller.stop();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_polls_early() {
        let poller = DataPoller::spawn(
            "triggered",
            Duration::from_secs(60),
            || async { Ok::<_, FetchError>(()) },
            |_| {},
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(poller.stats().invocations, 1);

        poller.trigger();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(poller.stats().invocations, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_loop() {
        let delivered = counter();
        let sink_count = Arc::clone(&delivered);

        let poller = DataPoller::spawn(
            "dropped",
            Duration::from_secs(1),
            || async { Ok::<_, FetchError>(()) },
            move |_| {
                sink_count.fetch_add(1, Ordering::SeqCst);
            },
        );
        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(poller);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }
}
