use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_stream::Stream;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Cheap "has anything changed" signal for one service/date: how many
/// check-ins exist and when the latest happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncSignal {
    pub last_count: i64,
    pub last_timestamp: Option<DateTime<Utc>>,
}

/// Remembers the last signal seen and reports when a new one differs.
#[derive(Debug, Default)]
pub struct SyncTracker {
    last: Option<SyncSignal>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `signal`; returns true when it differs from the previous one.
    /// The first signal only sets the baseline.
    pub fn observe(&mut self, signal: SyncSignal) -> bool {
        let changed = self.last.is_some_and(|last| last != signal);
        self.last = Some(signal);
        changed
    }

    pub fn last(&self) -> Option<SyncSignal> {
        self.last
    }
}

/// Polls `fetch` every `interval` and yields a signal each time it changes.
///
/// The first successful poll is yielded as the baseline. Failed polls are
/// logged and retried on the next tick. Dropping the stream stops polling.
/// A zero interval is raised to one millisecond.
pub fn watch_changes<F, Fut, E>(
    interval: Duration,
    mut fetch: F,
) -> impl Stream<Item = SyncSignal>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<SyncSignal, E>>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tracker = SyncTracker::new();

        loop {
            ticker.tick().await;

            let signal = match fetch().await {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!(error = %e, "Attendance sync poll failed");
                    continue;
                }
            };

            let first = tracker.last().is_none();
            if tracker.observe(signal) || first {
                yield signal;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio_stream::StreamExt;

    fn signal(count: i64) -> SyncSignal {
        SyncSignal {
            last_count: count,
            last_timestamp: DateTime::from_timestamp(1_700_000_000 + count, 0),
        }
    }

    #[test]
    fn test_first_observation_sets_baseline() {
        let mut tracker = SyncTracker::new();

        assert!(!tracker.observe(signal(3)));
        assert!(!tracker.observe(signal(3)));
        assert!(tracker.observe(signal(4)));
        assert_eq!(tracker.last(), Some(signal(4)));
    }

    #[test]
    fn test_timestamp_change_alone_is_a_change() {
        let mut tracker = SyncTracker::new();
        let base = signal(2);
        tracker.observe(base);

        // A delete followed by a new check-in keeps the count but moves the timestamp
        let moved = SyncSignal {
            last_count: 2,
            last_timestamp: DateTime::from_timestamp(1_800_000_000, 0),
        };
        assert!(tracker.observe(moved));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_yields_only_changes() {
        let counts = Arc::new(Mutex::new(vec![1, 1, 2, 2, 2, 5].into_iter()));

        let stream = watch_changes(Duration::from_secs(2), move || {
            let next = counts.lock().unwrap().next();
            async move { next.map(signal).ok_or("exhausted") }
        });

        let seen: Vec<i64> = stream
            .take(3)
            .map(|s| s.last_count)
            .collect()
            .await;

        assert_eq!(seen, vec![1, 2, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_does_not_panic() {
        let stream = watch_changes(Duration::ZERO, || async { Ok::<_, &str>(signal(7)) });

        let seen: Vec<i64> = stream.take(1).map(|s| s.last_count).collect().await;
        assert_eq!(seen, vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_survives_failed_polls() {
        let results = Arc::new(Mutex::new(
            vec![Err("db down"), Ok(signal(1)), Err("db down"), Ok(signal(2))].into_iter(),
        ));

        let stream = watch_changes(Duration::from_millis(10), move || {
            let next = results.lock().unwrap().next().unwrap_or(Err("exhausted"));
            async move { next }
        });

        let seen: Vec<i64> = stream.take(2).map(|s| s.last_count).collect().await;
        assert_eq!(seen, vec![1, 2]);
    }
}
