// SPDX-License-Identifier: Apache-2.0

//! Per work-unit acknowledgement tracking.
//!
//! An [`EventAckTracker`] counts events handed to the pipeline that have not
//! been acknowledged yet. When the count drops to zero the tracker completes
//! and every [`EventAckTracker::wait`] returns [`AckOutcome::Completed`]. If
//! the parent cancellation token fires first (shutdown), waiters get
//! [`AckOutcome::Abandoned`] instead and must not persist offsets for the
//! work-unit.
//!
//! Acknowledging more events than are pending is a bug in the caller. Debug
//! builds panic; release builds clamp the count to zero and log an error.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::event::TrackedEvent;

/// Why a tracker's lifetime ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Every pending event was acknowledged.
    Completed,
    /// The tracker was cancelled before all events were acknowledged.
    Abandoned,
}

struct Counter {
    pending: u64,
    outcome: Option<AckOutcome>,
}

struct Shared {
    counter: Mutex<Counter>,
    done: CancellationToken,
}

/// Cloneable handle to the acknowledgement state of one work-unit.
#[derive(Clone)]
pub struct EventAckTracker {
    shared: Arc<Shared>,
}

impl EventAckTracker {
    /// Create a tracker whose lifetime is bounded by `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            shared: Arc::new(Shared {
                counter: Mutex::new(Counter {
                    pending: 0,
                    outcome: None,
                }),
                done: parent.child_token(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counter> {
        self.shared
            .counter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Register `n` more events as in flight.
    pub fn add(&self, n: u64) {
        if n == 0 {
            return;
        }

        let mut counter = self.lock();
        if counter.outcome.is_some() {
            warn!(
                pending = counter.pending,
                added = n,
                "Adding events to a tracker that already finished"
            );
        }
        counter.pending += n;
    }

    /// Attach a payload to this tracker, counting it as one pending event.
    pub fn track<T>(&self, payload: T) -> TrackedEvent<T> {
        self.add(1);
        TrackedEvent::new(payload, self.clone())
    }

    /// Acknowledge a single event.
    pub fn ack(&self) {
        self.ack_n(1);
    }

    /// Acknowledge `n` events, completing the tracker when none remain.
    pub fn ack_n(&self, n: u64) {
        if n == 0 {
            return;
        }

        let mut counter = self.lock();
        let pending = counter.pending;
        debug_assert!(
            n <= pending,
            "acknowledged {} events but only {} are pending",
            n,
            pending
        );

        if n > pending {
            error!(
                pending,
                acked = n,
                "Acknowledged more events than pending, clamping to zero"
            );
            counter.pending = 0;
        } else {
            counter.pending -= n;
        }

        if counter.pending == 0 {
            self.finish(&mut counter, AckOutcome::Completed);
        }
    }

    fn finish(&self, counter: &mut Counter, outcome: AckOutcome) {
        if counter.outcome.is_none() {
            counter.outcome = Some(outcome);
        }
        self.shared.done.cancel();
    }

    /// End the tracker's lifetime without waiting for the pending events.
    pub fn abandon(&self) {
        let mut counter = self.lock();
        self.finish(&mut counter, AckOutcome::Abandoned);
    }

    /// Wait until every pending event is acknowledged or the tracker is
    /// cancelled. Returns immediately when nothing is pending.
    ///
    /// Callers that want a deadline wrap this in `tokio::time::timeout`.
    pub async fn wait(&self) -> AckOutcome {
        {
            let mut counter = self.lock();
            if counter.pending == 0 {
                self.finish(&mut counter, AckOutcome::Completed);
            }
        }

        self.shared.done.cancelled().await;

        let outcome = self.outcome().unwrap_or(AckOutcome::Abandoned);
        if outcome == AckOutcome::Abandoned {
            debug!(pending = self.pending(), "Acknowledgement wait abandoned");
        }
        outcome
    }

    /// How the tracker ended, or `None` while it is still live.
    pub fn outcome(&self) -> Option<AckOutcome> {
        let mut counter = self.lock();
        if counter.outcome.is_none() && self.shared.done.is_cancelled() {
            counter.outcome = Some(AckOutcome::Abandoned);
        }
        counter.outcome
    }

    /// Whether the tracker's lifetime has ended, for either reason.
    pub fn is_done(&self) -> bool {
        self.shared.done.is_cancelled()
    }

    /// Number of events not yet acknowledged.
    pub fn pending(&self) -> u64 {
        self.lock().pending
    }

    /// Whether both handles refer to the same tracker.
    pub fn same_as(&self, other: &EventAckTracker) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Default for EventAckTracker {
    fn default() -> Self {
        Self::new(&CancellationToken::new())
    }
}

impl fmt::Debug for EventAckTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counter = self.lock();
        f.debug_struct("EventAckTracker")
            .field("pending", &counter.pending)
            .field("outcome", &counter.outcome)
            .field("done", &self.shared.done.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_single_event() {
        let tracker = EventAckTracker::default();
        tracker.add(1);
        assert_eq!(tracker.outcome(), None);

        tracker.ack();

        assert_eq!(tracker.pending(), 0);
        assert!(tracker.is_done());
        assert_eq!(tracker.outcome(), Some(AckOutcome::Completed));
    }

    #[tokio::test]
    async fn test_wait_without_events() {
        let tracker = EventAckTracker::default();

        let outcome = timeout(Duration::from_secs(1), tracker.wait())
            .await
            .expect("wait should return immediately");

        assert_eq!(outcome, AckOutcome::Completed);
        assert_eq!(tracker.pending(), 0);
        assert!(tracker.is_done());
    }

    #[tokio::test]
    async fn test_wait_until_acked() {
        let tracker = EventAckTracker::default();
        tracker.add(3);

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait().await })
        };

        tracker.ack();
        tracker.ack_n(1);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        assert_eq!(tracker.pending(), 1);

        tracker.ack();
        let outcome = timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, AckOutcome::Completed);
    }

    #[tokio::test]
    async fn test_parent_cancel_abandons() {
        let parent = CancellationToken::new();
        let tracker = EventAckTracker::new(&parent);
        tracker.add(2);
        tracker.ack();

        parent.cancel();

        let outcome = timeout(Duration::from_secs(1), tracker.wait())
            .await
            .unwrap();
        assert_eq!(outcome, AckOutcome::Abandoned);
        assert_eq!(tracker.pending(), 1);
        assert_eq!(tracker.outcome(), Some(AckOutcome::Abandoned));
    }

    #[tokio::test]
    async fn test_parent_cancel_reaches_all_children() {
        let parent = CancellationToken::new();
        let trackers: Vec<_> = (0..4).map(|_| EventAckTracker::new(&parent)).collect();
        for t in &trackers {
            t.add(1);
        }

        parent.cancel();

        for t in &trackers {
            assert_eq!(t.wait().await, AckOutcome::Abandoned);
        }
    }

    #[test]
    fn test_child_cancel_leaves_parent() {
        let parent = CancellationToken::new();
        let tracker = EventAckTracker::new(&parent);
        tracker.add(1);
        tracker.ack();

        assert!(tracker.is_done());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_abandon() {
        let tracker = EventAckTracker::default();
        tracker.add(1);
        tracker.abandon();

        assert_eq!(tracker.outcome(), Some(AckOutcome::Abandoned));

        // A late ack does not rewrite the outcome.
        tracker.ack();
        assert_eq!(tracker.pending(), 0);
        assert_eq!(tracker.outcome(), Some(AckOutcome::Abandoned));
    }

    #[test]
    fn test_completion_is_final() {
        let tracker = EventAckTracker::default();
        tracker.add(1);
        tracker.ack();
        tracker.add(1);
        tracker.ack();

        assert_eq!(tracker.outcome(), Some(AckOutcome::Completed));
        assert!(tracker.is_done());
    }

    #[test]
    fn test_add_zero_and_ack_zero_are_noops() {
        let tracker = EventAckTracker::default();
        tracker.add(0);
        tracker.ack_n(0);

        assert_eq!(tracker.pending(), 0);
        assert_eq!(tracker.outcome(), None);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "acknowledged 2 events but only 1 are pending")]
    fn test_over_ack_panics_in_debug() {
        let tracker = EventAckTracker::default();
        tracker.add(1);
        tracker.ack_n(2);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_over_ack_clamps_in_release() {
        let tracker = EventAckTracker::default();
        tracker.add(1);
        tracker.ack_n(2);

        assert_eq!(tracker.pending(), 0);
        assert_eq!(tracker.outcome(), Some(AckOutcome::Completed));
    }

    #[test]
    fn test_track_counts_event() {
        let tracker = EventAckTracker::default();
        let event = tracker.track("line");

        assert_eq!(tracker.pending(), 1);
        assert!(event.tracker().unwrap().same_as(&tracker));
        assert!(!tracker.same_as(&EventAckTracker::default()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_add_and_ack() {
        let tracker = EventAckTracker::default();
        // Held until all workers finished so the count cannot reach zero early.
        tracker.add(1);

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.wait().await })
            })
            .collect();

        let workers: Vec<_> = (0..64)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        tracker.add(1);
                        tokio::task::yield_now().await;
                        tracker.ack();
                    }
                })
            })
            .collect();

        for w in workers {
            w.await.unwrap();
        }

        assert_eq!(tracker.pending(), 1);
        assert_eq!(tracker.outcome(), None);

        tracker.ack();

        for w in waiters {
            let outcome = timeout(Duration::from_secs(5), w).await.unwrap().unwrap();
            assert_eq!(outcome, AckOutcome::Completed);
        }
        assert_eq!(tracker.pending(), 0);
        assert_eq!(tracker.outcome(), Some(AckOutcome::Completed));
    }
}
