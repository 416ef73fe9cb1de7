// SPDX-License-Identifier: Apache-2.0

use super::tracker::EventAckTracker;

/// An event paired with the tracker of the work-unit it was read in.
///
/// The pipeline carries the tracker along untouched; only the
/// [`EventAckHandler`](super::EventAckHandler) looks at it once the event is
/// acknowledged.
#[derive(Debug, Clone)]
pub struct TrackedEvent<T> {
    pub payload: T,
    tracker: Option<EventAckTracker>,
}

impl<T> TrackedEvent<T> {
    /// Pair `payload` with `tracker`. The caller is responsible for having
    /// counted the event with [`EventAckTracker::add`].
    pub fn new(payload: T, tracker: EventAckTracker) -> Self {
        Self {
            payload,
            tracker: Some(tracker),
        }
    }

    /// An event whose acknowledgement nobody waits for.
    pub fn untracked(payload: T) -> Self {
        Self {
            payload,
            tracker: None,
        }
    }

    pub fn tracker(&self) -> Option<&EventAckTracker> {
        self.tracker.as_ref()
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}
