// SPDX-License-Identifier: Apache-2.0

//! Routes pipeline acknowledgements back to per work-unit trackers.
//!
//! The pipeline reports acknowledgements as "the oldest `n` published events
//! were delivered". The handler remembers, in publish order, which tracker
//! each published event belongs to and turns such a report into tracker
//! decrements. One report may span events of many work-units.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tracing::error;

use super::event::TrackedEvent;
use super::tracker::EventAckTracker;
use crate::error::{Error, Result};

#[derive(Default)]
pub struct EventAckHandler {
    /// Tracker of every published, unacknowledged event, oldest first.
    /// `None` marks events that nobody tracks.
    outstanding: Mutex<VecDeque<Option<EventAckTracker>>>,
}

impl EventAckHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Option<EventAckTracker>>> {
        self.outstanding.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record an event handed to the pipeline.
    ///
    /// Events the pipeline did not accept will never be acknowledged by it,
    /// so they are acknowledged on their tracker right away and take no
    /// position in the outstanding sequence.
    pub fn add_event<T>(&self, event: &TrackedEvent<T>, accepted: bool) {
        if !accepted {
            if let Some(tracker) = event.tracker() {
                tracker.ack();
            }
            return;
        }

        self.lock().push_back(event.tracker().cloned());
    }

    /// Acknowledge the oldest `n` outstanding events.
    ///
    /// Consecutive events of the same tracker are acknowledged with a single
    /// call. Acknowledging more events than are outstanding is rejected
    /// without touching any tracker.
    pub fn ack_events(&self, n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }

        let acked: Vec<_> = {
            let mut outstanding = self.lock();
            if n > outstanding.len() {
                error!(
                    acked = n,
                    outstanding = outstanding.len(),
                    "Pipeline acknowledged more events than were published"
                );
                return Err(Error::AckOverflow {
                    requested: n,
                    outstanding: outstanding.len(),
                });
            }
            outstanding.drain(..n).collect()
        };

        let mut run: Option<(EventAckTracker, u64)> = None;
        for tracker in acked.into_iter().flatten() {
            if let Some((current, count)) = run.as_mut() {
                if current.same_as(&tracker) {
                    *count += 1;
                    continue;
                }
            }
            if let Some((current, count)) = run.replace((tracker, 1)) {
                current.ack_n(count);
            }
        }
        if let Some((current, count)) = run {
            current.ack_n(count);
        }

        Ok(())
    }

    /// Number of published events not yet acknowledged.
    pub fn outstanding(&self) -> usize {
        self.lock().len()
    }
}
