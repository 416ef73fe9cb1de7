// SPDX-License-Identifier: Apache-2.0

//! Offset committer for at-least-once delivery.
//!
//! Harvesters hand the committer a work-unit's tracker together with the
//! offset the file will be at once that work-unit is delivered. When the
//! tracker completes the offset is applied to the state table; abandoned
//! work-units leave the offset untouched so the data is read again after a
//! restart. The table is periodically saved to a [`StateStore`].

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ack::{AckOutcome, EventAckTracker};
use crate::bounded_channel::{self, BoundedReceiver, BoundedSender};
use crate::config::StateConfig;
use crate::error::{Error, Result};
use crate::registry::StateStore;
use crate::state::FileStates;

const COMMIT_CHAN_SIZE: usize = 1000;

/// Longest pause between checkpoints while draining before drain ends.
const DRAIN_IDLE_TIMEOUT: Duration = Duration::from_millis(100);

/// Configuration for the offset committer
#[derive(Debug, Clone)]
pub struct OffsetCommitterConfig {
    /// Interval between periodic checkpoints
    pub checkpoint_interval: Duration,
    /// Maximum time to wait when draining checkpoints during shutdown
    pub drain_timeout: Duration,
    /// Maximum duration of consecutive checkpoint failures before returning error
    pub max_checkpoint_failure_duration: Duration,
}

impl Default for OffsetCommitterConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(2),
            max_checkpoint_failure_duration: Duration::from_secs(60),
        }
    }
}

impl From<&StateConfig> for OffsetCommitterConfig {
    fn from(config: &StateConfig) -> Self {
        Self {
            checkpoint_interval: config.checkpoint_interval(),
            drain_timeout: config.drain_timeout(),
            max_checkpoint_failure_duration: config.max_checkpoint_failure(),
        }
    }
}

/// Result of waiting on a work-unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Id of the file state the work-unit was read from
    pub id: String,
    /// Offset the file is at once the work-unit is delivered
    pub offset: u64,
    pub outcome: AckOutcome,
}

/// Handle for submitting work-units to the committer.
#[derive(Clone)]
pub struct CommitSender {
    tx: BoundedSender<Checkpoint>,
}

impl CommitSender {
    /// Wait for `tracker` in the background and forward the outcome.
    pub fn commit_when_acked(
        &self,
        tracker: EventAckTracker,
        id: impl Into<String>,
        offset: u64,
    ) -> JoinHandle<Result<()>> {
        let sender = self.clone();
        let id = id.into();
        tokio::spawn(async move {
            let outcome = tracker.wait().await;
            sender
                .send(Checkpoint {
                    id,
                    offset,
                    outcome,
                })
                .await
        })
    }

    pub async fn send(&self, checkpoint: Checkpoint) -> Result<()> {
        self.tx
            .send(checkpoint)
            .await
            .map_err(|_| Error::ChannelSend)
    }
}

/// Applies acknowledged offsets and persists the state table.
pub struct OffsetCommitter<S> {
    checkpoint_rx: BoundedReceiver<Checkpoint>,
    states: FileStates,
    store: S,
    config: OffsetCommitterConfig,
    /// Tracks when checkpoint failures started (for threshold-based exit)
    checkpoint_first_failure: Option<Instant>,
}

impl<S: StateStore> OffsetCommitter<S> {
    pub fn new(
        states: FileStates,
        store: S,
        config: OffsetCommitterConfig,
    ) -> (Self, CommitSender) {
        let (tx, checkpoint_rx) = bounded_channel::bounded(COMMIT_CHAN_SIZE);
        let committer = Self {
            checkpoint_rx,
            states,
            store,
            config,
            checkpoint_first_failure: None,
        };
        (committer, CommitSender { tx })
    }

    /// Run until cancelled or until every [`CommitSender`] is dropped.
    ///
    /// Remaining checkpoints are drained and a final snapshot is saved before
    /// returning. Returns an error if saving kept failing for longer than the
    /// configured threshold.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        info!("Offset committer started");

        let mut checkpoint_interval = tokio::time::interval(self.config.checkpoint_interval);
        let mut fatal_error = None;

        loop {
            select! {
                biased;

                _ = checkpoint_interval.tick() => {
                    if let Err(e) = self.maybe_checkpoint() {
                        error!("Checkpoint failures persisted beyond threshold, exiting: {}", e);
                        fatal_error = Some(e);
                        break;
                    }
                }

                checkpoint = self.checkpoint_rx.next() => {
                    match checkpoint {
                        Some(checkpoint) => self.apply(checkpoint),
                        None => {
                            debug!("Commit channel closed, exiting offset committer run loop");
                            break;
                        }
                    }
                }

                _ = cancel.cancelled() => {
                    debug!("Offset committer cancelled, draining pending checkpoints");
                    break;
                }
            }
        }

        self.drain().await;

        match fatal_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn apply(&self, checkpoint: Checkpoint) {
        match checkpoint.outcome {
            AckOutcome::Completed => {
                match self.states.advance_offset(&checkpoint.id, checkpoint.offset) {
                    Ok(()) => debug!(
                        id = %checkpoint.id,
                        offset = checkpoint.offset,
                        "Advanced acknowledged offset"
                    ),
                    Err(e) => warn!(
                        id = %checkpoint.id,
                        offset = checkpoint.offset,
                        "Dropping acknowledged offset: {}", e
                    ),
                }
            }
            AckOutcome::Abandoned => debug!(
                id = %checkpoint.id,
                offset = checkpoint.offset,
                "Work-unit abandoned before acknowledgement, keeping previous offset"
            ),
        }
    }

    /// Apply queued checkpoints until the queue stays idle or the drain
    /// deadline passes, then save a final snapshot.
    async fn drain(&mut self) {
        let deadline = tokio::time::Instant::now() + self.config.drain_timeout;
        let mut drained = 0;

        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                debug!("Drain deadline reached after {} checkpoints", drained);
                break;
            }

            let wait = (deadline - now).min(DRAIN_IDLE_TIMEOUT);
            match tokio::time::timeout(wait, self.checkpoint_rx.next()).await {
                Ok(Some(checkpoint)) => {
                    self.apply(checkpoint);
                    drained += 1;
                }
                Ok(None) | Err(_) => break,
            }
        }

        if drained > 0 {
            info!("Drained {} pending checkpoints", drained);
        }

        if let Err(e) = self.checkpoint() {
            warn!("Failed to perform final checkpoint: {}", e);
        } else {
            info!("Final checkpoint completed successfully");
        }
    }

    /// Checkpoint, tolerating failures until they last longer than the
    /// configured threshold.
    fn maybe_checkpoint(&mut self) -> Result<()> {
        match self.checkpoint() {
            Ok(()) => {
                if self.checkpoint_first_failure.is_some() {
                    debug!("Checkpoint succeeded after previous failures");
                    self.checkpoint_first_failure = None;
                }
                Ok(())
            }
            Err(e) => {
                let first_failure = *self
                    .checkpoint_first_failure
                    .get_or_insert_with(Instant::now);
                let failure_duration = first_failure.elapsed();

                if failure_duration >= self.config.max_checkpoint_failure_duration {
                    Err(e)
                } else {
                    warn!(
                        "Checkpoint failed (failures started {:?} ago): {}",
                        failure_duration, e
                    );
                    Ok(())
                }
            }
        }
    }

    /// Drop expired states and save the rest.
    fn checkpoint(&mut self) -> Result<()> {
        let removed = self.states.cleanup(Utc::now());
        let snapshot = self.states.snapshot();
        self.store.save(&snapshot)?;

        debug!(states = snapshot.len(), removed, "Checkpoint completed");
        Ok(())
    }
}
