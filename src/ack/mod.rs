// SPDX-License-Identifier: Apache-2.0

//! Acknowledgement tracking for at-least-once delivery.
//!
//! Every event read from a file is tagged with the [`EventAckTracker`] of its
//! work-unit. The [`EventAckHandler`] turns pipeline acknowledgements into
//! tracker decrements, and a tracker reaching zero tells the waiting code it
//! is safe to persist the work-unit's offset.

mod event;
mod handler;
mod tracker;

pub use event::TrackedEvent;
pub use handler::EventAckHandler;
pub use tracker::{AckOutcome, EventAckTracker};
