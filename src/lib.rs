// SPDX-License-Identifier: Apache-2.0

//! Bookkeeping core for a log-shipping agent.
//!
//! * [`state`] identifies files and records how far each one has been read.
//! * [`ack`] tracks when the events of a work-unit are acknowledged by the
//!   output, so offsets are only persisted for delivered data.
//! * [`checkpoint`] applies acknowledged offsets and saves the state table
//!   through a [`registry::StateStore`].

pub mod ack;
pub mod bounded_channel;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod state;

pub use ack::{AckOutcome, EventAckHandler, EventAckTracker, TrackedEvent};
pub use error::{Error, Result};
pub use state::{FileInfo, FileState, FileStateOs, FileStates, StateIdentifier, Ttl};
