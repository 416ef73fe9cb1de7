// SPDX-License-Identifier: Apache-2.0

//! Shared in-memory table of file states.
//!
//! Harvesters update the table while the registry reads snapshots of it, so
//! every access goes through a mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::file_state::FileState;
use crate::error::{Error, Result};

/// Cloneable handle to the state table, keyed by state id.
#[derive(Clone, Default)]
pub struct FileStates {
    inner: Arc<Mutex<HashMap<String, FileState>>>,
}

impl FileStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from restored states.
    pub fn from_states(states: impl IntoIterator<Item = FileState>) -> Self {
        let table = states
            .into_iter()
            .map(|s| (s.id().to_string(), s))
            .collect();
        Self {
            inner: Arc::new(Mutex::new(table)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, FileState>> {
        // Entries are replaced whole, so a poisoned table is still consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace the state with the same id.
    ///
    /// ADMeta already known for the id is merged into the new state without
    /// overwriting its keys. A state carrying `prev_id` retires the entry it
    /// superseded, taking over that entry's ADMeta the same way.
    pub fn update(&self, mut state: FileState) {
        let mut table = self.lock();
        if let Some(existing) = table.get(state.id()) {
            state.add_ad_meta(existing);
        }
        if let Some(prev) = state.prev_id().filter(|prev| *prev != state.id()) {
            if let Some(superseded) = table.remove(prev) {
                debug!(
                    id = state.id(),
                    prev_id = prev,
                    "Retiring superseded file state"
                );
                state.add_ad_meta(&superseded);
            }
        }
        table.insert(state.id().to_string(), state);
    }

    pub fn find(&self, id: &str) -> Option<FileState> {
        self.lock().get(id).cloned()
    }

    /// Find the stored state for `state`, following `prev_id` when the
    /// identity changed since the state was stored.
    pub fn find_previous(&self, state: &FileState) -> Option<FileState> {
        let table = self.lock();
        table
            .get(state.id())
            .or_else(|| state.prev_id().and_then(|prev| table.get(prev)))
            .cloned()
    }

    /// Advance the stored offset for `id`.
    ///
    /// Work-units may be acknowledged out of order, so an offset behind the
    /// stored one is ignored.
    pub fn advance_offset(&self, id: &str, offset: u64) -> Result<()> {
        let mut table = self.lock();
        let state = table
            .get_mut(id)
            .ok_or_else(|| Error::UnknownState(id.to_string()))?;
        if offset < state.offset() {
            debug!(
                id = %id,
                current = state.offset(),
                offset,
                "Ignoring stale offset"
            );
            return Ok(());
        }
        state.advance_offset(offset);
        Ok(())
    }

    /// Mark whether a reader is still tailing the file.
    pub fn set_finished(&self, id: &str, finished: bool) -> Result<()> {
        let mut table = self.lock();
        let state = table
            .get_mut(id)
            .ok_or_else(|| Error::UnknownState(id.to_string()))?;
        state.finished = finished;
        Ok(())
    }

    /// Drop every state that expired at `now`, returning how many were removed.
    pub fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let mut table = self.lock();
        let before = table.len();
        table.retain(|id, state| {
            let expired = state.is_expired(now);
            if expired {
                debug!(id = %id, source = state.source(), "Removing expired file state");
            }
            !expired
        });
        before - table.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of all states, for persisting.
    pub fn snapshot(&self) -> Vec<FileState> {
        self.lock().values().cloned().collect()
    }
}
