// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};

use super::schema::RegistrySnapshot;
use crate::error::Result;
use crate::state::FileState;

/// Durable storage for file states.
///
/// Implementations must keep ids exactly as given; `finished` is not
/// persisted and restored states start unfinished.
pub trait StateStore: Send {
    /// Read the last saved states. An empty store yields no states.
    fn load(&mut self) -> Result<Vec<FileState>>;

    /// Replace the saved states.
    fn save(&mut self, states: &[FileState]) -> Result<()>;
}

/// Store keeping the serialized snapshot in memory.
///
/// Clones share the same snapshot.
#[derive(Clone, Default)]
pub struct MemoryStore {
    snapshot: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw JSON of the last save, if any.
    pub fn raw(&self) -> Option<String> {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl StateStore for MemoryStore {
    fn load(&mut self) -> Result<Vec<FileState>> {
        match self.raw() {
            Some(json) => Ok(RegistrySnapshot::from_json(&json)?.states),
            None => Ok(Vec::new()),
        }
    }

    fn save(&mut self, states: &[FileState]) -> Result<()> {
        let json = RegistrySnapshot::new(states.to_vec()).to_json()?;
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Some(json);
        Ok(())
    }
}
