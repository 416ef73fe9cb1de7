// SPDX-License-Identifier: Apache-2.0

//! Platform file identity as seen by the OS.
//!
//! On Unix this is the inode and device number of the file, which stay stable
//! across renames. The record is opaque to the rest of the crate: identity
//! strategies only ever use its string rendering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque OS identity record for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileStateOs {
    inode: u64,
    device: u64,
}

impl FileStateOs {
    /// Create a record from raw values, used by probes and when restoring state.
    pub fn new(inode: u64, device: u64) -> Self {
        Self { inode, device }
    }
}

impl fmt::Display for FileStateOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.inode, self.device)
    }
}

/// Capability to probe the OS identity of a file from its metadata.
///
/// Returning `None` means the platform cannot provide an identity; identity
/// strategies then fall back to path based identity.
pub trait FileInfo {
    fn os_state(&self) -> Option<FileStateOs>;
}

impl FileInfo for std::fs::Metadata {
    #[cfg(unix)]
    fn os_state(&self) -> Option<FileStateOs> {
        use std::os::unix::fs::MetadataExt;

        Some(FileStateOs::new(self.ino(), self.dev()))
    }

    // Stable std does not expose the Windows file index through Metadata.
    #[cfg(not(unix))]
    fn os_state(&self) -> Option<FileStateOs> {
        None
    }
}

impl FileInfo for FileStateOs {
    fn os_state(&self) -> Option<FileStateOs> {
        Some(*self)
    }
}

impl FileInfo for Option<FileStateOs> {
    fn os_state(&self) -> Option<FileStateOs> {
        *self
    }
}
