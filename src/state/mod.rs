// SPDX-License-Identifier: Apache-2.0

//! File identity and shipping state.
//!
//! A [`FileState`] records how far a file has been read. Its id comes from a
//! [`StateIdentifier`] strategy and stays stable across renames and restarts
//! as long as the strategy's inputs do.

mod file_state;
mod identifier;
mod os_state;
mod states;

pub use file_state::{FileState, Ttl};
pub use identifier::{
    FINGERPRINT_IDENTIFIER, INODE_MARKER_IDENTIFIER, NATIVE_IDENTIFIER, PATH_IDENTIFIER,
    StateIdentifier,
};
pub use os_state::{FileInfo, FileStateOs};
pub use states::FileStates;
