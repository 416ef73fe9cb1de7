// SPDX-License-Identifier: Apache-2.0

//! Identity strategies for file states.
//!
//! A strategy is chosen once when an input is configured and then derives the
//! `id` of every state that input creates. Strategies never fail: when the
//! information a strategy needs is missing they degrade to a weaker strategy
//! and report the name of the one actually used.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use super::file_state::FileState;

pub const NATIVE_IDENTIFIER: &str = "native";
pub const PATH_IDENTIFIER: &str = "path";
pub const FINGERPRINT_IDENTIFIER: &str = "fingerprint";
pub const INODE_MARKER_IDENTIFIER: &str = "inode_marker";

/// Number of hex characters of the meta hash appended to ids.
const META_HASH_LEN: usize = 16;

/// Strategy used to derive a stable identifier for a file state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StateIdentifier {
    /// OS identity (inode and device). Falls back to `Path`.
    #[default]
    Native,
    /// The file path.
    Path,
    /// SHA-256 of `length` bytes starting at `offset`. Falls back to `Path`.
    Fingerprint { offset: u64, length: usize },
    /// OS identity combined with the contents of a marker file that
    /// distinguishes devices whose inodes get reused. Falls back to `Native`.
    InodeMarker { marker_path: PathBuf },
}

impl StateIdentifier {
    /// Name of the configured strategy.
    pub fn name(&self) -> &'static str {
        match self {
            StateIdentifier::Native => NATIVE_IDENTIFIER,
            StateIdentifier::Path => PATH_IDENTIFIER,
            StateIdentifier::Fingerprint { .. } => FINGERPRINT_IDENTIFIER,
            StateIdentifier::InodeMarker { .. } => INODE_MARKER_IDENTIFIER,
        }
    }

    /// Derive `(id, identifier_name)` for a candidate state.
    ///
    /// The returned name is the strategy that produced the id, which differs
    /// from [`StateIdentifier::name`] when a fallback was used.
    pub fn generate_id(&self, state: &FileState) -> (String, &'static str) {
        match self {
            StateIdentifier::Native => native_id(state),
            StateIdentifier::Path => path_id(state),
            StateIdentifier::Fingerprint { offset, length } => {
                match fingerprint(Path::new(state.source()), *offset, *length) {
                    Ok(hash) => (hash, FINGERPRINT_IDENTIFIER),
                    Err(e) => {
                        debug!(
                            source = state.source(),
                            error = %e,
                            "Fingerprint unavailable, falling back to path identity"
                        );
                        path_id(state)
                    }
                }
            }
            StateIdentifier::InodeMarker { marker_path } => {
                let Some(os_state) = state.file_state_os() else {
                    return native_id(state);
                };
                match std::fs::read_to_string(marker_path) {
                    Ok(marker) => (
                        with_meta(
                            format!("{}-{}", os_state, marker.trim()),
                            state.meta(),
                        ),
                        INODE_MARKER_IDENTIFIER,
                    ),
                    Err(e) => {
                        debug!(
                            marker = ?marker_path,
                            error = %e,
                            "Inode marker unreadable, falling back to native identity"
                        );
                        native_id(state)
                    }
                }
            }
        }
    }
}

fn native_id(state: &FileState) -> (String, &'static str) {
    match state.file_state_os() {
        Some(os_state) => (
            with_meta(os_state.to_string(), state.meta()),
            NATIVE_IDENTIFIER,
        ),
        None => {
            debug!(
                source = state.source(),
                "OS identity unavailable, falling back to path identity"
            );
            path_id(state)
        }
    }
}

fn path_id(state: &FileState) -> (String, &'static str) {
    (
        with_meta(state.source().to_string(), state.meta()),
        PATH_IDENTIFIER,
    )
}

/// Suffix `id` with a hash of the meta entries, so the same file read with
/// different meta gets tracked separately.
fn with_meta(id: String, meta: Option<&HashMap<String, String>>) -> String {
    let Some(meta) = meta else {
        return id;
    };

    let mut entries: Vec<_> = meta.iter().collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for (k, v) in entries {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"\n");
    }
    let digest = format!("{:x}", hasher.finalize());

    format!("{}-{}", id, &digest[..META_HASH_LEN])
}

/// Hash the content window `[offset, offset + length)` of a file.
///
/// Files too short to fill the window are reported as `UnexpectedEof`.
fn fingerprint(path: &Path, offset: u64, length: usize) -> io::Result<String> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut hasher = Sha256::new();
    let copied = io::copy(&mut file.take(length as u64), &mut hasher)?;
    if copied < length as u64 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("file holds {} of {} fingerprint bytes", copied, length),
        ));
    }

    Ok(format!("{:x}", hasher.finalize()))
}
