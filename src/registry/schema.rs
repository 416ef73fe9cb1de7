// SPDX-License-Identifier: Apache-2.0

//! Versioned snapshot format for persisted file states.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::state::FileState;

/// Current schema version for registry snapshots
pub const REGISTRY_VERSION: u8 = 1;

/// All file states known at checkpoint time
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Schema version (always 1 for this format)
    pub version: u8,
    pub states: Vec<FileState>,
}

impl RegistrySnapshot {
    pub fn new(states: Vec<FileState>) -> Self {
        Self {
            version: REGISTRY_VERSION,
            states,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a snapshot, rejecting versions this crate does not understand.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let version = value
            .get("version")
            .and_then(|v| v.as_u64())
            .and_then(|v| u8::try_from(v).ok())
            .unwrap_or(0);
        if version != REGISTRY_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FileStateOs, StateIdentifier};

    fn state(inode: u64, offset: u64) -> FileState {
        let mut s = FileState::new(
            &FileStateOs::new(inode, 9),
            format!("/var/log/{}.log", inode),
            "log",
            None,
            &StateIdentifier::Native,
        );
        s.advance_offset(offset);
        s
    }

    #[test]
    fn test_snapshot_json_layout() {
        let snapshot = RegistrySnapshot::new(vec![state(1, 500)]);
        let json: serde_json::Value =
            serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();

        assert_eq!(json["version"], 1);
        let entry = &json["states"][0];
        assert_eq!(entry["id"], "1-9");
        assert_eq!(entry["offset"], 500);
        assert_eq!(entry["ttl"], -1);
        assert_eq!(entry["type"], "log");
        assert_eq!(entry["identifier_name"], "native");
        assert!(entry.get("finished").is_none());
        assert!(entry.get("meta").is_none());
    }

    #[test]
    fn test_snapshot_restore() {
        let snapshot = RegistrySnapshot::new(vec![state(1, 500), state(2, 1000)]);
        let restored = RegistrySnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();

        assert_eq!(restored.version, REGISTRY_VERSION);
        assert_eq!(restored.states.len(), 2);
        let second = restored.states.iter().find(|s| s.id() == "2-9").unwrap();
        assert_eq!(second.offset(), 1000);
    }

    #[test]
    fn test_unsupported_version() {
        let err = RegistrySnapshot::from_json(r#"{"version": 2, "states": []}"#).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(2)));

        let err = RegistrySnapshot::from_json(r#"{"states": []}"#).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(0)));
    }

    #[test]
    fn test_malformed_json() {
        let err = RegistrySnapshot::from_json("not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
