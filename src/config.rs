// SPDX-License-Identifier: Apache-2.0

//! Configuration for file state tracking.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::state::{StateIdentifier, Ttl};

/// Which identity strategy an input uses for its files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileIdentity {
    /// Inode and device number
    #[default]
    Native,
    /// File path
    Path,
    /// Hash of a window of the file content
    Fingerprint,
    /// Inode and device number plus the contents of a marker file
    InodeMarker,
}

/// Content window hashed by the fingerprint strategy
#[derive(Debug, Clone, Deserialize)]
pub struct FingerprintConfig {
    /// Bytes to skip before the window
    #[serde(default)]
    pub offset: u64,

    /// Size of the window in bytes
    #[serde(default = "default_fingerprint_length")]
    pub length: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            offset: 0,
            length: default_fingerprint_length(),
        }
    }
}

/// Configuration for tracking file states of one input
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// Identity strategy for new file states
    #[serde(default)]
    pub file_identity: FileIdentity,

    /// Fingerprint window (when file_identity is fingerprint)
    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    /// Marker file path (when file_identity is inode_marker)
    #[serde(default)]
    pub inode_marker_path: Option<PathBuf>,

    /// Seconds a finished state is kept before removal; unset keeps it forever
    #[serde(default)]
    pub clean_inactive_secs: Option<u64>,

    /// How often acknowledged offsets are checkpointed (in milliseconds)
    #[serde(default = "default_checkpoint_interval_ms")]
    pub checkpoint_interval_ms: u64,

    /// How long to keep draining acknowledgements on shutdown (in milliseconds)
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// How long checkpoints may keep failing before giving up (in milliseconds)
    #[serde(default = "default_max_checkpoint_failure_ms")]
    pub max_checkpoint_failure_ms: u64,
}

const MIN_FINGERPRINT_LENGTH: usize = 64;

fn default_fingerprint_length() -> usize {
    1024
}

fn default_checkpoint_interval_ms() -> u64 {
    1000
}

fn default_drain_timeout_ms() -> u64 {
    2000
}

fn default_max_checkpoint_failure_ms() -> u64 {
    60_000
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            file_identity: FileIdentity::default(),
            fingerprint: FingerprintConfig::default(),
            inode_marker_path: None,
            clean_inactive_secs: None,
            checkpoint_interval_ms: default_checkpoint_interval_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            max_checkpoint_failure_ms: default_max_checkpoint_failure_ms(),
        }
    }
}

impl StateConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.file_identity {
            FileIdentity::Fingerprint if self.fingerprint.length < MIN_FINGERPRINT_LENGTH => {
                return Err(Error::Config(format!(
                    "fingerprint.length must be at least {} bytes",
                    MIN_FINGERPRINT_LENGTH
                )));
            }
            FileIdentity::InodeMarker if self.inode_marker_path.is_none() => {
                return Err(Error::Config(
                    "inode_marker_path must be set when file_identity is 'inode_marker'"
                        .to_string(),
                ));
            }
            _ => {}
        }

        if self.checkpoint_interval_ms == 0 {
            return Err(Error::Config(
                "checkpoint_interval_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the identity strategy for this input.
    pub fn identifier(&self) -> Result<StateIdentifier> {
        self.validate()?;

        Ok(match self.file_identity {
            FileIdentity::Native => StateIdentifier::Native,
            FileIdentity::Path => StateIdentifier::Path,
            FileIdentity::Fingerprint => StateIdentifier::Fingerprint {
                offset: self.fingerprint.offset,
                length: self.fingerprint.length,
            },
            FileIdentity::InodeMarker => StateIdentifier::InodeMarker {
                // validate() guarantees the path is set
                marker_path: self.inode_marker_path.clone().unwrap_or_default(),
            },
        })
    }

    /// Retention for states created by this input
    pub fn ttl(&self) -> Ttl {
        match self.clean_inactive_secs {
            Some(secs) => Ttl::After(Duration::from_secs(secs)),
            None => Ttl::Infinite,
        }
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn max_checkpoint_failure(&self) -> Duration {
        Duration::from_millis(self.max_checkpoint_failure_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = StateConfig::default();
        assert_eq!(config.file_identity, FileIdentity::Native);
        assert_eq!(config.fingerprint.length, 1024);
        assert_eq!(config.checkpoint_interval(), Duration::from_secs(1));
        assert_eq!(config.drain_timeout(), Duration::from_secs(2));
        assert_eq!(config.ttl(), Ttl::Infinite);
        assert_eq!(config.identifier().unwrap(), StateIdentifier::Native);
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: StateConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.file_identity, FileIdentity::Native);
        assert_eq!(config.checkpoint_interval_ms, 1000);
        assert_eq!(config.max_checkpoint_failure(), Duration::from_secs(60));
    }

    #[test]
    fn test_deserialize_fingerprint() {
        let config: StateConfig = serde_json::from_str(
            r#"{
                "file_identity": "fingerprint",
                "fingerprint": { "offset": 16, "length": 256 },
                "clean_inactive_secs": 3600
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.identifier().unwrap(),
            StateIdentifier::Fingerprint {
                offset: 16,
                length: 256
            }
        );
        assert_eq!(config.ttl(), Ttl::After(Duration::from_secs(3600)));
    }

    #[test]
    fn test_config_validation() {
        let mut config = StateConfig {
            file_identity: FileIdentity::Fingerprint,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.fingerprint.length = 8;
        assert!(config.validate().is_err());

        config.file_identity = FileIdentity::InodeMarker;
        assert!(config.identifier().is_err());

        config.inode_marker_path = Some(PathBuf::from("/var/lib/marker"));
        assert_eq!(
            config.identifier().unwrap(),
            StateIdentifier::InodeMarker {
                marker_path: PathBuf::from("/var/lib/marker")
            }
        );

        config.checkpoint_interval_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_identity_rejected() {
        let res: std::result::Result<StateConfig, _> =
            serde_json::from_str(r#"{ "file_identity": "magic" }"#);
        assert!(res.is_err());
    }
}
