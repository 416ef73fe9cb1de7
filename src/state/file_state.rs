// SPDX-License-Identifier: Apache-2.0

//! The shipping state of a single tracked file.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use super::identifier::StateIdentifier;
use super::os_state::{FileInfo, FileStateOs};

/// How long a state is retained once its file is no longer observed.
///
/// Serialized as signed nanoseconds, with `-1` meaning infinite retention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Ttl {
    /// Never expire.
    #[default]
    Infinite,
    /// Expire once finished and not updated for this long. Zero expires
    /// as soon as the state is finished.
    After(Duration),
}

impl From<i64> for Ttl {
    fn from(nanos: i64) -> Self {
        if nanos < 0 {
            Ttl::Infinite
        } else {
            Ttl::After(Duration::from_nanos(nanos as u64))
        }
    }
}

impl From<Ttl> for i64 {
    fn from(ttl: Ttl) -> Self {
        match ttl {
            Ttl::Infinite => -1,
            Ttl::After(d) => d.as_nanos().min(i64::MAX as u128) as i64,
        }
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ttl::Infinite => write!(f, "infinite"),
            Ttl::After(d) => write!(f, "{:?}", d),
        }
    }
}

/// What the agent knows about one logical file at one point in time.
///
/// Two states refer to the same file iff their ids are equal, see
/// [`FileState::is_equal`]. The id is fixed at construction; an identity
/// change produces a new state through [`FileState::superseded_by`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileState {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prev_id: Option<String>,
    /// True once no reader is tailing the file. Never persisted.
    #[serde(skip)]
    pub finished: bool,
    source: String,
    offset: u64,
    pub timestamp: DateTime<Utc>,
    pub ttl: Ttl,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_meta"
    )]
    meta: Option<HashMap<String, String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_meta"
    )]
    ad_meta: Option<HashMap<String, String>>,
    #[serde(default)]
    file_state_os: Option<FileStateOs>,
    identifier_name: String,
}

fn deserialize_meta<'de, D>(deserializer: D) -> Result<Option<HashMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let meta = Option::<HashMap<String, String>>::deserialize(deserializer)?;
    Ok(meta.filter(|m| !m.is_empty()))
}

impl FileState {
    /// Create the state of a newly discovered file.
    ///
    /// This is the only way to obtain a fresh id: the OS identity is probed
    /// from `info` and `identifier` derives the id from the candidate state.
    /// An empty `meta` is stored as absent.
    pub fn new<I>(
        info: &I,
        source: impl Into<String>,
        kind: impl Into<String>,
        meta: impl Into<Option<HashMap<String, String>>>,
        identifier: &StateIdentifier,
    ) -> Self
    where
        I: FileInfo + ?Sized,
    {
        let mut state = Self {
            id: String::new(),
            prev_id: None,
            finished: false,
            source: source.into(),
            offset: 0,
            timestamp: Utc::now(),
            ttl: Ttl::Infinite,
            kind: kind.into(),
            meta: meta.into().filter(|m| !m.is_empty()),
            ad_meta: None,
            file_state_os: info.os_state(),
            identifier_name: String::new(),
        };

        let (id, identifier_name) = identifier.generate_id(&state);
        state.id = id;
        state.identifier_name = identifier_name.to_string();
        state
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the state this one superseded, if any.
    pub fn prev_id(&self) -> Option<&str> {
        self.prev_id.as_deref()
    }

    /// Path of the file when it was last observed. Informational only.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Record a new path for the file, e.g. after a rename.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn meta(&self) -> Option<&HashMap<String, String>> {
        self.meta.as_ref()
    }

    pub fn ad_meta(&self) -> Option<&HashMap<String, String>> {
        self.ad_meta.as_ref()
    }

    pub fn file_state_os(&self) -> Option<FileStateOs> {
        self.file_state_os
    }

    /// Name of the strategy that produced the id.
    pub fn identifier_name(&self) -> &str {
        &self.identifier_name
    }

    /// Whether both states point to the same file. Only the ids are compared.
    pub fn is_equal(&self, other: &FileState) -> bool {
        self.id == other.id
    }

    /// Set a single ADMeta entry, replacing any previous value for `key`.
    pub fn set_ad_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.ad_meta
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
    }

    /// Copy the ADMeta entries of `other` that are missing from this state.
    /// Existing keys are never overwritten.
    pub fn add_ad_meta(&mut self, other: &FileState) {
        let Some(source) = other.ad_meta.as_ref() else {
            return;
        };

        for (k, v) in source {
            let target = self.ad_meta.get_or_insert_with(HashMap::new);
            if !target.contains_key(k) {
                target.insert(k.clone(), v.clone());
            }
        }
    }

    /// Move the read position forward and refresh the timestamp.
    ///
    /// Offsets never move backwards for the same file; use
    /// [`FileState::reset_offset`] when the content was replaced.
    pub fn advance_offset(&mut self, offset: u64) {
        debug_assert!(
            offset >= self.offset,
            "offset regression for {}: {} -> {}",
            self.id,
            self.offset,
            offset
        );
        if offset < self.offset {
            warn!(
                id = %self.id,
                current = self.offset,
                requested = offset,
                "Ignoring offset regression"
            );
            return;
        }

        self.offset = offset;
        self.timestamp = Utc::now();
    }

    /// Restart reading from the beginning, e.g. after truncation.
    pub fn reset_offset(&mut self) {
        self.offset = 0;
        self.timestamp = Utc::now();
    }

    /// Re-run identity and return the state that replaces this one when the
    /// id or strategy changed. The replacement keeps the read position and
    /// records this state's id as its `prev_id`.
    pub fn superseded_by(&self, identifier: &StateIdentifier) -> Option<FileState> {
        let (id, identifier_name) = identifier.generate_id(self);
        if id == self.id && identifier_name == self.identifier_name {
            return None;
        }

        info!(
            prev_id = %self.id,
            id = %id,
            prev_identifier = %self.identifier_name,
            identifier = identifier_name,
            source = %self.source,
            "File identity changed, migrating state"
        );

        let mut next = self.clone();
        next.prev_id = Some(self.id.clone());
        next.id = id;
        next.identifier_name = identifier_name.to_string();
        Some(next)
    }

    /// Whether the state may be dropped from the registry at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if !self.finished {
            return false;
        }

        match self.ttl {
            Ttl::Infinite => false,
            Ttl::After(ttl) => {
                let idle = (now - self.timestamp).to_std().unwrap_or(Duration::ZERO);
                idle >= ttl
            }
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FileState {{ id: {}, prev_id: {:?}, finished: {}, source: {}, offset: {}, \
             timestamp: {}, ttl: {}, type: {}, meta: {:?}, file_state_os: {:?}, \
             identifier: {}, ad_meta: {:?} }}",
            self.id,
            self.prev_id,
            self.finished,
            self.source,
            self.offset,
            self.timestamp.to_rfc3339(),
            self.ttl,
            self.kind,
            self.meta,
            self.file_state_os,
            self.identifier_name,
            self.ad_meta,
        )
    }
}
