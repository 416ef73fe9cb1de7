// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Acknowledged {requested} events but only {outstanding} are outstanding")]
    AckOverflow { requested: usize, outstanding: usize },

    #[error("Unsupported registry snapshot version: {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown file state: {0}")]
    UnknownState(String),

    #[error("Channel send error")]
    ChannelSend,
}

pub type Result<T> = std::result::Result<T, Error>;
