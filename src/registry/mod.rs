// SPDX-License-Identifier: Apache-2.0

//! Persisted form of the file state table.

mod schema;
mod store;

pub use schema::{REGISTRY_VERSION, RegistrySnapshot};
pub use store::{MemoryStore, StateStore};
