//! Durable key-value storage for feed state.
//!
//! Three logical stores share one backend: feed documents, alternate-body id
//! lists and seen mail ids. All are keyed by feed name and hold JSON values.

pub mod repo;
pub mod sqlite;

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

pub use repo::{KvStore, WriteBatch, WriteOp};
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreName {
    Feeds,
    Alternates,
    SeenMail,
}

impl StoreName {
    pub const ALL: [StoreName; 3] = [StoreName::Feeds, StoreName::Alternates, StoreName::SeenMail];

    pub fn as_str(self) -> &'static str {
        match self {
            StoreName::Feeds => "feeds",
            StoreName::Alternates => "alternates",
            StoreName::SeenMail => "seen_mail",
        }
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read and decode a JSON value. A decode failure is corruption, not absence.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    name: StoreName,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(name, key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                store: name,
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

pub fn to_json<T: Serialize>(name: StoreName, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Encode {
        store: name,
        source,
    })
}

pub fn write_json<T: Serialize>(
    store: &dyn KvStore,
    name: StoreName,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = to_json(name, value)?;
    store.put(name, key, &raw)
}
