//! Durable key-value storage for transcripts, chat logs and accounts.
//!
//! The session controller only talks to [`PersistenceBackend`], so the
//! in-memory map, the local JSON files and the remote object store are
//! interchangeable. Writes are last-writer-wins: two processes acting as the
//! same user may silently overwrite each other's turns.

mod file;
mod memory;
mod object;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use object::{ObjectStore, ObjectStoreConfig};

/// A durable key-value store.
///
/// Keys are `/`-separated segments made of ASCII letters, digits, `.`, `_`
/// and `-` (see [`validate_key`]).
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    async fn save(&self, key: &str, value: &Value) -> Result<(), StoreError>;

    /// Loads the value under `key`, or `None` if it was never saved.
    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;
}

#[async_trait]
impl<B: PersistenceBackend + ?Sized> PersistenceBackend for Arc<B> {
    #[inline]
    async fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        (**self).save(key, value).await
    }

    #[inline]
    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).load(key).await
    }
}

#[async_trait]
impl<B: PersistenceBackend + ?Sized> PersistenceBackend for Box<B> {
    #[inline]
    async fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        (**self).save(key, value).await
    }

    #[inline]
    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).load(key).await
    }
}

/// Key of a user's active transcript.
///
/// Session records live under `sessions/` and accounts under `accounts/`, so
/// no user name can reach another user's records.
#[inline]
pub fn transcript_key(user: &str) -> String {
    format!("sessions/{user}/transcript")
}

/// Key of a user's chat log archive.
#[inline]
pub fn archive_key(user: &str) -> String {
    format!("sessions/{user}/archive")
}

/// Key of an account record.
#[inline]
pub fn account_key(username: &str) -> String {
    format!("accounts/{username}")
}

/// Returns `true` if `segment` can be used as one key segment, e.g. a
/// user name.
pub fn is_valid_key_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Checks that `key` maps safely onto file paths and object names.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.split('/').all(is_valid_key_segment) {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_owned()))
    }
}

/// Serializes `value` and saves it under `key`.
pub async fn save_json<B, T>(
    backend: &B,
    key: &str,
    value: &T,
) -> Result<(), StoreError>
where
    B: PersistenceBackend + ?Sized,
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value).map_err(|source| {
        StoreError::Serialization {
            key: key.to_owned(),
            source,
        }
    })?;
    backend.save(key, &value).await
}

/// Loads the value under `key` and deserializes it.
pub async fn load_json<B, T>(
    backend: &B,
    key: &str,
) -> Result<Option<T>, StoreError>
where
    B: PersistenceBackend + ?Sized,
    T: DeserializeOwned,
{
    let Some(value) = backend.load(key).await? else {
        return Ok(None);
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| StoreError::Serialization {
            key: key.to_owned(),
            source,
        })
}
