use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{PersistenceBackend, validate_key};
use crate::error::StoreError;

/// A store that lives as long as the process, for sessions without
/// durable history.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

#[async_trait]
impl PersistenceBackend for MemoryStore {
    async fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        validate_key(key)?;
        self.values
            .write()
            .await
            .insert(key.to_owned(), value.clone());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;
        Ok(self.values.read().await.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_last_writer_wins() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);
        store.save("alice/transcript", &json!([1])).await.unwrap();
        store.save("alice/transcript", &json!([2])).await.unwrap();
        assert_eq!(
            store.load("alice/transcript").await.unwrap(),
            Some(json!([2]))
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let store = MemoryStore::new();
        let err = store.load("../secret").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }
}
