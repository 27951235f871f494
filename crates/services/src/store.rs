//! Typed access to the device key-value store.
//!
//! Reads never fail: a missing, unreadable, or malformed value yields the
//! type's default and is logged. Writes report storage errors to the caller.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use progress_core::model::StorageKey;
use storage::mapping::{decode_json, encode_json};
use storage::repository::{KeyValueStore, StorageError};

#[derive(Clone)]
pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
}

impl LocalStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Raw stored text, or `None` if absent or unreadable.
    pub async fn read_raw(&self, key: &StorageKey) -> Option<String> {
        match self.kv.get_item(&key.as_key()).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(%key, error = %err, "local read failed");
                None
            }
        }
    }

    /// Decoded value, falling back to `T::default()`.
    pub async fn read_json<T: DeserializeOwned + Default>(&self, key: &StorageKey) -> T {
        self.read_json_opt(key).await.unwrap_or_default()
    }

    /// Decoded value, or `None` if absent or malformed.
    pub async fn read_json_opt<T: DeserializeOwned>(&self, key: &StorageKey) -> Option<T> {
        let raw = self.read_raw(key).await?;
        match decode_json(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(%key, error = %err, "malformed stored value, using default");
                None
            }
        }
    }

    /// # Errors
    ///
    /// Returns `StorageError` if encoding or the write fails.
    pub async fn write_json<T: Serialize + ?Sized>(
        &self,
        key: &StorageKey,
        value: &T,
    ) -> Result<(), StorageError> {
        let raw = encode_json(value)?;
        self.kv.set_item(&key.as_key(), &raw).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the removal fails.
    pub async fn remove(&self, key: &StorageKey) -> Result<(), StorageError> {
        self.kv.remove_item(&key.as_key()).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the removal fails.
    pub async fn remove_many(&self, keys: &[StorageKey]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }
        let raw: Vec<String> = keys.iter().map(|key| key.as_key().into_owned()).collect();
        self.kv.multi_remove(&raw).await
    }

    /// Every stored key this layer owns. Foreign keys are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the key listing fails.
    pub async fn owned_keys(&self) -> Result<Vec<StorageKey>, StorageError> {
        let keys = self.kv.get_all_keys().await?;
        Ok(keys.iter().filter_map(|raw| StorageKey::parse(raw)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{AttemptId, KeySlot};
    use storage::repository::InMemoryKeyValueStore;

    #[tokio::test]
    async fn malformed_values_read_as_default() {
        let kv = InMemoryKeyValueStore::new();
        kv.set_item(KeySlot::Shares.as_str(), "not json").await.unwrap();
        let store = LocalStore::new(Arc::new(kv));

        let shares: u64 = store.read_json(&KeySlot::Shares.into()).await;
        assert_eq!(shares, 0);
    }

    #[tokio::test]
    async fn owned_keys_skip_foreign_entries() {
        let kv = InMemoryKeyValueStore::new();
        kv.set_item("weather.station", "1").await.unwrap();
        kv.set_item("attempt:a1", "{}").await.unwrap();
        kv.set_item(KeySlot::StreakCount.as_str(), "3").await.unwrap();
        let store = LocalStore::new(Arc::new(kv));

        let keys = store.owned_keys().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&StorageKey::AttemptDetail(AttemptId::new("a1"))));
        assert!(keys.contains(&KeySlot::StreakCount.into()));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = LocalStore::new(Arc::new(InMemoryKeyValueStore::new()));
        let key = StorageKey::from(KeySlot::ReadIds);
        store.write_json(&key, &vec!["a", "b"]).await.unwrap();
        let ids: Vec<String> = store.read_json(&key).await;
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

        store.remove(&key).await.unwrap();
        assert!(store.read_raw(&key).await.is_none());
    }
}
