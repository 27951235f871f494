use std::sync::Arc;

use tokio::sync::Mutex;

use progress_core::model::{AttemptKind, AttemptRecord, FallbackBucket, KeySlot, StorageKey};
use storage::mapping::decode_attempt_rows;
use storage::repository::StorageError;

use crate::store::LocalStore;

/// One single-writer lock per bucket so concurrent appends cannot overwrite each other.
#[derive(Default)]
struct BucketLocks {
    disaster: Mutex<()>,
    first_aid: Mutex<()>,
    everyday_first_aid: Mutex<()>,
}

impl BucketLocks {
    fn for_bucket(&self, bucket: FallbackBucket) -> &Mutex<()> {
        match bucket {
            FallbackBucket::Disaster => &self.disaster,
            FallbackBucket::FirstAid => &self.first_aid,
            FallbackBucket::EverydayFirstAid => &self.everyday_first_aid,
        }
    }
}

fn bucket_key(bucket: FallbackBucket) -> StorageKey {
    KeySlot::Fallback(bucket).into()
}

/// Bounded, most-recent-first fallback buckets of attempts that missed the remote store.
///
/// Clones share the same locks.
#[derive(Clone)]
pub struct LocalAttemptStore {
    store: LocalStore,
    cap: usize,
    locks: Arc<BucketLocks>,
}

impl LocalAttemptStore {
    #[must_use]
    pub fn new(store: LocalStore, cap: usize) -> Self {
        Self {
            store,
            cap,
            locks: Arc::new(BucketLocks::default()),
        }
    }

    /// Prepend `record` to its kind's bucket, dropping the oldest rows beyond the cap.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the bucket cannot be written.
    pub async fn append(&self, kind: AttemptKind, record: AttemptRecord) -> Result<(), StorageError> {
        let bucket = FallbackBucket::for_kind(kind);
        let _guard = self.locks.for_bucket(bucket).lock().await;

        let mut rows = self.read_bucket(bucket).await;
        rows.insert(0, record);
        rows.truncate(self.cap);
        self.store.write_json(&bucket_key(bucket), &rows).await
    }

    /// Rows of `kind`'s current bucket, most recent first.
    pub async fn get(&self, kind: AttemptKind) -> Vec<AttemptRecord> {
        self.get_bucket(FallbackBucket::for_kind(kind)).await
    }

    /// Rows of a single bucket, including the legacy one.
    pub async fn get_bucket(&self, bucket: FallbackBucket) -> Vec<AttemptRecord> {
        let _guard = self.locks.for_bucket(bucket).lock().await;
        self.read_bucket(bucket).await
    }

    /// Delete `kind`'s current bucket.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the removal fails.
    pub async fn clear(&self, kind: AttemptKind) -> Result<(), StorageError> {
        self.clear_bucket(FallbackBucket::for_kind(kind)).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the removal fails.
    pub async fn clear_bucket(&self, bucket: FallbackBucket) -> Result<(), StorageError> {
        let _guard = self.locks.for_bucket(bucket).lock().await;
        self.store.remove(&bucket_key(bucket)).await
    }

    /// Delete every bucket, legacy included. Stops at the first failure.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any removal fails.
    pub async fn clear_all(&self) -> Result<(), StorageError> {
        for bucket in FallbackBucket::ALL {
            self.clear_bucket(bucket).await?;
        }
        Ok(())
    }

    async fn read_bucket(&self, bucket: FallbackBucket) -> Vec<AttemptRecord> {
        let key = bucket_key(bucket);
        let Some(raw) = self.store.read_raw(&key).await else {
            return Vec::new();
        };
        match decode_attempt_rows(&raw, bucket.kind()) {
            Ok(mut rows) => {
                rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                rows
            }
            Err(err) => {
                tracing::warn!(%key, error = %err, "malformed fallback bucket, treating as empty");
                Vec::new()
            }
        }
    }
}
