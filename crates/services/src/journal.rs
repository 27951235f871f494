use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use progress_core::model::{
    AttemptId, AttemptIndexEntry, AttemptKind, AttemptRecord, KeySlot, StorageKey,
};
use storage::mapping::decode_attempt;
use storage::repository::StorageError;

use crate::store::LocalStore;

/// A journal index entry together with its resolved detail record.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    Resolved(AttemptRecord),
    /// The detail record is missing, unreadable, or describes a different attempt.
    Orphan(AttemptIndexEntry),
}

fn index_key() -> StorageKey {
    KeySlot::AttemptIndex.into()
}

fn detail_key(id: &AttemptId) -> StorageKey {
    StorageKey::AttemptDetail(id.clone())
}

/// Reviewable on-device copies of attempts: an `attemptIndex` listing plus
/// one `attempt:<id>` detail record per entry.
#[derive(Clone)]
pub struct AttemptJournal {
    store: LocalStore,
    cap: usize,
    lock: Arc<Mutex<()>>,
}

impl AttemptJournal {
    #[must_use]
    pub fn new(store: LocalStore, cap: usize) -> Self {
        Self {
            store,
            cap,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Store the detail record and prepend its index entry.
    ///
    /// Entries pushed past the cap lose their detail record too.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if either write fails.
    pub async fn save(&self, record: &AttemptRecord) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;

        self.store.write_json(&detail_key(&record.id), record).await?;

        let mut index = self.read_index().await;
        index.retain(|entry| entry.id != record.id);
        index.insert(0, AttemptIndexEntry::from_record(record));
        let evicted: Vec<StorageKey> = index
            .iter()
            .skip(self.cap)
            .map(|entry| detail_key(&entry.id))
            .collect();
        index.truncate(self.cap);

        self.store.write_json(&index_key(), &index).await?;
        if let Err(err) = self.store.remove_many(&evicted).await {
            tracing::warn!(error = %err, "failed to drop evicted attempt details");
        }
        Ok(())
    }

    /// Index entries (optionally only those of `kind`), resolved against their details.
    pub async fn load(&self, kind: Option<AttemptKind>) -> Vec<JournalEntry> {
        let _guard = self.lock.lock().await;

        let index = self.read_index().await;
        let mut entries = Vec::with_capacity(index.len());
        for entry in index {
            if kind.is_some_and(|kind| kind != entry.kind) {
                continue;
            }
            entries.push(self.resolve(entry).await);
        }
        entries
    }

    /// Remove `ids` from the index and delete their detail keys.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the index rewrite or detail removal fails.
    pub async fn prune(&self, ids: &[AttemptId]) -> Result<usize, StorageError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock.lock().await;

        let doomed: HashSet<&AttemptId> = ids.iter().collect();
        let mut index = self.read_index().await;
        let before = index.len();
        index.retain(|entry| !doomed.contains(&entry.id));
        let removed = before - index.len();

        self.store.write_json(&index_key(), &index).await?;
        let details: Vec<StorageKey> = ids.iter().map(detail_key).collect();
        self.store.remove_many(&details).await?;
        Ok(removed)
    }

    /// Delete the index and every detail record, including details the index
    /// no longer references.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the removal fails.
    pub async fn clear_all(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;

        let mut keys: Vec<StorageKey> = vec![index_key()];
        keys.extend(self.read_index().await.iter().map(|entry| detail_key(&entry.id)));
        match self.store.owned_keys().await {
            Ok(owned) => keys.extend(
                owned
                    .into_iter()
                    .filter(|key| matches!(key, StorageKey::AttemptDetail(_))),
            ),
            Err(err) => tracing::warn!(error = %err, "could not list keys, clearing indexed details only"),
        }
        keys.sort_by(|a, b| a.as_key().cmp(&b.as_key()));
        keys.dedup();
        self.store.remove_many(&keys).await
    }

    async fn read_index(&self) -> Vec<AttemptIndexEntry> {
        self.store.read_json(&index_key()).await
    }

    async fn resolve(&self, entry: AttemptIndexEntry) -> JournalEntry {
        let Some(raw) = self.store.read_raw(&detail_key(&entry.id)).await else {
            tracing::debug!(id = %entry.id, "attempt detail missing");
            return JournalEntry::Orphan(entry);
        };
        match decode_attempt(&raw, entry.kind) {
            Ok(record) if entry.resolves_to(&record) => JournalEntry::Resolved(record),
            Ok(_) => {
                tracing::debug!(id = %entry.id, "attempt detail does not match its index entry");
                JournalEntry::Orphan(entry)
            }
            Err(err) => {
                tracing::debug!(id = %entry.id, error = %err, "attempt detail unreadable");
                JournalEntry::Orphan(entry)
            }
        }
    }
}
