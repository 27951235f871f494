use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use progress_core::model::{CompletionCount, CompletionDomain, CompletionSet, KeySlot, StorageKey};

use crate::store::LocalStore;

/// Result of `CompletionTracker::mark_complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionChange {
    Added,
    AlreadyComplete,
    /// The pair was new but the updated set could not be written.
    NotPersisted,
}

fn domain_key(domain: CompletionDomain) -> StorageKey {
    KeySlot::Completed(domain).into()
}

/// Idempotent record of (category, sub-level) pairs finished with a perfect
/// score. Callers decide when a pair qualifies.
#[derive(Clone)]
pub struct CompletionTracker {
    store: LocalStore,
    lock: Arc<Mutex<()>>,
}

impl CompletionTracker {
    #[must_use]
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn mark_complete(
        &self,
        domain: CompletionDomain,
        category: &str,
        sub_level: &str,
    ) -> CompletionChange {
        let _guard = self.lock.lock().await;

        let mut set = self.snapshot_unlocked(domain).await;
        if !set.mark(category, sub_level) {
            return CompletionChange::AlreadyComplete;
        }
        match self.store.write_json(&domain_key(domain), &set).await {
            Ok(()) => CompletionChange::Added,
            Err(err) => {
                tracing::warn!(%domain, category, sub_level, error = %err, "failed to persist completion");
                CompletionChange::NotPersisted
            }
        }
    }

    pub async fn count_completed(&self, domain: CompletionDomain) -> CompletionCount {
        self.snapshot(domain).await.count()
    }

    /// Current completion set for `domain`; empty when absent or malformed.
    pub async fn snapshot(&self, domain: CompletionDomain) -> CompletionSet {
        let _guard = self.lock.lock().await;
        self.snapshot_unlocked(domain).await
    }

    /// Holds off every mark until the guard drops.
    pub(crate) async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    async fn snapshot_unlocked(&self, domain: CompletionDomain) -> CompletionSet {
        self.store.read_json(&domain_key(domain)).await
    }
}
