use std::sync::Arc;

use progress_core::model::{KeySlot, StorageKey, SuppressionToken, WipeMarker};
use progress_core::time::Clock;
use storage::repository::{AttemptFilter, IdentityProvider, RemoteAttemptStore, StorageError};

use crate::completion::CompletionTracker;
use crate::config::ProgressConfig;
use crate::counters::CounterStore;
use crate::error::ProgressServiceError;
use crate::journal::AttemptJournal;
use crate::local_attempts::LocalAttemptStore;
use crate::store::LocalStore;

/// How the remote half of a wipe ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteWipe {
    Deleted(u64),
    /// No signed-in user, so there was nothing to delete remotely.
    Skipped,
    Failed(String),
}

/// Outcome of `WipeCoordinator::wipe_all`. The two halves are independent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WipeReport {
    /// Pass into progress requests to keep them local-only until it expires.
    pub token: SuppressionToken,
    /// `None` when every local key was removed.
    pub local_error: Option<String>,
    pub remote: RemoteWipe,
}

impl WipeReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.local_error.is_none() && !matches!(self.remote, RemoteWipe::Failed(_))
    }
}

/// Every local writer a wipe clears. Built from the same instances the
/// other services use so the wipe waits on their locks.
#[derive(Clone)]
pub struct LocalWriters {
    pub store: LocalStore,
    pub attempts: LocalAttemptStore,
    pub journal: AttemptJournal,
    pub completion: CompletionTracker,
    pub counters: CounterStore,
}

/// Resets all progress, locally and remotely, without a transaction.
#[derive(Clone)]
pub struct WipeCoordinator {
    clock: Clock,
    local: LocalWriters,
    remote: Arc<dyn RemoteAttemptStore>,
    identity: Arc<dyn IdentityProvider>,
    config: ProgressConfig,
}

impl WipeCoordinator {
    #[must_use]
    pub fn new(
        local: LocalWriters,
        remote: Arc<dyn RemoteAttemptStore>,
        identity: Arc<dyn IdentityProvider>,
        config: ProgressConfig,
    ) -> Self {
        Self {
            clock: Clock::default(),
            local,
            remote,
            identity,
            config,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Mark, clear local data, clear remote rows, then mark again.
    ///
    /// Neither half stops the other; failures are logged and reported.
    pub async fn wipe_all(&self) -> WipeReport {
        self.write_marker().await;

        let local_error = match self.clear_local().await {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(error = %err, "local wipe incomplete");
                Some(err.to_string())
            }
        };

        let remote = match self.clear_remote().await {
            Ok(Some(deleted)) => RemoteWipe::Deleted(deleted),
            Ok(None) => RemoteWipe::Skipped,
            Err(err) => {
                tracing::warn!(error = %err, "remote wipe failed, rows resurface once suppression expires");
                RemoteWipe::Failed(err.to_string())
            }
        };

        let marker = self.write_marker().await;
        tracing::info!(?remote, local_ok = local_error.is_none(), "progress wiped");
        WipeReport {
            token: marker.token(self.config.suppression_window),
            local_error,
            remote,
        }
    }

    async fn write_marker(&self) -> WipeMarker {
        let marker = WipeMarker::new(self.clock.now());
        let millis = marker.set_at.timestamp_millis();
        if let Err(err) = self
            .local
            .store
            .write_json(&KeySlot::WipeMarker.into(), &millis)
            .await
        {
            tracing::warn!(error = %err, "failed to persist wipe marker");
        }
        marker
    }

    /// Attempts every removal even after a failure; reports the first error.
    ///
    /// Completion and counter writers stay locked out for the whole removal,
    /// so a write already in flight lands before the clear, never after it.
    async fn clear_local(&self) -> Result<(), StorageError> {
        let _completion = self.local.completion.exclusive().await;
        let _counters = self.local.counters.exclusive().await;

        let slots: Vec<StorageKey> = KeySlot::all()
            .filter(|slot| !matches!(slot, KeySlot::WipeMarker | KeySlot::Fallback(_)))
            .map(StorageKey::from)
            .collect();

        let results = [
            self.local.store.remove_many(&slots).await,
            self.local.journal.clear_all().await,
            self.local.attempts.clear_all().await,
        ];
        results.into_iter().collect()
    }

    async fn clear_remote(&self) -> Result<Option<u64>, ProgressServiceError> {
        let user = match self.identity.current_user().await {
            Ok(user) => user,
            Err(err) => {
                tracing::debug!(error = %err, "no identity, skipping remote wipe");
                return Ok(None);
            }
        };
        Ok(Some(self.remote.delete(&AttemptFilter::for_user(user)).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use progress_core::model::{
        AttemptDraft, AttemptId, AttemptKind, CompletionCount, CompletionDomain, UserId,
    };
    use progress_core::time::{fixed_clock, fixed_now};
    use storage::repository::{
        InMemoryKeyValueStore, InMemoryRemoteStore, KeyValueStore, StaticIdentity,
    };

    use crate::completion::CompletionChange;

    fn writers(kv: Arc<dyn KeyValueStore>) -> LocalWriters {
        let store = LocalStore::new(kv);
        LocalWriters {
            attempts: LocalAttemptStore::new(store.clone(), 200),
            journal: AttemptJournal::new(store.clone(), 200),
            completion: CompletionTracker::new(store.clone()),
            counters: CounterStore::new(store.clone()).with_clock(fixed_clock()),
            store,
        }
    }

    fn coordinator(
        kv: &InMemoryKeyValueStore,
        remote: &InMemoryRemoteStore,
        identity: StaticIdentity,
    ) -> WipeCoordinator {
        coordinator_over(writers(Arc::new(kv.clone())), remote, identity)
    }

    fn coordinator_over(
        local: LocalWriters,
        remote: &InMemoryRemoteStore,
        identity: StaticIdentity,
    ) -> WipeCoordinator {
        WipeCoordinator::new(
            local,
            Arc::new(remote.clone()),
            Arc::new(identity),
            ProgressConfig::default(),
        )
        .with_clock(fixed_clock())
    }

    /// Device store that suspends once before every call.
    #[derive(Clone)]
    struct YieldingKv(InMemoryKeyValueStore);

    #[async_trait]
    impl KeyValueStore for YieldingKv {
        async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
            tokio::task::yield_now().await;
            self.0.get_item(key).await
        }

        async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
            tokio::task::yield_now().await;
            self.0.set_item(key, value).await
        }

        async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
            tokio::task::yield_now().await;
            self.0.remove_item(key).await
        }

        async fn get_all_keys(&self) -> Result<Vec<String>, StorageError> {
            tokio::task::yield_now().await;
            self.0.get_all_keys().await
        }

        async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
            tokio::task::yield_now().await;
            self.0.multi_remove(keys).await
        }
    }

    async fn seed(kv: &InMemoryKeyValueStore) {
        for (key, value) in [
            ("progress.shares", "3"),
            ("knowledge.readIds", r#"["a"]"#),
            ("streak.count", "2"),
            ("streak.lastActive", "\"2023-11-14\""),
            ("progress.disaster.completed", r#"{"Flood":{"Ⅰ":true}}"#),
            ("progress.everyday.completed", r#"{"CPR":{"Ⅰ":true}}"#),
            ("attemptIndex", "[]"),
            ("attempt:x", "{}"),
            ("quiz_history_fallback_disaster", "[]"),
            ("quiz_history_fallback_everydayfirstaid", "[]"),
            ("settings.theme", "\"dark\""),
        ] {
            kv.set_item(key, value).await.unwrap();
        }
    }

    #[tokio::test]
    async fn wipe_clears_owned_keys_and_keeps_the_marker() {
        let kv = InMemoryKeyValueStore::new();
        seed(&kv).await;
        let remote = InMemoryRemoteStore::new();
        let report = coordinator(&kv, &remote, StaticIdentity::signed_out())
            .wipe_all()
            .await;

        assert!(report.is_complete());
        assert_eq!(report.remote, RemoteWipe::Skipped);
        assert_eq!(report.token.expires_at, fixed_now() + Duration::seconds(20));

        let mut keys = kv.get_all_keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["progress.wipe.skipServer", "settings.theme"]);
        let marker = kv.get_item("progress.wipe.skipServer").await.unwrap();
        assert_eq!(marker, Some(fixed_now().timestamp_millis().to_string()));
    }

    #[tokio::test]
    async fn remote_rows_for_the_user_are_deleted() {
        let kv = InMemoryKeyValueStore::new();
        let remote = InMemoryRemoteStore::new();
        let user = UserId::new("alice");
        let row = AttemptDraft::new(AttemptKind::Disaster, "Flood", "Ⅰ", 1, 1, 5_000)
            .into_record(AttemptId::new("r"), fixed_now());
        remote.insert(&user, &row).await.unwrap();

        let report = coordinator(&kv, &remote, StaticIdentity::signed_in(user.clone()))
            .wipe_all()
            .await;
        assert_eq!(report.remote, RemoteWipe::Deleted(1));
        assert!(remote.rows_for(&user).is_empty());
    }

    #[tokio::test]
    async fn local_failure_does_not_stop_remote_delete() {
        let kv = InMemoryKeyValueStore::new();
        seed(&kv).await;
        kv.set_read_only(true);
        let remote = InMemoryRemoteStore::new();
        let user = UserId::new("alice");
        let row = AttemptDraft::new(AttemptKind::FirstAid, "CPR", "Ⅱ", 1, 1, 5_000)
            .into_record(AttemptId::new("r"), fixed_now());
        remote.insert(&user, &row).await.unwrap();

        let report = coordinator(&kv, &remote, StaticIdentity::signed_in(user.clone()))
            .wipe_all()
            .await;
        assert!(report.local_error.is_some());
        assert_eq!(report.remote, RemoteWipe::Deleted(1));
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn remote_failure_is_reported_after_local_clear() {
        let kv = InMemoryKeyValueStore::new();
        seed(&kv).await;
        let remote = InMemoryRemoteStore::new();
        remote.set_offline(true);

        let report = coordinator(&kv, &remote, StaticIdentity::signed_in(UserId::new("alice")))
            .wipe_all()
            .await;
        assert!(report.local_error.is_none());
        assert!(matches!(report.remote, RemoteWipe::Failed(_)));
        assert!(kv.get_item("progress.shares").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn in_flight_writes_do_not_outlive_the_wipe() {
        let kv = InMemoryKeyValueStore::new();
        let local = writers(Arc::new(YieldingKv(kv.clone())));
        for category in ["Flood", "Lightning", "Typhoon", "Landslide"] {
            local
                .completion
                .mark_complete(CompletionDomain::Disaster, category, "Ⅰ")
                .await;
        }
        for _ in 0..3 {
            local.counters.increment_share_counter().await;
        }

        let completion = local.completion.clone();
        let mark = tokio::spawn(async move {
            completion
                .mark_complete(CompletionDomain::Disaster, "Heatwave", "Ⅰ")
                .await
        });
        let counters = local.counters.clone();
        let share = tokio::spawn(async move { counters.increment_share_counter().await });
        // Let both writers take their locks and suspend mid-update.
        tokio::task::yield_now().await;

        let report = coordinator_over(local.clone(), &InMemoryRemoteStore::new(), StaticIdentity::signed_out())
            .wipe_all()
            .await;
        assert!(report.is_complete());
        assert_eq!(mark.await.unwrap(), CompletionChange::Added);
        assert_eq!(share.await.unwrap(), 4);

        assert_eq!(
            local.completion.count_completed(CompletionDomain::Disaster).await,
            CompletionCount::default()
        );
        assert_eq!(local.counters.share_count().await, 0);
    }
}
