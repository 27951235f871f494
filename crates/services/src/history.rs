use std::sync::Arc;

use progress_core::model::{AttemptKind, AttemptRecord, FallbackBucket, ReadContext};
use progress_core::reconcile::{Candidate, Reconciliation, reconcile};
use storage::repository::{AttemptFilter, IdentityProvider, RemoteAttemptStore};

use crate::config::ProgressConfig;
use crate::journal::{AttemptJournal, JournalEntry};
use crate::local_attempts::LocalAttemptStore;

/// Merges remote rows, local fallback buckets and the attempt journal into one
/// deduplicated, most-recent-first history.
#[derive(Clone)]
pub struct HistoryReader {
    local: LocalAttemptStore,
    journal: AttemptJournal,
    remote: Arc<dyn RemoteAttemptStore>,
    identity: Arc<dyn IdentityProvider>,
    config: ProgressConfig,
}

impl HistoryReader {
    #[must_use]
    pub fn new(
        local: LocalAttemptStore,
        journal: AttemptJournal,
        remote: Arc<dyn RemoteAttemptStore>,
        identity: Arc<dyn IdentityProvider>,
        config: ProgressConfig,
    ) -> Self {
        Self {
            local,
            journal,
            remote,
            identity,
            config,
        }
    }

    /// Merged history for `kind`, remote included when reachable.
    ///
    /// Orphaned journal entries found on the way are pruned. Never fails:
    /// remote problems degrade to local-only rows.
    pub async fn get_history(&self, kind: AttemptKind, limit: usize) -> Vec<AttemptRecord> {
        let merged = self.collect(kind, limit, ReadContext::Live).await;

        let orphans: Vec<_> = merged.pruned_orphans().cloned().collect();
        if !orphans.is_empty() {
            match self.journal.prune(&orphans).await {
                Ok(removed) => tracing::debug!(%kind, removed, "pruned orphaned journal entries"),
                Err(err) => tracing::warn!(%kind, error = %err, "failed to prune journal orphans"),
            }
        }
        merged.rows
    }

    /// Gather and reconcile every candidate for `kind` under `ctx`, without
    /// touching storage.
    pub async fn collect(&self, kind: AttemptKind, limit: usize, ctx: ReadContext) -> Reconciliation {
        let limit = self.config.clamp_limit(limit);
        let mut candidates = Vec::new();

        if ctx.include_remote() {
            candidates.extend(self.remote_rows(kind, limit).await.into_iter().map(Candidate::remote));
        } else {
            tracing::debug!(%kind, ?ctx, "remote history skipped");
        }

        for &bucket in FallbackBucket::read_set(kind) {
            candidates.extend(self.local.get_bucket(bucket).await.into_iter().map(|mut row| {
                row.kind = kind;
                Candidate::local(row)
            }));
        }

        for entry in self.journal.load(Some(kind)).await {
            candidates.push(match entry {
                JournalEntry::Resolved(record) => Candidate::local(record),
                JournalEntry::Orphan(entry) => Candidate::Orphan(entry),
            });
        }

        reconcile(candidates, limit)
    }

    async fn remote_rows(&self, kind: AttemptKind, limit: usize) -> Vec<AttemptRecord> {
        let user = match self.identity.current_user().await {
            Ok(user) => user,
            Err(err) => {
                tracing::debug!(%kind, error = %err, "no identity, reading local history only");
                return Vec::new();
            }
        };
        let filter = AttemptFilter::for_user(user).kind(kind);
        match self.remote.select(&filter, limit).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(%kind, error = %err, "remote history unavailable, using local rows");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use progress_core::model::{AttemptDraft, AttemptId, UserId};
    use progress_core::reconcile::ReconcileOutcome;
    use progress_core::time::fixed_now;
    use storage::repository::{InMemoryKeyValueStore, InMemoryRemoteStore, KeyValueStore, StaticIdentity};

    use crate::store::LocalStore;

    struct Fixture {
        kv: InMemoryKeyValueStore,
        remote: InMemoryRemoteStore,
        local: LocalAttemptStore,
        journal: AttemptJournal,
        reader: HistoryReader,
    }

    fn fixture(identity: StaticIdentity) -> Fixture {
        let kv = InMemoryKeyValueStore::new();
        let remote = InMemoryRemoteStore::new();
        let store = LocalStore::new(Arc::new(kv.clone()));
        let local = LocalAttemptStore::new(store.clone(), 200);
        let journal = AttemptJournal::new(store, 200);
        let reader = HistoryReader::new(
            local.clone(),
            journal.clone(),
            Arc::new(remote.clone()),
            Arc::new(identity),
            ProgressConfig::default(),
        );
        Fixture {
            kv,
            remote,
            local,
            journal,
            reader,
        }
    }

    fn alice() -> UserId {
        UserId::new("alice")
    }

    fn record(id: &str, kind: AttemptKind, category: &str, minutes: i64) -> AttemptRecord {
        AttemptDraft::new(kind, category, "Ⅰ", 3, 5, 25_000)
            .into_record(AttemptId::new(id), fixed_now() + Duration::minutes(minutes))
    }

    #[tokio::test]
    async fn same_day_local_row_beats_remote_row() {
        let fx = fixture(StaticIdentity::signed_in(alice()));
        fx.remote
            .insert(&alice(), &record("remote", AttemptKind::Disaster, "Flood", 5))
            .await
            .unwrap();
        fx.local
            .append(AttemptKind::Disaster, record("local", AttemptKind::Disaster, "Flood", 0))
            .await
            .unwrap();

        let rows = fx.reader.get_history(AttemptKind::Disaster, 50).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id.as_str(), "local");
    }

    #[tokio::test]
    async fn distinct_keys_merge_newest_first() {
        let fx = fixture(StaticIdentity::signed_in(alice()));
        fx.remote
            .insert(&alice(), &record("r", AttemptKind::Disaster, "Fire", 10))
            .await
            .unwrap();
        fx.local
            .append(AttemptKind::Disaster, record("l", AttemptKind::Disaster, "Flood", 0))
            .await
            .unwrap();

        let rows = fx.reader.get_history(AttemptKind::Disaster, 50).await;
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r", "l"]);

        let capped = fx.reader.get_history(AttemptKind::Disaster, 1).await;
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn remote_failure_degrades_to_local_rows() {
        let fx = fixture(StaticIdentity::signed_in(alice()));
        fx.remote.set_offline(true);
        fx.local
            .append(AttemptKind::Disaster, record("l", AttemptKind::Disaster, "Flood", 0))
            .await
            .unwrap();

        let rows = fx.reader.get_history(AttemptKind::Disaster, 50).await;
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn first_aid_reads_include_legacy_bucket() {
        let fx = fixture(StaticIdentity::signed_out());
        fx.kv
            .set_item(
                "quiz_history_fallback_everydayfirstaid",
                r#"[{"category":"Burns","subLevel":"Ⅱ","completed":true,"timestamp":1700000000000}]"#,
            )
            .await
            .unwrap();
        fx.local
            .append(AttemptKind::FirstAid, record("new", AttemptKind::FirstAid, "CPR", 0))
            .await
            .unwrap();

        let rows = fx.reader.get_history(AttemptKind::FirstAid, 50).await;
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.kind == AttemptKind::FirstAid));
        assert!(fx.reader.get_history(AttemptKind::Disaster, 50).await.is_empty());
    }

    #[tokio::test]
    async fn orphans_are_pruned_only_by_get_history() {
        let fx = fixture(StaticIdentity::signed_out());
        fx.journal
            .save(&record("kept", AttemptKind::Disaster, "Flood", 0))
            .await
            .unwrap();
        fx.journal
            .save(&record("lost", AttemptKind::Disaster, "Fire", 1))
            .await
            .unwrap();
        fx.kv.remove_item("attempt:lost").await.unwrap();

        let preview = fx
            .reader
            .collect(AttemptKind::Disaster, 50, ReadContext::Live)
            .await;
        assert_eq!(preview.count(ReconcileOutcome::OrphanPruned), 1);
        assert_eq!(fx.journal.load(None).await.len(), 2);

        let rows = fx.reader.get_history(AttemptKind::Disaster, 50).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(fx.journal.load(None).await.len(), 1);
    }

    #[tokio::test]
    async fn local_only_context_skips_remote() {
        let fx = fixture(StaticIdentity::signed_in(alice()));
        fx.remote
            .insert(&alice(), &record("r", AttemptKind::Disaster, "Fire", 0))
            .await
            .unwrap();

        let merged = fx
            .reader
            .collect(
                AttemptKind::Disaster,
                50,
                ReadContext::LocalOnly(progress_core::model::LocalOnlyReason::Requested),
            )
            .await;
        assert!(merged.rows.is_empty());
    }
}
