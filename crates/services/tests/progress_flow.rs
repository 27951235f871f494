use std::sync::Arc;

use chrono::Duration;

use progress_core::model::{
    AttemptDraft, AttemptKind, CompletionDomain, ProgressRequest, UserId,
};
use progress_core::time::fixed_clock;
use services::{Clock, ProgressConfig, ProgressServices, RemoteWipe};
use storage::repository::{
    InMemoryKeyValueStore, InMemoryRemoteStore, KeyValueStore, StaticIdentity, Storage,
};

struct Harness {
    kv: InMemoryKeyValueStore,
    remote: InMemoryRemoteStore,
    storage: Storage,
}

impl Harness {
    fn new(user: Option<&str>) -> Self {
        let kv = InMemoryKeyValueStore::new();
        let remote = InMemoryRemoteStore::new();
        let storage = Storage::new(
            Arc::new(kv.clone()),
            Arc::new(remote.clone()),
            Arc::new(StaticIdentity::new(user.map(UserId::new))),
        );
        Self { kv, remote, storage }
    }

    fn services(&self, clock: Clock) -> ProgressServices {
        ProgressServices::new(&self.storage, clock, ProgressConfig::default())
    }
}

fn perfect_flood() -> AttemptDraft {
    AttemptDraft::new(AttemptKind::Disaster, "Flood", "Ⅰ", 5, 5, 12_000)
}

async fn seed_progress(services: &ProgressServices) {
    let outcome = services.recorder().record(perfect_flood()).await;
    assert!(outcome.persisted);
    services
        .completion()
        .mark_complete(CompletionDomain::Disaster, "Flood", "Ⅰ")
        .await;
    services.counters().increment_share_counter().await;
    services.counters().mark_article_read("storm-prep").await;
}

//
// ─── SCENARIOS ─────────────────────────────────────────────────────────────────
//

#[tokio::test]
async fn empty_storage_reports_zero_everywhere() {
    let harness = Harness::new(None);
    let progress = harness
        .services(fixed_clock())
        .achievements()
        .compute_progress(ProgressRequest::local_only())
        .await;

    assert_eq!(progress.len(), 40);
    assert!(progress.all_zero());
}

#[tokio::test]
async fn one_completed_sub_level() {
    let services = Harness::new(None).services(fixed_clock());
    services
        .completion()
        .mark_complete(CompletionDomain::Disaster, "Flood", "Ⅰ")
        .await;

    let progress = services
        .achievements()
        .compute_progress(ProgressRequest::local_only())
        .await;
    assert_eq!(progress.get("dz_sub_10"), Some(10));
    assert_eq!(progress.get("dz_cat_1"), Some(100));
}

#[tokio::test]
async fn three_completed_sub_levels_across_two_categories() {
    let services = Harness::new(None).services(fixed_clock());
    for (category, sub_level) in [("Flood", "Ⅰ"), ("Flood", "Ⅱ"), ("Lightning", "Ⅰ")] {
        services
            .completion()
            .mark_complete(CompletionDomain::Disaster, category, sub_level)
            .await;
    }

    let progress = services
        .achievements()
        .compute_progress(ProgressRequest::local_only())
        .await;
    assert_eq!(progress.get("dz_sub_10"), Some(30));
    assert_eq!(progress.get("dz_cat_1"), Some(100));
    assert_eq!(progress.get("dz_cat_3"), Some(67));
}

#[tokio::test]
async fn share_flag_caps_at_one_hundred() {
    let services = Harness::new(None).services(fixed_clock());
    services.counters().increment_share_counter().await;
    let once = services
        .achievements()
        .compute_progress(ProgressRequest::default())
        .await;
    assert_eq!(once.get("share1"), Some(100));

    services.counters().increment_share_counter().await;
    let twice = services
        .achievements()
        .compute_progress(ProgressRequest::default())
        .await;
    assert_eq!(twice.get("share1"), Some(100));
    assert_eq!(twice.get("share5"), Some(40));
}

#[tokio::test]
async fn progress_is_zero_while_remote_wipe_is_pending() {
    let harness = Harness::new(Some("alice"));
    let services = harness.services(fixed_clock());
    seed_progress(&services).await;
    assert_eq!(harness.remote.rows_for(&UserId::new("alice")).len(), 1);

    let gate = harness.remote.hold_deletes();
    let wipe = services.wipe();
    let pending = tokio::spawn(async move { wipe.wipe_all().await });

    for _ in 0..100 {
        let keys = harness.kv.get_all_keys().await.unwrap();
        if keys == vec!["progress.wipe.skipServer".to_string()] {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(harness.remote.rows_for(&UserId::new("alice")).len(), 1);

    let progress = services
        .achievements()
        .compute_progress(ProgressRequest::default())
        .await;
    assert!(progress.all_zero());

    gate.notify_one();
    let report = pending.await.unwrap();
    assert_eq!(report.remote, RemoteWipe::Deleted(1));
    assert!(report.is_complete());
}

//
// ─── SUPPRESSION ───────────────────────────────────────────────────────────────
//

#[tokio::test]
async fn failed_remote_wipe_resurfaces_after_the_window() {
    let harness = Harness::new(Some("alice"));
    let clock = fixed_clock();
    let services = harness.services(clock);
    seed_progress(&services).await;

    harness.remote.set_offline(true);
    let report = services.wipe().wipe_all().await;
    assert!(matches!(report.remote, RemoteWipe::Failed(_)));
    harness.remote.set_offline(false);

    let during = services
        .achievements()
        .compute_progress(ProgressRequest::default())
        .await;
    assert!(during.all_zero());

    let later = harness.services(clock.advanced(Duration::seconds(21)));
    let after = later
        .achievements()
        .compute_progress(ProgressRequest::default())
        .await;
    assert_eq!(after.get("quiz1"), Some(100));
    assert_eq!(after.get("perfect1"), Some(100));
    assert_eq!(after.get("dz_sub_1"), Some(0));
}

#[tokio::test]
async fn explicit_token_suppresses_without_the_marker() {
    let harness = Harness::new(Some("alice"));
    let services = harness.services(fixed_clock());
    seed_progress(&services).await;

    harness.remote.set_offline(true);
    let report = services.wipe().wipe_all().await;
    harness.remote.set_offline(false);
    harness.kv.remove_item("progress.wipe.skipServer").await.unwrap();

    let with_token = services
        .achievements()
        .compute_progress(ProgressRequest::with_token(report.token))
        .await;
    assert!(with_token.all_zero());

    let without = services
        .achievements()
        .compute_progress(ProgressRequest::default())
        .await;
    assert_eq!(without.get("quiz1"), Some(100));
}

//
// ─── PROPERTIES ────────────────────────────────────────────────────────────────
//

#[tokio::test]
async fn recorded_attempt_appears_once_whichever_store_took_it() {
    for user in [Some("alice"), None] {
        let harness = Harness::new(user);
        let services = harness.services(fixed_clock());

        let first = services.recorder().record(perfect_flood()).await;
        assert_eq!(first.used_fallback, user.is_none());
        services.recorder().record(perfect_flood()).await;

        let rows = services
            .history()
            .get_history(AttemptKind::Disaster, 200)
            .await;
        assert_eq!(rows.len(), 1, "user {user:?}");
        assert_eq!(rows[0].key(), first.record.key());
    }
}

#[tokio::test]
async fn offline_then_online_attempts_merge_with_local_winning() {
    let harness = Harness::new(Some("alice"));
    let services = harness.services(fixed_clock());

    harness.remote.set_offline(true);
    let offline = services.recorder().record(perfect_flood()).await;
    assert!(offline.used_fallback);
    harness.remote.set_offline(false);

    let later = harness.services(fixed_clock().advanced(Duration::minutes(10)));
    let online = later.recorder().record(perfect_flood()).await;
    assert!(!online.used_fallback);

    let rows = later.history().get_history(AttemptKind::Disaster, 200).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, offline.record.id);
}

#[tokio::test]
async fn repeated_article_reads_count_once() {
    let services = ProgressServices::in_memory(fixed_clock());
    services.counters().mark_article_read("quake").await;
    services.counters().mark_article_read("quake").await;

    assert_eq!(services.counters().read_count().await, 1);
    assert_eq!(services.counters().streak().await.count, 1);
}

#[tokio::test]
async fn percentages_are_clamped() {
    let services = Harness::new(None).services(fixed_clock());
    for i in 0..99 {
        services.counters().mark_article_read(&format!("article-{i}")).await;
    }

    let progress = services
        .achievements()
        .compute_progress(ProgressRequest::local_only())
        .await;
    assert_eq!(progress.get("read15"), Some(100));
    assert!(progress.iter().all(|(_, pct)| pct <= 100));
}

#[tokio::test]
async fn completion_counts_only_reset_by_wipe() {
    let services = Harness::new(None).services(fixed_clock());
    let completion = services.completion();
    completion
        .mark_complete(CompletionDomain::Everyday, "CPR", "Ⅰ")
        .await;
    let before = completion.count_completed(CompletionDomain::Everyday).await;
    completion
        .mark_complete(CompletionDomain::Everyday, "CPR", "Ⅰ")
        .await;
    let after = completion.count_completed(CompletionDomain::Everyday).await;
    assert!(after.sub_level_count >= before.sub_level_count);

    services.wipe().wipe_all().await;
    assert_eq!(
        completion
            .count_completed(CompletionDomain::Everyday)
            .await
            .sub_level_count,
        0
    );
}

#[tokio::test]
async fn fast_and_first_aid_attempts_unlock_their_flags() {
    let services = Harness::new(None).services(fixed_clock());
    services
        .recorder()
        .record(AttemptDraft::new(AttemptKind::FirstAid, "Burns", "Ⅱ", 2, 5, 20_000))
        .await;

    let progress = services
        .achievements()
        .compute_progress(ProgressRequest::local_only())
        .await;
    assert_eq!(progress.get("speed20"), Some(100));
    assert_eq!(progress.get("firstaid1"), Some(100));
    assert_eq!(progress.get("perfect1"), Some(0));
    assert_eq!(progress.get("quiz10"), Some(10));
}
