use std::sync::Arc;

use progress_core::model::{AttemptDraft, AttemptId, AttemptKind, KeySlot, StorageKey};
use progress_core::time::fixed_now;
use storage::mapping::{decode_attempt_rows, encode_json};
use storage::repository::{DisconnectedRemote, KeyValueStore, StaticIdentity, Storage};
use storage::sqlite::{SqliteKeyValueStore, latest_version};

#[tokio::test]
async fn sqlite_kv_round_trips_and_overwrites() {
    let store = SqliteKeyValueStore::connect("sqlite:file:memdb_kv_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");
    // A second run must be a no-op.
    store.migrate().await.expect("migrate again");

    let key = KeySlot::Shares.as_str();
    assert_eq!(store.get_item(key).await.unwrap(), None);

    store.set_item(key, "1").await.unwrap();
    store.set_item(key, "2").await.unwrap();
    assert_eq!(store.get_item(key).await.unwrap().as_deref(), Some("2"));

    store.remove_item(key).await.unwrap();
    assert_eq!(store.get_item(key).await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_kv_lists_and_multi_removes() {
    let store = SqliteKeyValueStore::connect("sqlite:file:memdb_kv_multi?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");

    let detail = StorageKey::AttemptDetail(AttemptId::new("a1")).as_key().into_owned();
    store.set_item(KeySlot::ReadIds.as_str(), "[\"x\"]").await.unwrap();
    store.set_item(&detail, "{}").await.unwrap();
    store.set_item("weather.station", "\"tokyo\"").await.unwrap();

    let keys = store.get_all_keys().await.unwrap();
    assert_eq!(keys.len(), 3);
    assert!(keys.contains(&detail));

    store
        .multi_remove(&[detail.clone(), KeySlot::ReadIds.as_str().to_string()])
        .await
        .unwrap();
    assert_eq!(store.get_all_keys().await.unwrap(), vec!["weather.station".to_string()]);
}

#[tokio::test]
async fn sqlite_storage_holds_attempt_buckets() {
    let storage = Storage::sqlite(
        "sqlite:file:memdb_kv_bucket?mode=memory&cache=shared",
        Arc::new(DisconnectedRemote),
        Arc::new(StaticIdentity::signed_out()),
    )
    .await
    .expect("sqlite storage");

    let record = AttemptDraft::new(AttemptKind::Disaster, "Flood", "Ⅰ", 5, 5, 11_000)
        .into_record(AttemptId::new("b1"), fixed_now());
    let key = KeySlot::Fallback(progress_core::model::FallbackBucket::Disaster).as_str();
    storage
        .local
        .set_item(key, &encode_json(&vec![record.clone()]).unwrap())
        .await
        .unwrap();

    let raw = storage.local.get_item(key).await.unwrap().expect("bucket");
    let rows = decode_attempt_rows(&raw, AttemptKind::Disaster).unwrap();
    assert_eq!(rows, vec![record]);
}

#[tokio::test]
async fn migrate_records_the_latest_schema_version() {
    let store = SqliteKeyValueStore::connect("sqlite:file:memdb_schema_version?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");
    assert_eq!(store.schema_version().await.unwrap(), latest_version());
}
