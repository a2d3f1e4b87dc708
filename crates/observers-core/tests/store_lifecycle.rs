//! End-to-end tests for the observation store: lifecycle, queries, and
//! persistence through a state backend.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use observers_core::{
    ListFilters, ListQuery, NewObservation, ObservationError, ObservationStore, Severity, SortBy,
    Status,
};
use observers_state::{FsStateStore, MemoryStateStore, StateStore, StorageError};

const KEY: &str = "observations";

async fn persistent_store(backend: &Arc<MemoryStateStore>) -> ObservationStore {
    ObservationStore::load(backend.clone(), KEY).await.unwrap()
}

fn ids(result: &observers_core::ListResult) -> Vec<String> {
    result
        .observations
        .iter()
        .map(|o| o.id().to_string())
        .collect()
}

#[tokio::test]
async fn test_acknowledge_resolve_clear_scenario() {
    let backend = Arc::new(MemoryStateStore::new());
    let mut store = persistent_store(&backend).await;

    let a = store
        .create(NewObservation::new("bug").severity("critical"))
        .await
        .unwrap();
    let b = store
        .create(NewObservation::new("note").severity("info"))
        .await
        .unwrap();

    let listed = store.list(&ListQuery::all()).unwrap();
    assert_eq!(ids(&listed), vec![a.id().to_string(), b.id().to_string()]);
    assert_eq!(listed.total, 2);

    store.acknowledge(a.id()).await.unwrap();
    let got = store.get(a.id()).unwrap();
    assert_eq!(got.status(), Status::Acknowledged);
    assert!(got.acknowledged_at().is_some());

    store
        .resolve(a.id(), Some("fixed".to_string()))
        .await
        .unwrap();
    let got = store.get(a.id()).unwrap();
    assert_eq!(got.status(), Status::Resolved);
    assert_eq!(got.resolution_note(), Some("fixed"));

    assert_eq!(store.clear_resolved().await.unwrap(), 1);
    let listed = store.list(&ListQuery::all()).unwrap();
    assert_eq!(ids(&listed), vec![b.id().to_string()]);
    assert_eq!(listed.total, 1);
}

#[tokio::test]
async fn test_reload_reproduces_every_observation() {
    let backend = Arc::new(MemoryStateStore::new());
    let mut store = persistent_store(&backend).await;

    let a = store
        .create(
            NewObservation::new("unbounded retry loop")
                .observer("reliability")
                .severity("high")
                .source_type("code")
                .source_ref("src/client.rs:88")
                .metadata(serde_json::json!({"rule": "retry-budget"})),
        )
        .await
        .unwrap();
    store
        .create(NewObservation::new("tone drifted").source_type("conversation"))
        .await
        .unwrap();
    store.acknowledge(a.id()).await.unwrap();
    store.resolve(a.id(), Some("capped at 5".into())).await.unwrap();

    let before = store.list(&ListQuery::all()).unwrap();
    let reloaded = persistent_store(&backend).await;
    let after = reloaded.list(&ListQuery::all()).unwrap();

    assert_eq!(before.observations, after.observations);
    assert_eq!(reloaded.len(), store.len());
}

#[tokio::test]
async fn test_severity_filter_orders_critical_first() {
    let mut store = ObservationStore::in_memory();
    for (content, severity) in [
        ("h1", "high"),
        ("l1", "low"),
        ("c1", "critical"),
        ("i1", "info"),
        ("h2", "high"),
    ] {
        store
            .create(NewObservation::new(content).severity(severity))
            .await
            .unwrap();
    }

    let query = ListQuery::all().with_filters(
        ListFilters::default().with_severities([Severity::Critical, Severity::High]),
    );
    let result = store.list(&query).unwrap();
    let contents: Vec<&str> = result.observations.iter().map(|o| o.content()).collect();
    assert_eq!(contents, vec!["c1", "h1", "h2"]);
    assert_eq!(result.total, 5);
    assert_eq!(result.by_severity.get("high"), Some(&2));
}

#[tokio::test]
async fn test_created_at_sort_is_newest_first() {
    let mut store = ObservationStore::in_memory();
    for content in ["first", "second", "third"] {
        store.create(NewObservation::new(content)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let result = store
        .list(&ListQuery::all().sorted_by(SortBy::CreatedAt))
        .unwrap();
    let contents: Vec<&str> = result.observations.iter().map(|o| o.content()).collect();
    assert_eq!(contents, vec!["third", "second", "first"]);
}

#[tokio::test]
async fn test_clear_resolved_is_exact_and_idempotent() {
    let mut store = ObservationStore::in_memory();
    let mut kept = Vec::new();
    for i in 0..6 {
        let obs = store
            .create(NewObservation::new(format!("n{i}")).observer("lint"))
            .await
            .unwrap();
        if i % 2 == 0 {
            store.resolve(obs.id(), None).await.unwrap();
        } else {
            if i == 3 {
                store.acknowledge(obs.id()).await.unwrap();
            }
            kept.push(store.get(obs.id()).unwrap());
        }
    }

    assert_eq!(store.clear_resolved().await.unwrap(), 3);
    assert_eq!(store.clear_resolved().await.unwrap(), 0);

    let remaining = store.list(&ListQuery::all()).unwrap();
    assert_eq!(remaining.observations, kept);
}

#[tokio::test]
async fn test_ids_are_unique() {
    let mut store = ObservationStore::in_memory();
    let mut seen = HashSet::new();
    for i in 0..200 {
        let obs = store
            .create(NewObservation::new(format!("obs {i}")))
            .await
            .unwrap();
        assert!(!obs.id().is_empty());
        assert!(seen.insert(obs.id().to_string()));
    }
    assert_eq!(store.len(), 200);
}

#[tokio::test]
async fn test_empty_content_leaves_store_unchanged() {
    let mut store = ObservationStore::in_memory();
    store.create(NewObservation::new("keep")).await.unwrap();

    for bad in [NewObservation::default(), NewObservation::new(""), NewObservation::new("\t ")] {
        let err = store.create(bad).await.unwrap_err();
        assert!(matches!(err, ObservationError::Validation { .. }));
    }
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_batch_keeps_entries_before_the_invalid_one() {
    let backend = Arc::new(MemoryStateStore::new());
    let mut store = persistent_store(&backend).await;

    let batch = vec![
        NewObservation::new("one").severity("low"),
        NewObservation::new("two").severity("high"),
        NewObservation::new("bad").severity("urgent"),
        NewObservation::new("four"),
    ];
    let err = store.create_batch(batch).await.unwrap_err();
    assert!(matches!(err, ObservationError::InvalidEnumValue { .. }));
    assert_eq!(err.field(), Some("observations[2].severity"));

    assert_eq!(store.len(), 2);
    // The partial insert was flushed before the error surfaced.
    let reloaded = persistent_store(&backend).await;
    assert_eq!(reloaded.len(), 2);
}

#[tokio::test]
async fn test_batch_element_error_survives_a_failed_flush() {
    let backend = Arc::new(MemoryStateStore::new());
    let mut store = persistent_store(&backend).await;

    backend.fail_writes(true);
    let err = store
        .create_batch(vec![
            NewObservation::new("a"),
            NewObservation::new("b").severity("urgent"),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, ObservationError::InvalidEnumValue { .. }));
    assert_eq!(err.field(), Some("observations[1].severity"));

    // The prefix is in memory only until a flush goes through.
    assert_eq!(store.len(), 1);
    assert!(persistent_store(&backend).await.is_empty());

    backend.fail_writes(false);
    store.flush().await.unwrap();
    assert_eq!(persistent_store(&backend).await.len(), 1);
}

#[tokio::test]
async fn test_batch_counts_and_single_flush() {
    let backend = Arc::new(MemoryStateStore::new());
    let mut store = persistent_store(&backend).await;

    let created = store
        .create_batch(vec![
            NewObservation::new("a").severity("critical"),
            NewObservation::new("b").severity("critical"),
            NewObservation::new("c").severity("medium"),
        ])
        .await
        .unwrap();

    assert_eq!(created.count, 3);
    assert_eq!(created.by_severity.get("critical"), Some(&2));
    assert_eq!(created.by_status.get("open"), Some(&3));
    assert_eq!(backend.write_count(), 1);
}

#[tokio::test]
async fn test_flush_failure_surfaces_but_keeps_memory_state() {
    let backend = Arc::new(MemoryStateStore::new());
    let mut store = persistent_store(&backend).await;
    let a = store.create(NewObservation::new("a")).await.unwrap();

    backend.fail_writes(true);
    let err = store.acknowledge(a.id()).await.unwrap_err();
    assert!(matches!(err, ObservationError::Persistence(_)));
    assert_eq!(store.get(a.id()).unwrap().status(), Status::Acknowledged);

    // The persisted copy still has the pre-failure state until a flush succeeds.
    let stale = persistent_store(&backend).await;
    assert_eq!(stale.get(a.id()).unwrap().status(), Status::Open);

    backend.fail_writes(false);
    store.flush().await.unwrap();
    let fresh = persistent_store(&backend).await;
    assert_eq!(fresh.get(a.id()).unwrap().status(), Status::Acknowledged);
}

#[tokio::test]
async fn test_malformed_document_fails_load() {
    for blob in [
        "not json",
        r#"{"observations": {"x": {"content": "missing fields"}}}"#,
        r#"{"observations": []}"#,
    ] {
        let backend: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new().with_blob(KEY, blob));
        let err = match ObservationStore::load(backend, KEY).await {
            Ok(_) => panic!("load accepted {blob:?}"),
            Err(e) => e,
        };
        assert!(matches!(
            err,
            ObservationError::Persistence(StorageError::Malformed { .. })
        ));
    }
}

#[tokio::test]
async fn test_mount_without_backend_is_in_memory() {
    let store = ObservationStore::mount(None, KEY).await.unwrap();
    assert!(!store.is_persistent());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_filesystem_backend_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let backend: Arc<dyn StateStore> = Arc::new(FsStateStore::new(dir.path()).unwrap());

    let mut store = ObservationStore::load(backend.clone(), "session-1")
        .await
        .unwrap();
    let obs = store
        .create(NewObservation::new("missing index on lookup").severity("medium"))
        .await
        .unwrap();

    assert!(dir.path().join("session-1.json").exists());

    let reopened = ObservationStore::load(backend, "session-1").await.unwrap();
    assert_eq!(reopened.get(obs.id()).unwrap(), obs);
}
