use chrono::{TimeZone, Utc};
use faultline::analytics::{day_key, midnight_ms, month_start_ms, Aggregator};
use faultline::config::DatabaseConfig;
use faultline::store::{SqliteStore, Store};
use faultline::types::{Adapter, AnalyticEvent, ErrorEvent, LogEntry};
use std::path::PathBuf;
use std::sync::Arc;

fn temp_db() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faultline.db");
    (dir, path)
}

async fn open_store(path: &PathBuf) -> SqliteStore {
    SqliteStore::open(&DatabaseConfig {
        path: path.clone(),
        pool_size: 4,
    })
    .await
    .unwrap()
}

fn submitted(fingerprint: &str, last_seen: i64) -> ErrorEvent {
    ErrorEvent {
        message: "boom".into(),
        kind: "TypeError".into(),
        path: "src/cart.js".into(),
        line: "88".into(),
        ticket: "ticket-1".into(),
        fingerprint: fingerprint.into(),
        adapter: Adapter {
            name: "browser".into(),
            kind: "javascript".into(),
            version: "1.2.0".into(),
        },
        count: 1,
        timestamp: last_seen,
        last_seen,
        evolution: [(day_key(last_seen), 1)].into_iter().collect(),
        logs: vec![LogEntry {
            timestamp: last_seen,
            kind: "error".into(),
            log: "first".into(),
        }],
        ..Default::default()
    }
}

fn ts(y: i32, mo: u32, d: u32, h: u32) -> i64 {
    Utc.with_ymd_and_hms(y, mo, d, h, 0, 0)
        .unwrap()
        .timestamp_millis()
}

#[tokio::test]
async fn test_upsert_create_then_merge() {
    let (_dir, path) = temp_db();
    let store = open_store(&path).await;

    let created = store.upsert_error(submitted("fp", 1_000)).await.unwrap();
    assert!(created.created);
    assert!(created.event.id.is_assigned());
    assert_eq!(created.event.count, 1);

    let mut second = submitted("fp", 2_000);
    second.logs[0].log = "second".into();
    let merged = store.upsert_error(second).await.unwrap();
    assert!(!merged.created);
    assert_eq!(merged.event.id, created.event.id);
    assert_eq!(merged.event.count, 2);
    assert_eq!(merged.event.last_seen, 2_000);
    assert_eq!(merged.event.logs[0].log, "second", "volatile fields refreshed");
    assert_eq!(merged.event.evolution[&day_key(2_000)], 2);
}

#[tokio::test]
async fn test_find_error_round_trip() {
    let (_dir, path) = temp_db();
    let store = open_store(&path).await;

    let mut event = submitted("fp", 1_000);
    event.badges.insert("release".into(), "1.4.2".into());
    event.snippet.insert("88".into(), "cart.add(item)".into());
    store.upsert_error(event).await.unwrap();

    let found = store.find_error("ticket-1", "fp").await.unwrap().unwrap();
    assert_eq!(found.message, "boom");
    assert_eq!(found.badges["release"], "1.4.2");
    assert_eq!(found.snippet["88"], "cart.add(item)");
    assert_eq!(found.adapter.name, "browser");

    assert!(store
        .find_error("ticket-1", "missing")
        .await
        .unwrap()
        .is_none());
    assert!(store
        .find_error("other-ticket", "fp")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_concurrent_upserts_count_exactly() {
    let (_dir, path) = temp_db();
    let store = Arc::new(open_store(&path).await);

    let k = 16;
    let mut handles = Vec::new();
    for i in 0..k {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .upsert_error(submitted("fp", 1_000 + i))
                .await
                .unwrap()
                .created
        }));
    }

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap() {
            created += 1;
        }
    }
    assert_eq!(created, 1);

    let stored = store.find_error("ticket-1", "fp").await.unwrap().unwrap();
    assert_eq!(stored.count, k);
}

#[tokio::test]
async fn test_operator_actions() {
    let (_dir, path) = temp_db();
    let store = open_store(&path).await;
    store.upsert_error(submitted("fp", 1_000)).await.unwrap();

    store.set_resolved("ticket-1", "fp", true).await.unwrap();
    store.mark_seen("ticket-1", "fp", "op-1").await.unwrap();
    store.mark_seen("ticket-1", "fp", "op-2").await.unwrap();
    store.mark_seen("ticket-1", "fp", "op-1").await.unwrap();

    let stored = store.find_error("ticket-1", "fp").await.unwrap().unwrap();
    assert!(stored.resolved);
    assert_eq!(stored.seen_by, vec!["op-1".to_string(), "op-2".to_string()]);

    assert!(store.set_resolved("ticket-1", "missing", true).await.is_err());
    assert!(store.mark_seen("ticket-1", "missing", "op-1").await.is_err());
}

#[tokio::test]
async fn test_analytics_document_lifecycle() {
    let (_dir, path) = temp_db();
    let store = Arc::new(open_store(&path).await);
    let aggregator = Aggregator::new(store.clone());

    let at = ts(2026, 8, 25, 14);
    let event = AnalyticEvent {
        ticket: "ticket-1".into(),
        is_new_visitor: true,
        is_new_session: true,
        time_on_page: 30,
        referrer: "google.com".into(),
        page: "/home".into(),
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/126.0 Safari/537.36".into(),
    };
    aggregator.record_at(&event, at).await.unwrap();
    aggregator.record_at(&event, at).await.unwrap();

    let month = month_start_ms(at);
    let docs = store
        .analytics_in_range("ticket-1", month, month)
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].human_readable_month, "August 2026");

    let bucket = &docs[0].data[&format!("{}-14", midnight_ms(at))];
    assert_eq!(bucket.visits, 2);
    assert_eq!(bucket.new_visitors, 2);
    assert_eq!(bucket.windows, 2);
    assert_eq!(bucket.chrome, 2);
    assert_eq!(bucket.pages["/home"], 2);
    assert_eq!(docs[0].aggregated_monthly_data.visits, 2);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let (_dir, path) = temp_db();
    {
        let store = open_store(&path).await;
        store.upsert_error(submitted("fp", 1_000)).await.unwrap();
        store.upsert_error(submitted("fp", 2_000)).await.unwrap();
    }

    let store = open_store(&path).await;
    let stored = store.find_error("ticket-1", "fp").await.unwrap().unwrap();
    assert_eq!(stored.count, 2);
    assert_eq!(stored.last_seen, 2_000);
}
