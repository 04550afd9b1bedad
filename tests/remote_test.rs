use async_trait::async_trait;
use prodboard::remote::{MirrorTransport, RemoteMirror, RetryPolicy, SyncStatus};
use prodboard::section::reference_sections;
use prodboard::storage::MemoryStore;
use prodboard::{AdminGate, Ledger, LedgerError, Period, Result, RowKey};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fails the first `failures` pushes, then accepts.
struct FlakyTransport {
    failures: u32,
    attempts: AtomicU32,
    pushed: Mutex<Option<Value>>,
    remote: Value,
}

impl FlakyTransport {
    fn new(failures: u32) -> Self {
        FlakyTransport {
            failures,
            attempts: AtomicU32::new(0),
            pushed: Mutex::new(None),
            remote: json!({ "2025-1": { "orgu": { "1": { "kyass": "7" } } } }),
        }
    }
}

#[async_trait]
impl MirrorTransport for FlakyTransport {
    async fn fetch(&self) -> Result<Value> {
        Ok(self.remote.clone())
    }

    async fn push(&self, blob: &Value) -> Result<Value> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(LedgerError::Remote(format!("attempt {} refused", attempt)));
        }
        *self.pushed.lock().unwrap() = Some(blob.clone());
        Ok(json!({ "ok": true }))
    }
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        multiplier: 2,
        max_backoff: Duration::from_millis(5),
    }
}

#[tokio::test]
async fn failed_push_keeps_local_state_and_reports_failure() {
    let transport = Arc::new(FlakyTransport::new(u32::MAX));
    let mirror = RemoteMirror::new(transport.clone(), fast_policy(3));

    let mut ledger = Ledger::open(Box::new(MemoryStore::new()), reference_sections());
    let privilege = AdminGate::new(Some("pw")).unwrap().unlock("pw").unwrap();
    let period = Period::new(2025, 1).unwrap();
    let snapshot = ledger
        .set_cell(&privilege, period, "orgu", &RowKey::Day(5), "kyass", "50")
        .unwrap();

    let result = mirror.push(&snapshot.to_json()).await;
    assert!(result.is_err());
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
    assert!(matches!(mirror.status(), SyncStatus::Failed { .. }));

    assert_eq!(ledger.get_cell(period, "orgu", &RowKey::Day(5), "kyass"), "50");
}

#[tokio::test]
async fn push_retries_until_success() {
    let transport = Arc::new(FlakyTransport::new(2));
    let mirror = RemoteMirror::new(transport.clone(), fast_policy(3));

    let blob = json!({ "2025-1": {} });
    let ack = mirror.push(&blob).await.unwrap();

    assert_eq!(ack, json!({ "ok": true }));
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(mirror.status(), SyncStatus::Idle);
    assert_eq!(transport.pushed.lock().unwrap().clone(), Some(blob));
}

#[tokio::test]
async fn background_push_completes() {
    let transport = Arc::new(FlakyTransport::new(0));
    let mirror = Arc::new(RemoteMirror::new(transport.clone(), fast_policy(1)));

    mirror.spawn_push(json!({})).await.unwrap();

    assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(mirror.status(), SyncStatus::Idle);
}

#[tokio::test]
async fn superseded_snapshot_is_never_written_after_a_newer_one() {
    let transport = Arc::new(FlakyTransport::new(1));
    let policy = RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(50),
        multiplier: 2,
        max_backoff: Duration::from_millis(200),
    };
    let mirror = Arc::new(RemoteMirror::new(transport.clone(), policy));

    let old = mirror.spawn_push(json!({ "v": "old" }));
    tokio::time::sleep(Duration::from_millis(10)).await;
    let new = mirror.spawn_push(json!({ "v": "new" }));
    old.await.unwrap();
    new.await.unwrap();

    assert_eq!(transport.pushed.lock().unwrap().clone(), Some(json!({ "v": "new" })));
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(mirror.status(), SyncStatus::Idle);
}

#[tokio::test]
async fn queued_snapshots_collapse_to_the_latest() {
    let transport = Arc::new(FlakyTransport::new(0));
    let mirror = Arc::new(RemoteMirror::new(transport.clone(), fast_policy(1)));

    let handles: Vec<_> = (0..5)
        .map(|i| mirror.spawn_push(json!({ "v": i })))
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(transport.pushed.lock().unwrap().clone(), Some(json!({ "v": 4 })));
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(mirror.status(), SyncStatus::Idle);
}

#[tokio::test]
async fn fetched_blob_replaces_local_cells() {
    let transport = Arc::new(FlakyTransport::new(0));
    let mirror = RemoteMirror::new(transport, fast_policy(1));
    let mut ledger = Ledger::open(Box::new(MemoryStore::new()), reference_sections());

    let blob = mirror.fetch().await.unwrap();
    ledger.apply_remote(&blob).unwrap();

    let period = Period::new(2025, 1).unwrap();
    assert_eq!(ledger.get_cell(period, "orgu", &RowKey::Day(1), "kyass"), "7");
}

#[test]
fn status_serialises_with_a_state_tag() {
    assert_eq!(
        serde_json::to_value(SyncStatus::Pushing { attempt: 2 }).unwrap(),
        json!({ "state": "pushing", "attempt": 2 })
    );
}
