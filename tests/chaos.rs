//! Chaos Testing for Ward Sync
//!
//! This module tests failure scenarios using:
//! 1. **FailingStore wrapper** - precise error injection at specific call counts
//! 2. **FlakyRemote** - remote writes failing on chosen attempts
//! 3. **Data corruption** - garbage and foreign-key data in local storage
//!
//! # Running Chaos Tests
//! ```bash
//! cargo test --test chaos -- --nocapture
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use ward_sync::{
    DurableStore, EngineConfig, EngineMetrics, FetchError, Fetcher, InMemoryStore, MutationOp,
    MutationQueue, OfflineEngine, RemoteError, RemoteWriter, Request, ResponseSnapshot,
    ResponseSource, StorageError, WriteOutcome,
};

// =============================================================================
// Failing Store Wrapper - Precise Error Injection
// =============================================================================

/// Wraps a store and fails chosen `put` calls (1-indexed), or every read
/// while `reads_down` is set.
pub struct FailingStore<S: DurableStore> {
    inner: S,
    put_calls: AtomicU64,
    fail_puts_on: Vec<u64>,
    reads_down: AtomicBool,
}

impl<S: DurableStore> FailingStore<S> {
    pub fn new(inner: S, fail_puts_on: Vec<u64>) -> Self {
        Self {
            inner,
            put_calls: AtomicU64::new(0),
            fail_puts_on,
            reads_down: AtomicBool::new(false),
        }
    }

    pub fn set_reads_down(&self, down: bool) {
        self.reads_down.store(down, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), StorageError> {
        if self.reads_down.load(Ordering::SeqCst) {
            Err(StorageError::Backend("disk I/O error".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<S: DurableStore> DurableStore for FailingStore<S> {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StorageError> {
        self.check_read()?;
        self.inner.get(namespace, key).await
    }

    async fn put(&self, namespace: &str, key: &str, value: &Value) -> Result<(), StorageError> {
        let call = self.put_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_puts_on.contains(&call) {
            return Err(StorageError::Backend(format!("injected failure on put #{call}")));
        }
        self.inner.put(namespace, key, value).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        self.inner.delete(namespace, key).await
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        self.check_read()?;
        self.inner.keys(namespace).await
    }

    async fn namespaces(&self) -> Result<Vec<String>, StorageError> {
        self.check_read()?;
        self.inner.namespaces().await
    }

    async fn drop_namespace(&self, namespace: &str) -> Result<bool, StorageError> {
        self.inner.drop_namespace(namespace).await
    }
}

// =============================================================================
// Remote and Network Doubles
// =============================================================================

/// Remote failing on the listed attempts (1-indexed), recording every payload.
#[derive(Default)]
struct FlakyRemote {
    attempts: AtomicU64,
    fail_on: HashSet<u64>,
    down: AtomicBool,
    seen: Mutex<Vec<Value>>,
}

impl FlakyRemote {
    fn failing_on(attempts: impl IntoIterator<Item = u64>) -> Self {
        Self {
            fail_on: attempts.into_iter().collect(),
            ..Default::default()
        }
    }

    fn attempt(&self, payload: &Value) -> Result<(), RemoteError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().push(payload.clone());
        if self.down.load(Ordering::SeqCst) || self.fail_on.contains(&n) {
            Err(RemoteError::Rejected {
                status: 502,
                body: "bad gateway".into(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteWriter for FlakyRemote {
    async fn insert(&self, _table: &str, payload: &Value) -> Result<(), RemoteError> {
        self.attempt(payload)
    }

    async fn update(
        &self,
        _table: &str,
        _key_field: &str,
        _key_value: &Value,
        payload: &Value,
    ) -> Result<(), RemoteError> {
        self.attempt(payload)
    }

    async fn upsert(&self, _table: &str, payload: &Value) -> Result<(), RemoteError> {
        self.attempt(payload)
    }
}

/// Network that answers everything with the same body, or nothing at all.
#[derive(Default)]
struct Network {
    offline: AtomicBool,
}

#[async_trait]
impl Fetcher for Network {
    async fn fetch(&self, _request: &Request) -> Result<ResponseSnapshot, FetchError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(FetchError::Network("no route to host".into()))
        } else {
            Ok(ResponseSnapshot::new(200, "fresh"))
        }
    }
}

fn queue_on(store: Arc<dyn DurableStore>) -> MutationQueue {
    MutationQueue::new(store, Arc::new(EngineMetrics::default()))
}

fn config() -> EngineConfig {
    EngineConfig {
        app_origin: "https://ward.example.org".into(),
        data_host: Some("abc.supabase.co".into()),
        ..Default::default()
    }
}

async fn engine_on(store: Arc<dyn DurableStore>, net: Arc<Network>) -> OfflineEngine {
    OfflineEngine::builder(config())
        .store(store)
        .fetcher(net)
        .remote(Arc::new(FlakyRemote::default()))
        .build()
        .await
        .expect("engine builds")
}

// =============================================================================
// Storage Failures
// =============================================================================

#[tokio::test]
async fn chaos_enqueue_put_failure_surfaces_error() {
    let store = Arc::new(FailingStore::new(InMemoryStore::new(), vec![1]));
    let queue = queue_on(store);

    let first = queue
        .enqueue("vitals", MutationOp::Insert, json!({"fc": 80}), None)
        .await;
    assert!(matches!(first, Err(StorageError::Backend(_))));
    assert_eq!(queue.len().await.unwrap(), 0);

    queue
        .enqueue("vitals", MutationOp::Insert, json!({"fc": 81}), None)
        .await
        .unwrap();
    assert_eq!(queue.list().await.unwrap()[0].payload, json!({"fc": 81}));
}

#[tokio::test]
async fn chaos_dequeue_failure_leads_to_resend_not_loss() {
    // put #1 = enqueue, put #2 = dequeue after the successful send
    let store = Arc::new(FailingStore::new(InMemoryStore::new(), vec![2]));
    let queue = queue_on(store);
    let remote = FlakyRemote::default();

    queue
        .enqueue("vitals", MutationOp::Insert, json!({"fc": 80}), None)
        .await
        .unwrap();

    let first = queue.replay(&remote).await;
    assert_eq!(first.synced, 1);
    assert_eq!(queue.len().await.unwrap(), 1, "entry kept when removal fails");

    let second = queue.replay(&remote).await;
    assert_eq!(second.synced, 1);
    assert!(queue.is_empty().await.unwrap());
    assert_eq!(remote.seen.lock().len(), 2);
}

#[tokio::test]
async fn chaos_retry_bookkeeping_failure_keeps_count() {
    let store = Arc::new(FailingStore::new(InMemoryStore::new(), vec![2]));
    let queue = queue_on(store);
    let remote = FlakyRemote::default();
    remote.down.store(true, Ordering::SeqCst);

    queue
        .enqueue("labs", MutationOp::Upsert, json!({"id": "l1"}), None)
        .await
        .unwrap();

    let result = queue.replay(&remote).await;
    assert_eq!((result.synced, result.failed, result.discarded), (0, 1, 0));
    assert_eq!(queue.list().await.unwrap()[0].retry_count, 0);

    queue.replay(&remote).await;
    assert_eq!(queue.list().await.unwrap()[0].retry_count, 1);
}

#[tokio::test]
async fn chaos_unreadable_queue_replays_nothing() {
    let store = Arc::new(FailingStore::new(InMemoryStore::new(), vec![]));
    let queue = queue_on(store.clone());
    let remote = FlakyRemote::default();
    queue
        .enqueue("vitals", MutationOp::Insert, json!({"fc": 80}), None)
        .await
        .unwrap();

    store.set_reads_down(true);
    let result = queue.replay(&remote).await;
    assert_eq!(result.attempted(), 0);
    assert!(remote.seen.lock().is_empty());

    store.set_reads_down(false);
    assert_eq!(queue.replay(&remote).await.synced, 1);
}

#[tokio::test]
async fn chaos_read_outage_is_not_mistaken_for_corruption() {
    let store = Arc::new(FailingStore::new(InMemoryStore::new(), vec![]));
    let queue = queue_on(store.clone());
    queue
        .enqueue("vitals", MutationOp::Insert, json!({"fc": 80}), None)
        .await
        .unwrap();

    store.set_reads_down(true);
    assert!(matches!(queue.list().await, Err(StorageError::Backend(_))));
    assert_eq!(queue.stats().await.pending, 0);

    // Nothing was set aside during the outage
    store.set_reads_down(false);
    assert_eq!(queue.stats().await.pending, 1);
    assert_eq!(store.keys("offline-queue").await.unwrap(), vec!["pending"]);
}

#[tokio::test]
async fn chaos_cache_read_failure_falls_back_to_offline_response() {
    let store = Arc::new(FailingStore::new(InMemoryStore::new(), vec![]));
    let net = Arc::new(Network::default());
    let engine = engine_on(store.clone(), net.clone()).await;

    store.set_reads_down(true);
    let req = Request::get("https://ward.example.org/api/census").unwrap();
    let served = engine.fetch(&req).await.unwrap();
    assert_eq!(served.source, ResponseSource::Network);

    net.offline.store(true, Ordering::SeqCst);
    let served = engine.fetch(&req).await.unwrap();
    assert_eq!(served.source, ResponseSource::Offline);
    assert_eq!(served.response.status, 503);
}

#[tokio::test]
async fn chaos_cache_write_failure_still_serves_network() {
    let store = Arc::new(FailingStore::new(InMemoryStore::new(), (1..=10).collect()));
    let engine = engine_on(store, Arc::new(Network::default())).await;

    let req = Request::get("https://ward.example.org/app.js").unwrap();
    let served = engine.fetch(&req).await.unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.text(), "fresh");
}

// =============================================================================
// Remote Flapping
// =============================================================================

#[tokio::test]
async fn chaos_flapping_remote_drains_queue_in_order() {
    let store = Arc::new(InMemoryStore::new());
    let queue = queue_on(store);
    let remote = FlakyRemote::failing_on([2, 3, 5]);

    for n in 0..4 {
        queue
            .enqueue("vitals", MutationOp::Insert, json!({"n": n}), None)
            .await
            .unwrap();
    }

    let mut passes = 0;
    while !queue.is_empty().await.unwrap() {
        queue.replay(&remote).await;
        passes += 1;
        assert!(passes < 5, "queue should drain well before the ceiling");
    }

    // 1 ok n0, 2 fail n1, 3 fail n2, 4 ok n3 | 5 fail n1, 6 ok n2 | 7 ok n1
    let seen: Vec<i64> = remote
        .seen
        .lock()
        .iter()
        .filter_map(|p| p["n"].as_i64())
        .collect();
    assert_eq!(seen, vec![0, 1, 2, 3, 1, 2, 1]);
    assert_eq!(passes, 3);
}

// =============================================================================
// Data Corruption
// =============================================================================

#[tokio::test]
async fn chaos_garbage_cache_entry_is_a_miss() {
    let store = Arc::new(InMemoryStore::new());
    let net = Arc::new(Network::default());
    net.offline.store(true, Ordering::SeqCst);
    let engine = engine_on(store.clone(), net).await;

    let req = Request::get("https://abc.supabase.co/rest/v1/vitals").unwrap();
    store
        .put("ward-sync-data-v1", &req.cache_key(), &json!({"garbage": [1, 2, 3]}))
        .await
        .unwrap();

    let served = engine.fetch(&req).await.unwrap();
    assert_eq!(served.source, ResponseSource::Offline);
    assert_eq!(served.response.status, 503);
}

#[tokio::test]
async fn chaos_corrupted_queue_snapshot_reads_as_empty() {
    let store = Arc::new(InMemoryStore::new());
    store
        .put("offline-queue", "pending", &json!({"not": "an array"}))
        .await
        .unwrap();
    let queue = queue_on(store.clone());

    assert!(queue.is_empty().await.unwrap());
    queue
        .enqueue("vitals", MutationOp::Insert, json!({"fc": 80}), None)
        .await
        .unwrap();
    assert_eq!(queue.len().await.unwrap(), 1);

    // The corrupt value is kept aside, not overwritten
    let keys = store.keys("offline-queue").await.unwrap();
    assert_eq!(keys.len(), 2);
    let aside = keys.iter().find(|k| k.starts_with("pending.unreadable-")).unwrap();
    assert_eq!(store.raw("offline-queue", aside), Some(json!({"not": "an array"})));
}

#[tokio::test]
async fn chaos_partially_corrupted_snapshot_keeps_valid_entries() {
    let store = Arc::new(InMemoryStore::new());
    let queue = queue_on(store.clone());
    let good = queue
        .enqueue("vitals", MutationOp::Insert, json!({"fc": 80}), None)
        .await
        .unwrap();

    let mut snapshot = store.raw("offline-queue", "pending").unwrap();
    snapshot
        .as_array_mut()
        .unwrap()
        .insert(0, json!({"table": 42, "operation": "explode"}));
    store.put("offline-queue", "pending", &snapshot).await.unwrap();

    let entries = queue.list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, good.id);
}

#[tokio::test]
async fn chaos_foreign_key_data_is_never_misread() {
    let store = Arc::new(InMemoryStore::new());
    let net = Arc::new(Network::default());
    let remote = Arc::new(FlakyRemote::default());
    let engine = OfflineEngine::builder(config())
        .store(store.clone())
        .fetcher(net.clone())
        .remote(remote.clone())
        .build()
        .await
        .expect("engine builds");

    engine.unlock("alice-session").await.unwrap();
    let req = Request::get("https://ward.example.org/api/patient/17").unwrap();
    engine.fetch(&req).await.unwrap();
    engine.set_online(false).await;
    engine
        .write("notes", MutationOp::Insert, json!({"text": "alice"}), None)
        .await
        .unwrap();

    engine.lock();
    engine.unlock("bob-session").await.unwrap();

    net.offline.store(true, Ordering::SeqCst);
    let served = engine.fetch(&req).await.unwrap();
    assert_eq!(served.source, ResponseSource::Offline, "sealed entry is a miss");
    assert_eq!(engine.pending_count().await, 0);

    // Alice's sealed queue does not block Bob
    let outcome = engine
        .write("notes", MutationOp::Insert, json!({"text": "bob"}), None)
        .await
        .unwrap();
    assert!(matches!(outcome, WriteOutcome::Queued(_)));
    assert_eq!(engine.pending_count().await, 1);

    let result = engine.set_online(true).await.expect("reconnect replays");
    assert_eq!(result.synced, 1);
    assert_eq!(*remote.seen.lock(), vec![json!({"text": "bob"})]);

    // Alice's mutation was set aside, not lost
    engine.unlock("alice-session").await.unwrap();
    assert_eq!(engine.pending_count().await, 1);
    assert_eq!(engine.fetch(&req).await.unwrap().response.text(), "fresh");

    engine.set_online(false).await;
    let result = engine.set_online(true).await.expect("reconnect replays");
    assert_eq!(result.synced, 1);
    assert_eq!(
        *remote.seen.lock(),
        vec![json!({"text": "bob"}), json!({"text": "alice"})]
    );
}
