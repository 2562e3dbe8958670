// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable mutation queue with bounded replay.
//!
//! The whole queue lives under a single storage key as an ordered snapshot.
//! Every change is a read-modify-write of that snapshot, serialized by an
//! async mutex so no caller ever observes a half-applied change.
//!
//! # Replay
//!
//! ```text
//! snapshot at pass start ──► for each entry, in order
//!                              ├─ remote Ok  ──► dequeue           (synced)
//!                              └─ remote Err ──► retries += 1      (failed)
//!                                                  └─ at ceiling ──► dequeue (discarded)
//! ```
//!
//! Entries enqueued while a pass runs are left for the next pass.
//!
//! # Unreadable snapshots
//!
//! A snapshot that does not decode (sealed under another session's key, or
//! corrupted on disk) is moved aside to `pending.unreadable-<millis>` with its
//! bytes intact, and the queue carries on empty.
//! [`restore_unreadable`](MutationQueue::restore_unreadable) merges such
//! snapshots back once they open again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::crypto::looks_like_ciphertext;
use crate::metrics::EngineMetrics;
use crate::remote::RemoteWriter;
use crate::storage::traits::{DurableStore, StorageError};

mod mutation;

pub use mutation::{parse_snapshot, split_key, MutationOp, QueuedMutation};

/// Storage key of the queue snapshot inside its namespace.
pub const QUEUE_KEY: &str = "pending";

/// Key prefix for snapshots set aside because they could not be read.
pub const UNREADABLE_PREFIX: &str = "pending.unreadable-";

/// Outcome of one replay pass. Reported, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncPassResult {
    pub synced: usize,
    /// Every failed attempt, including the discarded ones
    pub failed: usize,
    /// Entries dropped this pass after reaching the retry ceiling
    pub discarded: usize,
    #[serde(skip)]
    pub duration: Duration,
}

impl SyncPassResult {
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.synced + self.failed
    }
}

/// Lifetime queue counters plus current depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub enqueued: u64,
    pub synced: u64,
    pub discarded: u64,
    pub passes: u64,
}

pub struct MutationQueue {
    store: Arc<dyn DurableStore>,
    namespace: String,
    max_retries: u32,
    key_field: String,
    metrics: Arc<EngineMetrics>,
    write_lock: Mutex<()>,
    replay_lock: Mutex<()>,
    enqueued: AtomicU64,
    synced: AtomicU64,
    discarded: AtomicU64,
    passes: AtomicU64,
}

impl MutationQueue {
    /// Queue with default namespace, ceiling and key field.
    pub fn new(store: Arc<dyn DurableStore>, metrics: Arc<EngineMetrics>) -> Self {
        Self::from_config(store, &EngineConfig::default(), metrics)
    }

    pub fn from_config(
        store: Arc<dyn DurableStore>,
        config: &EngineConfig,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            store,
            namespace: config.queue_namespace.clone(),
            max_retries: config.max_retries.max(1),
            key_field: config.update_key_field.clone(),
            metrics,
            write_lock: Mutex::new(()),
            replay_lock: Mutex::new(()),
            enqueued: AtomicU64::new(0),
            synced: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            passes: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Append a new mutation. No duplicate suppression.
    #[tracing::instrument(skip(self, payload, authoring_user))]
    pub async fn enqueue(
        &self,
        table: &str,
        operation: MutationOp,
        payload: Value,
        authoring_user: Option<String>,
    ) -> Result<QueuedMutation, StorageError> {
        let entry = QueuedMutation::new(
            table,
            operation,
            payload,
            authoring_user,
            self.metrics.clock().now_millis(),
        );
        let pushed = entry.clone();
        let depth = self
            .modify(move |entries| {
                entries.push(pushed);
                (entries.len(), true)
            })
            .await?;

        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.metrics.enqueued(table, depth);
        info!(id = %entry.id, op = %operation, depth, "Mutation queued");
        Ok(entry)
    }

    /// Remove one entry. Returns `false` (and writes nothing) if absent.
    pub async fn dequeue(&self, id: Uuid) -> Result<bool, StorageError> {
        self.modify(|entries| {
            let before = entries.len();
            entries.retain(|e| e.id != id);
            let removed = entries.len() != before;
            (removed, removed)
        })
        .await
    }

    /// All entries in enqueue order.
    pub async fn list(&self) -> Result<Vec<QueuedMutation>, StorageError> {
        let _guard = self.write_lock.lock().await;
        self.load_locked().await
    }

    pub async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.list().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len().await? == 0)
    }

    pub async fn stats(&self) -> QueueStats {
        let pending = match self.len().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Queue depth unavailable, reporting 0");
                0
            }
        };
        QueueStats {
            pending,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            synced: self.synced.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
        }
    }

    /// Replay every entry present now. Waits for a running pass to finish.
    #[tracing::instrument(skip(self, remote))]
    pub async fn replay(&self, remote: &dyn RemoteWriter) -> SyncPassResult {
        let _pass = self.replay_lock.lock().await;
        self.run_pass(remote).await
    }

    /// Like [`replay`](Self::replay), but returns `None` instead of waiting
    /// when a pass is already running.
    pub async fn try_replay(&self, remote: &dyn RemoteWriter) -> Option<SyncPassResult> {
        let _pass = self.replay_lock.try_lock().ok()?;
        Some(self.run_pass(remote).await)
    }

    async fn run_pass(&self, remote: &dyn RemoteWriter) -> SyncPassResult {
        let start = Instant::now();
        let snapshot = match self.list().await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "Could not read queue for replay");
                Vec::new()
            }
        };

        let mut result = SyncPassResult::default();
        if snapshot.is_empty() {
            debug!("Queue empty, nothing to replay");
            return result;
        }

        info!(entries = snapshot.len(), "Replay pass starting");
        for entry in &snapshot {
            match entry.apply(remote, &self.key_field).await {
                Ok(()) => {
                    if let Err(e) = self.dequeue(entry.id).await {
                        error!(id = %entry.id, error = %e, "Synced entry could not be removed");
                    }
                    result.synced += 1;
                }
                Err(err) => {
                    result.failed += 1;
                    match self.record_failure(entry.id).await {
                        Ok(Some(retries)) if retries >= self.max_retries => {
                            result.discarded += 1;
                            warn!(
                                id = %entry.id,
                                table = %entry.table,
                                op = %entry.operation,
                                retries,
                                error = %err,
                                "Mutation discarded after reaching retry ceiling"
                            );
                        }
                        Ok(Some(retries)) => {
                            debug!(id = %entry.id, retries, error = %err, "Replay failed, will retry");
                        }
                        Ok(None) => {
                            debug!(id = %entry.id, "Entry removed during replay");
                        }
                        Err(e) => {
                            error!(id = %entry.id, error = %e, "Could not record replay failure");
                        }
                    }
                }
            }
        }

        result.duration = start.elapsed();
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.synced.fetch_add(result.synced as u64, Ordering::Relaxed);
        self.discarded
            .fetch_add(result.discarded as u64, Ordering::Relaxed);
        let depth = self.len().await.unwrap_or(0);
        self.metrics.sync_pass(&result, depth);
        info!(
            synced = result.synced,
            failed = result.failed,
            discarded = result.discarded,
            remaining = depth,
            duration_ms = result.duration.as_millis() as u64,
            "Replay pass complete"
        );
        result
    }

    /// Bump the retry count, dropping the entry at the ceiling.
    /// Returns the new count, or `None` if the entry is gone.
    async fn record_failure(&self, id: Uuid) -> Result<Option<u32>, StorageError> {
        let ceiling = self.max_retries;
        self.modify(move |entries| {
            let Some(pos) = entries.iter().position(|e| e.id == id) else {
                return (None, false);
            };
            entries[pos].retry_count += 1;
            let retries = entries[pos].retry_count;
            if retries >= ceiling {
                entries.remove(pos);
            }
            (Some(retries), true)
        })
        .await
    }

    /// Merge snapshots moved aside by earlier loads back into the queue, for
    /// those that open now. Entries already queued are not duplicated and the
    /// result is ordered by enqueue time. Returns how many entries came back.
    ///
    /// Snapshots that still do not open are left in place.
    #[tracing::instrument(skip(self))]
    pub async fn restore_unreadable(&self) -> Result<usize, StorageError> {
        let _guard = self.write_lock.lock().await;
        let aside: Vec<String> = self
            .store
            .keys(&self.namespace)
            .await?
            .into_iter()
            .filter(|k| k.starts_with(UNREADABLE_PREFIX))
            .collect();
        if aside.is_empty() {
            return Ok(0);
        }

        let current = self.load_locked().await?;
        let mut entries: Vec<QueuedMutation> = Vec::new();
        let mut drained = Vec::new();
        for key in aside {
            let snapshot = match self.store.get(&self.namespace, &key).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(StorageError::Serialization(_)) => {
                    debug!(key = %key, "Set-aside snapshot still unreadable");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !snapshot.is_array() {
                debug!(key = %key, "Set-aside snapshot still unreadable");
                continue;
            }
            for entry in parse_snapshot(snapshot) {
                let known = entries.iter().chain(&current).any(|e| e.id == entry.id);
                if !known {
                    entries.push(entry);
                }
            }
            drained.push(key);
        }
        if drained.is_empty() {
            return Ok(0);
        }

        // Set-aside entries predate the live snapshot, so they go first on ties
        let restored = entries.len();
        entries.extend(current);
        entries.sort_by_key(|e| e.timestamp);
        let snapshot = serde_json::to_value(&entries)?;
        self.store.put(&self.namespace, QUEUE_KEY, &snapshot).await?;
        for key in &drained {
            self.store.delete(&self.namespace, key).await?;
        }
        info!(restored, snapshots = drained.len(), depth = entries.len(), "Set-aside mutations restored");
        Ok(restored)
    }

    /// Current snapshot. Caller holds `write_lock`.
    ///
    /// Backend failures propagate. A snapshot that cannot be decoded is moved
    /// aside and the queue reads as empty, so later writes are never blocked
    /// by it and never overwrite it.
    async fn load_locked(&self) -> Result<Vec<QueuedMutation>, StorageError> {
        let reason = match self.store.get(&self.namespace, QUEUE_KEY).await {
            Ok(None) => return Ok(Vec::new()),
            Ok(Some(snapshot @ Value::Array(_))) => return Ok(parse_snapshot(snapshot)),
            Ok(Some(Value::String(token))) if looks_like_ciphertext(&token) => {
                "sealed under a key that is not loaded".to_string()
            }
            Ok(Some(_)) => "not a list of mutations".to_string(),
            Err(StorageError::Serialization(e)) => e,
            Err(e) => return Err(e),
        };
        self.set_aside(&reason).await?;
        Ok(Vec::new())
    }

    async fn set_aside(&self, reason: &str) -> Result<String, StorageError> {
        let existing = self.store.keys(&self.namespace).await?;
        let base = format!("{UNREADABLE_PREFIX}{}", self.metrics.clock().now_millis());
        let mut target = base.clone();
        let mut n = 1;
        while existing.contains(&target) {
            target = format!("{base}-{n}");
            n += 1;
        }

        self.store.rename(&self.namespace, QUEUE_KEY, &target).await?;
        warn!(
            namespace = %self.namespace,
            moved_to = %target,
            reason,
            "Unreadable queue snapshot set aside, continuing with an empty queue"
        );
        Ok(target)
    }

    /// Serialized read-modify-write. The closure returns its result and
    /// whether the snapshot changed.
    async fn modify<R>(
        &self,
        change: impl FnOnce(&mut Vec<QueuedMutation>) -> (R, bool),
    ) -> Result<R, StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load_locked().await?;
        let (out, changed) = change(&mut entries);
        if changed {
            let snapshot = serde_json::to_value(&entries)?;
            self.store.put(&self.namespace, QUEUE_KEY, &snapshot).await?;
        }
        Ok(out)
    }
}
