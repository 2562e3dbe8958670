// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite backend for on-device durable storage.
//!
//! One table holds every namespace:
//! ```sql
//! CREATE TABLE kv_entries (
//!   namespace TEXT NOT NULL,
//!   key       TEXT NOT NULL,
//!   value     TEXT NOT NULL,   -- JSON text (ciphertext token when encrypted)
//!   seq       INTEGER NOT NULL, -- write order, used for oldest-first listing
//!   PRIMARY KEY (namespace, key)
//! )
//! ```
//!
//! Values are stored as JSON text. When wrapped by
//! [`EncryptedStore`](crate::crypto::EncryptedStore) the text is a quoted
//! base64 token, so no plaintext reaches the file.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{any::AnyPoolOptions, AnyPool, Row};
use tracing::{debug, info};

use super::traits::{DurableStore, StorageError};
use crate::resilience::retry::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

fn backend(context: &str, err: sqlx::Error) -> StorageError {
    StorageError::Backend(format!("{}: {}", context, err))
}

pub struct SqliteStore {
    pool: AnyPool,
    path: String,
    seq: AtomicI64,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        install_drivers();

        let path_str = path.as_ref().to_string_lossy().to_string();
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Backend(format!("Failed to create storage dir: {}", e)))?;
            }
        }
        let url = format!("sqlite://{}?mode=rwc", path_str);

        // Single connection: every mutating call is one statement, and one
        // writer keeps SQLite from returning SQLITE_BUSY under load.
        let pool = retry("sqlite_open", &RetryConfig::storage_open(), || async {
            AnyPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&url)
                .await
                .map_err(|e| backend("connect", e))
        })
        .await?;

        let store = Self {
            pool,
            path: path_str,
            seq: AtomicI64::new(0),
        };
        store.init_schema().await?;

        let max_seq = store.max_seq().await?;
        store.seq.store(max_seq, Ordering::Release);

        info!(path = %store.path, max_seq, "Local store opened");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| backend("enable WAL mode", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                seq INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| backend("create kv_entries", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_kv_seq ON kv_entries (namespace, seq)")
            .execute(&self.pool)
            .await
            .map_err(|e| backend("create idx_kv_seq", e))?;

        Ok(())
    }

    async fn max_seq(&self) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COALESCE(MAX(seq), 0) AS max_seq FROM kv_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| backend("read max seq", e))?;
        row.try_get::<i64, _>("max_seq")
            .map_err(|e| backend("decode max seq", e))
    }

    /// Path to the database file.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    /// Close the pool, flushing the SQLite WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend("get", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let text: String = row.try_get("value").map_err(|e| backend("decode value", e))?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn put(&self, namespace: &str, key: &str, value: &Value) -> Result<(), StorageError> {
        let text = serde_json::to_string(value)?;
        let seq = self.seq.fetch_add(1, Ordering::AcqRel) + 1;

        sqlx::query(
            "INSERT INTO kv_entries (namespace, key, value, seq) VALUES (?, ?, ?, ?) \
             ON CONFLICT (namespace, key) DO UPDATE SET value = excluded.value, seq = excluded.seq",
        )
        .bind(namespace)
        .bind(key)
        .bind(text)
        .bind(seq)
        .execute(&self.pool)
        .await
        .map_err(|e| backend("put", e))?;

        debug!(namespace, key, seq, "Entry written");
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| backend("delete", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT key FROM kv_entries WHERE namespace = ? ORDER BY seq ASC")
            .bind(namespace)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend("keys", e))?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("key").map_err(|e| backend("decode key", e)))
            .collect()
    }

    async fn namespaces(&self) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT DISTINCT namespace FROM kv_entries ORDER BY namespace")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend("namespaces", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("namespace")
                    .map_err(|e| backend("decode namespace", e))
            })
            .collect()
    }

    async fn drop_namespace(&self, namespace: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE namespace = ?")
            .bind(namespace)
            .execute(&self.pool)
            .await
            .map_err(|e| backend("drop namespace", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn len(&self, namespace: &str) -> Result<usize, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM kv_entries WHERE namespace = ?")
            .bind(namespace)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| backend("count", e))?;
        let n: i64 = row.try_get("n").map_err(|e| backend("decode count", e))?;
        Ok(n as usize)
    }

    /// Moves the stored text as-is, so rows that no longer parse can be moved too.
    async fn rename(&self, namespace: &str, from: &str, to: &str) -> Result<bool, StorageError> {
        let seq = self.seq.fetch_add(1, Ordering::AcqRel) + 1;
        let mut tx = self.pool.begin().await.map_err(|e| backend("begin rename", e))?;

        sqlx::query("DELETE FROM kv_entries WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(to)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend("rename", e))?;
        let moved = sqlx::query(
            "UPDATE kv_entries SET key = ?, seq = ? WHERE namespace = ? AND key = ?",
        )
        .bind(to)
        .bind(seq)
        .bind(namespace)
        .bind(from)
        .execute(&mut *tx)
        .await
        .map_err(|e| backend("rename", e))?
        .rows_affected()
            > 0;

        tx.commit().await.map_err(|e| backend("commit rename", e))?;
        debug!(namespace, from, to, moved, "Entry renamed");
        Ok(moved)
    }
}
