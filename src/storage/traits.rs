// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Encryption error: {0}")]
    Encryption(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Local durable key/value storage, partitioned into named namespaces.
///
/// Every call is a single atomic step against the backend: a `put` either
/// replaces the whole value or leaves the old one in place. Callers that need
/// read-modify-write semantics serialize those calls themselves.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StorageError>;

    /// Insert or replace. A replaced key moves to the newest position.
    async fn put(&self, namespace: &str, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Returns `true` if the key existed.
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StorageError>;

    /// Keys in the namespace, oldest write first.
    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

    /// All namespaces currently holding at least one entry.
    async fn namespaces(&self) -> Result<Vec<String>, StorageError>;

    /// Remove a namespace and everything in it. Returns `true` if it existed.
    async fn drop_namespace(&self, namespace: &str) -> Result<bool, StorageError>;

    async fn len(&self, namespace: &str) -> Result<usize, StorageError> {
        Ok(self.keys(namespace).await?.len())
    }

    /// Move a value to another key in the same namespace, replacing whatever
    /// `to` held. Returns `false` if `from` was absent.
    ///
    /// Backends that can undo their own encoding should override this so a
    /// value that no longer decodes can still be moved.
    async fn rename(&self, namespace: &str, from: &str, to: &str) -> Result<bool, StorageError> {
        let Some(value) = self.get(namespace, from).await? else {
            return Ok(false);
        };
        self.put(namespace, to, &value).await?;
        self.delete(namespace, from).await
    }
}
