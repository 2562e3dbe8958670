// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::traits::{DurableStore, StorageError};

#[derive(Default)]
struct Namespace {
    /// key -> (write sequence, value)
    entries: HashMap<String, (u64, Value)>,
}

/// Volatile [`DurableStore`] for tests and for hosts without a disk.
pub struct InMemoryStore {
    namespaces: DashMap<String, Namespace>,
    seq: AtomicU64,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            namespaces: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Total entries across all namespaces
    #[must_use]
    pub fn total_entries(&self) -> usize {
        self.namespaces.iter().map(|ns| ns.entries.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_entries() == 0
    }

    pub fn clear(&self) {
        self.namespaces.clear();
    }

    /// Raw value as stored, bypassing any decorator. Used to check what
    /// actually lands at rest.
    #[must_use]
    pub fn raw(&self, namespace: &str, key: &str) -> Option<Value> {
        self.namespaces
            .get(namespace)
            .and_then(|ns| ns.entries.get(key).map(|(_, v)| v.clone()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.raw(namespace, key))
    }

    async fn put(&self, namespace: &str, key: &str, value: &Value) -> Result<(), StorageError> {
        let seq = self.seq.fetch_add(1, Ordering::AcqRel);
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .entries
            .insert(key.to_string(), (seq, value.clone()));
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        let removed = match self.namespaces.get_mut(namespace) {
            Some(mut ns) => ns.entries.remove(key).is_some(),
            None => false,
        };
        // Empty namespaces disappear, matching the SQL backend
        self.namespaces.remove_if(namespace, |_, ns| ns.entries.is_empty());
        Ok(removed)
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        let Some(ns) = self.namespaces.get(namespace) else {
            return Ok(Vec::new());
        };
        let mut ordered: Vec<(u64, String)> = ns
            .entries
            .iter()
            .map(|(k, (seq, _))| (*seq, k.clone()))
            .collect();
        ordered.sort_unstable_by_key(|(seq, _)| *seq);
        Ok(ordered.into_iter().map(|(_, k)| k).collect())
    }

    async fn namespaces(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self
            .namespaces
            .iter()
            .filter(|ns| !ns.entries.is_empty())
            .map(|ns| ns.key().clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn drop_namespace(&self, namespace: &str) -> Result<bool, StorageError> {
        Ok(self.namespaces.remove(namespace).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert!(store.namespaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryStore::new();
        store.put("ns", "k", &json!({"fc": 80})).await.unwrap();

        let value = store.get("ns", "k").await.unwrap().unwrap();
        assert_eq!(value["fc"], 80);
        assert!(store.get("other", "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_are_oldest_first_and_rewrite_moves_to_end() {
        let store = InMemoryStore::new();
        store.put("ns", "a", &json!(1)).await.unwrap();
        store.put("ns", "b", &json!(2)).await.unwrap();
        store.put("ns", "c", &json!(3)).await.unwrap();
        assert_eq!(store.keys("ns").await.unwrap(), vec!["a", "b", "c"]);

        store.put("ns", "a", &json!(4)).await.unwrap();
        assert_eq!(store.keys("ns").await.unwrap(), vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let store = InMemoryStore::new();
        assert!(!store.delete("ns", "missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_last_delete_removes_namespace() {
        let store = InMemoryStore::new();
        store.put("ns", "only", &json!(true)).await.unwrap();
        assert!(store.delete("ns", "only").await.unwrap());
        assert!(store.namespaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_namespace() {
        let store = InMemoryStore::new();
        store.put("keep", "x", &json!(1)).await.unwrap();
        store.put("drop", "y", &json!(2)).await.unwrap();

        assert!(store.drop_namespace("drop").await.unwrap());
        assert!(!store.drop_namespace("drop").await.unwrap());
        assert_eq!(store.namespaces().await.unwrap(), vec!["keep"]);
        assert_eq!(store.len("keep").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryStore::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    store
                        .put("ns", &format!("batch-{}-item-{}", batch, i), &json!(i))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len("ns").await.unwrap(), 100);
    }
}
