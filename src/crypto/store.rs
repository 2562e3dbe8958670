// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::AtRestCipher;
use crate::storage::traits::{DurableStore, StorageError};

/// [`DurableStore`] decorator that seals values on the way in and opens them
/// on the way out.
///
/// Keys and namespace names stay in the clear; they carry request URLs and
/// table names, never record content.
pub struct EncryptedStore {
    inner: Arc<dyn DurableStore>,
    cipher: Arc<AtRestCipher>,
}

impl EncryptedStore {
    pub fn new(inner: Arc<dyn DurableStore>, cipher: Arc<AtRestCipher>) -> Self {
        Self { inner, cipher }
    }

    pub fn cipher(&self) -> &Arc<AtRestCipher> {
        &self.cipher
    }
}

#[async_trait]
impl DurableStore for EncryptedStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let stored = self.inner.get(namespace, key).await?;
        Ok(stored.map(|value| self.cipher.decrypt_if_needed(value)))
    }

    async fn put(&self, namespace: &str, key: &str, value: &Value) -> Result<(), StorageError> {
        let sealed = self
            .cipher
            .encrypt_if_ready(value)
            .map_err(|e| StorageError::Encryption(e.to_string()))?;
        self.inner.put(namespace, key, &sealed).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        self.inner.delete(namespace, key).await
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        self.inner.keys(namespace).await
    }

    async fn namespaces(&self) -> Result<Vec<String>, StorageError> {
        self.inner.namespaces().await
    }

    async fn drop_namespace(&self, namespace: &str) -> Result<bool, StorageError> {
        self.inner.drop_namespace(namespace).await
    }

    async fn len(&self, namespace: &str) -> Result<usize, StorageError> {
        self.inner.len(namespace).await
    }

    // Sealed bytes move untouched, even when the current key cannot open them
    async fn rename(&self, namespace: &str, from: &str, to: &str) -> Result<bool, StorageError> {
        self.inner.rename(namespace, from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;
    use serde_json::json;
    use zeroize::Zeroizing;

    fn setup() -> (Arc<InMemoryStore>, Arc<AtRestCipher>, EncryptedStore) {
        let raw = Arc::new(InMemoryStore::new());
        let cipher = Arc::new(AtRestCipher::default());
        let store = EncryptedStore::new(raw.clone(), cipher.clone());
        (raw, cipher, store)
    }

    #[tokio::test]
    async fn test_values_are_sealed_at_rest() {
        let (raw, cipher, store) = setup();
        cipher.init_with_key(Zeroizing::new([3u8; 32]));

        let record = json!({"table": "vitals", "payload": {"fc": 80}});
        store.put("offline-queue", "pending", &record).await.unwrap();

        let at_rest = raw.raw("offline-queue", "pending").unwrap();
        assert!(at_rest.is_string());
        assert!(!at_rest.to_string().contains("vitals"));

        assert_eq!(store.get("offline-queue", "pending").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_plaintext_passthrough_without_key() {
        let (raw, _cipher, store) = setup();
        let record = json!({"fc": 90});

        store.put("ns", "k", &record).await.unwrap();
        assert_eq!(raw.raw("ns", "k"), Some(record.clone()));
        assert_eq!(store.get("ns", "k").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_plaintext_written_before_login_still_reads_after() {
        let (_raw, cipher, store) = setup();
        store.put("ns", "legacy", &json!({"old": true})).await.unwrap();

        cipher.init_with_key(Zeroizing::new([5u8; 32]));
        assert_eq!(store.get("ns", "legacy").await.unwrap(), Some(json!({"old": true})));
    }

    #[tokio::test]
    async fn test_listing_passes_through() {
        let (_raw, cipher, store) = setup();
        cipher.init_with_key(Zeroizing::new([1u8; 32]));

        store.put("ns", "a", &json!(1)).await.unwrap();
        store.put("ns", "b", &json!(2)).await.unwrap();

        assert_eq!(store.keys("ns").await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.namespaces().await.unwrap(), vec!["ns"]);
        assert!(store.delete("ns", "a").await.unwrap());
        assert_eq!(store.len("ns").await.unwrap(), 1);
    }
}
