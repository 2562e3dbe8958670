// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache strategy router.
//!
//! Every outgoing read is classified ([`classify`]) and served by one of four
//! strategies ([`strategies`]). Network failures never escape: a read either
//! gets a real response, a cached one, the app shell, or a synthetic 503.
//!
//! ```text
//!   Request ──► Classifier ──► Passthrough ──► None (caller fetches itself)
//!                    │
//!                    └──► Strategy ──► Fetcher ◄──► network
//!                             │
//!                             └──► DurableStore (versioned namespaces)
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::metrics::{self, EngineMetrics, LatencyTimer};
use crate::storage::traits::DurableStore;

pub mod classify;
pub mod http;
mod lifecycle;
mod strategies;

pub use classify::{CacheKind, Classifier, Route, Strategy};
pub use http::{
    cache_key_for, FetchError, Fetcher, Request, ResponseSnapshot, ReqwestFetcher, OFFLINE_STATUS,
};
pub use lifecycle::{ActivationReport, InstallReport};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    /// The cached app shell, standing in for a navigation target
    Shell,
    /// Synthetic offline response
    Offline,
}

impl ResponseSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Shell => "shell",
            ResponseSource::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedResponse {
    pub response: ResponseSnapshot,
    pub source: ResponseSource,
}

impl ServedResponse {
    fn new(response: ResponseSnapshot, source: ResponseSource) -> Self {
        Self { response, source }
    }
}

/// Persisted form of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub response: ResponseSnapshot,
    pub namespace: String,
    /// Epoch millis
    pub stored_at: i64,
}

/// Cheap to clone; clones share storage, network and metrics.
#[derive(Clone)]
pub struct CacheRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    store: Arc<dyn DurableStore>,
    fetcher: Arc<dyn Fetcher>,
    classifier: Classifier,
    config: EngineConfig,
    metrics: Arc<EngineMetrics>,
}

impl CacheRouter {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn DurableStore>,
        fetcher: Arc<dyn Fetcher>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                classifier: Classifier::from_config(&config),
                store,
                fetcher,
                config,
                metrics,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn namespace(&self, kind: CacheKind) -> String {
        self.inner.config.namespace(kind.as_str())
    }

    #[must_use]
    pub fn classify(&self, request: &Request) -> Route {
        self.inner.classifier.classify(request)
    }

    /// Serve a read. `None` means the request is not intercepted.
    pub async fn handle(&self, request: &Request) -> Option<ServedResponse> {
        let Route::Cached { strategy, kind } = self.classify(request) else {
            debug!(url = %request.url, method = %request.method, "Passthrough");
            return None;
        };
        let _timer = LatencyTimer::new(strategy.as_str());
        let namespace = self.namespace(kind);
        let served = match strategy {
            Strategy::CacheFirst => self.cache_first(request, &namespace).await,
            Strategy::NetworkFirst => self.network_first(request, &namespace).await,
            Strategy::Navigation => self.network_first_with_fallback(request).await,
            Strategy::StaleWhileRevalidate => {
                self.stale_while_revalidate(request, &namespace).await
            }
        };
        self.inner.metrics.served(strategy.as_str(), served.source);
        Some(served)
    }

    /// Cached entry for `key`. Unreadable or undecodable entries are misses.
    pub(crate) async fn lookup(&self, namespace: &str, key: &str) -> Option<CachedResponse> {
        let value = match self.inner.store.get(namespace, key).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                warn!(namespace, key, error = %e, "Cache read failed");
                return None;
            }
        };
        match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(namespace, key, error = %e, "Undecodable cache entry treated as miss");
                None
            }
        }
    }

    /// Write a 2xx response into `namespace`. Anything else is ignored.
    pub(crate) async fn store_response(&self, namespace: &str, key: &str, response: &ResponseSnapshot) {
        if !response.is_success() {
            return;
        }
        let entry = CachedResponse {
            response: response.clone(),
            namespace: namespace.to_string(),
            stored_at: self.inner.metrics.clock().now_millis(),
        };
        let result = match serde_json::to_value(&entry) {
            Ok(value) => self.inner.store.put(namespace, key, &value).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => metrics::record_cache_write(namespace),
            Err(e) => warn!(namespace, key, error = %e, "Cache write failed"),
        }
    }

    pub(crate) async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot, FetchError> {
        self.inner.fetcher.fetch(request).await
    }

    pub(crate) fn store(&self) -> &Arc<dyn DurableStore> {
        &self.inner.store
    }
}
