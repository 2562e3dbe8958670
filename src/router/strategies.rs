// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The four serving strategies.

use tracing::{debug, info};

use super::http::{cache_key_for, Request, ResponseSnapshot};
use super::{CacheKind, CacheRouter, ResponseSource, ServedResponse, Strategy};
use crate::metrics;

impl CacheRouter {
    /// Cached entry if present, else the network (storing a 2xx), else a
    /// synthetic offline response.
    pub async fn cache_first(&self, request: &Request, namespace: &str) -> ServedResponse {
        let key = request.cache_key();
        if let Some(entry) = self.lookup(namespace, &key).await {
            return ServedResponse::new(entry.response, ResponseSource::Cache);
        }

        match self.fetch(request).await {
            Ok(response) => {
                self.store_response(namespace, &key, &response).await;
                ServedResponse::new(response, ResponseSource::Network)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Cache-first miss while offline");
                metrics::record_fetch_failure(Strategy::CacheFirst.as_str());
                ServedResponse::new(ResponseSnapshot::offline_text(), ResponseSource::Offline)
            }
        }
    }

    /// Network if reachable (storing a 2xx), else the cached entry, else a
    /// synthetic offline response.
    pub async fn network_first(&self, request: &Request, namespace: &str) -> ServedResponse {
        let key = request.cache_key();
        match self.fetch(request).await {
            Ok(response) => {
                self.store_response(namespace, &key, &response).await;
                ServedResponse::new(response, ResponseSource::Network)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network-first falling back to cache");
                metrics::record_fetch_failure(Strategy::NetworkFirst.as_str());
                match self.lookup(namespace, &key).await {
                    Some(entry) => ServedResponse::new(entry.response, ResponseSource::Cache),
                    None => ServedResponse::new(
                        ResponseSnapshot::offline_text(),
                        ResponseSource::Offline,
                    ),
                }
            }
        }
    }

    /// Network-first for page navigations. On total failure the cached app
    /// shell is served so client-side routing can take over.
    pub async fn network_first_with_fallback(&self, request: &Request) -> ServedResponse {
        let namespace = self.namespace(CacheKind::Runtime);
        let key = request.cache_key();
        match self.fetch(request).await {
            Ok(response) => {
                self.store_response(&namespace, &key, &response).await;
                return ServedResponse::new(response, ResponseSource::Network);
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Navigation offline");
                metrics::record_fetch_failure(Strategy::Navigation.as_str());
            }
        }

        if let Some(entry) = self.lookup(&namespace, &key).await {
            return ServedResponse::new(entry.response, ResponseSource::Cache);
        }
        if let Some(shell) = self.cached_shell().await {
            return ServedResponse::new(shell, ResponseSource::Shell);
        }
        info!(url = %request.url, "No cached shell, serving offline page");
        ServedResponse::new(ResponseSnapshot::offline_html(), ResponseSource::Offline)
    }

    /// Cached entry immediately with a detached refresh, or the network when
    /// nothing is cached.
    pub async fn stale_while_revalidate(&self, request: &Request, namespace: &str) -> ServedResponse {
        let key = request.cache_key();
        if let Some(entry) = self.lookup(namespace, &key).await {
            let router = self.clone();
            let request = request.clone();
            let namespace = namespace.to_string();
            tokio::spawn(async move {
                router.revalidate(&request, &namespace, &key).await;
            });
            return ServedResponse::new(entry.response, ResponseSource::Cache);
        }

        match self.fetch(request).await {
            Ok(response) => {
                self.store_response(namespace, &key, &response).await;
                ServedResponse::new(response, ResponseSource::Network)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Stale-while-revalidate miss while offline");
                metrics::record_fetch_failure(Strategy::StaleWhileRevalidate.as_str());
                ServedResponse::new(ResponseSnapshot::offline_json(), ResponseSource::Offline)
            }
        }
    }

    async fn revalidate(&self, request: &Request, namespace: &str, key: &str) {
        match self.fetch(request).await {
            Ok(response) => self.store_response(namespace, key, &response).await,
            Err(e) => debug!(url = %request.url, error = %e, "Background refresh failed"),
        }
    }

    /// The app shell document, looked up in `static` then `runtime`.
    pub(crate) async fn cached_shell(&self) -> Option<ResponseSnapshot> {
        let url = self
            .config()
            .origin_url()
            .ok()?
            .join(&self.config().shell_path)
            .ok()?;
        let key = cache_key_for(&url);
        for kind in [CacheKind::Static, CacheKind::Runtime] {
            if let Some(entry) = self.lookup(&self.namespace(kind), &key).await {
                return Some(entry.response);
            }
        }
        None
    }
}
