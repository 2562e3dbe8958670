// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Install, activation and capacity maintenance.

use serde::Serialize;
use tracing::{info, warn};

use super::http::Request;
use super::{CacheKind, CacheRouter};
use crate::metrics;
use crate::storage::traits::StorageError;

/// Outcome of pre-populating the shell resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cached: Vec<String>,
    pub failed: Vec<String>,
}

impl InstallReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Stale namespaces removed
    pub deleted: Vec<String>,
}

impl CacheRouter {
    /// Namespaces owned by the current version.
    #[must_use]
    pub fn allow_list(&self) -> Vec<String> {
        CacheKind::ALL.iter().map(|kind| self.namespace(*kind)).collect()
    }

    /// Fetch each shell resource into the `static` namespace.
    ///
    /// Best-effort per resource: one unreachable asset does not stop the rest.
    #[tracing::instrument(skip(self))]
    pub async fn install(&self) -> InstallReport {
        let mut report = InstallReport::default();
        let namespace = self.namespace(CacheKind::Static);
        let origin = match self.config().origin_url() {
            Ok(origin) => origin,
            Err(e) => {
                warn!(error = %e, "Cannot resolve shell resources");
                report.failed = self.config().precache_paths.clone();
                return report;
            }
        };

        for path in &self.config().precache_paths {
            let request = match origin.join(path).map(|url| Request::get(url.as_str())) {
                Ok(Ok(request)) => request,
                _ => {
                    warn!(path = %path, "Invalid shell resource path");
                    report.failed.push(path.clone());
                    continue;
                }
            };
            match self.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    self.store_response(&namespace, &request.cache_key(), &response).await;
                    report.cached.push(path.clone());
                }
                Ok(response) => {
                    warn!(path = %path, status = response.status, "Shell resource not cached");
                    report.failed.push(path.clone());
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Shell resource unreachable");
                    report.failed.push(path.clone());
                }
            }
        }

        info!(
            cached = report.cached.len(),
            failed = report.failed.len(),
            "Shell pre-cache complete"
        );
        report
    }

    /// Delete every namespace carrying our prefix that the current version
    /// does not own. Namespaces without the prefix are never touched.
    #[tracing::instrument(skip(self))]
    pub async fn activate(&self) -> Result<ActivationReport, StorageError> {
        let allow = self.allow_list();
        let prefix = &self.config().cache_prefix;
        let mut report = ActivationReport::default();

        for namespace in self.store().namespaces().await? {
            if !namespace.starts_with(prefix.as_str()) || allow.contains(&namespace) {
                continue;
            }
            let entries = self.store().len(&namespace).await.unwrap_or(0);
            if self.store().drop_namespace(&namespace).await? {
                info!(namespace = %namespace, entries, "Deleted stale cache namespace");
                metrics::record_cache_evictions("rotation", entries);
                report.deleted.push(namespace);
            }
        }
        Ok(report)
    }

    /// Trim the data namespace to the configured ceiling, oldest first.
    /// Returns the number of entries removed.
    #[tracing::instrument(skip(self))]
    pub async fn trim_data_cache(&self) -> Result<usize, StorageError> {
        let namespace = self.namespace(CacheKind::Data);
        let max = self.config().data_cache_max_entries;
        let keys = self.store().keys(&namespace).await?;
        if keys.len() <= max {
            return Ok(0);
        }

        let excess = keys.len() - max;
        let mut removed = 0;
        for key in keys.iter().take(excess) {
            if self.store().delete(&namespace, key).await? {
                removed += 1;
            }
        }
        info!(namespace = %namespace, removed, kept = max, "Trimmed data cache");
        metrics::record_cache_evictions("trim", removed);
        Ok(removed)
    }
}
