// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request classification.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! | # | Match                                   | Route                         |
//! |---|-----------------------------------------|-------------------------------|
//! | 1 | method is not GET                       | passthrough                   |
//! | 2 | ws/wss, or realtime prefix on data host | passthrough                   |
//! | 3 | REST prefix on data host                | stale-while-revalidate `data` |
//! | 4 | anything else on data host              | passthrough                   |
//! | 5 | navigation                              | network-first + shell         |
//! | 6 | font host / build asset extension       | cache-first `fonts`/`static`  |
//! | 7 | everything else                         | network-first `runtime`       |

use reqwest::Method;

use super::http::Request;
use crate::config::EngineConfig;

/// Cache partition kinds. Each maps to one versioned namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Static,
    Fonts,
    Runtime,
    Data,
}

impl CacheKind {
    pub const ALL: [CacheKind; 4] = [
        CacheKind::Static,
        CacheKind::Fonts,
        CacheKind::Runtime,
        CacheKind::Data,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Static => "static",
            CacheKind::Fonts => "fonts",
            CacheKind::Runtime => "runtime",
            CacheKind::Data => "data",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    /// Network-first, falling back to the cached app shell
    Navigation,
    StaleWhileRevalidate,
}

impl Strategy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache_first",
            Strategy::NetworkFirst => "network_first",
            Strategy::Navigation => "navigation",
            Strategy::StaleWhileRevalidate => "stale_while_revalidate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted; the caller talks to the network directly
    Passthrough,
    Cached { strategy: Strategy, kind: CacheKind },
}

impl Route {
    fn cached(strategy: Strategy, kind: CacheKind) -> Self {
        Route::Cached { strategy, kind }
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    data_host: Option<String>,
    data_path_prefix: String,
    realtime_path_prefix: String,
    font_hosts: Vec<String>,
    static_extensions: Vec<String>,
}

impl Classifier {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            data_host: config.data_host.as_ref().map(|h| h.to_ascii_lowercase()),
            data_path_prefix: config.data_path_prefix.clone(),
            realtime_path_prefix: config.realtime_path_prefix.clone(),
            font_hosts: config
                .font_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            static_extensions: config
                .static_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn classify(&self, request: &Request) -> Route {
        if request.method != Method::GET {
            return Route::Passthrough;
        }

        let url = &request.url;
        if matches!(url.scheme(), "ws" | "wss") {
            return Route::Passthrough;
        }

        let host = url.host_str().unwrap_or_default();
        let path = url.path();
        if self.is_data_host(host) {
            if path.starts_with(&self.realtime_path_prefix) {
                return Route::Passthrough;
            }
            if path.starts_with(&self.data_path_prefix) {
                return Route::cached(Strategy::StaleWhileRevalidate, CacheKind::Data);
            }
            return Route::Passthrough;
        }

        if request.navigate {
            return Route::cached(Strategy::Navigation, CacheKind::Runtime);
        }

        if self.font_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)) {
            return Route::cached(Strategy::CacheFirst, CacheKind::Fonts);
        }

        if let Some(ext) = extension(path) {
            if self.static_extensions.iter().any(|e| *e == ext) {
                return Route::cached(Strategy::CacheFirst, CacheKind::Static);
            }
        }

        Route::cached(Strategy::NetworkFirst, CacheKind::Runtime)
    }

    fn is_data_host(&self, host: &str) -> bool {
        self.data_host
            .as_deref()
            .is_some_and(|data| data.eq_ignore_ascii_case(host))
    }
}

/// Lowercased extension of the last path segment.
fn extension(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
