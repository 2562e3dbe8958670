// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Offline engine coordinator.
//!
//! The [`OfflineEngine`] ties the components together:
//! - [`CacheRouter`] serving reads from versioned cache namespaces
//! - [`MutationQueue`] holding writes that could not reach the remote
//! - [`AtRestCipher`] sealing everything both of them persist
//! - [`SyncCoordinator`] replaying the queue on connectivity, wake and manual triggers
//!
//! # Lifecycle
//!
//! ```text
//! Created → Installing → Activating → Active → Running → ShuttingDown
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ward_sync::{EngineConfig, EngineState, OfflineEngine, RestRemote, ReqwestFetcher};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig {
//!     app_origin: "https://ward.example.org".into(),
//!     data_host: Some("abc.supabase.co".into()),
//!     ..Default::default()
//! };
//! let engine = OfflineEngine::builder(config)
//!     .fetcher(Arc::new(ReqwestFetcher::new(Duration::from_secs(10))?))
//!     .remote(Arc::new(RestRemote::new("https://abc.supabase.co", "anon-key", Duration::from_secs(10))?))
//!     .build()
//!     .await?;
//!
//! engine.start().await?;
//! assert_eq!(engine.state(), EngineState::Active);
//! engine.unlock("session-token").await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod lifecycle;
mod push;
mod sync;
mod types;

pub use push::{LogNotifier, Notification, Notifier, PushPayload};
pub use sync::SyncCoordinator;
pub use types::{EngineError, EngineEvent, EngineState, SyncTrigger, WriteOutcome};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::info;

use crate::clients::ClientHub;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::crypto::{AtRestCipher, EncryptedStore};
use crate::metrics::EngineMetrics;
use crate::queue::MutationQueue;
use crate::remote::RemoteWriter;
use crate::router::{CacheRouter, Fetcher};
use crate::storage::traits::DurableStore;
use crate::storage::{InMemoryStore, SqliteStore};

const EVENT_INBOX_CAPACITY: usize = 256;

/// Main offline engine.
///
/// `Send + Sync`; share it behind an `Arc` so one task can drive
/// [`run()`](Self::run) while others call into the API.
pub struct OfflineEngine {
    /// Configuration (updated at runtime via the watch channel)
    pub(super) config: RwLock<EngineConfig>,

    /// Runtime config updates
    pub(super) config_rx: Mutex<watch::Receiver<EngineConfig>>,

    /// Engine state (broadcast to watchers)
    pub(super) state: watch::Sender<EngineState>,
    pub(super) state_rx: watch::Receiver<EngineState>,

    pub(super) shutdown_tx: watch::Sender<bool>,

    /// External events (views, OS wake-ups, push service)
    pub(super) events_tx: mpsc::Sender<EngineEvent>,
    pub(super) events_rx: Mutex<mpsc::Receiver<EngineEvent>>,

    pub(super) cipher: Arc<AtRestCipher>,
    pub(super) router: CacheRouter,
    pub(super) queue: Arc<MutationQueue>,
    pub(super) remote: Arc<dyn RemoteWriter>,
    pub(super) coordinator: SyncCoordinator,
    pub(super) clients: Arc<ClientHub>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) metrics: Arc<EngineMetrics>,

    /// Last known connectivity
    pub(super) online: AtomicBool,
}

impl OfflineEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Get current engine state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    /// Check if engine is serving requests.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state(), EngineState::Active | EngineState::Running)
    }

    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    pub(super) fn set_state(&self, state: EngineState) {
        let _ = self.state.send(state);
        crate::metrics::set_engine_state(&state.to_string());
    }
}

/// Assembles an [`OfflineEngine`] from its collaborators.
///
/// The fetcher and remote writer are required. Storage defaults to SQLite at
/// `storage_path`, or memory when no path is configured.
pub struct EngineBuilder {
    config: EngineConfig,
    config_rx: Option<watch::Receiver<EngineConfig>>,
    store: Option<Arc<dyn DurableStore>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    remote: Option<Arc<dyn RemoteWriter>>,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Arc<dyn Clock>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            config_rx: None,
            store: None,
            fetcher: None,
            remote: None,
            notifier: None,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn config_updates(mut self, rx: watch::Receiver<EngineConfig>) -> Self {
        self.config_rx = Some(rx);
        self
    }

    /// Raw storage. The engine wraps it in an [`EncryptedStore`].
    #[must_use]
    pub fn store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[must_use]
    pub fn remote(mut self, remote: Arc<dyn RemoteWriter>) -> Self {
        self.remote = Some(remote);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn build(self) -> Result<OfflineEngine, EngineError> {
        self.config.validate()?;
        let fetcher = self.fetcher.ok_or(EngineError::MissingComponent("fetcher"))?;
        let remote = self.remote.ok_or(EngineError::MissingComponent("remote"))?;

        let raw_store: Arc<dyn DurableStore> = match (self.store, &self.config.storage_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(SqliteStore::open(path).await?),
            (None, None) => Arc::new(InMemoryStore::new()),
        };

        let config = self.config;
        let metrics = Arc::new(EngineMetrics::new(self.clock));
        let cipher = Arc::new(AtRestCipher::new(
            config.kdf_salt.as_bytes().to_vec(),
            config.kdf_iterations,
        ));
        let store: Arc<dyn DurableStore> = Arc::new(EncryptedStore::new(raw_store, cipher.clone()));
        let clients = Arc::new(ClientHub::new(config.client_channel_capacity));
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(LogNotifier::new(clients.clone())) as Arc<dyn Notifier>);

        let router = CacheRouter::new(config.clone(), store.clone(), fetcher, metrics.clone());
        let queue = Arc::new(MutationQueue::from_config(store, &config, metrics.clone()));
        let coordinator = SyncCoordinator::new(queue.clone(), remote.clone(), clients.clone());

        let config_rx = self.config_rx.unwrap_or_else(|| {
            let (tx, rx) = watch::channel(config.clone());
            // Sender dropped: the run loop sees no updates
            drop(tx);
            rx
        });
        let (state_tx, state_rx) = watch::channel(EngineState::Created);
        let (shutdown_tx, _) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::channel(EVENT_INBOX_CAPACITY);

        info!(
            version = %config.cache_version,
            queue = %config.queue_namespace,
            max_retries = config.max_retries,
            "Offline engine assembled"
        );

        Ok(OfflineEngine {
            config: RwLock::new(config),
            config_rx: Mutex::new(config_rx),
            state: state_tx,
            state_rx,
            shutdown_tx,
            events_tx,
            events_rx: Mutex::new(events_rx),
            cipher,
            router,
            queue,
            remote,
            coordinator,
            clients,
            notifier,
            metrics,
            online: AtomicBool::new(true),
        })
    }
}
