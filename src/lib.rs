//! # Ward Sync
//!
//! An offline-first caching and sync engine for clinical front-line apps that
//! must keep working on wards, in basements and in lifts.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Cache Strategy Router                    │
//! │  • Classifies every read (method, host, path, extension)   │
//! │  • cache-first / network-first / shell / stale-w-revalidate│
//! │  • Synthetic 503 when nothing else is available            │
//! └─────────────────────────────────────────────────────────────┘
//!            │ reads                          writes │
//!            ▼                                       ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │  Versioned namespaces    │   │        Mutation Queue        │
//! │  static/fonts/runtime/   │   │  • FIFO snapshot, one key    │
//! │  data, rotated on deploy │   │  • Bounded retries (5)       │
//! └──────────────────────────┘   └──────────────────────────────┘
//!            │                                       │
//!            ▼                                       ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Encryption-at-Rest Layer                    │
//! │  • AES-256-GCM, fresh nonce per value                      │
//! │  • PBKDF2 key from the session secret, memory only         │
//! │  • Plaintext passthrough when locked or unreadable         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              DurableStore (SQLite or memory)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`SyncCoordinator`] replays the queue against a [`RemoteWriter`] when
//! connectivity returns, on a periodic wake and on demand, and reports each
//! pass to open views.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use serde_json::json;
//! use ward_sync::{EngineConfig, MutationOp, OfflineEngine, Request, RestRemote, ReqwestFetcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig {
//!         app_origin: "https://ward.example.org".into(),
//!         data_host: Some("abc.supabase.co".into()),
//!         storage_path: Some("./ward-sync.db".into()),
//!         ..Default::default()
//!     };
//!
//!     let engine = Arc::new(
//!         OfflineEngine::builder(config)
//!             .fetcher(Arc::new(ReqwestFetcher::new(Duration::from_secs(10))?))
//!             .remote(Arc::new(RestRemote::new(
//!                 "https://abc.supabase.co",
//!                 "anon-key",
//!                 Duration::from_secs(10),
//!             )?))
//!             .build()
//!             .await?,
//!     );
//!
//!     engine.start().await?;
//!     engine.unlock("session-token").await?;
//!
//!     // Reads go through the router
//!     let req = Request::get("https://abc.supabase.co/rest/v1/vitals?ward=eq.B")?;
//!     if let Some(served) = engine.fetch(&req).await {
//!         println!("{} from {:?}", served.response.status, served.source);
//!     }
//!
//!     // Writes are applied, or queued when they cannot be
//!     engine
//!         .write("vitals", MutationOp::Insert, json!({"fc": 80}), Some("u1".into()))
//!         .await?;
//!
//!     let runner = tokio::spawn({
//!         let engine = engine.clone();
//!         async move { engine.run().await }
//!     });
//!     engine.shutdown().await;
//!     runner.await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`OfflineEngine`] facade and the [`SyncCoordinator`]
//! - [`router`]: Request classification and the four serving strategies
//! - [`queue`]: The durable [`MutationQueue`]
//! - [`crypto`]: [`AtRestCipher`] and the [`EncryptedStore`] decorator
//! - [`storage`]: Local storage backends (SQLite, memory)
//! - [`remote`]: Remote table writes
//! - [`clients`]: Open views and engine messages
//! - [`resilience`]: Retry with backoff

pub mod clients;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod metrics;
pub mod queue;
pub mod remote;
pub mod resilience;
pub mod router;
pub mod storage;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use clients::{ClickOutcome, ClientHub, ClientMessage, ClientView, EngineMessage};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig};
pub use coordinator::{
    EngineBuilder, EngineError, EngineEvent, EngineState, LogNotifier, Notification, Notifier,
    OfflineEngine, PushPayload, SyncCoordinator, SyncTrigger, WriteOutcome,
};
pub use crypto::{AtRestCipher, CryptoError, EncryptedStore};
pub use metrics::{EngineMetrics, LatencyTimer, MetricsSnapshot};
pub use queue::{MutationOp, MutationQueue, QueueStats, QueuedMutation, SyncPassResult};
pub use remote::{RemoteError, RemoteWriter, RestRemote};
pub use resilience::retry::RetryConfig;
pub use router::{
    CacheKind, CacheRouter, CachedResponse, FetchError, Fetcher, Request, ResponseSnapshot,
    ResponseSource, ReqwestFetcher, Route, ServedResponse, Strategy,
};
pub use storage::traits::{DurableStore, StorageError};
pub use storage::{InMemoryStore, SqliteStore};
