// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine lifecycle: startup, the event loop and shutdown.

use std::time::{Duration, Instant};

use tokio::time::{interval_at, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::types::{EngineError, EngineEvent, EngineState, SyncTrigger};
use super::OfflineEngine;
use crate::clients::EngineMessage;

fn wake_interval(secs: u64) -> Interval {
    let period = Duration::from_secs(secs.max(1));
    let mut wake = interval_at(tokio::time::Instant::now() + period, period);
    wake.set_missed_tick_behavior(MissedTickBehavior::Delay);
    wake
}

impl OfflineEngine {
    /// Install and activate the current version.
    ///
    /// 1. Pre-cache the shell resources (best-effort)
    /// 2. Activate right away without waiting for old views to close
    /// 3. Delete stale namespaces carrying our prefix
    /// 4. Claim every open view and announce the version
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<(), EngineError> {
        let started = Instant::now();
        info!("Starting offline engine");

        self.set_state(EngineState::Installing);
        let install = self.router.install().await;
        if !install.is_complete() {
            warn!(missing = ?install.failed, "Shell pre-cache incomplete");
        }

        self.set_state(EngineState::Activating);
        let activation = self.router.activate().await?;
        let claimed = self.clients.claim_all();
        let version = self.config.read().cache_version.clone();
        self.clients
            .broadcast(EngineMessage::Activated { version: version.clone() });

        self.set_state(EngineState::Active);
        info!(
            version = %version,
            precached = install.cached.len(),
            deleted_namespaces = activation.deleted.len(),
            claimed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Offline engine active"
        );
        Ok(())
    }

    /// Run the event loop until [`shutdown()`](Self::shutdown).
    ///
    /// Handles inbox events, the periodic wake and config updates. Only
    /// `sync_interval_secs` takes effect live; other settings apply on the
    /// next build.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow() {
            return;
        }
        let mut config_rx = self.config_rx.lock().await;
        let mut inbox = self.events_rx.lock().await;

        let mut wake_secs = self.config.read().sync_interval_secs;
        let mut wake = wake_interval(wake_secs);

        self.set_state(EngineState::Running);
        info!(wake_secs, "Offline engine running");

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                Some(event) = inbox.recv() => {
                    self.handle_event(event).await;
                }

                _ = wake.tick(), if wake_secs > 0 => {
                    debug!("Periodic wake");
                    self.sync(SyncTrigger::PeriodicWake).await;
                }

                Ok(()) = config_rx.changed() => {
                    let new_config = config_rx.borrow_and_update().clone();
                    if new_config.sync_interval_secs != wake_secs {
                        wake_secs = new_config.sync_interval_secs;
                        wake = wake_interval(wake_secs);
                    }
                    info!(wake_secs, "Config updated");
                    *self.config.write() = new_config;
                }
            }
        }
        info!("Offline engine event loop stopped");
    }

    pub(super) async fn handle_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::Sync(trigger) => {
                self.sync(trigger).await;
            }
            EngineEvent::Connectivity { online } => {
                self.set_online(online).await;
            }
            EngineEvent::Client(message) => {
                self.handle_client_message(message).await;
            }
            EngineEvent::Push(raw) => {
                self.handle_push(&raw).await;
            }
            EngineEvent::NotificationClick(target) => {
                self.notification_click(&target);
            }
        }
    }

    /// Initiate graceful shutdown.
    ///
    /// Queued mutations stay on disk for the next start. The key is dropped.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        info!("Initiating offline engine shutdown...");
        self.set_state(EngineState::ShuttingDown);
        self.shutdown_tx.send_replace(true);

        let pending = self.pending_count().await;
        self.cipher.clear();
        info!(pending, "Offline engine shutdown complete");
    }
}
