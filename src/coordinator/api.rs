// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine API: reads, writes, key management, connectivity and view events.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::push::{Notification, PushPayload};
use super::types::{EngineEvent, SyncTrigger, WriteOutcome};
use super::OfflineEngine;
use crate::clients::{ClickOutcome, ClientHub, ClientMessage, EngineMessage};
use crate::crypto::{AtRestCipher, CryptoError};
use crate::metrics::{self, EngineMetrics};
use crate::queue::{MutationOp, MutationQueue, QueuedMutation, SyncPassResult};
use crate::router::{CacheRouter, Request, ServedResponse};
use crate::storage::traits::StorageError;

impl OfflineEngine {
    /// Serve a read. `None` means the request is not intercepted and the
    /// caller should talk to the network itself.
    pub async fn fetch(&self, request: &Request) -> Option<ServedResponse> {
        self.router.handle(request).await
    }

    /// Write to the remote store, queueing the mutation when offline or when
    /// the attempt fails.
    ///
    /// Only a local storage failure is an error: the write could be neither
    /// applied nor saved.
    #[tracing::instrument(skip(self, payload, authoring_user))]
    pub async fn write(
        &self,
        table: &str,
        operation: MutationOp,
        payload: Value,
        authoring_user: Option<String>,
    ) -> Result<WriteOutcome, StorageError> {
        let mutation = QueuedMutation::new(
            table,
            operation,
            payload,
            authoring_user,
            self.metrics.clock().now_millis(),
        );

        if self.is_online() {
            let key_field = self.config.read().update_key_field.clone();
            match mutation.apply(self.remote.as_ref(), &key_field).await {
                Ok(()) => {
                    debug!("Write applied directly");
                    return Ok(WriteOutcome::Applied);
                }
                Err(e) => {
                    warn!(error = %e, "Remote write failed, queueing");
                }
            }
        }

        let QueuedMutation {
            payload,
            authoring_user,
            ..
        } = mutation;
        let entry = self
            .queue
            .enqueue(table, operation, payload, authoring_user)
            .await?;
        Ok(WriteOutcome::Queued(entry))
    }

    /// Derive the at-rest key from a session secret. Call after sign-in.
    pub async fn unlock(&self, secret: &str) -> Result<(), CryptoError> {
        self.cipher.init(secret).await?;
        info!("At-rest encryption unlocked");

        // Mutations queued under this key before a key switch come back now
        match self.queue.restore_unreadable().await {
            Ok(0) => {}
            Ok(restored) => info!(restored, "Queued mutations recovered on unlock"),
            Err(e) => warn!(error = %e, "Could not restore set-aside queue snapshots"),
        }
        Ok(())
    }

    /// Forget the at-rest key. Call on sign-out.
    pub fn lock(&self) {
        self.cipher.clear();
        info!("At-rest encryption locked");
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Record connectivity. Coming back online triggers a replay pass.
    pub async fn set_online(&self, online: bool) -> Option<SyncPassResult> {
        let was_online = self.online.swap(online, Ordering::AcqRel);
        metrics::set_online(online);
        match (was_online, online) {
            (false, true) => {
                info!("Connectivity restored");
                self.sync(SyncTrigger::ConnectivityRestored).await
            }
            (true, false) => {
                info!("Connectivity lost");
                None
            }
            _ => None,
        }
    }

    /// Replay the queue now. `None` if offline or a pass is already running.
    pub async fn sync_now(&self) -> Option<SyncPassResult> {
        self.sync(SyncTrigger::Manual).await
    }

    pub(super) async fn sync(&self, trigger: SyncTrigger) -> Option<SyncPassResult> {
        if !self.is_online() {
            debug!(trigger = trigger.as_str(), "Offline, sync deferred");
            metrics::record_sync_skipped(trigger.as_str());
            return None;
        }
        self.coordinator.trigger(trigger).await
    }

    /// Mutations waiting for the next pass.
    pub async fn pending_count(&self) -> usize {
        match self.queue.len().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Queue depth unavailable, reporting 0");
                0
            }
        }
    }

    pub async fn handle_client_message(&self, message: ClientMessage) {
        match message {
            ClientMessage::SyncNow => {
                self.sync_now().await;
            }
            ClientMessage::CleanupCache => {
                if let Err(e) = self.router.trim_data_cache().await {
                    warn!(error = %e, "Cache cleanup failed");
                }
            }
        }
    }

    /// Decode and raise a push notification. Malformed payloads are dropped.
    pub async fn handle_push(&self, raw: &[u8]) -> Option<Notification> {
        let Some(payload) = PushPayload::decode(raw) else {
            metrics::record_push("dropped");
            return None;
        };
        let notification = Notification::from(payload);
        self.notifier.show(&notification).await;
        self.metrics.notification();
        Some(notification)
    }

    /// Focus the view showing `target`, or open one.
    pub fn notification_click(&self, target: &str) -> Option<ClickOutcome> {
        let url = self
            .config
            .read()
            .origin_url()
            .ok()
            .and_then(|origin| origin.join(target).ok());
        let Some(url) = url else {
            debug!(target, "Unresolvable notification target");
            return None;
        };
        Some(self.clients.focus_or_open(url))
    }

    /// Inbox for events delivered while [`run()`](Self::run) is active.
    #[must_use]
    pub fn events(&self) -> mpsc::Sender<EngineEvent> {
        self.events_tx.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineMessage> {
        self.clients.subscribe()
    }

    #[must_use]
    pub fn clients(&self) -> &Arc<ClientHub> {
        &self.clients
    }

    #[must_use]
    pub fn router(&self) -> &CacheRouter {
        &self.router
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<MutationQueue> {
        &self.queue
    }

    #[must_use]
    pub fn cipher(&self) -> &Arc<AtRestCipher> {
        &self.cipher
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }
}
