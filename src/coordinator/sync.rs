// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use tracing::info;

use super::types::SyncTrigger;
use crate::clients::{ClientHub, EngineMessage};
use crate::metrics;
use crate::queue::{MutationQueue, SyncPassResult};
use crate::remote::RemoteWriter;

/// Turns triggers into replay passes and reports each pass to open views.
///
/// Passes are single-flight: a trigger that arrives while one is running is
/// skipped, since the running pass already covers everything it would see.
pub struct SyncCoordinator {
    queue: Arc<MutationQueue>,
    remote: Arc<dyn RemoteWriter>,
    clients: Arc<ClientHub>,
}

impl SyncCoordinator {
    pub fn new(
        queue: Arc<MutationQueue>,
        remote: Arc<dyn RemoteWriter>,
        clients: Arc<ClientHub>,
    ) -> Self {
        Self {
            queue,
            remote,
            clients,
        }
    }

    /// Run one pass for `trigger`. `None` if a pass was already in flight.
    #[tracing::instrument(skip(self, trigger), fields(trigger = trigger.as_str()))]
    pub async fn trigger(&self, trigger: SyncTrigger) -> Option<SyncPassResult> {
        let Some(result) = self.queue.try_replay(self.remote.as_ref()).await else {
            info!("Replay already running, trigger skipped");
            metrics::record_sync_skipped(trigger.as_str());
            return None;
        };

        self.clients.broadcast(EngineMessage::SyncComplete {
            synced: result.synced,
            failed: result.failed,
        });
        Some(result)
    }
}
