// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Open UI contexts and the messages exchanged with them.
//!
//! Views never share memory with the engine. They receive [`EngineMessage`]s
//! over a broadcast channel and send [`ClientMessage`]s back through the
//! engine's event inbox.

use dashmap::DashMap;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::coordinator::Notification;

/// Engine → views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineMessage {
    SyncComplete { synced: usize, failed: usize },
    Activated { version: String },
    FocusView { client_id: Uuid, url: String },
    OpenView { client_id: Uuid, url: String },
    Notification(Notification),
}

/// Views → engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    SyncNow,
    CleanupCache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientView {
    pub id: Uuid,
    pub url: Url,
    /// Whether the current engine version controls this view
    pub controlled: bool,
    pub focused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Focused(Uuid),
    Opened(Uuid),
}

pub struct ClientHub {
    views: DashMap<Uuid, ClientView>,
    tx: broadcast::Sender<EngineMessage>,
}

impl ClientHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            views: DashMap::new(),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineMessage> {
        self.tx.subscribe()
    }

    /// Track a newly opened view. It stays uncontrolled until the next claim.
    pub fn register(&self, url: Url) -> Uuid {
        let id = Uuid::new_v4();
        self.views.insert(
            id,
            ClientView {
                id,
                url,
                controlled: false,
                focused: false,
            },
        );
        debug!(client = %id, "View registered");
        id
    }

    pub fn unregister(&self, id: Uuid) -> bool {
        self.views.remove(&id).is_some()
    }

    #[must_use]
    pub fn views(&self) -> Vec<ClientView> {
        self.views.iter().map(|v| v.value().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Take control of every open view. Returns how many changed hands.
    pub fn claim_all(&self) -> usize {
        let mut claimed = 0;
        for mut view in self.views.iter_mut() {
            if !view.controlled {
                view.controlled = true;
                claimed += 1;
            }
        }
        info!(claimed, total = self.views.len(), "Claimed open views");
        claimed
    }

    /// Send to every subscriber. Returns the number that received it.
    pub fn broadcast(&self, message: EngineMessage) -> usize {
        match self.tx.send(message) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No views listening, message dropped");
                0
            }
        }
    }

    /// Focus a view already showing `target`'s path, or open a new one.
    pub fn focus_or_open(&self, target: Url) -> ClickOutcome {
        let existing = self
            .views
            .iter()
            .find(|v| v.url.path() == target.path())
            .map(|v| v.id);

        if let Some(id) = existing {
            for mut view in self.views.iter_mut() {
                view.focused = view.id == id;
            }
            self.broadcast(EngineMessage::FocusView {
                client_id: id,
                url: target.to_string(),
            });
            return ClickOutcome::Focused(id);
        }

        let id = Uuid::new_v4();
        for mut view in self.views.iter_mut() {
            view.focused = false;
        }
        self.views.insert(
            id,
            ClientView {
                id,
                url: target.clone(),
                controlled: true,
                focused: true,
            },
        );
        self.broadcast(EngineMessage::OpenView {
            client_id: id,
            url: target.to_string(),
        });
        ClickOutcome::Opened(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn url(path: &str) -> Url {
        Url::parse("https://ward.example.org").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_message_wire_format() {
        let msg = EngineMessage::SyncComplete { synced: 2, failed: 1 };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "SYNC_COMPLETE", "synced": 2, "failed": 1})
        );

        let inbound: ClientMessage = serde_json::from_value(json!({"type": "SYNC_NOW"})).unwrap();
        assert_eq!(inbound, ClientMessage::SyncNow);
        let cleanup: ClientMessage =
            serde_json::from_value(json!({"type": "CLEANUP_CACHE"})).unwrap();
        assert_eq!(cleanup, ClientMessage::CleanupCache);
    }

    #[test]
    fn test_claim_all_counts_only_new_views() {
        let hub = ClientHub::new(8);
        hub.register(url("/"));
        hub.register(url("/patients"));
        assert_eq!(hub.claim_all(), 2);
        hub.register(url("/labs"));
        assert_eq!(hub.claim_all(), 1);
        assert!(hub.views().iter().all(|v| v.controlled));
    }

    #[tokio::test]
    async fn test_click_focuses_matching_view() {
        let hub = ClientHub::new(8);
        let mut rx = hub.subscribe();
        hub.register(url("/"));
        let labs = hub.register(url("/labs/42"));

        assert_eq!(hub.focus_or_open(url("/labs/42")), ClickOutcome::Focused(labs));
        assert_eq!(hub.len(), 2);
        match rx.recv().await.unwrap() {
            EngineMessage::FocusView { client_id, .. } => assert_eq!(client_id, labs),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_click_opens_when_no_match() {
        let hub = ClientHub::new(8);
        let mut rx = hub.subscribe();
        hub.register(url("/"));

        let ClickOutcome::Opened(id) = hub.focus_or_open(url("/escalations/7")) else {
            panic!("expected a new view");
        };
        assert_eq!(hub.len(), 2);
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineMessage::OpenView { client_id, .. } if client_id == id
        ));
    }

    #[test]
    fn test_broadcast_without_listeners() {
        let hub = ClientHub::new(8);
        assert_eq!(hub.broadcast(EngineMessage::Activated { version: "v1".into() }), 0);
    }
}
