// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Urgent out-of-band notifications (critical lab results, escalations).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clients::{ClientHub, EngineMessage};

pub const DEFAULT_PUSH_TITLE: &str = "Ward update";
pub const DEFAULT_PUSH_TAG: &str = "ward-sync";
pub const DEFAULT_PUSH_URL: &str = "/";

/// Decoded push body. Every field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub critical: bool,
    /// Target view path
    pub url: String,
}

impl Default for PushPayload {
    fn default() -> Self {
        Self {
            title: DEFAULT_PUSH_TITLE.to_string(),
            body: String::new(),
            tag: DEFAULT_PUSH_TAG.to_string(),
            critical: false,
            url: DEFAULT_PUSH_URL.to_string(),
        }
    }
}

impl PushPayload {
    /// Decode a raw push body. An empty body yields the defaults; anything
    /// that is not a JSON object of the expected shape is dropped.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Some(Self::default());
        }
        match serde_json::from_slice::<Self>(raw) {
            Ok(payload) => Some(payload),
            Err(e) => {
                debug!(error = %e, bytes = raw.len(), "Dropping malformed push payload");
                None
            }
        }
    }
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub tag: String,
    /// Stays on screen until the user acts on it
    pub require_interaction: bool,
    pub url: String,
}

impl From<PushPayload> for Notification {
    fn from(payload: PushPayload) -> Self {
        Self {
            title: payload.title,
            body: payload.body,
            tag: payload.tag,
            require_interaction: payload.critical,
            url: payload.url,
        }
    }
}

/// Surface that raises notifications on the device.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, notification: &Notification);
}

/// Logs every notification and forwards it to open views.
pub struct LogNotifier {
    clients: Arc<ClientHub>,
}

impl LogNotifier {
    pub fn new(clients: Arc<ClientHub>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn show(&self, notification: &Notification) {
        if notification.require_interaction {
            warn!(title = %notification.title, tag = %notification.tag, url = %notification.url, "Critical notification");
        } else {
            info!(title = %notification.title, tag = %notification.tag, "Notification");
        }
        self.clients
            .broadcast(EngineMessage::Notification(notification.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let payload = PushPayload::decode(br#"{"body": "K+ 6.8 mmol/L", "critical": true}"#).unwrap();
        assert_eq!(payload.title, DEFAULT_PUSH_TITLE);
        assert_eq!(payload.body, "K+ 6.8 mmol/L");
        assert!(payload.critical);
        assert_eq!(payload.url, "/");
    }

    #[test]
    fn test_empty_body_uses_defaults() {
        assert_eq!(PushPayload::decode(b""), Some(PushPayload::default()));
    }

    #[test]
    fn test_malformed_payloads_are_dropped() {
        assert_eq!(PushPayload::decode(b"{not json"), None);
        assert_eq!(PushPayload::decode(b"\"just a string\""), None);
        assert_eq!(PushPayload::decode(br#"{"critical": "yes"}"#), None);
    }

    #[test]
    fn test_critical_requires_interaction() {
        let n = Notification::from(PushPayload {
            critical: true,
            ..Default::default()
        });
        assert!(n.require_interaction);
    }

    #[tokio::test]
    async fn test_log_notifier_forwards_to_views() {
        let hub = Arc::new(ClientHub::new(4));
        let mut rx = hub.subscribe();
        let notifier = LogNotifier::new(hub);
        let n = Notification::from(PushPayload::default());

        notifier.show(&n).await;
        assert_eq!(rx.recv().await.unwrap(), EngineMessage::Notification(n));
    }
}
