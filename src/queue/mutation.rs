// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::remote::{RemoteError, RemoteWriter};

/// Remote operation a queued mutation replays as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    Insert,
    Update,
    Upsert,
}

impl MutationOp {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationOp::Insert => "insert",
            MutationOp::Update => "update",
            MutationOp::Upsert => "upsert",
        }
    }
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pending write destined for the remote store.
///
/// Persisted as part of the queue snapshot, so field names are part of the
/// on-disk format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    pub id: Uuid,
    pub table: String,
    pub operation: MutationOp,
    pub payload: Value,
    /// Enqueue time, epoch millis
    pub timestamp: i64,
    #[serde(rename = "userId", default)]
    pub authoring_user: Option<String>,
    #[serde(rename = "retries", default)]
    pub retry_count: u32,
}

impl QueuedMutation {
    pub fn new(
        table: impl Into<String>,
        operation: MutationOp,
        payload: Value,
        authoring_user: Option<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            table: table.into(),
            operation,
            payload,
            timestamp,
            authoring_user,
            retry_count: 0,
        }
    }

    /// Replay this mutation against the remote.
    pub async fn apply(&self, remote: &dyn RemoteWriter, key_field: &str) -> Result<(), RemoteError> {
        match self.operation {
            MutationOp::Insert => remote.insert(&self.table, &self.payload).await,
            MutationOp::Upsert => remote.upsert(&self.table, &self.payload).await,
            MutationOp::Update => {
                let (key, rest) = split_key(&self.payload, key_field)?;
                remote.update(&self.table, key_field, &key, &rest).await
            }
        }
    }
}

/// Separate the identifying key from an update payload.
pub fn split_key(payload: &Value, key_field: &str) -> Result<(Value, Value), RemoteError> {
    let mut rest = payload
        .as_object()
        .cloned()
        .ok_or_else(|| RemoteError::InvalidRequest("update payload is not an object".into()))?;
    let key = rest
        .remove(key_field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| RemoteError::InvalidRequest(format!("update payload has no '{key_field}'")))?;
    Ok((key, Value::Object(rest)))
}

/// Decode a persisted snapshot.
///
/// Anything other than an array is corrupt and reads as an empty queue.
/// Individual entries that fail to decode are skipped.
pub fn parse_snapshot(value: Value) -> Vec<QueuedMutation> {
    let Value::Array(items) = value else {
        warn!("Queue snapshot is not an array, treating as empty");
        return Vec::new();
    };
    let total = items.len();
    let entries: Vec<QueuedMutation> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if entries.len() != total {
        warn!(skipped = total - entries.len(), "Skipped undecodable queue entries");
    }
    entries
}
