// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote table-write interface consumed by the mutation queue.
//!
//! The queue never looks inside a [`RemoteError`]: any `Err` is a failed
//! attempt, whether the cause was a dropped connection or a validation
//! rejection.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

mod rest;

pub use rest::RestRemote;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Remote rejected write ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

/// Writes against a remote tabular store.
#[async_trait]
pub trait RemoteWriter: Send + Sync {
    async fn insert(&self, table: &str, payload: &Value) -> Result<(), RemoteError>;

    /// Update the row(s) where `key_field == key_value`. `payload` no longer
    /// carries the key field.
    async fn update(
        &self,
        table: &str,
        key_field: &str,
        key_value: &Value,
        payload: &Value,
    ) -> Result<(), RemoteError>;

    async fn upsert(&self, table: &str, payload: &Value) -> Result<(), RemoteError>;
}
