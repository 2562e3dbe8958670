// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the offline engine.

use thiserror::Error;

use crate::clients::ClientMessage;
use crate::config::ConfigError;
use crate::crypto::CryptoError;
use crate::queue::QueuedMutation;
use crate::storage::traits::StorageError;

/// Engine lifecycle state.
///
/// Use [`super::OfflineEngine::state()`] to check the current state or
/// [`super::OfflineEngine::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Just created, not yet started
    Created,
    /// Pre-caching shell resources
    Installing,
    /// Deleting stale namespaces and claiming views
    Activating,
    /// Serving reads and accepting writes
    Active,
    /// Event loop running
    Running,
    /// Graceful shutdown in progress
    ShuttingDown,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Installing => write!(f, "Installing"),
            Self::Activating => write!(f, "Activating"),
            Self::Active => write!(f, "Active"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

/// What asked for a replay pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    ConnectivityRestored,
    PeriodicWake,
    Manual,
}

impl SyncTrigger {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::ConnectivityRestored => "connectivity_restored",
            SyncTrigger::PeriodicWake => "periodic_wake",
            SyncTrigger::Manual => "manual",
        }
    }
}

/// Inputs delivered to the running engine from outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Sync(SyncTrigger),
    Connectivity { online: bool },
    Client(ClientMessage),
    /// Raw push event body
    Push(Vec<u8>),
    /// A notification was clicked; carries its target URL or path
    NotificationClick(String),
}

/// Where a write ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// Applied to the remote store immediately
    Applied,
    /// Stored in the mutation queue for a later pass
    Queued(QueuedMutation),
}

impl WriteOutcome {
    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(self, WriteOutcome::Queued(_))
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("Engine component not provided: {0}")]
    MissingComponent(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_state_display() {
        assert_eq!(format!("{}", EngineState::Created), "Created");
        assert_eq!(format!("{}", EngineState::Running), "Running");
        assert_eq!(format!("{}", EngineState::ShuttingDown), "ShuttingDown");
    }

    #[test]
    fn test_write_outcome_is_queued() {
        assert!(!WriteOutcome::Applied.is_queued());
    }
}
