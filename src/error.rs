//! Error types for the vSphere inventory cache.
//!
//! Each component owns a narrow error enum ([`FetchError`] for the resource
//! fetcher, [`TierError`] for cache tiers, [`ConfigError`] for configuration
//! loading). This module ties them together into the crate-level [`Error`],
//! which is what library callers outside the query façade see.
//!
//! The façade itself never returns these: fetch failures, corrupt cache
//! payloads and unavailable tiers are absorbed and downgraded to stale or
//! empty responses.

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use crate::cache::TierError;
pub use crate::config::ConfigError;
pub use crate::fetcher::FetchError;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the inventory cache.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Upstream Errors
    // ========================================================================
    /// The resource fetcher failed (timeout, auth, protocol).
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A resource reference could not be resolved to a canonical id.
    #[error("Unknown {kind} '{reference}'")]
    UnknownResource {
        /// Kind of the resource that was looked up
        kind: String,
        /// The reference as given by the caller
        reference: String,
    },

    // ========================================================================
    // Cache Errors
    // ========================================================================
    /// A cache tier failed to read, write or decode an entry.
    #[error(transparent)]
    Tier(#[from] TierError),

    // ========================================================================
    // Sync Errors
    // ========================================================================
    /// A sync was requested while another one is still running.
    #[error("A sync is already running ({percent}% complete)")]
    SyncAlreadyRunning {
        /// When the running sync started
        started_at: Option<DateTime<Utc>>,
        /// Progress of the running sync
        percent: u8,
    },

    /// A background task panicked or was dropped before finishing.
    #[error("Background task '{0}' did not complete")]
    TaskAborted(String),

    /// A background task ran and returned an error.
    #[error("Background task '{label}' failed: {message}")]
    TaskFailed {
        /// Task label
        label: String,
        /// Error reported by the task
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    // ========================================================================
    // IO / Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error with source.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new unknown resource error.
    pub fn unknown_resource(kind: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::UnknownResource {
            kind: kind.into(),
            reference: reference.into(),
        }
    }

    /// Returns true if the caller can recover by polling or retrying later.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::SyncAlreadyRunning { .. } | Error::UnknownResource { .. } => true,
            Error::Fetch(e) => e.is_transient(),
            Error::Tier(_) => true,
            _ => false,
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Fetch(FetchError::Auth { .. }) => 3,
            Error::Fetch(_) => 2,
            Error::SyncAlreadyRunning { .. } => 4,
            Error::Config(_) => 5,
            Error::UnknownResource { .. } => 6,
            _ => 1,
        }
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Adds context with a closure that is only evaluated on error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Other {
            message: message.into(),
            source: Some(Box::new(e)),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::Other {
            message: f().into(),
            source: Some(Box::new(e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::NodeKind;
    use std::time::Duration;

    #[test]
    fn test_fetch_errors_are_recoverable_except_auth() {
        let timeout: Error = FetchError::Timeout {
            kind: NodeKind::Datacenter,
            scope: "vc01".to_string(),
            after: Duration::from_secs(5),
        }
        .into();
        assert!(timeout.is_recoverable());
        assert_eq!(timeout.exit_code(), 2);

        let auth: Error = FetchError::Auth {
            message: "bad credentials".to_string(),
        }
        .into();
        assert!(!auth.is_recoverable());
        assert_eq!(auth.exit_code(), 3);
    }

    #[test]
    fn test_sync_already_running_display() {
        let err = Error::SyncAlreadyRunning {
            started_at: None,
            percent: 40,
        };
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "A sync is already running (40% complete)");
    }

    #[test]
    fn test_error_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = result.context("reading snapshot").unwrap_err();
        assert_eq!(err.to_string(), "reading snapshot");
    }
}
