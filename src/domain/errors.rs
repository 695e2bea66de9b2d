//! Error taxonomy
//!
//! `ItemError` is the per-identifier failure that the recovery layer reasons
//! about. `AuditError` covers run-level failures (configuration, setup, I/O).

use std::path::PathBuf;

use thiserror::Error;

/// Message fragments that mean the browser session is gone.
const SESSION_INVALID_PATTERNS: &[&str] = &[
    "invalid session id",
    "no such session",
    "disconnected",
    "not connected to devtools",
    "chrome not reachable",
];

/// Message fragments that look like a transient network condition.
const TRANSIENT_PATTERNS: &[&str] = &[
    "net::err",
    "timeout",
    "timed out",
    "connection",
    "dns",
];

/// Coarse failure class derived from an error message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    SessionInvalid,
    Transient,
    Unclassified,
}

/// Classifies a raw driver or transport message.
///
/// Session patterns are checked first: a dead session frequently also
/// reports "connection" in its message.
pub fn classify_failure(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    if SESSION_INVALID_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureKind::SessionInvalid
    } else if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureKind::Transient
    } else {
        FailureKind::Unclassified
    }
}

/// Failure while processing a single identifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    #[error("Invalid UPC format: {identifier:?}")]
    InvalidFormat { identifier: String },

    #[error("Session expired; re-login did not recover.")]
    SessionExpired,

    #[error("Session invalid: {message}")]
    SessionInvalid { message: String },

    #[error("Transient failure: {message}")]
    Transient { message: String },

    #[error("{message}")]
    Unclassified { message: String },
}

impl ItemError {
    /// Builds the variant that matches the message text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match classify_failure(&message) {
            FailureKind::SessionInvalid => Self::SessionInvalid { message },
            FailureKind::Transient => Self::Transient { message },
            FailureKind::Unclassified => Self::Unclassified { message },
        }
    }

    pub const fn is_session_invalid(&self) -> bool {
        matches!(self, Self::SessionInvalid { .. })
    }

    /// Errors the in-session retry loop may try again.
    ///
    /// Session-invalid failures are left to the restart path, and terminal
    /// outcomes are never retried.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Unclassified { .. })
    }
}

/// Run-level failure
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session setup failed: {0}")]
    SessionSetup(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl AuditError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
