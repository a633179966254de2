//! Error types for lxd-bgpd
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-11: Error Handling - Structured error types with contextual information
//! - AU-3: Content of Audit Records - Errors name the entity or operation involved

use lxd_bgp_types::ParseError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for lxd-bgpd operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// How an error is handled by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Startup cannot continue; the process exits non-zero.
    Fatal,
    /// Platform connectivity problem; retried on the next trigger or reconnect.
    Transient,
    /// A single malformed or missing entity; its contribution is dropped.
    DataAnomaly,
    /// A publish or withdraw call failed; retried by the next pass.
    PublisherFailure,
}

/// Errors that can occur in lxd-bgpd.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The platform API could not be reached (socket, HTTP or WebSocket failure).
    #[error("Platform transport error during {operation}: {message}")]
    Transport {
        /// The operation that failed.
        operation: String,
        /// Error message.
        message: String,
    },

    /// A bounded operation did not finish in time.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The limit that was exceeded.
        timeout_ms: u64,
    },

    /// The platform API answered with an error envelope.
    #[error("Platform API error during {operation} (code {code}): {message}")]
    Api {
        /// The operation that failed.
        operation: String,
        /// Error code reported by the platform.
        code: u16,
        /// Error message reported by the platform.
        message: String,
    },

    /// A referenced network, instance or project does not exist.
    #[error("{entity} not found")]
    NotFound {
        /// Description of the missing entity.
        entity: String,
    },

    /// An entity carries data that cannot be interpreted.
    #[error("Invalid data for {entity}: {message}")]
    InvalidData {
        /// Description of the offending entity.
        entity: String,
        /// Error message.
        message: String,
    },

    /// A publish or withdraw call was rejected by the route publisher.
    #[error("Route publisher {operation} failed: {message}")]
    Publisher {
        /// The operation that failed (`publish` or `withdraw`).
        operation: String,
        /// Error message.
        message: String,
    },

    /// The BGP speaker could not be reached or configured at startup.
    #[error("BGP speaker setup failed: {message}")]
    Speaker {
        /// Error message.
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Address or prefix parse failure.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Creates a platform API error.
    pub fn api(operation: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            operation: operation.into(),
            code,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    /// Creates an invalid data error.
    pub fn invalid_data(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidData {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates a route publisher error.
    pub fn publisher(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publisher {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a speaker setup error.
    pub fn speaker(message: impl Into<String>) -> Self {
        Self::Speaker {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Classifies this error for handling.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Transport { .. } | SyncError::Timeout { .. } => ErrorKind::Transient,
            SyncError::Api { .. }
            | SyncError::NotFound { .. }
            | SyncError::InvalidData { .. }
            | SyncError::Parse(_) => ErrorKind::DataAnomaly,
            SyncError::Publisher { .. } => ErrorKind::PublisherFailure,
            SyncError::Speaker { .. } | SyncError::InvalidConfig { .. } | SyncError::Io(_) => {
                ErrorKind::Fatal
            }
        }
    }

    /// Returns true if the entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. })
    }

    /// Returns true if this error must abort a reconciliation pass instead of
    /// skipping the entity that produced it.
    ///
    /// A topology view collected while the platform is unreachable is
    /// incomplete, and diffing against it would withdraw live routes.
    pub fn aborts_pass(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
