//! Error types for the room sync client.

use thiserror::Error;

use crate::error_kind::ErrorKind;
use crate::phase::Phase;

/// Errors that can occur while synchronizing a room.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Failed to receive a message from the push channel.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// Could not establish the push connection.
    #[error("failed to connect push channel to `{url}`: {reason}")]
    Connect {
        /// Target URL.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// A request to the room API could not be completed.
    #[error("request to `{endpoint}` failed: {reason}")]
    Fetch {
        /// Endpoint path relative to the room.
        endpoint: String,
        /// Underlying failure.
        reason: String,
    },

    /// The room API answered with a non-success status.
    #[error("unexpected status {status} from `{endpoint}`")]
    Status {
        /// Endpoint path relative to the room.
        endpoint: String,
        /// HTTP status code.
        status: u16,
    },

    /// A response belongs to a round or phase the client already moved past.
    #[error("stale response for round {round} ({phase})")]
    StaleResponse {
        /// Round carried by the discarded response.
        round: u32,
        /// Phase carried by the discarded response.
        phase: Phase,
    },

    /// A snapshot or push payload is malformed or missing required fields.
    #[error("invalid payload: {0}")]
    Validation(String),

    /// Failed to serialize or deserialize a JSON document.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The sync engine is no longer running.
    #[error("sync engine is not running")]
    NotRunning,

    /// The guess for the current round was already spent.
    #[error("guess is locked for this round")]
    GuessLocked,

    /// The edit is not accepted in the current phase.
    #[error("input not allowed during {phase} phase")]
    InputNotAllowed {
        /// Phase the room is in.
        phase: Phase,
    },

    /// A configuration value is missing or unparsable.
    #[error("invalid configuration `{var}`: {reason}")]
    Config {
        /// Variable or field name.
        var: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Classify this error for the containment policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TransportReceive(_) | Self::Connect { .. } => ErrorKind::Transport,
            Self::Fetch { .. } | Self::Status { .. } | Self::Timeout | Self::Io(_) => {
                ErrorKind::Fetch
            }
            Self::StaleResponse { .. } => ErrorKind::StaleResponse,
            Self::Validation(_) | Self::Serialization(_) => ErrorKind::Validation,
            Self::NotRunning
            | Self::GuessLocked
            | Self::InputNotAllowed { .. }
            | Self::Config { .. } => ErrorKind::Usage,
        }
    }
}

/// A specialized [`Result`] type for room sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
