//! Failure classes used to decide how an error is contained.
//!
//! Every [`SyncError`](crate::SyncError) maps onto exactly one
//! [`ErrorKind`]. None of them is propagated to a global error state: the
//! sync loop logs, retries on the next timer, or discards, depending on the
//! class.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Containment class of a [`SyncError`](crate::SyncError).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The push channel closed or failed. Recovered by reconnecting.
    Transport,
    /// A state fetch or flush failed. The next poll or flush resends.
    Fetch,
    /// A response was superseded by newer local state and dropped.
    StaleResponse,
    /// A snapshot or payload was malformed. Treated as "no state yet".
    Validation,
    /// A client-side rejection: stopped engine, locked guess, bad config.
    Usage,
}

impl ErrorKind {
    /// Returns a human-readable description of this failure class.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transport => {
                "The push connection dropped. Reconnecting in the background; polling keeps the room fresh."
            }
            Self::Fetch => {
                "A request to the room server failed. It will be retried on the next refresh or save."
            }
            Self::StaleResponse => {
                "A response arrived for a round or phase that is already over and was ignored."
            }
            Self::Validation => "The server sent an incomplete room state. Waiting for the next one.",
            Self::Usage => "The action is not possible in the current state of the room.",
        }
    }

    /// Whether the sync loop recovers from this class on its own.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Usage)
    }

    /// Whether a failure of this class deserves a log line above `debug`.
    pub fn is_reportable(&self) -> bool {
        matches!(self, Self::Transport | Self::Fetch | Self::Validation)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
