//! Events emitted by the sync engine.
//!
//! Events are informational: the view is already updated when they arrive.
//! They are delivered on a bounded channel and dropped (with a warning) when
//! the consumer falls behind, except [`SyncEvent::Stopped`], which is always
//! the last event and always delivered.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::autosave::FlushTarget;
use crate::error_kind::ErrorKind;
use crate::phase::Phase;
use crate::protocol::GuessResponse;

/// Notable things that happened inside a room session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The push channel is (re)connected.
    PushConnected,
    /// The push channel closed; a reconnect is scheduled.
    PushDisconnected { reason: Option<String> },
    /// A fetched snapshot replaced the previous one.
    SnapshotApplied { round: u32, phase: Phase },
    /// A new round began; the edit buffer was reset.
    RoundStarted { round: u32 },
    /// The phase changed within a round.
    PhaseChanged { round: u32, from: Phase, to: Phase },
    /// A response was older than what is shown and was dropped.
    StaleDiscarded { round: u32, phase: Phase },
    /// Buffered edits reached the server.
    Flushed { target: FlushTarget, forced: bool },
    /// A flush failed; the edits stay pending.
    FlushFailed { target: FlushTarget, reason: String },
    /// The server answered the guess.
    GuessResolved(GuessResponse),
    /// The game was restarted, here or by another player.
    Restarted { remote: bool },
    /// The first state fetch failed.
    ConnectionError { reason: String },
    /// A request or payload failed in a way worth surfacing.
    Error { kind: ErrorKind, message: String },
    /// The engine stopped. Always the last event.
    Stopped,
}

/// Queue an event without blocking; drop it if the channel is full.
pub(crate) fn emit_event(event_tx: &mpsc::Sender<SyncEvent>, event: SyncEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Deliver the final [`SyncEvent::Stopped`], waiting for room if needed.
pub(crate) async fn emit_stopped(event_tx: &mpsc::Sender<SyncEvent>) {
    if event_tx.send(SyncEvent::Stopped).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_channel_drops_but_stopped_waits() {
        let (tx, mut rx) = mpsc::channel(1);
        emit_event(&tx, SyncEvent::PushConnected);
        emit_event(&tx, SyncEvent::Restarted { remote: false });

        let stopper = tokio::spawn(async move { emit_stopped(&tx).await });
        assert_eq!(rx.recv().await.unwrap(), SyncEvent::PushConnected);
        assert_eq!(rx.recv().await.unwrap(), SyncEvent::Stopped);
        stopper.await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
