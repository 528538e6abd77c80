//! Refresh producers: the push supervisor and the poller.
//!
//! Both run as their own tasks and feed one [`ChannelSignal`] stream into
//! the sync loop. Neither holds game state; every notification and every
//! poll tick becomes exactly one [`RefreshRequest`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::protocol::PushMessage;
use crate::transport::{Connector, PushTransport};

/// Default delay before reopening a closed push connection.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Default period of the fallback poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshSource {
    Push,
    Poll,
    /// The push channel (re)connected; notifications may have been missed.
    Connected,
    /// Requested through the client handle or after an explicit submit.
    Manual,
}

/// One request to fetch the room state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub source: RefreshSource,
    /// Validated push payload, if the notification carried a recognized one.
    pub message: Option<PushMessage>,
}

impl RefreshRequest {
    pub fn new(source: RefreshSource) -> Self {
        Self {
            source,
            message: None,
        }
    }
}

/// What the producers tell the sync loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    Connected,
    Disconnected { reason: Option<String> },
    Refresh(RefreshRequest),
}

/// Keep a push connection open for `room_code` until shutdown.
///
/// Closures and failed connects are followed by `backoff`, then another
/// attempt, forever.
pub(crate) async fn run_push<C: Connector>(
    connector: Arc<C>,
    room_code: String,
    backoff: Duration,
    signal_tx: mpsc::UnboundedSender<ChannelSignal>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(room = %room_code, "push supervisor started");
    loop {
        let connected = tokio::select! {
            result = connector.connect(&room_code) => result,
            _ = shutdown_rx.changed() => break,
        };

        match connected {
            Ok(mut transport) => {
                info!(room = %room_code, "push channel open");
                if signal_tx.send(ChannelSignal::Connected).is_err()
                    || signal_tx
                        .send(ChannelSignal::Refresh(RefreshRequest::new(RefreshSource::Connected)))
                        .is_err()
                {
                    break;
                }

                let reason = tokio::select! {
                    reason = forward_notifications(&mut transport, &signal_tx) => reason,
                    _ = shutdown_rx.changed() => {
                        if let Err(e) = transport.close().await {
                            debug!("closing push channel: {e}");
                        }
                        break;
                    }
                };

                warn!(room = %room_code, reason = ?reason, "push channel closed");
                if signal_tx
                    .send(ChannelSignal::Disconnected { reason })
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => {
                warn!(room = %room_code, "push connect failed: {e}");
            }
        }

        tokio::select! {
            () = tokio::time::sleep(backoff) => {}
            _ = shutdown_rx.changed() => break,
        }
    }
    debug!(room = %room_code, "push supervisor exited");
}

/// Turn every inbound frame into a refresh until the transport ends.
///
/// Returns the failure reason, or `None` for a clean close.
async fn forward_notifications<T: PushTransport>(
    transport: &mut T,
    signal_tx: &mpsc::UnboundedSender<ChannelSignal>,
) -> Option<String> {
    loop {
        match transport.recv().await {
            Some(Ok(text)) => {
                let message = match PushMessage::parse(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("rejected push payload: {e}");
                        None
                    }
                };
                debug!(kind = message.as_ref().map(PushMessage::kind), "push notification");
                let request = RefreshRequest {
                    source: RefreshSource::Push,
                    message,
                };
                if signal_tx.send(ChannelSignal::Refresh(request)).is_err() {
                    return Some("sync loop gone".into());
                }
            }
            Some(Err(e)) => return Some(e.to_string()),
            None => return None,
        }
    }
}

/// Request a refresh every `interval` until shutdown.
pub(crate) async fn run_poller(
    interval: Duration,
    signal_tx: mpsc::UnboundedSender<ChannelSignal>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let request = RefreshRequest::new(RefreshSource::Poll);
                if signal_tx.send(ChannelSignal::Refresh(request)).is_err() {
                    break;
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
    debug!("poller exited");
}
