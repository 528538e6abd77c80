//! Async sync engine for one room.
//!
//! [`RoomSyncClient`] is a thin handle that talks to a background sync loop
//! over an unbounded MPSC channel. The loop owns the [`RoomSession`] and
//! multiplexes user commands, refresh requests from the push channel and the
//! poller, network completions, the autosave deadline and the countdown tick
//! with `tokio::select!`. Events are emitted on a bounded channel returned
//! from [`RoomSyncClient::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let api = HttpRoomApi::new("https://jeux.example", "XK42", GameKind::Word)?;
//! let connector = WebSocketConnector::new("wss://jeux.example");
//! let config = SyncConfig::new("XK42", GameKind::Word, 7);
//! let (client, mut events) = RoomSyncClient::start(api, connector, my_view, NoAudio, config);
//!
//! client.edit_answer(1, "Chat")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SyncEvent::PhaseChanged { to, .. } => { /* … */ }
//!         SyncEvent::Stopped => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn, Instrument};

use crate::api::RoomApi;
use crate::audio::AudioSink;
use crate::autosave::DEFAULT_AUTOSAVE_DELAY;
use crate::buffer::{Verdict, VoteKey};
use crate::channel::{
    run_poller, run_push, ChannelSignal, RefreshRequest, RefreshSource,
    DEFAULT_POLL_INTERVAL, DEFAULT_RECONNECT_BACKOFF,
};
use crate::countdown::{Clock, SystemClock, DEFAULT_COUNTDOWN_TICK};
use crate::error::{Result, SyncError};
use crate::event::{emit_event, emit_stopped, SyncEvent};
use crate::phase::{GameKind, Phase, RoundPhase};
use crate::protocol::{CategoryId, GuessResponse, PlayerInfo, UserId};
use crate::render::View;
use crate::session::{Action, FlushBody, FlushMeta, RoomSession, SessionParams};
use crate::snapshot::FetchTicket;
use crate::transport::Connector;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`RoomSyncClient`].
///
/// Room code, game and the local player's id are required; timings have
/// defaults matching the server's expectations.
///
/// ```
/// use room_sync_client::client::SyncConfig;
/// use room_sync_client::phase::GameKind;
/// use std::time::Duration;
///
/// let config = SyncConfig::new("XK42", GameKind::Word, 7)
///     .with_autosave_delay(Duration::from_millis(1500))
///     .with_event_channel_capacity(64);
/// assert_eq!(config.poll_interval, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub room_code: String,
    pub game: GameKind,
    /// Server id of the local player.
    pub self_id: UserId,
    /// Quiet period before edits are flushed. Defaults to **2 s**.
    pub autosave_delay: Duration,
    /// Period of the fallback poll. Defaults to **5 s**.
    pub poll_interval: Duration,
    /// Delay before reopening a closed push channel. Defaults to **2 s**.
    pub reconnect_backoff: Duration,
    /// Refresh period of the countdown display. Defaults to **500 ms**.
    pub countdown_tick: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// Events are dropped (with a warning) when the consumer falls behind;
    /// `Stopped` is always delivered. Defaults to **256**, clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the sync loop gets to stop after [`RoomSyncClient::shutdown`]
    /// before it is aborted. Defaults to **1 s**.
    pub shutdown_timeout: Duration,
    /// Wall clock used against server deadlines.
    pub clock: Arc<dyn Clock>,
}

impl SyncConfig {
    pub fn new(room_code: impl Into<String>, game: GameKind, self_id: UserId) -> Self {
        Self {
            room_code: room_code.into(),
            game,
            self_id,
            autosave_delay: DEFAULT_AUTOSAVE_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            countdown_tick: DEFAULT_COUNTDOWN_TICK,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            clock: Arc::new(SystemClock),
        }
    }

    /// Read the configuration from `ROOM_CODE`, `ROOM_GAME`, `ROOM_USER_ID`
    /// and the optional `ROOM_AUTOSAVE_MS`, `ROOM_POLL_MS`,
    /// `ROOM_RECONNECT_MS`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] naming the first missing or unparsable
    /// variable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(SyncError::Config {
                    var,
                    reason: "missing".into(),
                })
        };
        let millis = |var: &'static str| -> Result<Option<Duration>> {
            lookup(var)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .map(Duration::from_millis)
                        .map_err(|e| SyncError::Config {
                            var,
                            reason: e.to_string(),
                        })
                })
                .transpose()
        };

        let room_code = required("ROOM_CODE")?;
        let game = required("ROOM_GAME")?
            .parse::<GameKind>()
            .map_err(|e| SyncError::Config {
                var: "ROOM_GAME",
                reason: e.to_string(),
            })?;
        let self_id = required("ROOM_USER_ID")?
            .trim()
            .parse::<UserId>()
            .map_err(|e| SyncError::Config {
                var: "ROOM_USER_ID",
                reason: e.to_string(),
            })?;

        let mut config = Self::new(room_code.trim(), game, self_id);
        if let Some(delay) = millis("ROOM_AUTOSAVE_MS")? {
            config.autosave_delay = delay;
        }
        if let Some(interval) = millis("ROOM_POLL_MS")? {
            config = config.with_poll_interval(interval);
        }
        if let Some(backoff) = millis("ROOM_RECONNECT_MS")? {
            config.reconnect_backoff = backoff;
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_autosave_delay(mut self, delay: Duration) -> Self {
        self.autosave_delay = delay;
        self
    }

    /// Set the poll period. Zero is raised to 1 ms.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// Set the countdown refresh period. Zero is raised to 1 ms.
    #[must_use]
    pub fn with_countdown_tick(mut self, tick: Duration) -> Self {
        self.countdown_tick = tick.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State published by the sync loop for the handle's accessors.
struct SharedState {
    running: AtomicBool,
    push_connected: AtomicBool,
    guess_locked: AtomicBool,
    round: AtomicU32,
    phase: Mutex<Phase>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            push_connected: AtomicBool::new(false),
            guess_locked: AtomicBool::new(false),
            round: AtomicU32::new(0),
            phase: Mutex::new(Phase::Idle),
        }
    }
}

/// User input queued to the sync loop.
#[derive(Debug)]
enum Command {
    EditAnswer { category: CategoryId, text: String },
    SetVote { key: VoteKey, verdict: Verdict },
    ToggleVote { key: VoteKey },
    SubmitAnswers,
    SubmitVotes,
    SetGuess(String),
    SubmitGuess(Option<String>),
    Restart,
    Refresh,
    FetchPlayers,
    AudioEnded,
}

/// Outcome of a spawned network call.
#[derive(Debug)]
enum Completion {
    State {
        ticket: FetchTicket,
        result: Result<String>,
    },
    Flushed {
        meta: FlushMeta,
        result: Result<()>,
    },
    Guess {
        round: u32,
        result: Result<GuessResponse>,
    },
    Restarted(Result<()>),
    Players(Result<Vec<PlayerInfo>>),
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running room sync engine.
///
/// Created with [`RoomSyncClient::start`]. Input methods queue a command
/// and return immediately; phase checks happen in the loop, and rejected
/// input is reported as a [`SyncEvent::Error`].
pub struct RoomSyncClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<SharedState>,
    session_id: uuid::Uuid,
    task: Option<tokio::task::JoinHandle<()>>,
    producers: Vec<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl RoomSyncClient {
    /// Start the sync loop, the push supervisor and the poller.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Returns
    ///
    /// A tuple of `(client_handle, event_receiver)`. The receiver yields
    /// [`SyncEvent`]s until [`SyncEvent::Stopped`].
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start<A, C, V, S>(
        api: A,
        connector: C,
        view: V,
        audio: S,
        config: SyncConfig,
    ) -> (Self, mpsc::Receiver<SyncEvent>)
    where
        A: RoomApi,
        C: Connector,
        V: View,
        S: AudioSink,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel::<ChannelSignal>();
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<SyncEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (producers_tx, producers_rx) = watch::channel(false);

        let session = RoomSession::new(
            SessionParams {
                room_code: config.room_code.clone(),
                game: config.game,
                self_id: config.self_id,
                autosave_delay: config.autosave_delay,
                clock: Arc::clone(&config.clock),
            },
            Box::new(view),
            Box::new(audio),
        );
        let session_id = session.id();
        let span = tracing::info_span!(
            "room_session",
            session = %session_id,
            room = %config.room_code,
        );

        let producers = vec![
            tokio::spawn(
                run_push(
                    Arc::new(connector),
                    config.room_code.clone(),
                    config.reconnect_backoff,
                    signal_tx.clone(),
                    producers_rx.clone(),
                )
                .instrument(span.clone()),
            ),
            tokio::spawn(
                run_poller(config.poll_interval, signal_tx, producers_rx).instrument(span.clone()),
            ),
        ];

        let state = Arc::new(SharedState::new());
        let task = tokio::spawn(
            sync_loop(
                session,
                Arc::new(api),
                LoopChannels {
                    cmd_rx,
                    signal_rx,
                    event_tx,
                    shutdown_rx,
                    producers_tx,
                },
                Arc::clone(&state),
                config.countdown_tick,
            )
            .instrument(span),
        );

        let client = Self {
            cmd_tx,
            state,
            session_id,
            task: Some(task),
            producers,
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (client, event_rx)
    }

    // ── Input ───────────────────────────────────────────────────────

    /// Record typed text for a category (word game, playing phase).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotRunning`] once the engine stopped.
    pub fn edit_answer(&self, category: CategoryId, text: impl Into<String>) -> Result<()> {
        self.send(Command::EditAnswer {
            category,
            text: text.into(),
        })
    }

    /// Set the verdict on `target`'s answer for `category` (validation phase).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotRunning`] once the engine stopped.
    pub fn set_vote(&self, target: UserId, category: CategoryId, verdict: Verdict) -> Result<()> {
        self.send(Command::SetVote {
            key: VoteKey::new(target, category),
            verdict,
        })
    }

    /// Flip the displayed verdict on `target`'s answer for `category`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotRunning`] once the engine stopped.
    pub fn toggle_vote(&self, target: UserId, category: CategoryId) -> Result<()> {
        self.send(Command::ToggleVote {
            key: VoteKey::new(target, category),
        })
    }

    /// Flush the answers now and refresh afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotRunning`] once the engine stopped.
    pub fn submit_answers(&self) -> Result<()> {
        self.send(Command::SubmitAnswers)
    }

    /// Flush the votes now and refresh afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotRunning`] once the engine stopped.
    pub fn submit_votes(&self) -> Result<()> {
        self.send(Command::SubmitVotes)
    }

    /// Update the guess text (music game).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::GuessLocked`] once the round's guess is spent.
    pub fn set_guess(&self, text: impl Into<String>) -> Result<()> {
        self.check_guess()?;
        self.send(Command::SetGuess(text.into()))
    }

    /// Send the round's single guess; `text` replaces the buffered guess.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::GuessLocked`] once the round's guess is spent.
    pub fn submit_guess(&self, text: Option<String>) -> Result<()> {
        self.check_guess()?;
        self.send(Command::SubmitGuess(text))
    }

    /// Start the game over for the whole room.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotRunning`] once the engine stopped.
    pub fn restart(&self) -> Result<()> {
        self.send(Command::Restart)
    }

    /// Fetch the room state now.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotRunning`] once the engine stopped.
    pub fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh)
    }

    /// Fetch the player list now.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotRunning`] once the engine stopped.
    pub fn fetch_players(&self) -> Result<()> {
        self.send(Command::FetchPlayers)
    }

    /// Report that the audio sink reached the end of the preview.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotRunning`] once the engine stopped.
    pub fn notify_audio_ended(&self) -> Result<()> {
        self.send(Command::AudioEnded)
    }

    /// Stop the sync loop and its producers.
    ///
    /// The event receiver yields [`SyncEvent::Stopped`] and then `None`.
    pub async fn shutdown(&mut self) {
        debug!("RoomSyncClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("sync loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("sync loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("sync loop aborted: {join_err}");
                    }
                }
            }
        }

        for producer in self.producers.drain(..) {
            producer.abort();
        }
        self.state.running.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Id of the session, as recorded in log spans.
    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    pub fn is_push_connected(&self) -> bool {
        self.state.push_connected.load(Ordering::Acquire)
    }

    pub fn is_guess_locked(&self) -> bool {
        self.state.guess_locked.load(Ordering::Acquire)
    }

    /// Round currently shown (0 before the first round).
    pub fn current_round(&self) -> u32 {
        self.state.round.load(Ordering::Acquire)
    }

    /// Phase currently shown.
    pub async fn current_phase(&self) -> Phase {
        *self.state.phase.lock().await
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn check_guess(&self) -> Result<()> {
        if self.state.guess_locked.load(Ordering::Acquire) {
            return Err(SyncError::GuessLocked);
        }
        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        if !self.state.running.load(Ordering::Acquire) {
            return Err(SyncError::NotRunning);
        }
        self.cmd_tx.send(command).map_err(|_| SyncError::NotRunning)
    }
}

impl std::fmt::Debug for RoomSyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSyncClient")
            .field("session_id", &self.session_id)
            .field("running", &self.is_running())
            .field("push_connected", &self.is_push_connected())
            .field("round", &self.current_round())
            .finish()
    }
}

impl Drop for RoomSyncClient {
    fn drop(&mut self) {
        // No executor here to drive a graceful stop; abort everything.
        if let Some(task) = self.task.take() {
            task.abort();
        }
        for producer in self.producers.drain(..) {
            producer.abort();
        }
    }
}

// ── Sync loop ───────────────────────────────────────────────────────

struct LoopChannels {
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    signal_rx: mpsc::UnboundedReceiver<ChannelSignal>,
    event_tx: mpsc::Sender<SyncEvent>,
    shutdown_rx: oneshot::Receiver<()>,
    producers_tx: watch::Sender<bool>,
}

/// Single owner of the session.
///
/// Exits on the shutdown signal or when the handle is dropped.
async fn sync_loop<A: RoomApi>(
    mut session: RoomSession,
    api: Arc<A>,
    channels: LoopChannels,
    state: Arc<SharedState>,
    countdown_tick: Duration,
) {
    let LoopChannels {
        mut cmd_rx,
        mut signal_rx,
        event_tx,
        mut shutdown_rx,
        producers_tx,
    } = channels;
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
    let mut countdown = tokio::time::interval(countdown_tick);
    countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticking = false;
    let mut signals_open = true;

    debug!("sync loop started");
    dispatch(session.start(), &api, &done_tx);

    loop {
        publish(&state, session.marker(), session.guess_locked()).await;
        for event in session.drain_events() {
            emit_event(&event_tx, event);
        }
        ticking |= session.countdown_running();
        let autosave_at = session.next_autosave();

        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                break;
            }

            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("command channel closed, stopping sync loop");
                    break;
                };
                match handle_command(&mut session, cmd) {
                    Ok(actions) => dispatch(actions, &api, &done_tx),
                    Err(e) => {
                        debug!("input rejected: {e}");
                        emit_event(&event_tx, SyncEvent::Error {
                            kind: e.kind(),
                            message: e.to_string(),
                        });
                    }
                }
            }

            signal = signal_rx.recv(), if signals_open => match signal {
                Some(ChannelSignal::Connected) => {
                    state.push_connected.store(true, Ordering::Release);
                    emit_event(&event_tx, SyncEvent::PushConnected);
                }
                Some(ChannelSignal::Disconnected { reason }) => {
                    state.push_connected.store(false, Ordering::Release);
                    emit_event(&event_tx, SyncEvent::PushDisconnected { reason });
                }
                Some(ChannelSignal::Refresh(request)) => {
                    dispatch(session.on_refresh(request), &api, &done_tx);
                }
                None => signals_open = false,
            },

            Some(done) = done_rx.recv() => {
                let actions = handle_completion(&mut session, done);
                dispatch(actions, &api, &done_tx);
            }

            () = tokio::time::sleep_until(autosave_at.unwrap_or_else(Instant::now)), if autosave_at.is_some() => {
                dispatch(session.on_autosave_due(Instant::now()), &api, &done_tx);
            }

            _ = countdown.tick(), if ticking => {
                ticking = session.on_countdown_tick();
            }
        }
    }

    let _ = producers_tx.send(true);
    state.running.store(false, Ordering::Release);
    state.push_connected.store(false, Ordering::Release);
    for event in session.drain_events() {
        emit_event(&event_tx, event);
    }
    emit_stopped(&event_tx).await;
    debug!("sync loop exited");
}

fn handle_command(session: &mut RoomSession, command: Command) -> Result<Vec<Action>> {
    match command {
        Command::EditAnswer { category, text } => {
            session.edit_answer(category, text).map(|()| Vec::new())
        }
        Command::SetVote { key, verdict } => session.set_vote(key, verdict).map(|()| Vec::new()),
        Command::ToggleVote { key } => session.toggle_vote(key).map(|_| Vec::new()),
        Command::SubmitAnswers => session.submit_answers(),
        Command::SubmitVotes => session.submit_votes(),
        Command::SetGuess(text) => session.set_guess(text).map(|()| Vec::new()),
        Command::SubmitGuess(text) => session.submit_guess(text),
        Command::Restart => Ok(session.restart()),
        Command::Refresh => Ok(session.on_refresh(RefreshRequest::new(RefreshSource::Manual))),
        Command::FetchPlayers => Ok(vec![Action::FetchPlayers]),
        Command::AudioEnded => {
            session.on_audio_ended();
            Ok(Vec::new())
        }
    }
}

fn handle_completion(session: &mut RoomSession, completion: Completion) -> Vec<Action> {
    match completion {
        Completion::State { ticket, result } => session.on_state_fetched(ticket, result),
        Completion::Flushed { meta, result } => session.on_flushed(meta, result),
        Completion::Guess { round, result } => session.on_guess_result(round, result),
        Completion::Restarted(result) => session.on_restarted(result),
        Completion::Players(result) => {
            session.on_players(result);
            Vec::new()
        }
    }
}

/// Spawn one task per action; each reports back on `done_tx`.
fn dispatch<A: RoomApi>(
    actions: Vec<Action>,
    api: &Arc<A>,
    done_tx: &mpsc::UnboundedSender<Completion>,
) {
    for action in actions {
        let api = Arc::clone(api);
        let done_tx = done_tx.clone();
        tokio::spawn(
            async move {
                let completion = match action {
                    Action::FetchState(ticket) => Completion::State {
                        ticket,
                        result: api.fetch_state().await,
                    },
                    Action::Flush { meta, body } => {
                        let result = match &body {
                            FlushBody::Answers(answers) => api.post_answers(answers).await,
                            FlushBody::Votes(votes) => api.post_votes(votes).await,
                        };
                        Completion::Flushed { meta, result }
                    }
                    Action::SubmitGuess { round, guess } => Completion::Guess {
                        round,
                        result: api.post_guess(&guess).await,
                    },
                    Action::Restart => Completion::Restarted(api.restart().await),
                    Action::FetchPlayers => Completion::Players(api.fetch_players().await),
                };
                if done_tx.send(completion).is_err() {
                    debug!("sync loop gone, completion dropped");
                }
            }
            .in_current_span(),
        );
    }
}

/// Copy what the handle's accessors report.
///
/// The session is not `Sync`; it must not be borrowed across the await.
async fn publish(state: &SharedState, marker: RoundPhase, guess_locked: bool) {
    state.round.store(marker.round, Ordering::Release);
    state.guess_locked.store(guess_locked, Ordering::Release);
    *state.phase.lock().await = marker.phase;
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_defaults() {
        let config = SyncConfig::new("XK42", GameKind::Music, 3);
        assert_eq!(config.autosave_delay, Duration::from_millis(2000));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.reconnect_backoff, Duration::from_secs(2));
        assert_eq!(config.countdown_tick, Duration::from_millis(500));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn builder_clamps_zero_values() {
        let config = SyncConfig::new("XK42", GameKind::Word, 3)
            .with_event_channel_capacity(0)
            .with_poll_interval(Duration::ZERO);
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn config_from_lookup() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("ROOM_CODE", " XK42 "),
            ("ROOM_GAME", "blindtest"),
            ("ROOM_USER_ID", "12"),
            ("ROOM_POLL_MS", "750"),
        ]))
        .unwrap();
        assert_eq!(config.room_code, "XK42");
        assert_eq!(config.game, GameKind::Music);
        assert_eq!(config.self_id, 12);
        assert_eq!(config.poll_interval, Duration::from_millis(750));
        assert_eq!(config.autosave_delay, DEFAULT_AUTOSAVE_DELAY);
    }

    #[test]
    fn config_errors_name_the_variable() {
        let err = SyncConfig::from_lookup(lookup(&[("ROOM_CODE", "XK42"), ("ROOM_GAME", "word")]))
            .unwrap_err();
        assert!(matches!(err, SyncError::Config { var: "ROOM_USER_ID", .. }));

        let err = SyncConfig::from_lookup(lookup(&[
            ("ROOM_CODE", "XK42"),
            ("ROOM_GAME", "chess"),
            ("ROOM_USER_ID", "1"),
        ]))
        .unwrap_err();
        assert!(matches!(err, SyncError::Config { var: "ROOM_GAME", .. }));

        let err = SyncConfig::from_lookup(lookup(&[
            ("ROOM_CODE", "XK42"),
            ("ROOM_GAME", "word"),
            ("ROOM_USER_ID", "1"),
            ("ROOM_AUTOSAVE_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, SyncError::Config { var: "ROOM_AUTOSAVE_MS", .. }));
    }
}
