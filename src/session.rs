//! The room session: all client-side state of one room visit.
//!
//! [`RoomSession`] is owned by the sync loop and never shared. Its methods
//! are synchronous: each one updates state, re-renders if needed, and
//! returns the network [`Action`]s the loop must perform. Completions come
//! back through the `on_*` methods.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::{AudioDirector, AudioSink};
use crate::autosave::{AutosaveScheduler, FlushTarget};
use crate::buffer::{LocalEditBuffer, Verdict, VoteKey};
use crate::channel::RefreshRequest;
use crate::countdown::{is_running, Clock};
use crate::error::{Result, SyncError};
use crate::error_kind::ErrorKind;
use crate::event::SyncEvent;
use crate::phase::{GameKind, Phase, PhaseMachine, RoundPhase};
use crate::protocol::{
    AnswersPayload, CategoryId, GuessResponse, PlayerInfo, PushMessage, UserId, VotesPayload,
};
use crate::render::{Reconciler, RenderContext, View};
use crate::snapshot::{Accepted, FetchTicket, Prompt, RoomSnapshot, SnapshotStore};

/// Identity of one flush, handed back with its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushMeta {
    pub target: FlushTarget,
    pub round: u32,
    /// Buffer revision the body was taken at.
    pub revision: u64,
    /// Sent because an input phase was left, not by the debounce.
    pub forced: bool,
    /// Fetch the state once the flush succeeded (explicit submit).
    pub refresh_after: bool,
}

/// Body of a flush: the whole buffer for the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushBody {
    Answers(AnswersPayload),
    Votes(VotesPayload),
}

/// Network work requested by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    FetchState(FetchTicket),
    Flush { meta: FlushMeta, body: FlushBody },
    SubmitGuess { round: u32, guess: String },
    Restart,
    FetchPlayers,
}

/// Everything the session needs besides the view and audio.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub room_code: String,
    pub game: GameKind,
    pub self_id: UserId,
    pub autosave_delay: std::time::Duration,
    pub clock: Arc<dyn Clock>,
}

/// Client-side state of one room, from entry to shutdown.
pub struct RoomSession {
    id: Uuid,
    room_code: String,
    game: GameKind,
    self_id: UserId,
    store: SnapshotStore,
    buffer: LocalEditBuffer,
    machine: PhaseMachine,
    autosave: AutosaveScheduler,
    reconciler: Reconciler,
    /// `GET players` result; music states carry no player list.
    roster: Vec<PlayerInfo>,
    view: Box<dyn View>,
    audio: AudioDirector,
    clock: Arc<dyn Clock>,
    fetched_once: bool,
    /// A local restart is posted and not yet answered; state is not fetched.
    restart_pending: bool,
    events: Vec<SyncEvent>,
}

impl RoomSession {
    pub fn new(params: SessionParams, view: Box<dyn View>, audio: Box<dyn AudioSink>) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_code: params.room_code,
            game: params.game,
            self_id: params.self_id,
            store: SnapshotStore::new(),
            buffer: LocalEditBuffer::new(0),
            machine: PhaseMachine::new(),
            autosave: AutosaveScheduler::new(params.autosave_delay),
            reconciler: Reconciler::new(),
            roster: Vec::new(),
            view,
            audio: AudioDirector::new(audio),
            clock: params.clock,
            fetched_once: false,
            restart_pending: false,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn game(&self) -> GameKind {
        self.game
    }

    pub fn snapshot(&self) -> Option<&RoomSnapshot> {
        self.store.current()
    }

    /// Round and phase currently shown.
    pub fn marker(&self) -> RoundPhase {
        self.store
            .marker()
            .unwrap_or_else(|| RoundPhase::new(0, Phase::Idle))
    }

    pub fn buffer(&self) -> &LocalEditBuffer {
        &self.buffer
    }

    pub fn guess_locked(&self) -> bool {
        self.buffer.guess_locked()
    }

    /// Events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        std::mem::take(&mut self.events)
    }

    /// Show the waiting view and request the first state.
    pub fn start(&mut self) -> Vec<Action> {
        info!(room = %self.room_code, game = ?self.game, "room session started");
        self.reconciler.render_waiting(self.view.as_mut(), self.game);
        self.fetch().into_iter().collect()
    }

    // ── Refresh path ────────────────────────────────────────────────

    /// Handle one refresh request from the push channel, the poller or the
    /// handle: pre-apply the push payload, then fetch.
    pub fn on_refresh(&mut self, request: RefreshRequest) -> Vec<Action> {
        if self.restart_pending {
            debug!(source = ?request.source, "refresh ignored while restarting");
            return Vec::new();
        }
        let mut actions = Vec::new();
        if let Some(message) = &request.message {
            actions.extend(self.apply_push(message));
        }
        actions.extend(self.fetch());
        actions
    }

    fn apply_push(&mut self, message: &PushMessage) -> Vec<Action> {
        let changed = match message {
            PushMessage::RoundStarted(payload) => {
                self.store.pre_apply(|s| s.apply_round_started(payload))
            }
            PushMessage::RoundReveal(payload) => self.store.pre_apply(|s| s.apply_reveal(payload)),
            PushMessage::Finished => self.store.pre_apply(RoomSnapshot::apply_finished),
            PushMessage::RoomUpdated => false,
        };
        let mut actions = Vec::new();
        if changed {
            debug!(kind = message.kind(), "push payload pre-applied");
            actions.extend(self.reconcile());
        }
        if self.game == GameKind::Music
            && *message == PushMessage::RoomUpdated
            && self.marker().round > 0
        {
            actions.push(Action::FetchPlayers);
        }
        actions
    }

    /// Number a state request, unless a local restart is still in flight.
    fn fetch(&mut self) -> Option<Action> {
        if self.restart_pending {
            return None;
        }
        Some(Action::FetchState(self.store.issue()))
    }

    /// Completion of `GET state`.
    pub fn on_state_fetched(&mut self, ticket: FetchTicket, result: Result<String>) -> Vec<Action> {
        let first = !self.fetched_once;
        self.fetched_once = true;

        let snapshot = match result.and_then(|body| RoomSnapshot::from_json(&body)) {
            Ok(snapshot) => snapshot,
            Err(e) if e.kind() == ErrorKind::Validation => {
                warn!(seq = ticket.seq(), "invalid room state: {e}");
                if self.store.current().is_none() {
                    self.reconciler.render_waiting(self.view.as_mut(), self.game);
                }
                return Vec::new();
            }
            Err(e) => {
                warn!(seq = ticket.seq(), "state fetch failed: {e}");
                if first {
                    self.reconciler.render_connection_error(self.view.as_mut());
                    self.events.push(SyncEvent::ConnectionError {
                        reason: e.to_string(),
                    });
                }
                return Vec::new();
            }
        };

        match self.store.accept(ticket, snapshot) {
            Ok(Accepted::Applied) => {}
            Ok(Accepted::RemoteRestart) => {
                info!("server restarted the game");
                self.reset_local_state();
                self.events.push(SyncEvent::Restarted { remote: true });
            }
            Err(SyncError::StaleResponse { round, phase }) => {
                debug!(seq = ticket.seq(), round, %phase, "stale state discarded");
                self.events.push(SyncEvent::StaleDiscarded { round, phase });
                return Vec::new();
            }
            Err(e) => {
                warn!("state rejected: {e}");
                return Vec::new();
            }
        }

        let marker = self.marker();
        self.events.push(SyncEvent::SnapshotApplied {
            round: marker.round,
            phase: marker.phase,
        });
        self.reconcile()
    }

    /// Run the phase machine on the current snapshot, then render.
    ///
    /// Forced flush bodies are copied from the buffer before anything is
    /// rendered or seeded, so the returned actions carry exactly what the
    /// player had typed when the phase was left.
    fn reconcile(&mut self) -> Vec<Action> {
        let Some(snapshot) = self.store.current() else {
            self.reconciler.render_waiting(self.view.as_mut(), self.game);
            return Vec::new();
        };
        let marker = snapshot.marker();
        let transition = self.machine.observe(marker);
        let mut actions = Vec::new();

        if transition.new_round {
            if transition.previous.is_some() || marker.round > 0 {
                debug!(round = marker.round, "new round, edit buffer reset");
                self.events.push(SyncEvent::RoundStarted {
                    round: marker.round,
                });
            }
            self.autosave.cancel_all();
            self.buffer = LocalEditBuffer::new(marker.round);
        } else {
            if transition.leaves_answering && self.buffer.has_unsaved_answers() {
                self.autosave.cancel(FlushTarget::Answers);
                actions.push(flush_action(&self.buffer, FlushTarget::Answers, true, false));
            }
            if transition.leaves_voting && self.buffer.has_unsaved_votes() {
                self.autosave.cancel(FlushTarget::Votes);
                actions.push(flush_action(&self.buffer, FlushTarget::Votes, true, false));
            }
            if let (true, Some(previous)) = (transition.phase_changed, transition.previous) {
                self.events.push(SyncEvent::PhaseChanged {
                    round: marker.round,
                    from: previous.phase,
                    to: marker.phase,
                });
            }
        }

        self.buffer.seed(snapshot, self.self_id);

        if self.game == GameKind::Music {
            match (&snapshot.phase, &snapshot.prompt) {
                (Phase::Playing, Prompt::Preview(src)) => self.audio.ensure_loop(src),
                (Phase::Playing, _) => {}
                _ => self.audio.stop(),
            }
            if transition.entered_finished {
                actions.push(Action::FetchPlayers);
            }
        }

        let ctx = RenderContext {
            snapshot,
            buffer: &self.buffer,
            game: self.game,
            self_id: self.self_id,
            roster: &self.roster,
            now: self.clock.now_unix(),
        };
        self.reconciler.render(self.view.as_mut(), &ctx);
        actions
    }

    fn render(&mut self) {
        match self.store.current() {
            Some(snapshot) => {
                let ctx = RenderContext {
                    snapshot,
                    buffer: &self.buffer,
                    game: self.game,
                    self_id: self.self_id,
                    roster: &self.roster,
                    now: self.clock.now_unix(),
                };
                self.reconciler.render(self.view.as_mut(), &ctx);
            }
            None => self.reconciler.render_waiting(self.view.as_mut(), self.game),
        }
    }

    // ── User input ──────────────────────────────────────────────────

    fn require(&self, game: GameKind, phase: Phase) -> Result<()> {
        let current = self.marker().phase;
        if self.game == game && current == phase {
            Ok(())
        } else {
            Err(SyncError::InputNotAllowed { phase: current })
        }
    }

    /// The player typed `text` for `category`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InputNotAllowed`] outside the word game's playing
    /// phase.
    pub fn edit_answer(&mut self, category: CategoryId, text: String) -> Result<()> {
        self.require(GameKind::Word, Phase::Playing)?;
        self.reconciler.record_answer(category, &text);
        self.buffer.edit_answer(category, text);
        self.autosave.arm(FlushTarget::Answers, Instant::now());
        Ok(())
    }

    /// The player set a verdict on another player's answer.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InputNotAllowed`] outside the validation phase or
    /// when judging their own answer.
    pub fn set_vote(&mut self, key: VoteKey, verdict: Verdict) -> Result<()> {
        self.require(GameKind::Word, Phase::Validation)?;
        self.check_vote_target(key)?;
        self.buffer.set_vote(key, verdict);
        self.reconciler.record_vote(key, verdict);
        self.autosave.arm(FlushTarget::Votes, Instant::now());
        Ok(())
    }

    /// Flip the displayed verdict.
    ///
    /// # Errors
    ///
    /// Same as [`set_vote`](Self::set_vote).
    pub fn toggle_vote(&mut self, key: VoteKey) -> Result<Verdict> {
        self.require(GameKind::Word, Phase::Validation)?;
        self.check_vote_target(key)?;
        let shown = self.reconciler.shown_verdict(key);
        let verdict = self.buffer.toggle_vote(key, shown);
        self.reconciler.record_vote(key, verdict);
        self.autosave.arm(FlushTarget::Votes, Instant::now());
        Ok(verdict)
    }

    fn check_vote_target(&self, key: VoteKey) -> Result<()> {
        if key.target == self.self_id {
            return Err(SyncError::InputNotAllowed {
                phase: self.marker().phase,
            });
        }
        Ok(())
    }

    /// Send the answers now, then refresh.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InputNotAllowed`] outside the playing phase.
    pub fn submit_answers(&mut self) -> Result<Vec<Action>> {
        self.require(GameKind::Word, Phase::Playing)?;
        self.autosave.cancel(FlushTarget::Answers);
        Ok(vec![flush_action(&self.buffer, FlushTarget::Answers, false, true)])
    }

    /// Send the votes now, then refresh.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InputNotAllowed`] outside the validation phase.
    pub fn submit_votes(&mut self) -> Result<Vec<Action>> {
        self.require(GameKind::Word, Phase::Validation)?;
        self.autosave.cancel(FlushTarget::Votes);
        Ok(vec![flush_action(&self.buffer, FlushTarget::Votes, false, true)])
    }

    /// Update the guess text.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::GuessLocked`] once the attempt is spent, or
    /// [`SyncError::InputNotAllowed`] outside a music game.
    pub fn set_guess(&mut self, text: String) -> Result<()> {
        if self.game != GameKind::Music {
            return Err(SyncError::InputNotAllowed {
                phase: self.marker().phase,
            });
        }
        self.buffer.set_guess_text(text)
    }

    /// Spend the round's single guess.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::GuessLocked`] when the attempt is spent or in
    /// flight, or [`SyncError::InputNotAllowed`] outside the playing phase.
    pub fn submit_guess(&mut self, text: Option<String>) -> Result<Vec<Action>> {
        self.require(GameKind::Music, Phase::Playing)?;
        if let Some(text) = text {
            self.buffer.set_guess_text(text)?;
        }
        let guess = self.buffer.begin_guess()?;
        Ok(vec![Action::SubmitGuess {
            round: self.buffer.round(),
            guess,
        }])
    }

    /// Replay: drop everything and ask the server to start over.
    pub fn restart(&mut self) -> Vec<Action> {
        info!("restart requested");
        self.restart_pending = true;
        self.store.reset();
        self.reset_local_state();
        self.reconciler.render_waiting(self.view.as_mut(), self.game);
        self.events.push(SyncEvent::Restarted { remote: false });
        vec![Action::Restart]
    }

    fn reset_local_state(&mut self) {
        self.machine.reset();
        self.autosave.cancel_all();
        self.buffer = LocalEditBuffer::new(0);
        self.reconciler.reset(self.view.as_mut());
        self.audio.stop();
        self.roster.clear();
    }

    // ── Timers ──────────────────────────────────────────────────────

    /// Earliest autosave deadline.
    pub fn next_autosave(&self) -> Option<Instant> {
        self.autosave.next_due()
    }

    /// Flush every target whose quiet period has elapsed.
    pub fn on_autosave_due(&mut self, now: Instant) -> Vec<Action> {
        let phase = self.marker().phase;
        self.autosave
            .take_due(now)
            .into_iter()
            .filter(|target| match target {
                FlushTarget::Answers => {
                    phase == Phase::Playing && self.buffer.has_unsaved_answers()
                }
                FlushTarget::Votes => phase == Phase::Validation && self.buffer.has_unsaved_votes(),
            })
            .map(|target| flush_action(&self.buffer, target, false, false))
            .collect()
    }

    /// Whether the countdown display still needs ticking.
    pub fn countdown_running(&self) -> bool {
        self.store.current().is_some_and(|s| {
            s.phase.has_deadline() && is_running(s.ends_at, self.clock.now_unix())
        })
    }

    /// Refresh the countdown text; returns whether it must keep ticking.
    pub fn on_countdown_tick(&mut self) -> bool {
        let (phase, ends_at) = self
            .store
            .current()
            .map_or((Phase::Idle, None), |s| (s.phase, s.ends_at));
        let now = self.clock.now_unix();
        self.reconciler.tick(self.view.as_mut(), phase, ends_at, now);
        self.countdown_running()
    }

    /// The audio sink finished the preview.
    pub fn on_audio_ended(&mut self) -> bool {
        let (phase, ends_at) = self
            .store
            .current()
            .map_or((Phase::Idle, None), |s| (s.phase, s.ends_at));
        self.audio.on_ended(phase, ends_at, self.clock.now_unix())
    }

    // ── Completions ─────────────────────────────────────────────────

    pub fn on_flushed(&mut self, meta: FlushMeta, result: Result<()>) -> Vec<Action> {
        if meta.round != self.buffer.round() {
            debug!(flush = %meta.target, round = meta.round, "flush ack for a past round ignored");
            return Vec::new();
        }
        match result {
            Ok(()) => {
                debug!(flush = %meta.target, revision = meta.revision, forced = meta.forced, "flushed");
                match meta.target {
                    FlushTarget::Answers => self.buffer.mark_answers_flushed(meta.revision),
                    FlushTarget::Votes => self.buffer.mark_votes_flushed(meta.revision),
                }
                self.events.push(SyncEvent::Flushed {
                    target: meta.target,
                    forced: meta.forced,
                });
                if meta.refresh_after {
                    return self.fetch().into_iter().collect();
                }
            }
            Err(e) => {
                warn!(flush = %meta.target, "flush failed: {e}");
                self.events.push(SyncEvent::FlushFailed {
                    target: meta.target,
                    reason: e.to_string(),
                });
            }
        }
        Vec::new()
    }

    pub fn on_guess_result(&mut self, round: u32, result: Result<GuessResponse>) -> Vec<Action> {
        if round != self.buffer.round() {
            debug!(round, "guess result for a past round ignored");
            return Vec::new();
        }
        match result {
            Ok(response) => {
                info!(correct = response.correct, points = response.points_awarded, "guess resolved");
                self.buffer.resolve_guess(&response);
                self.events.push(SyncEvent::GuessResolved(response));
                self.render();
                self.fetch().into_iter().collect()
            }
            Err(e) => {
                warn!("guess failed: {e}");
                self.buffer.release_guess();
                self.events.push(SyncEvent::Error {
                    kind: e.kind(),
                    message: e.to_string(),
                });
                Vec::new()
            }
        }
    }

    pub fn on_restarted(&mut self, result: Result<()>) -> Vec<Action> {
        self.restart_pending = false;
        if let Err(e) = result {
            warn!("restart failed: {e}");
            self.events.push(SyncEvent::Error {
                kind: e.kind(),
                message: e.to_string(),
            });
        }
        self.fetch().into_iter().collect()
    }

    pub fn on_players(&mut self, result: Result<Vec<PlayerInfo>>) {
        match result {
            Ok(players) => {
                debug!(count = players.len(), "roster updated");
                self.roster = players;
                self.render();
            }
            Err(e) => warn!("player list fetch failed: {e}"),
        }
    }
}

fn flush_action(
    buffer: &LocalEditBuffer,
    target: FlushTarget,
    forced: bool,
    refresh_after: bool,
) -> Action {
    let body = match target {
        FlushTarget::Answers => FlushBody::Answers(buffer.answers_payload()),
        FlushTarget::Votes => FlushBody::Votes(buffer.votes_payload()),
    };
    Action::Flush {
        meta: FlushMeta {
            target,
            round: buffer.round(),
            revision: buffer.revision(),
            forced,
            refresh_after,
        },
        body,
    }
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("id", &self.id)
            .field("room_code", &self.room_code)
            .field("game", &self.game)
            .field("marker", &self.marker())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::audio::NoAudio;
    use crate::phase::ViewMode;
    use crate::render::{InputKind, RowContent, RowKey, ScoreLine, TextSlot, CONNECTION_ERROR};
    use std::sync::Mutex as StdMutex;

    #[derive(Debug)]
    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_unix(&self) -> i64 {
            self.0
        }
    }

    #[derive(Clone, Default)]
    struct Texts(Arc<StdMutex<Vec<(TextSlot, String)>>>);

    impl Texts {
        fn last(&self, slot: TextSlot) -> Option<String> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(s, _)| *s == slot)
                .map(|(_, t)| t.clone())
        }
    }

    impl View for Texts {
        fn show_mode(&mut self, _mode: ViewMode) {}
        fn set_text(&mut self, slot: TextSlot, text: &str) {
            self.0.lock().unwrap().push((slot, text.to_string()));
        }
        fn set_input_enabled(&mut self, _input: InputKind, _enabled: bool) {}
        fn clear_rows(&mut self) {}
        fn mount_row(&mut self, _key: RowKey, _content: &RowContent) {}
        fn update_row(&mut self, _key: RowKey, _content: &RowContent) {}
        fn render_scoreboard(&mut self, _lines: &[ScoreLine]) {}
    }

    fn session(game: GameKind) -> (RoomSession, Texts) {
        let texts = Texts::default();
        let params = SessionParams {
            room_code: "XK42".into(),
            game,
            self_id: 7,
            autosave_delay: std::time::Duration::from_secs(2),
            clock: Arc::new(FixedClock(1_700_000_000)),
        };
        (
            RoomSession::new(params, Box::new(texts.clone()), Box::new(NoAudio)),
            texts,
        )
    }

    fn ticket(actions: &[Action]) -> FetchTicket {
        actions
            .iter()
            .find_map(|a| match a {
                Action::FetchState(t) => Some(*t),
                _ => None,
            })
            .expect("fetch action")
    }

    fn word_state(round: u32, phase: &str) -> String {
        format!(
            r#"{{"phase":"{phase}","round":{round},"totalRounds":3,"letter":"C",
                "categories":[{{"ID":1,"Name":"Animal"}}],
                "players":[{{"UserID":7,"Pseudo":"Ana"}},{{"UserID":8,"Pseudo":"Bo"}}]}}"#
        )
    }

    fn apply(session: &mut RoomSession, body: String) -> Vec<Action> {
        let actions = session.on_refresh(RefreshRequest::new(crate::channel::RefreshSource::Poll));
        session.on_state_fetched(ticket(&actions), Ok(body))
    }

    #[test]
    fn leaving_playing_forces_one_flush() {
        let (mut s, _) = session(GameKind::Word);
        apply(&mut s, word_state(1, "playing"));
        s.edit_answer(1, "Chat".into()).unwrap();

        let actions = apply(&mut s, word_state(1, "validation"));
        let flushes: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                Action::Flush { meta, body } => Some((meta, body)),
                _ => None,
            })
            .collect();
        assert_eq!(flushes.len(), 1);
        assert!(flushes[0].0.forced);
        let mut expected = AnswersPayload::new();
        expected.insert(1, "Chat".into());
        assert_eq!(flushes[0].1, &FlushBody::Answers(expected));
        assert!(s.next_autosave().is_none());
    }

    #[test]
    fn new_round_discards_edits_without_flush() {
        let (mut s, _) = session(GameKind::Word);
        apply(&mut s, word_state(1, "playing"));
        s.edit_answer(1, "Chat".into()).unwrap();

        let actions = apply(&mut s, word_state(2, "playing"));
        assert!(actions.iter().all(|a| !matches!(a, Action::Flush { .. })));
        assert_eq!(s.buffer().answer(1), Some(""));
        assert!(!s.buffer().has_unsaved_answers());
        assert!(s.drain_events().contains(&SyncEvent::RoundStarted { round: 2 }));
    }

    #[test]
    fn edits_outside_playing_are_rejected() {
        let (mut s, _) = session(GameKind::Word);
        apply(&mut s, word_state(1, "validation"));
        let err = s.edit_answer(1, "Chat".into()).unwrap_err();
        assert!(matches!(err, SyncError::InputNotAllowed { phase: Phase::Validation }));
        assert!(s.set_vote(VoteKey::new(7, 1), Verdict::Valid).is_err());
        assert!(s.set_vote(VoteKey::new(8, 1), Verdict::Valid).is_ok());
    }

    #[test]
    fn first_fetch_failure_is_visible() {
        let (mut s, texts) = session(GameKind::Word);
        let actions = s.start();
        s.on_state_fetched(
            ticket(&actions),
            Err(SyncError::Fetch {
                endpoint: "petitbac/state".into(),
                reason: "refused".into(),
            }),
        );
        assert_eq!(texts.last(TextSlot::Status).as_deref(), Some(CONNECTION_ERROR));
        assert!(matches!(
            s.drain_events().as_slice(),
            [SyncEvent::ConnectionError { .. }]
        ));
    }

    #[test]
    fn malformed_state_keeps_waiting_view() {
        let (mut s, texts) = session(GameKind::Music);
        let actions = s.start();
        s.on_state_fetched(ticket(&actions), Ok(r#"{"phase":"warmup"}"#.into()));
        assert!(s.snapshot().is_none());
        assert_eq!(
            texts.last(TextSlot::Status).as_deref(),
            Some(crate::render::WAITING_MUSIC)
        );
    }

    #[test]
    fn flush_ack_from_previous_round_is_ignored() {
        let (mut s, _) = session(GameKind::Word);
        apply(&mut s, word_state(1, "playing"));
        s.edit_answer(1, "Chat".into()).unwrap();
        let actions = s.submit_answers().unwrap();
        let Some(Action::Flush { meta, .. }) = actions.first() else {
            panic!("expected flush");
        };
        let meta = *meta;
        apply(&mut s, word_state(2, "playing"));
        s.edit_answer(1, "Bison".into()).unwrap();
        assert!(s.on_flushed(meta, Ok(())).is_empty());
        assert!(s.buffer().has_unsaved_answers());
    }

    #[test]
    fn remote_restart_resets_session() {
        let (mut s, _) = session(GameKind::Word);
        apply(&mut s, word_state(3, "finished"));
        s.drain_events();
        apply(&mut s, word_state(1, "playing"));
        let events = s.drain_events();
        assert!(events.contains(&SyncEvent::Restarted { remote: true }));
        assert_eq!(s.marker(), RoundPhase::new(1, Phase::Playing));
    }

    fn flush_bodies(actions: &[Action]) -> Vec<FlushBody> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Flush { body, .. } => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn replay_from_first_round_validation_reopens_answering() {
        let (mut s, _) = session(GameKind::Word);
        apply(&mut s, word_state(1, "playing"));
        s.edit_answer(1, "Chat".into()).unwrap();
        apply(&mut s, word_state(1, "validation"));
        s.drain_events();

        apply(&mut s, word_state(1, "idle"));
        assert!(s.drain_events().contains(&SyncEvent::Restarted { remote: true }));
        apply(&mut s, word_state(1, "playing"));

        assert_eq!(s.marker(), RoundPhase::new(1, Phase::Playing));
        assert_eq!(s.buffer().answer(1), Some(""));
        assert!(s.edit_answer(1, "Chèvre".into()).is_ok());
    }

    #[test]
    fn replay_during_first_round_drops_old_typing() {
        let (mut s, _) = session(GameKind::Word);
        apply(&mut s, word_state(1, "playing"));
        s.edit_answer(1, "Chat".into()).unwrap();

        let actions = apply(&mut s, word_state(1, "idle"));
        assert!(flush_bodies(&actions).is_empty());
        apply(&mut s, word_state(1, "playing"));

        assert_eq!(s.buffer().answer(1), Some(""));
        assert!(!s.buffer().has_unsaved_answers());
    }

    #[test]
    fn submitting_twice_sends_the_same_answers() {
        let (mut s, _) = session(GameKind::Word);
        apply(&mut s, word_state(1, "playing"));
        s.edit_answer(1, "Chat".into()).unwrap();

        let first = s.submit_answers().unwrap();
        let Some(Action::Flush { meta, .. }) = first.first() else {
            panic!("expected flush");
        };
        s.on_flushed(*meta, Ok(()));
        let second = s.submit_answers().unwrap();

        assert_eq!(flush_bodies(&first), flush_bodies(&second));
        assert!(!s.buffer().has_unsaved_answers());
    }

    #[test]
    fn forced_flush_keeps_typing_over_older_server_answer() {
        let (mut s, texts) = session(GameKind::Word);
        apply(&mut s, word_state(1, "playing"));
        s.edit_answer(1, "Chat".into()).unwrap();

        let validation = word_state(1, "validation")
            .replacen('{', r#"{"answersByUser":{"7":{"1":"Ch"}},"#, 1);
        let actions = apply(&mut s, validation);

        let mut typed = AnswersPayload::new();
        typed.insert(1, "Chat".into());
        assert_eq!(flush_bodies(&actions), vec![FlushBody::Answers(typed)]);
        assert_eq!(s.buffer().answer(1), Some("Chat"));
        assert_eq!(texts.last(TextSlot::Status).as_deref(), Some(crate::render::VOTING));
    }

    #[test]
    fn refresh_is_held_back_until_restart_completes() {
        let (mut s, _) = session(GameKind::Word);
        apply(&mut s, word_state(2, "playing"));
        s.restart();
        let polled = s.on_refresh(RefreshRequest::new(crate::channel::RefreshSource::Poll));
        assert!(polled.is_empty());
        assert!(s.snapshot().is_none());
        s.drain_events();

        let actions = s.on_restarted(Ok(()));
        s.on_state_fetched(ticket(&actions), Ok(word_state(1, "idle")));
        assert_eq!(s.marker(), RoundPhase::new(1, Phase::Idle));
        assert!(!s
            .drain_events()
            .contains(&SyncEvent::Restarted { remote: true }));
    }

    #[test]
    fn local_restart_voids_in_flight_fetch() {
        let (mut s, _) = session(GameKind::Word);
        apply(&mut s, word_state(2, "playing"));
        let in_flight = ticket(&s.on_refresh(RefreshRequest::new(
            crate::channel::RefreshSource::Poll,
        )));
        assert_eq!(s.restart(), vec![Action::Restart]);
        s.on_state_fetched(in_flight, Ok(word_state(2, "playing")));
        assert!(s.snapshot().is_none());
    }

    #[test]
    fn reveal_push_disables_guess_and_shows_answer() {
        let (mut s, texts) = session(GameKind::Music);
        apply(
            &mut s,
            r#"{"phase":"playing","round":1,"total_rounds":3,"ends_at_unix":1700000030,"preview_url":"p.mp3"}"#
                .into(),
        );
        let message = PushMessage::parse(
            r#"{"type":"round_reveal","payload":{"title":"X","artist":"Y"}}"#,
        )
        .unwrap();
        s.on_refresh(RefreshRequest {
            source: crate::channel::RefreshSource::Push,
            message,
        });
        assert_eq!(s.marker().phase, Phase::Reveal);
        assert_eq!(texts.last(TextSlot::Reveal).as_deref(), Some("Réponse : X — Y"));
        assert!(matches!(
            s.submit_guess(Some("Intro".into())),
            Err(SyncError::InputNotAllowed { .. })
        ));
    }
}
