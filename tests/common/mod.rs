#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the room sync integration tests.
//!
//! Provides a channel-fed push connector, a recording room API, a recording
//! view and audio sink, and helpers for building `GET state` bodies.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use room_sync_client::protocol::{AnswersPayload, VotesPayload};
use room_sync_client::{
    Clock, Connector, GuessResponse, InputKind, PlayerInfo, PushTransport, RowContent, RowKey,
    ScoreLine, SyncError, SyncEvent, TextSlot, View, ViewMode,
};
use room_sync_client::audio::AudioSink;
use tokio::sync::{mpsc, Mutex};

// ── Push channel ────────────────────────────────────────────────────

/// What the scripted server pushes next.
#[derive(Debug)]
pub enum PushFrame {
    Text(String),
    /// End the current connection cleanly.
    Close,
}

type SharedFrames = Arc<Mutex<mpsc::UnboundedReceiver<PushFrame>>>;

/// Connector whose transports all read from one test-controlled queue.
pub struct MockConnector {
    frames: SharedFrames,
    connects: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
}

/// Test side of [`MockConnector`].
#[derive(Clone)]
pub struct PushHandle {
    tx: mpsc::UnboundedSender<PushFrame>,
    connects: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
}

impl MockConnector {
    pub fn new() -> (Self, PushHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connects = Arc::new(AtomicUsize::new(0));
        let refuse = Arc::new(AtomicBool::new(false));
        let connector = Self {
            frames: Arc::new(Mutex::new(rx)),
            connects: Arc::clone(&connects),
            refuse: Arc::clone(&refuse),
        };
        (
            connector,
            PushHandle {
                tx,
                connects,
                refuse,
            },
        )
    }
}

impl PushHandle {
    pub fn push(&self, json: &str) {
        self.tx.send(PushFrame::Text(json.to_string())).unwrap();
    }

    pub fn close(&self) {
        self.tx.send(PushFrame::Close).unwrap();
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

pub struct MockPushTransport {
    frames: SharedFrames,
    closed: bool,
}

#[async_trait]
impl PushTransport for MockPushTransport {
    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        if self.closed {
            return None;
        }
        let mut frames = self.frames.lock().await;
        match frames.recv().await {
            Some(PushFrame::Text(text)) => Some(Ok(text)),
            Some(PushFrame::Close) | None => {
                self.closed = true;
                None
            }
        }
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        self.closed = true;
        Ok(())
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockPushTransport;

    async fn connect(&self, room_code: &str) -> Result<MockPushTransport, SyncError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SyncError::Connect {
                url: format!("mock://{room_code}"),
                reason: "refused".into(),
            });
        }
        Ok(MockPushTransport {
            frames: Arc::clone(&self.frames),
            closed: false,
        })
    }
}

// ── Room API ────────────────────────────────────────────────────────

/// One request the engine made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    FetchState,
    PostAnswers(AnswersPayload),
    PostVotes(VotesPayload),
    PostGuess(String),
    Restart,
    FetchPlayers,
}

#[derive(Default)]
struct ApiInner {
    state: StdMutex<String>,
    fail_state: AtomicBool,
    guess_response: StdMutex<GuessResponse>,
    players: StdMutex<Vec<PlayerInfo>>,
    saved_answers: StdMutex<AnswersPayload>,
    calls: StdMutex<Vec<ApiCall>>,
}

/// Room API serving a replaceable state body and recording every call.
#[derive(Clone, Default)]
pub struct MockRoomApi {
    inner: Arc<ApiInner>,
}

impl MockRoomApi {
    pub fn with_state(body: String) -> Self {
        let api = Self::default();
        api.set_state(body);
        api
    }

    pub fn set_state(&self, body: String) {
        *self.inner.state.lock().unwrap() = body;
    }

    pub fn fail_state(&self, fail: bool) {
        self.inner.fail_state.store(fail, Ordering::SeqCst);
    }

    pub fn set_guess_response(&self, response: GuessResponse) {
        *self.inner.guess_response.lock().unwrap() = response;
    }

    pub fn set_players(&self, players: Vec<PlayerInfo>) {
        *self.inner.players.lock().unwrap() = players;
    }

    /// Answers as the server stores them: later posts overwrite per category.
    pub fn saved_answers(&self) -> AnswersPayload {
        self.inner.saved_answers.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: ApiCall) {
        self.inner.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl room_sync_client::RoomApi for MockRoomApi {
    async fn fetch_state(&self) -> room_sync_client::Result<String> {
        self.record(ApiCall::FetchState);
        if self.inner.fail_state.load(Ordering::SeqCst) {
            return Err(SyncError::Fetch {
                endpoint: "state".into(),
                reason: "connection refused".into(),
            });
        }
        Ok(self.inner.state.lock().unwrap().clone())
    }

    async fn post_answers(&self, answers: &AnswersPayload) -> room_sync_client::Result<()> {
        self.record(ApiCall::PostAnswers(answers.clone()));
        self.inner
            .saved_answers
            .lock()
            .unwrap()
            .extend(answers.iter().map(|(k, v)| (*k, v.clone())));
        Ok(())
    }

    async fn post_votes(&self, votes: &VotesPayload) -> room_sync_client::Result<()> {
        self.record(ApiCall::PostVotes(votes.clone()));
        Ok(())
    }

    async fn post_guess(&self, guess: &str) -> room_sync_client::Result<GuessResponse> {
        self.record(ApiCall::PostGuess(guess.to_string()));
        Ok(self.inner.guess_response.lock().unwrap().clone())
    }

    async fn restart(&self) -> room_sync_client::Result<()> {
        self.record(ApiCall::Restart);
        Ok(())
    }

    async fn fetch_players(&self) -> room_sync_client::Result<Vec<PlayerInfo>> {
        self.record(ApiCall::FetchPlayers);
        Ok(self.inner.players.lock().unwrap().clone())
    }
}

// ── View and audio ──────────────────────────────────────────────────

/// Latest state of every view surface.
#[derive(Debug, Default)]
pub struct ViewState {
    pub mode: Option<ViewMode>,
    pub texts: BTreeMap<TextSlot, String>,
    pub enabled: BTreeMap<InputKind, bool>,
    pub rows: BTreeMap<RowKey, RowContent>,
    pub mounts: usize,
    pub clears: usize,
    pub scoreboard: Vec<ScoreLine>,
}

#[derive(Clone, Default)]
pub struct RecordingView(Arc<StdMutex<ViewState>>);

impl RecordingView {
    pub fn text(&self, slot: TextSlot) -> String {
        self.0
            .lock()
            .unwrap()
            .texts
            .get(&slot)
            .cloned()
            .unwrap_or_default()
    }

    pub fn enabled(&self, input: InputKind) -> bool {
        self.0
            .lock()
            .unwrap()
            .enabled
            .get(&input)
            .copied()
            .unwrap_or(false)
    }

    pub fn mode(&self) -> Option<ViewMode> {
        self.0.lock().unwrap().mode
    }

    pub fn row(&self, key: RowKey) -> Option<RowContent> {
        self.0.lock().unwrap().rows.get(&key).cloned()
    }

    pub fn mounts(&self) -> usize {
        self.0.lock().unwrap().mounts
    }

    pub fn scoreboard(&self) -> Vec<ScoreLine> {
        self.0.lock().unwrap().scoreboard.clone()
    }
}

impl View for RecordingView {
    fn show_mode(&mut self, mode: ViewMode) {
        self.0.lock().unwrap().mode = Some(mode);
    }

    fn set_text(&mut self, slot: TextSlot, text: &str) {
        self.0.lock().unwrap().texts.insert(slot, text.to_string());
    }

    fn set_input_enabled(&mut self, input: InputKind, enabled: bool) {
        self.0.lock().unwrap().enabled.insert(input, enabled);
    }

    fn clear_rows(&mut self) {
        let mut state = self.0.lock().unwrap();
        state.rows.clear();
        state.clears += 1;
    }

    fn mount_row(&mut self, key: RowKey, content: &RowContent) {
        let mut state = self.0.lock().unwrap();
        state.rows.insert(key, content.clone());
        state.mounts += 1;
    }

    fn update_row(&mut self, key: RowKey, content: &RowContent) {
        self.0.lock().unwrap().rows.insert(key, content.clone());
    }

    fn render_scoreboard(&mut self, lines: &[ScoreLine]) {
        self.0.lock().unwrap().scoreboard = lines.to_vec();
    }
}

/// Audio sink logging `play <src>`, `restart` and `pause`.
#[derive(Clone, Default)]
pub struct RecordingAudio(Arc<StdMutex<Vec<String>>>);

impl RecordingAudio {
    pub fn log(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl AudioSink for RecordingAudio {
    fn load_and_play(&mut self, src: &str) {
        self.0.lock().unwrap().push(format!("play {src}"));
    }

    fn restart(&mut self) {
        self.0.lock().unwrap().push("restart".into());
    }

    fn pause(&mut self) {
        self.0.lock().unwrap().push("pause".into());
    }
}

/// Wall clock the test moves by hand.
#[derive(Debug)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn at(unix: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(unix)))
    }

    pub fn set(&self, unix: i64) {
        self.0.store(unix, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub const NOW: i64 = 1_700_000_000;

// ── Events ──────────────────────────────────────────────────────────

/// Receive events until one matches, failing after 60 s of (virtual) time.
pub async fn wait_for(
    events: &mut mpsc::Receiver<SyncEvent>,
    pred: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
    let found = tokio::time::timeout(Duration::from_secs(60), async {
        while let Some(event) = events.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await;
    match found {
        Ok(Some(event)) => event,
        Ok(None) => panic!("event channel closed before the expected event"),
        Err(_) => panic!("timed out waiting for event"),
    }
}

// ── JSON fixtures ───────────────────────────────────────────────────

/// Word-game state for players 7 (Ana) and 8 (Bo) with one category.
pub fn word_state(round: u32, phase: &str) -> String {
    serde_json::json!({
        "phase": phase,
        "round": round,
        "totalRounds": 3,
        "letter": "C",
        "categories": [{"ID": 1, "Name": "Animal"}],
        "players": [
            {"UserID": 7, "Pseudo": "Ana", "Score": 0},
            {"UserID": 8, "Pseudo": "Bo", "Score": 0},
        ],
    })
    .to_string()
}

/// Word-game validation state where Bo answered `answer`.
pub fn word_validation_state(round: u32, answer: &str) -> String {
    let mut state: serde_json::Value = serde_json::from_str(&word_state(round, "validation")).unwrap();
    state["answersByUser"] = serde_json::json!({ "8": { "1": answer } });
    state.to_string()
}

/// Music-game state with a preview reference.
pub fn music_state(round: u32, phase: &str) -> String {
    serde_json::json!({
        "phase": phase,
        "round": round,
        "totalRounds": 3,
        "endsAt": NOW + 30,
        "previewReference": format!("https://cdn.example/preview-{round}.mp3"),
    })
    .to_string()
}

/// Music-game reveal state.
pub fn music_reveal_state(round: u32, title: &str, artist: &str) -> String {
    let mut state: serde_json::Value = serde_json::from_str(&music_state(round, "reveal")).unwrap();
    state["title"] = serde_json::json!(title);
    state["artist"] = serde_json::json!(artist);
    state.to_string()
}

pub fn room_updated_json() -> &'static str {
    r#"{"type":"room_updated"}"#
}

pub fn reveal_json(title: &str, artist: &str) -> String {
    serde_json::json!({
        "type": "round_reveal",
        "payload": { "title": title, "artist": artist },
    })
    .to_string()
}
