//! # Scripted Room Example
//!
//! Plays one word round against an in-process fake server. Shows how to
//! implement [`RoomApi`], [`Connector`] and [`PushTransport`] yourself:
//!
//! - **Testing**: drive your view without a real server
//! - **Custom backends**: adapt any I/O layer (SSE, long polling, QUIC)
//!
//! ## Running
//!
//! ```sh
//! cargo run --example scripted_room
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use room_sync_client::protocol::{AnswersPayload, VotesPayload};
use room_sync_client::{
    Connector, GameKind, GuessResponse, InputKind, NoAudio, PlayerInfo, PushTransport, RoomApi,
    RoomSyncClient, RowContent, RowKey, ScoreLine, SyncConfig, SyncError, SyncEvent, TextSlot,
    View, ViewMode,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A fake room server
// ─────────────────────────────────────────────────────────────────────

/// Serves whatever state the script last set and logs what it receives.
#[derive(Clone, Default)]
struct FakeServer {
    state: Arc<Mutex<String>>,
}

impl FakeServer {
    fn set(&self, state: serde_json::Value) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state.to_string();
        }
    }
}

fn server_down() -> SyncError {
    SyncError::Fetch {
        endpoint: "fake".into(),
        reason: "poisoned state".into(),
    }
}

#[async_trait]
impl RoomApi for FakeServer {
    async fn fetch_state(&self) -> room_sync_client::Result<String> {
        self.state.lock().map(|s| s.clone()).map_err(|_| server_down())
    }

    async fn post_answers(&self, answers: &AnswersPayload) -> room_sync_client::Result<()> {
        tracing::info!("server received answers: {answers:?}");
        Ok(())
    }

    async fn post_votes(&self, votes: &VotesPayload) -> room_sync_client::Result<()> {
        tracing::info!("server received votes: {votes:?}");
        Ok(())
    }

    async fn post_guess(&self, _guess: &str) -> room_sync_client::Result<GuessResponse> {
        Ok(GuessResponse::default())
    }

    async fn restart(&self) -> room_sync_client::Result<()> {
        Ok(())
    }

    async fn fetch_players(&self) -> room_sync_client::Result<Vec<PlayerInfo>> {
        Ok(Vec::new())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A channel-backed push transport
// ─────────────────────────────────────────────────────────────────────

/// Hands out the single notification stream on first connect.
struct ChannelConnector {
    rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

struct ChannelTransport {
    rx: Option<mpsc::UnboundedReceiver<String>>,
}

#[async_trait]
impl PushTransport for ChannelTransport {
    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await.map(Ok),
            // Reconnects after the script ends stay silent.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        self.rx = None;
        Ok(())
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    type Transport = ChannelTransport;

    async fn connect(&self, _room_code: &str) -> Result<ChannelTransport, SyncError> {
        let rx = self.rx.lock().ok().and_then(|mut slot| slot.take());
        Ok(ChannelTransport { rx })
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: A view that prints
// ─────────────────────────────────────────────────────────────────────

struct PrintView;

impl View for PrintView {
    fn show_mode(&mut self, mode: ViewMode) {
        tracing::info!("── {mode:?} ──");
    }

    fn set_text(&mut self, slot: TextSlot, text: &str) {
        if !text.is_empty() {
            tracing::info!("{slot:?}: {text}");
        }
    }

    fn set_input_enabled(&mut self, _input: InputKind, _enabled: bool) {}

    fn clear_rows(&mut self) {}

    fn mount_row(&mut self, key: RowKey, content: &RowContent) {
        tracing::info!("+ {key:?} {content:?}");
    }

    fn update_row(&mut self, _key: RowKey, _content: &RowContent) {}

    fn render_scoreboard(&mut self, lines: &[ScoreLine]) {
        for line in lines {
            tracing::info!("{}: {} pts", line.name, line.score);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 4: Play a round
// ─────────────────────────────────────────────────────────────────────

fn room(phase: &str, extra: serde_json::Value) -> serde_json::Value {
    let mut state = serde_json::json!({
        "phase": phase,
        "round": 1,
        "totalRounds": 1,
        "letter": "P",
        "categories": [{"id": 1, "displayName": "Animal"}, {"id": 2, "displayName": "Pays"}],
        "players": [{"userID": 1, "displayName": "Moi"}, {"userID": 2, "displayName": "Léa"}],
    });
    if let (Some(state), Some(extra)) = (state.as_object_mut(), extra.as_object()) {
        state.extend(extra.clone());
    }
    state
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let server = FakeServer::default();
    server.set(serde_json::json!({"phase": "idle"}));
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let connector = ChannelConnector {
        rx: Mutex::new(Some(push_rx)),
    };

    let config = SyncConfig::new("DEMO", GameKind::Word, 1)
        .with_autosave_delay(Duration::from_millis(300));
    let (mut client, mut events) =
        RoomSyncClient::start(server.clone(), connector, PrintView, NoAudio, config);
    let notify = || push_tx.send(r#"{"type":"room_updated"}"#.to_string());

    tokio::time::sleep(Duration::from_millis(100)).await;
    server.set(room("playing", serde_json::json!({})));
    notify()?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.edit_answer(1, "Panda")?;
    client.edit_answer(2, "Pérou")?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    server.set(room(
        "validation",
        serde_json::json!({"answersByUser": {"2": {"1": "Pingouin", "2": "Portugal"}}}),
    ));
    notify()?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.toggle_vote(2, 1)?;
    client.submit_votes()?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.set(room(
        "finished",
        serde_json::json!({"scores": [{"userID": 2, "score": 20}, {"userID": 1, "score": 10}]}),
    ));
    notify()?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.shutdown().await;
    let mut seen = 0usize;
    while let Some(event) = events.recv().await {
        seen += 1;
        if event == SyncEvent::Stopped {
            break;
        }
    }
    tracing::info!("Done, saw {seen} event(s).");
    Ok(())
}
