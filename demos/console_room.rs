//! # Console Room Example
//!
//! Joins a live room over WebSocket + HTTP and renders it as log lines.
//!
//! 1. Read the room from `ROOM_CODE`, `ROOM_GAME` and `ROOM_USER_ID`
//! 2. Start the sync engine against `ROOM_SERVER`
//! 3. Type commands on stdin while the room plays
//! 4. Shut down gracefully on Ctrl+C or end of input
//!
//! ## Running
//!
//! ```sh
//! ROOM_SERVER=https://jeux.example ROOM_CODE=XK42 ROOM_GAME=word ROOM_USER_ID=7 \
//!     cargo run --example console_room
//! ```
//!
//! Commands: `a <category> <text>`, `v <player> <category>`, `g <guess>`,
//! `send`, `restart`, `quit`.

use room_sync_client::{
    AudioSink, HttpRoomApi, InputKind, RoomSyncClient, RowContent, RowKey, ScoreLine, SyncConfig,
    SyncEvent, TextSlot, View, ViewMode, WebSocketConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Default server when `ROOM_SERVER` is not set.
const DEFAULT_SERVER: &str = "http://localhost:8080";

/// View printing every change it is asked to make.
struct ConsoleView;

impl View for ConsoleView {
    fn show_mode(&mut self, mode: ViewMode) {
        tracing::info!("── {mode:?} ──");
    }

    fn set_text(&mut self, slot: TextSlot, text: &str) {
        if !text.is_empty() {
            tracing::info!("{slot:?}: {text}");
        }
    }

    fn set_input_enabled(&mut self, input: InputKind, enabled: bool) {
        tracing::debug!("{input:?} input enabled={enabled}");
    }

    fn clear_rows(&mut self) {
        tracing::debug!("rows cleared");
    }

    fn mount_row(&mut self, key: RowKey, content: &RowContent) {
        tracing::info!("+ {key:?} {content:?}");
    }

    fn update_row(&mut self, key: RowKey, content: &RowContent) {
        tracing::debug!("~ {key:?} {content:?}");
    }

    fn render_scoreboard(&mut self, lines: &[ScoreLine]) {
        for line in lines {
            let me = if line.is_me { " (toi)" } else { "" };
            tracing::info!("{}{me}: {} pts", line.name, line.score);
        }
    }
}

/// Audio sink that only reports what it would play.
struct LoggedAudio;

impl AudioSink for LoggedAudio {
    fn load_and_play(&mut self, src: &str) {
        tracing::info!("♪ playing {src}");
    }

    fn restart(&mut self) {
        tracing::info!("♪ looping preview");
    }

    fn pause(&mut self) {
        tracing::info!("♪ paused");
    }
}

/// Apply one stdin command. Returns `false` to quit.
fn handle_line(client: &RoomSyncClient, line: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let mut parts = line.trim().splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("a"), Some(category), text) => {
            client.edit_answer(category.parse()?, text.unwrap_or_default())?;
        }
        (Some("v"), Some(player), Some(category)) => {
            client.toggle_vote(player.parse()?, category.parse()?)?;
        }
        (Some("g"), Some(first), rest) => {
            let guess = match rest {
                Some(rest) => format!("{first} {rest}"),
                None => first.to_string(),
            };
            client.submit_guess(Some(guess))?;
        }
        (Some("send"), None, None) => {
            client.submit_answers()?;
        }
        (Some("restart"), None, None) => client.restart()?,
        (Some("quit"), None, None) => return Ok(false),
        (Some(""), None, None) => {}
        _ => tracing::warn!("unknown command: {line}"),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let server = std::env::var("ROOM_SERVER").unwrap_or_else(|_| DEFAULT_SERVER.to_string());
    let config = SyncConfig::from_env()?;
    let ws_base = server
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    tracing::info!("Joining room {} on {server}", config.room_code);

    let api = HttpRoomApi::new(&server, &config.room_code, config.game)?;
    let connector = WebSocketConnector::new(ws_base);
    let (mut client, mut events) =
        RoomSyncClient::start(api, connector, ConsoleView, LoggedAudio, config);

    // ── Event loop ──────────────────────────────────────────────────
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(SyncEvent::Stopped) | None => break,
                    Some(SyncEvent::ConnectionError { reason }) => {
                        tracing::error!("cannot reach the room: {reason}");
                    }
                    Some(SyncEvent::Error { kind, message }) => {
                        tracing::warn!("[{kind:?}] {message}");
                    }
                    Some(other) => tracing::debug!("event: {other:?}"),
                }
            }

            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                match handle_line(&client, &line) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => tracing::warn!("{e}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────
    client.shutdown().await;
    tracing::info!("Client shut down. Goodbye!");
    Ok(())
}
