//! # Room Sync Client
//!
//! Client-side live state synchronization for party-game rooms: the word
//! game (one word per category and letter, then peer voting) and the music
//! game (one guess per preview).
//!
//! The engine keeps a room view consistent with the server while the player
//! types. It combines push notifications with a fallback poll, discards
//! stale responses, debounces edits into autosaves and reconciles the view
//! without clobbering what the player is typing.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Connector`] and [`PushTransport`] for any push backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides [`WebSocketConnector`]
//! - **HTTP built-in**: the default `http-api` feature provides [`HttpRoomApi`]
//! - **Event-driven**: receive typed [`SyncEvent`]s via a channel
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use room_sync_client::{
//!     GameKind, HttpRoomApi, NoAudio, RoomSyncClient, SyncConfig, SyncEvent, WebSocketConnector,
//! };
//!
//! let api = HttpRoomApi::new("https://jeux.example", "XK42", GameKind::Word)?;
//! let connector = WebSocketConnector::new("wss://jeux.example");
//! let config = SyncConfig::new("XK42", GameKind::Word, 7);
//! let (client, mut events) = RoomSyncClient::start(api, connector, my_view, NoAudio, config);
//!
//! client.edit_answer(1, "Chat")?;
//! while let Some(event) = events.recv().await {
//!     if event == SyncEvent::Stopped {
//!         break;
//!     }
//! }
//! ```

pub mod api;
pub mod audio;
pub mod autosave;
pub mod buffer;
pub mod channel;
pub mod client;
pub mod countdown;
pub mod error;
pub mod error_kind;
pub mod event;
pub mod phase;
pub mod protocol;
pub mod render;
pub mod session;
pub mod snapshot;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use api::RoomApi;
pub use audio::{AudioSink, NoAudio};
pub use autosave::FlushTarget;
pub use buffer::{Verdict, VoteKey};
pub use client::{RoomSyncClient, SyncConfig};
pub use countdown::{Clock, SystemClock};
pub use error::{Result, SyncError};
pub use error_kind::ErrorKind;
pub use event::SyncEvent;
pub use phase::{GameKind, Phase, ViewMode};
pub use protocol::{CategoryId, GuessResponse, PlayerInfo, PushMessage, UserId};
pub use render::{InputKind, RowContent, RowKey, ScoreLine, TextSlot, View};
pub use snapshot::RoomSnapshot;
pub use transport::{Connector, PushTransport};

#[cfg(feature = "http-api")]
pub use api::HttpRoomApi;

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
