//! Wire types for the room server: push envelopes and HTTP bodies.
//!
//! The server has emitted two naming styles over time (`totalRounds` /
//! `total_rounds`, `UserID` / `userID`, game-prefixed push types). Every type
//! here serializes to the canonical camelCase form and accepts the older
//! spellings as aliases.
//!
//! Push payloads are validated here, at the transport boundary: a recognized
//! `type` whose payload is missing required fields is rejected before the
//! session ever sees it.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, SyncError};

// ── Type aliases ────────────────────────────────────────────────────

/// Server-assigned player identifier.
pub type UserId = i64;

/// Server-assigned category identifier.
pub type CategoryId = i64;

/// Body of `POST answers`: category → typed text.
pub type AnswersPayload = BTreeMap<CategoryId, String>;

/// Body of `POST votes`: category → target player → verdict.
pub type VotesPayload = BTreeMap<CategoryId, BTreeMap<UserId, bool>>;

/// Answers of every visible player: player → category → text.
pub type AnswersByUser = BTreeMap<UserId, BTreeMap<CategoryId, String>>;

/// Recorded verdicts: category → target player → voter → verdict.
pub type VotesByCategory = BTreeMap<CategoryId, BTreeMap<UserId, BTreeMap<UserId, bool>>>;

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Percent-encode a room code for use as a single URL path segment.
pub fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

// ── Snapshot pieces ─────────────────────────────────────────────────

/// A word-round category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(alias = "ID")]
    pub id: CategoryId,
    #[serde(rename = "displayName", alias = "Name", alias = "name")]
    pub display_name: String,
}

/// A player as listed by the server, in server order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    #[serde(rename = "userID", alias = "UserID", alias = "user_id", alias = "userId")]
    pub user_id: UserId,
    #[serde(
        rename = "displayName",
        alias = "Pseudo",
        alias = "pseudo",
        default
    )]
    pub display_name: String,
    #[serde(alias = "Score", default)]
    pub score: i64,
}

/// One line of the final score list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    #[serde(rename = "userID", alias = "UserID", alias = "user_id", alias = "userId")]
    pub user_id: UserId,
    pub score: i64,
}

/// Final scores: either an ordered list or a userID → score map.
///
/// Map keys stay strings here: untagged enums buffer their input and lose
/// serde_json's integer-key coercion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoresWire {
    List(Vec<ScoreEntry>),
    ByUser(BTreeMap<String, i64>),
}

/// `GET state` response body, before validation.
///
/// Every field is optional on the wire; [`RoomSnapshot`](crate::RoomSnapshot)
/// enforces the required set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotWire {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub round: u32,
    #[serde(rename = "totalRounds", alias = "total_rounds", default)]
    pub total_rounds: u32,
    #[serde(rename = "endsAt", alias = "ends_at_unix", alias = "endsAtUnix", default)]
    pub ends_at: Option<i64>,
    #[serde(default)]
    pub letter: Option<String>,
    #[serde(rename = "previewReference", alias = "preview_url", default)]
    pub preview_reference: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<Category>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub players: Vec<PlayerInfo>,
    #[serde(
        rename = "answersByUser",
        alias = "answers",
        default,
        deserialize_with = "null_as_default"
    )]
    pub answers_by_user: AnswersByUser,
    #[serde(
        rename = "votesByCategoryThenTarget",
        alias = "votes",
        default,
        deserialize_with = "null_as_default"
    )]
    pub votes: VotesByCategory,
    #[serde(default)]
    pub scores: Option<ScoresWire>,
    #[serde(rename = "alreadyTried", alias = "already_tried", default)]
    pub already_tried: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
}

// ── Guess ───────────────────────────────────────────────────────────

/// Body of `POST guess`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessRequest {
    pub guess: String,
}

/// Response of `POST guess`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessResponse {
    #[serde(default)]
    pub correct: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(rename = "alreadyTried", alias = "already_tried", default)]
    pub already_tried: bool,
    #[serde(rename = "pointsAwarded", alias = "points_awarded", default)]
    pub points_awarded: i64,
}

impl GuessResponse {
    /// Whether this response closes the round's single guess attempt.
    pub fn closes_attempt(&self) -> bool {
        self.locked || self.already_tried
    }
}

// ── Push channel ────────────────────────────────────────────────────

/// Raw push frame: `{type, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Payload of `round_started`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundStartedPayload {
    pub round: u32,
    #[serde(rename = "totalRounds", alias = "total_rounds")]
    pub total_rounds: u32,
    #[serde(rename = "endsAtUnix", alias = "ends_at_unix")]
    pub ends_at_unix: i64,
    #[serde(
        rename = "previewReference",
        alias = "preview_url",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub preview_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter: Option<String>,
}

/// Payload of `round_reveal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealPayload {
    pub title: String,
    pub artist: String,
}

/// A validated push notification.
///
/// The channel only looks at these to pre-apply short-lived values ahead of
/// the refresh they always trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// Something in the room changed; refresh.
    RoomUpdated,
    /// A round began.
    RoundStarted(RoundStartedPayload),
    /// The answer of the current music round is disclosed.
    RoundReveal(RevealPayload),
    /// The game is over.
    Finished,
}

impl PushMessage {
    /// Parse and validate a push frame.
    ///
    /// Returns `Ok(None)` for well-formed frames of an unrecognized type.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Serialization`] when the frame is not a JSON
    /// envelope, and [`SyncError::Validation`] when a recognized type lacks
    /// required payload fields.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let envelope: PushEnvelope = serde_json::from_str(text)?;
        Self::from_envelope(envelope)
    }

    /// Validate an already-decoded envelope.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] when a recognized type lacks
    /// required payload fields.
    pub fn from_envelope(envelope: PushEnvelope) -> Result<Option<Self>> {
        let kind = envelope.kind.as_str();
        let message = match kind {
            "room_updated" => Self::RoomUpdated,
            "round_started" | "petitbac_round_started" | "blindtest_round_started" => {
                Self::RoundStarted(decode_payload(kind, envelope.payload)?)
            }
            "round_reveal" | "blindtest_round_reveal" => {
                Self::RoundReveal(decode_payload(kind, envelope.payload)?)
            }
            "finished" | "petitbac_finished" | "blindtest_finished" => Self::Finished,
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    /// Canonical `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoomUpdated => "room_updated",
            Self::RoundStarted(_) => "round_started",
            Self::RoundReveal(_) => "round_reveal",
            Self::Finished => "finished",
        }
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(kind: &str, payload: serde_json::Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| SyncError::Validation(format!("`{kind}` payload: {e}")))
}
