//! Authoritative room state and the store that guards it.
//!
//! A [`RoomSnapshot`] is replaced wholesale on every accepted refresh. The
//! [`SnapshotStore`] decides whether a response may replace it: responses
//! are numbered by [`FetchTicket`] at request time, and a response that was
//! overtaken by a newer one, or that would move the displayed round/phase
//! backwards, is discarded.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Result, SyncError};
use crate::phase::{Phase, RoundPhase};
use crate::protocol::{
    AnswersByUser, Category, CategoryId, PlayerInfo, RevealPayload, RoundStartedPayload,
    ScoreEntry, ScoresWire, SnapshotWire, UserId, VotesByCategory,
};

/// Phase-specific shared context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Prompt {
    #[default]
    None,
    /// Initial letter of a word round.
    Letter(String),
    /// Audio preview of a music round.
    Preview(String),
}

/// The disclosed answer of a music round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disclosure {
    pub title: String,
    pub artist: String,
}

/// Validated room state as seen by the local player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub phase: Phase,
    pub round: u32,
    pub total_rounds: u32,
    /// Epoch-seconds deadline of the current phase.
    pub ends_at: Option<i64>,
    pub prompt: Prompt,
    pub categories: Vec<Category>,
    /// Server order; never reordered.
    pub players: Vec<PlayerInfo>,
    pub answers_by_user: AnswersByUser,
    pub votes: VotesByCategory,
    /// Final scores in server order (empty until finished).
    pub scores: Vec<ScoreEntry>,
    /// The local player already spent this round's guess.
    pub already_tried: bool,
    pub disclosure: Option<Disclosure>,
}

impl RoomSnapshot {
    /// Parse and validate a `GET state` body.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] when the body is not JSON, names an
    /// unknown phase, or carries no round outside the idle phase.
    pub fn from_json(text: &str) -> Result<Self> {
        let wire: SnapshotWire =
            serde_json::from_str(text).map_err(|e| SyncError::Validation(e.to_string()))?;
        Self::try_from(wire)
    }

    pub fn marker(&self) -> RoundPhase {
        RoundPhase::new(self.round, self.phase)
    }

    /// Text a player submitted for a category, if visible.
    pub fn answer_of(&self, user: UserId, category: CategoryId) -> Option<&str> {
        self.answers_by_user
            .get(&user)
            .and_then(|answers| answers.get(&category))
            .map(String::as_str)
    }

    /// Verdict recorded by `voter` on `target`'s answer for `category`.
    pub fn verdict_of(&self, voter: UserId, target: UserId, category: CategoryId) -> Option<bool> {
        self.votes
            .get(&category)
            .and_then(|by_target| by_target.get(&target))
            .and_then(|by_voter| by_voter.get(&voter))
            .copied()
    }

    /// Score of a player: final score list first, then the player entry.
    pub fn score_of(&self, user: UserId) -> Option<i64> {
        self.scores
            .iter()
            .find(|s| s.user_id == user)
            .map(|s| s.score)
            .or_else(|| self.players.iter().find(|p| p.user_id == user).map(|p| p.score))
    }

    /// Short-term values announced by `round_started`.
    ///
    /// Returns `false` (and changes nothing) when the hint is older than
    /// what is shown.
    pub fn apply_round_started(&mut self, payload: &RoundStartedPayload) -> bool {
        let next = RoundPhase::new(payload.round, Phase::Playing);
        if self.marker().regresses_to(next) {
            return false;
        }
        if payload.round != self.round {
            self.answers_by_user.clear();
            self.votes.clear();
            self.scores.clear();
            self.already_tried = false;
            self.disclosure = None;
        }
        self.round = payload.round;
        self.total_rounds = payload.total_rounds;
        self.phase = Phase::Playing;
        self.ends_at = (payload.ends_at_unix > 0).then_some(payload.ends_at_unix);
        if let Some(preview) = payload.preview_reference.as_deref().filter(|p| !p.is_empty()) {
            self.prompt = Prompt::Preview(preview.to_string());
        } else if let Some(letter) = payload.letter.as_deref().filter(|l| !l.is_empty()) {
            self.prompt = Prompt::Letter(letter.to_string());
        }
        true
    }

    /// Disclosure announced by `round_reveal`.
    pub fn apply_reveal(&mut self, payload: &RevealPayload) -> bool {
        if self.phase.rank() > Phase::Reveal.rank() {
            return false;
        }
        self.phase = Phase::Reveal;
        self.ends_at = None;
        self.disclosure = Some(Disclosure {
            title: payload.title.clone(),
            artist: payload.artist.clone(),
        });
        true
    }

    /// End of game announced by `finished`.
    pub fn apply_finished(&mut self) -> bool {
        self.phase = Phase::Finished;
        self.ends_at = None;
        true
    }
}

impl TryFrom<SnapshotWire> for RoomSnapshot {
    type Error = SyncError;

    fn try_from(wire: SnapshotWire) -> Result<Self> {
        let phase = match wire.phase.as_deref() {
            Some(raw) => raw.parse::<Phase>()?,
            None => Phase::Idle,
        };
        if phase != Phase::Idle && wire.round == 0 {
            return Err(SyncError::Validation(format!(
                "round must be positive during {phase}"
            )));
        }

        let prompt = match (wire.preview_reference, wire.letter) {
            (Some(preview), _) if !preview.is_empty() => Prompt::Preview(preview),
            (_, Some(letter)) if !letter.is_empty() => Prompt::Letter(letter),
            _ => Prompt::None,
        };

        let scores = match wire.scores {
            Some(ScoresWire::List(list)) => list,
            Some(ScoresWire::ByUser(by_user)) => scores_in_player_order(&wire.players, by_user),
            None => Vec::new(),
        };

        let disclosure = match (wire.title, wire.artist) {
            (None, None) => None,
            (title, artist) if matches!(phase, Phase::Reveal | Phase::Finished) => Some(Disclosure {
                title: title.unwrap_or_default(),
                artist: artist.unwrap_or_default(),
            }),
            _ => None,
        };

        let ends_at = wire
            .ends_at
            .filter(|&t| t > 0 && phase != Phase::Finished && phase != Phase::Idle);

        Ok(Self {
            phase,
            round: wire.round,
            total_rounds: wire.total_rounds,
            ends_at,
            prompt,
            categories: wire.categories,
            players: wire.players,
            answers_by_user: wire.answers_by_user,
            votes: wire.votes,
            scores,
            already_tried: wire.already_tried,
            disclosure,
        })
    }
}

/// Turn a userID → score map into a list following the player order.
fn scores_in_player_order(players: &[PlayerInfo], by_user: BTreeMap<String, i64>) -> Vec<ScoreEntry> {
    let mut by_id: BTreeMap<UserId, i64> = by_user
        .into_iter()
        .filter_map(|(key, score)| key.trim().parse::<UserId>().ok().map(|id| (id, score)))
        .collect();
    let mut ordered: Vec<ScoreEntry> = players
        .iter()
        .filter_map(|p| {
            by_id
                .remove(&p.user_id)
                .map(|score| ScoreEntry { user_id: p.user_id, score })
        })
        .collect();
    ordered.extend(
        by_id
            .into_iter()
            .map(|(user_id, score)| ScoreEntry { user_id, score }),
    );
    ordered
}

// ── Store ───────────────────────────────────────────────────────────

/// Identifies one state request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    epoch: u64,
    seq: u64,
}

impl FetchTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// How an accepted snapshot relates to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// Same game, same or later round/phase.
    Applied,
    /// The server started the game over (another player hit replay).
    RemoteRestart,
}

/// Holds the last accepted snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    current: Option<RoomSnapshot>,
    /// Bumped by a local restart; older tickets are void.
    epoch: u64,
    next_seq: u64,
    applied_seq: u64,
    /// Tickets below this were issued before the last push pre-apply.
    advanced_at: u64,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self {
            current: None,
            epoch: 0,
            next_seq: 1,
            applied_seq: 0,
            advanced_at: 0,
        }
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&RoomSnapshot> {
        self.current.as_ref()
    }

    pub fn marker(&self) -> Option<RoundPhase> {
        self.current.as_ref().map(RoomSnapshot::marker)
    }

    /// Number a new state request.
    pub fn issue(&mut self) -> FetchTicket {
        let ticket = FetchTicket {
            epoch: self.epoch,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        ticket
    }

    /// Replace the current snapshot with a fetched one, unless superseded.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::StaleResponse`] when the response belongs to an
    /// earlier session, was overtaken by a newer response, or would move the
    /// displayed round/phase backwards.
    pub fn accept(&mut self, ticket: FetchTicket, snapshot: RoomSnapshot) -> Result<Accepted> {
        let incoming = snapshot.marker();
        let stale = || SyncError::StaleResponse {
            round: incoming.round,
            phase: incoming.phase,
        };

        if ticket.epoch != self.epoch || ticket.seq < self.applied_seq {
            return Err(stale());
        }

        let mut outcome = Accepted::Applied;
        if let Some(shown) = self.marker() {
            if shown.regresses_to(incoming) {
                let fresh = ticket.seq > self.applied_seq && ticket.seq >= self.advanced_at;
                if fresh && shown.restarted_by(incoming) {
                    outcome = Accepted::RemoteRestart;
                } else {
                    return Err(stale());
                }
            }
        }

        debug!(
            seq = ticket.seq,
            round = incoming.round,
            phase = %incoming.phase,
            "snapshot accepted"
        );
        self.applied_seq = ticket.seq;
        self.current = Some(snapshot);
        Ok(outcome)
    }

    /// Apply a push hint in place, ahead of the refresh it triggers.
    ///
    /// Returns whether the hint changed what is shown.
    pub fn pre_apply(&mut self, apply: impl FnOnce(&mut RoomSnapshot) -> bool) -> bool {
        let snapshot = self.current.get_or_insert_with(RoomSnapshot::default);
        let before = snapshot.marker();
        let changed = apply(snapshot);
        if changed && snapshot.marker() != before {
            self.advanced_at = self.next_seq;
        }
        changed
    }

    /// Drop everything and void outstanding tickets (local restart).
    pub fn reset(&mut self) {
        self.current = None;
        self.epoch += 1;
        self.applied_seq = 0;
        self.advanced_at = 0;
    }
}
