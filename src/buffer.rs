//! Local edit buffer.
//!
//! Holds what the local player typed or toggled during the current round.
//! Every slot remembers the revision of its last unsaved edit, so a flush
//! that completes after further typing only clears what it actually sent.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, SyncError};
use crate::protocol::{AnswersPayload, CategoryId, GuessResponse, UserId, VotesPayload};
use crate::snapshot::RoomSnapshot;

/// A player's judgement of another player's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Verdict {
    #[default]
    Unset,
    Valid,
    Invalid,
}

impl Verdict {
    /// Next value of a two-state toggle. An unset verdict becomes valid.
    pub fn toggled(self) -> Self {
        match self {
            Self::Unset | Self::Invalid => Self::Valid,
            Self::Valid => Self::Invalid,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Unset => None,
            Self::Valid => Some(true),
            Self::Invalid => Some(false),
        }
    }

    pub fn from_server(value: Option<bool>) -> Self {
        match value {
            None => Self::Unset,
            Some(true) => Self::Valid,
            Some(false) => Self::Invalid,
        }
    }
}

/// Identifies one vote control: whose answer, in which category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoteKey {
    pub target: UserId,
    pub category: CategoryId,
}

impl VoteKey {
    pub fn new(target: UserId, category: CategoryId) -> Self {
        Self { target, category }
    }
}

impl fmt::Display for VoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.target, self.category)
    }
}

#[derive(Debug, Clone, Default)]
struct Slot<T> {
    value: T,
    /// Edited locally this round; server values no longer overwrite it.
    touched: bool,
    /// Revision of the last edit not yet acknowledged by a flush.
    pending: Option<u64>,
}

#[derive(Debug, Clone, Default)]
struct GuessSlot {
    text: String,
    in_flight: bool,
    locked: bool,
}

/// Per-round edit state of the local player.
#[derive(Debug, Clone, Default)]
pub struct LocalEditBuffer {
    round: u32,
    revision: u64,
    answers: BTreeMap<CategoryId, Slot<String>>,
    votes: BTreeMap<VoteKey, Slot<Verdict>>,
    guess: GuessSlot,
}

impl LocalEditBuffer {
    /// Empty buffer for `round`.
    pub fn new(round: u32) -> Self {
        Self {
            round,
            ..Self::default()
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    /// Latest edit revision.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Fill slots the player has not touched with the server's values.
    ///
    /// Covers the player's own answers and own verdicts. A verdict the server
    /// no longer reports is dropped unless it was set locally.
    pub fn seed(&mut self, snapshot: &RoomSnapshot, self_id: UserId) {
        for category in &snapshot.categories {
            let server = snapshot.answer_of(self_id, category.id).unwrap_or_default();
            let slot = self.answers.entry(category.id).or_default();
            if !slot.touched {
                slot.value = server.to_string();
            }
        }

        self.votes.retain(|_, slot| slot.touched);
        for (&category, by_target) in &snapshot.votes {
            for (&target, by_voter) in by_target {
                let Some(&verdict) = by_voter.get(&self_id) else {
                    continue;
                };
                self.votes
                    .entry(VoteKey::new(target, category))
                    .or_insert_with(|| Slot {
                        value: Verdict::from_server(Some(verdict)),
                        ..Slot::default()
                    });
            }
        }
        if snapshot.already_tried {
            self.guess.locked = true;
        }
    }

    // ── Answers ─────────────────────────────────────────────────────

    /// Record typed text for one category.
    pub fn edit_answer(&mut self, category: CategoryId, text: impl Into<String>) -> u64 {
        let rev = self.bump();
        let slot = self.answers.entry(category).or_default();
        slot.value = text.into();
        slot.touched = true;
        slot.pending = Some(rev);
        rev
    }

    pub fn answer(&self, category: CategoryId) -> Option<&str> {
        self.answers.get(&category).map(|s| s.value.as_str())
    }

    /// Whether the answer for `category` has an unsaved edit.
    pub fn answer_pending(&self, category: CategoryId) -> bool {
        self.answers
            .get(&category)
            .is_some_and(|s| s.pending.is_some())
    }

    pub fn has_unsaved_answers(&self) -> bool {
        self.answers.values().any(|s| s.pending.is_some())
    }

    /// Body of `POST answers`: every known category.
    pub fn answers_payload(&self) -> AnswersPayload {
        self.answers
            .iter()
            .map(|(&id, slot)| (id, slot.value.clone()))
            .collect()
    }

    /// Acknowledge a flush that carried edits up to `revision`.
    pub fn mark_answers_flushed(&mut self, revision: u64) {
        for slot in self.answers.values_mut() {
            clear_if_sent(&mut slot.pending, revision);
        }
    }

    // ── Votes ───────────────────────────────────────────────────────

    pub fn set_vote(&mut self, key: VoteKey, verdict: Verdict) -> u64 {
        let rev = self.bump();
        let slot = self.votes.entry(key).or_default();
        slot.value = verdict;
        slot.touched = true;
        slot.pending = Some(rev);
        rev
    }

    /// Flip a verdict, starting from `shown` when the buffer holds none.
    pub fn toggle_vote(&mut self, key: VoteKey, shown: Verdict) -> Verdict {
        let current = self.votes.get(&key).map_or(shown, |s| s.value);
        let next = current.toggled();
        self.set_vote(key, next);
        next
    }

    /// Verdict the player set locally or already had on the server.
    pub fn vote(&self, key: VoteKey) -> Option<Verdict> {
        self.votes.get(&key).map(|s| s.value)
    }

    pub fn vote_pending(&self, key: VoteKey) -> bool {
        self.votes.get(&key).is_some_and(|s| s.pending.is_some())
    }

    pub fn has_unsaved_votes(&self) -> bool {
        self.votes.values().any(|s| s.pending.is_some())
    }

    /// Body of `POST votes`: every verdict the player set this round.
    pub fn votes_payload(&self) -> VotesPayload {
        let mut payload = VotesPayload::new();
        for (key, slot) in self.votes.iter().filter(|(_, s)| s.touched) {
            if let Some(value) = slot.value.as_bool() {
                payload
                    .entry(key.category)
                    .or_default()
                    .insert(key.target, value);
            }
        }
        payload
    }

    pub fn mark_votes_flushed(&mut self, revision: u64) {
        for slot in self.votes.values_mut() {
            clear_if_sent(&mut slot.pending, revision);
        }
    }

    // ── Guess ───────────────────────────────────────────────────────

    /// Update the guess text.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::GuessLocked`] once the round's attempt is spent.
    pub fn set_guess_text(&mut self, text: impl Into<String>) -> Result<()> {
        if self.guess.locked {
            return Err(SyncError::GuessLocked);
        }
        self.guess.text = text.into();
        Ok(())
    }

    pub fn guess_text(&self) -> &str {
        &self.guess.text
    }

    pub fn guess_locked(&self) -> bool {
        self.guess.locked
    }

    /// Claim the round's single guess attempt.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::GuessLocked`] when the attempt is spent or
    /// already on its way.
    pub fn begin_guess(&mut self) -> Result<String> {
        if self.guess.locked || self.guess.in_flight {
            return Err(SyncError::GuessLocked);
        }
        self.guess.in_flight = true;
        Ok(self.guess.text.trim().to_string())
    }

    /// Apply the server's answer to the attempt.
    pub fn resolve_guess(&mut self, response: &GuessResponse) {
        self.guess.in_flight = false;
        if response.closes_attempt() {
            self.guess.locked = true;
        }
    }

    /// The attempt never reached the server; allow another one.
    pub fn release_guess(&mut self) {
        self.guess.in_flight = false;
    }

    fn bump(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

fn clear_if_sent(pending: &mut Option<u64>, revision: u64) {
    if pending.is_some_and(|rev| rev <= revision) {
        *pending = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::phase::Phase;
    use crate::protocol::Category;

    fn snapshot_with_answer(text: &str) -> RoomSnapshot {
        let mut s = RoomSnapshot {
            phase: Phase::Playing,
            round: 1,
            categories: vec![
                Category {
                    id: 1,
                    display_name: "Animal".into(),
                },
                Category {
                    id: 2,
                    display_name: "Pays".into(),
                },
            ],
            ..RoomSnapshot::default()
        };
        s.answers_by_user.entry(7).or_default().insert(1, text.into());
        s
    }

    #[test]
    fn last_edit_wins() {
        let mut buffer = LocalEditBuffer::new(1);
        buffer.edit_answer(1, "Ch");
        buffer.edit_answer(1, "Chat");
        assert_eq!(buffer.answers_payload().get(&1).map(String::as_str), Some("Chat"));
    }

    #[test]
    fn seed_fills_only_untouched_slots() {
        let mut buffer = LocalEditBuffer::new(1);
        buffer.edit_answer(2, "Pérou");
        buffer.seed(&snapshot_with_answer("Chameau"), 7);
        assert_eq!(buffer.answer(1), Some("Chameau"));
        assert_eq!(buffer.answer(2), Some("Pérou"));

        buffer.edit_answer(1, "Chat");
        buffer.seed(&snapshot_with_answer("Chameau"), 7);
        assert_eq!(buffer.answer(1), Some("Chat"));
    }

    #[test]
    fn late_flush_ack_keeps_newer_edits_pending() {
        let mut buffer = LocalEditBuffer::new(1);
        let sent = buffer.edit_answer(1, "Ch");
        buffer.edit_answer(2, "Pérou");
        buffer.mark_answers_flushed(sent);
        assert!(!buffer.answer_pending(1));
        assert!(buffer.answer_pending(2));
        buffer.mark_answers_flushed(buffer.revision());
        assert!(!buffer.has_unsaved_answers());
    }

    #[test]
    fn toggling_twice_keeps_final_value() {
        let mut buffer = LocalEditBuffer::new(1);
        let key = VoteKey::new(8, 1);
        assert_eq!(buffer.toggle_vote(key, Verdict::Unset), Verdict::Valid);
        assert_eq!(buffer.toggle_vote(key, Verdict::Unset), Verdict::Invalid);
        let payload = buffer.votes_payload();
        assert_eq!(payload.get(&1).and_then(|t| t.get(&8)), Some(&false));
        assert_eq!(payload.len(), 1);
    }

    #[test]
    fn toggle_starts_from_shown_server_verdict() {
        let mut buffer = LocalEditBuffer::new(1);
        let key = VoteKey::new(8, 2);
        assert_eq!(buffer.toggle_vote(key, Verdict::Valid), Verdict::Invalid);
    }

    #[test]
    fn seed_picks_up_own_server_verdicts() {
        let mut snapshot = snapshot_with_answer("Chameau");
        let mut by_voter = BTreeMap::new();
        by_voter.insert(7, true);
        by_voter.insert(9, false);
        snapshot.votes.entry(1).or_default().insert(8, by_voter);
        let mut other = BTreeMap::new();
        other.insert(9, false);
        snapshot.votes.entry(2).or_default().insert(8, other);

        let mut buffer = LocalEditBuffer::new(1);
        buffer.seed(&snapshot, 7);
        assert_eq!(buffer.vote(VoteKey::new(8, 1)), Some(Verdict::Valid));
        assert_eq!(buffer.vote(VoteKey::new(8, 2)), None);
        assert!(!buffer.has_unsaved_votes());
        assert!(buffer.votes_payload().is_empty());

        // Toggling starts from the seeded verdict, not from what was shown.
        assert_eq!(
            buffer.toggle_vote(VoteKey::new(8, 1), Verdict::Unset),
            Verdict::Invalid
        );
        buffer.seed(&snapshot, 7);
        assert_eq!(buffer.vote(VoteKey::new(8, 1)), Some(Verdict::Invalid));
    }

    #[test]
    fn unset_votes_are_not_sent() {
        let mut buffer = LocalEditBuffer::new(1);
        buffer.set_vote(VoteKey::new(8, 1), Verdict::Unset);
        assert!(buffer.votes_payload().is_empty());
        assert_eq!(VoteKey::new(8, 1).to_string(), "8::1");
    }

    #[test]
    fn guess_is_single_attempt() {
        let mut buffer = LocalEditBuffer::new(1);
        buffer.set_guess_text("  Intro ").unwrap();
        assert_eq!(buffer.begin_guess().unwrap(), "Intro");
        assert!(matches!(buffer.begin_guess(), Err(SyncError::GuessLocked)));
        buffer.resolve_guess(&GuessResponse {
            locked: true,
            ..GuessResponse::default()
        });
        assert!(buffer.guess_locked());
        assert!(buffer.set_guess_text("again").is_err());
    }

    #[test]
    fn failed_guess_can_be_retried() {
        let mut buffer = LocalEditBuffer::new(1);
        buffer.begin_guess().unwrap();
        buffer.release_guess();
        assert!(buffer.begin_guess().is_ok());
    }

    #[test]
    fn already_tried_snapshot_locks_guess() {
        let mut buffer = LocalEditBuffer::new(1);
        let snapshot = RoomSnapshot {
            already_tried: true,
            ..snapshot_with_answer("")
        };
        buffer.seed(&snapshot, 7);
        assert!(buffer.guess_locked());
    }
}
