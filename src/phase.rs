//! Phase state machine.
//!
//! The client never infers a phase on its own: every [`Transition`] is
//! derived from two consecutive `(round, phase)` observations, the latest one
//! always coming from a snapshot or a validated push hint. The transition
//! tells the session whether the edit buffer must be discarded (new round) or
//! force-flushed (an input phase is being left).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Stage of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No round running; waiting for the host.
    #[default]
    Idle,
    /// Players type answers or guess the track.
    Playing,
    /// Word game: players judge each other's answers.
    Validation,
    /// Music game: the track is disclosed.
    Reveal,
    /// The game is over; scores are final.
    Finished,
}

impl Phase {
    /// Position in the one-directional order of a round.
    ///
    /// `Validation` and `Reveal` share a rank: each game only uses one of them.
    pub fn rank(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Playing => 1,
            Self::Validation | Self::Reveal => 2,
            Self::Finished => 3,
        }
    }

    /// Whether the countdown is meaningful in this phase.
    pub fn has_deadline(self) -> bool {
        matches!(self, Self::Playing | Self::Validation | Self::Reveal)
    }

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Playing => "playing",
            Self::Validation => "validation",
            Self::Reveal => "reveal",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" | "" => Ok(Self::Idle),
            "playing" => Ok(Self::Playing),
            "validation" => Ok(Self::Validation),
            "reveal" => Ok(Self::Reveal),
            "finished" => Ok(Self::Finished),
            other => Err(SyncError::Validation(format!("unknown phase `{other}`"))),
        }
    }
}

/// Which game the room is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    /// Word-association rounds ("petit bac") with a voting phase.
    Word,
    /// Music-guessing rounds ("blind test") with a reveal phase.
    Music,
}

impl GameKind {
    /// Path segment of the game's API under the room.
    pub fn api_segment(self) -> &'static str {
        match self {
            Self::Word => "petitbac",
            Self::Music => "blindtest",
        }
    }
}

impl FromStr for GameKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "word" | "petitbac" => Ok(Self::Word),
            "music" | "blindtest" => Ok(Self::Music),
            other => Err(SyncError::Config {
                var: "game",
                reason: format!("unknown game `{other}`"),
            }),
        }
    }
}

/// What the view should present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewMode {
    /// Waiting for the game to start (or no usable state yet).
    Waiting,
    /// Word game: editable answers per category.
    Answering,
    /// Word game: verdict controls for other players' answers.
    Voting,
    /// Music game: guess input while the preview loops.
    Guessing,
    /// Music game: the answer is shown, guessing is closed.
    Revealing,
    /// Final scores.
    Scoreboard,
}

impl ViewMode {
    /// Derive the mode for a phase of the given game.
    pub fn for_phase(phase: Phase, game: GameKind) -> Self {
        match (phase, game) {
            (Phase::Idle, _) => Self::Waiting,
            (Phase::Playing, GameKind::Word) => Self::Answering,
            (Phase::Playing, GameKind::Music) => Self::Guessing,
            (Phase::Validation, _) => Self::Voting,
            (Phase::Reveal, _) => Self::Revealing,
            (Phase::Finished, _) => Self::Scoreboard,
        }
    }
}

/// Round and phase of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundPhase {
    pub round: u32,
    pub phase: Phase,
}

impl RoundPhase {
    pub fn new(round: u32, phase: Phase) -> Self {
        Self { round, phase }
    }

    /// Whether moving from `self` to `next` goes backwards.
    pub fn regresses_to(self, next: RoundPhase) -> bool {
        next.round < self.round || (next.round == self.round && next.phase.rank() < self.phase.rank())
    }

    /// Whether `next` looks like the server started the game over.
    ///
    /// A step back to the idle lobby of the first round always qualifies. A
    /// jump back to first-round play only does from a finished game or a
    /// later round, so a lagging reveal cannot pass for a replay.
    pub fn restarted_by(self, next: RoundPhase) -> bool {
        if next.round > 1 || !self.regresses_to(next) {
            return false;
        }
        match next.phase {
            Phase::Idle => true,
            Phase::Playing => self.phase == Phase::Finished || next.round < self.round,
            _ => false,
        }
    }
}

/// Decision derived from two consecutive observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: Option<RoundPhase>,
    pub current: RoundPhase,
    /// The input session changed: buffers are discarded, never flushed.
    pub new_round: bool,
    pub phase_changed: bool,
    /// `playing` was left within the same round.
    pub leaves_answering: bool,
    /// `validation` was left within the same round.
    pub leaves_voting: bool,
    pub entered_finished: bool,
}

/// Tracks the last handled observation.
#[derive(Debug, Clone, Default)]
pub struct PhaseMachine {
    last: Option<RoundPhase>,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last handled observation, if any.
    pub fn current(&self) -> Option<RoundPhase> {
        self.last
    }

    /// Record `next` and derive what changed since the previous observation.
    pub fn observe(&mut self, next: RoundPhase) -> Transition {
        let previous = self.last.replace(next);
        let new_round = previous.is_none_or(|p| p.round != next.round);
        let phase_changed = previous.is_none_or(|p| p.phase != next.phase);
        let left = |phase: Phase| {
            !new_round && previous.is_some_and(|p| p.phase == phase) && next.phase != phase
        };
        Transition {
            previous,
            current: next,
            new_round,
            phase_changed,
            leaves_answering: left(Phase::Playing),
            leaves_voting: left(Phase::Validation),
            entered_finished: next.phase == Phase::Finished
                && previous.is_none_or(|p| p.phase != Phase::Finished),
        }
    }

    /// Forget everything (restart).
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn rp(round: u32, phase: Phase) -> RoundPhase {
        RoundPhase::new(round, phase)
    }

    #[test]
    fn first_observation_opens_a_round() {
        let mut machine = PhaseMachine::new();
        let t = machine.observe(rp(1, Phase::Playing));
        assert!(t.new_round);
        assert!(!t.leaves_answering);
    }

    #[test]
    fn leaving_playing_in_same_round_requests_flush() {
        let mut machine = PhaseMachine::new();
        machine.observe(rp(1, Phase::Playing));
        let t = machine.observe(rp(1, Phase::Validation));
        assert!(!t.new_round);
        assert!(t.phase_changed);
        assert!(t.leaves_answering);
        assert!(!t.leaves_voting);
    }

    #[test]
    fn round_change_never_requests_flush() {
        let mut machine = PhaseMachine::new();
        machine.observe(rp(1, Phase::Playing));
        let t = machine.observe(rp(2, Phase::Playing));
        assert!(t.new_round);
        assert!(!t.leaves_answering);

        machine.observe(rp(2, Phase::Validation));
        let t = machine.observe(rp(3, Phase::Playing));
        assert!(t.new_round);
        assert!(!t.leaves_voting);
    }

    #[test]
    fn repeated_observation_changes_nothing() {
        let mut machine = PhaseMachine::new();
        machine.observe(rp(2, Phase::Validation));
        let t = machine.observe(rp(2, Phase::Validation));
        assert!(!t.new_round);
        assert!(!t.phase_changed);
        assert!(!t.entered_finished);
    }

    #[test]
    fn finishing_is_reported_once() {
        let mut machine = PhaseMachine::new();
        machine.observe(rp(3, Phase::Validation));
        let t = machine.observe(rp(3, Phase::Finished));
        assert!(t.entered_finished);
        assert!(t.leaves_voting);
        assert!(!machine.observe(rp(3, Phase::Finished)).entered_finished);
    }

    #[test]
    fn regression_and_restart_detection() {
        let finished = rp(3, Phase::Finished);
        assert!(finished.regresses_to(rp(1, Phase::Playing)));
        assert!(finished.restarted_by(rp(1, Phase::Playing)));

        let reveal = rp(1, Phase::Reveal);
        assert!(reveal.regresses_to(rp(1, Phase::Playing)));
        assert!(!reveal.restarted_by(rp(1, Phase::Playing)));

        assert!(!rp(2, Phase::Playing).regresses_to(rp(2, Phase::Reveal)));
    }

    #[test]
    fn back_to_first_round_lobby_is_a_restart() {
        assert!(rp(1, Phase::Validation).restarted_by(rp(1, Phase::Idle)));
        assert!(rp(1, Phase::Playing).restarted_by(rp(1, Phase::Idle)));
        assert!(rp(2, Phase::Reveal).restarted_by(rp(0, Phase::Idle)));

        assert!(!rp(1, Phase::Idle).restarted_by(rp(1, Phase::Idle)));
        assert!(!rp(3, Phase::Validation).restarted_by(rp(3, Phase::Idle)));
        assert!(!rp(1, Phase::Validation).restarted_by(rp(1, Phase::Playing)));
    }

    #[test]
    fn view_mode_follows_game() {
        assert_eq!(ViewMode::for_phase(Phase::Playing, GameKind::Word), ViewMode::Answering);
        assert_eq!(ViewMode::for_phase(Phase::Playing, GameKind::Music), ViewMode::Guessing);
        assert_eq!(ViewMode::for_phase(Phase::Finished, GameKind::Music), ViewMode::Scoreboard);
    }

    #[test]
    fn unknown_phase_is_a_validation_error() {
        assert!(matches!("paused".parse::<Phase>(), Err(SyncError::Validation(_))));
        assert_eq!("reveal".parse::<Phase>().unwrap(), Phase::Reveal);
    }
}
