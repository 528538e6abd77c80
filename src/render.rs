//! Reconciliation of the view against the latest snapshot and edit buffer.
//!
//! The [`Reconciler`] remembers every row it materialized in a table keyed
//! by [`RowKey`]. Rendering the same round again only appends rows for new
//! categories or players and updates values that changed; a different round
//! tears everything down first. Rows with an unsaved local edit are never
//! overwritten, so typing is not disturbed by refreshes.

use std::collections::BTreeMap;

use crate::buffer::{LocalEditBuffer, Verdict, VoteKey};
use crate::countdown::countdown_label;
use crate::phase::{GameKind, Phase, ViewMode};
use crate::protocol::{CategoryId, PlayerInfo, UserId};
use crate::snapshot::{Prompt, RoomSnapshot};

pub const WAITING_WORD: &str = "En attente du début de la partie…";
pub const WAITING_MUSIC: &str = "En attente du lancement…";
pub const YOUR_TURN: &str = "À toi de jouer !";
pub const VOTING: &str = "Vote sur les réponses des autres joueurs.";
pub const GAME_OVER: &str = "Partie terminée !";
pub const CONNECTION_ERROR: &str = "Erreur de connexion.";

/// Single-line texts of the room view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextSlot {
    Status,
    Round,
    Prompt,
    Timer,
    Reveal,
}

/// Input groups that can be enabled or disabled as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputKind {
    Answers,
    Votes,
    Guess,
}

/// Identity of a materialized row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowKey {
    /// The local player's answer input for a category.
    Answer(CategoryId),
    /// Verdict control for another player's answer.
    Vote(VoteKey),
}

/// What a row displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowContent {
    AnswerInput {
        label: String,
        value: String,
    },
    VoteControl {
        category: String,
        target_name: String,
        answer: String,
        verdict: Verdict,
    },
}

/// One line of the final scoreboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreLine {
    pub user_id: UserId,
    pub name: String,
    pub score: i64,
    pub is_me: bool,
}

/// Presentation surface driven by the sync engine.
///
/// Implementations only display; they never read back from the engine.
/// User input goes through the client handle.
pub trait View: Send + 'static {
    fn show_mode(&mut self, mode: ViewMode);
    fn set_text(&mut self, slot: TextSlot, text: &str);
    fn set_input_enabled(&mut self, input: InputKind, enabled: bool);
    /// Remove every row and empty the guess input.
    fn clear_rows(&mut self);
    fn mount_row(&mut self, key: RowKey, content: &RowContent);
    fn update_row(&mut self, key: RowKey, content: &RowContent);
    /// Replace the scoreboard; lines are in server order.
    fn render_scoreboard(&mut self, lines: &[ScoreLine]);
}

/// Everything a render pass reads.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub snapshot: &'a RoomSnapshot,
    pub buffer: &'a LocalEditBuffer,
    pub game: GameKind,
    pub self_id: UserId,
    /// Last `GET players` result (music games carry no players in state).
    pub roster: &'a [PlayerInfo],
    pub now: i64,
}

/// Materialization table plus caches of what the view currently shows.
#[derive(Debug, Default)]
pub struct Reconciler {
    rendered_round: Option<u32>,
    mode: Option<ViewMode>,
    rows: BTreeMap<RowKey, RowContent>,
    texts: BTreeMap<TextSlot, String>,
    enabled: BTreeMap<InputKind, bool>,
    scoreboard: Option<Vec<ScoreLine>>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered_round(&self) -> Option<u32> {
        self.rendered_round
    }

    /// What is materialized under `key`.
    pub fn row(&self, key: RowKey) -> Option<&RowContent> {
        self.rows.get(&key)
    }

    /// Bring the view in line with `ctx`.
    pub fn render(&mut self, view: &mut dyn View, ctx: &RenderContext<'_>) {
        let snapshot = ctx.snapshot;
        if self.rendered_round != Some(snapshot.round) {
            self.teardown(view);
            self.rendered_round = Some(snapshot.round);
        }

        let mode = ViewMode::for_phase(snapshot.phase, ctx.game);
        self.set_mode(view, mode);
        self.set_text(view, TextSlot::Status, status_label(mode, ctx.game));
        let round = if snapshot.round > 0 {
            format!("Manche {} / {}", snapshot.round, snapshot.total_rounds)
        } else {
            String::new()
        };
        self.set_text(view, TextSlot::Round, &round);
        let prompt = match &snapshot.prompt {
            Prompt::Letter(letter) if snapshot.phase != Phase::Idle => format!("Lettre : {letter}"),
            _ => String::new(),
        };
        self.set_text(view, TextSlot::Prompt, &prompt);
        self.tick(view, snapshot.phase, snapshot.ends_at, ctx.now);
        let reveal = snapshot
            .disclosure
            .as_ref()
            .map(|d| format!("Réponse : {} — {}", d.title, d.artist))
            .unwrap_or_default();
        self.set_text(view, TextSlot::Reveal, &reveal);

        match mode {
            ViewMode::Answering => self.reconcile_answers(view, ctx),
            ViewMode::Voting => self.reconcile_votes(view, ctx),
            ViewMode::Scoreboard => self.reconcile_scoreboard(view, ctx),
            ViewMode::Waiting | ViewMode::Guessing | ViewMode::Revealing => {}
        }

        self.set_enabled(view, InputKind::Answers, mode == ViewMode::Answering);
        self.set_enabled(view, InputKind::Votes, mode == ViewMode::Voting);
        self.set_enabled(
            view,
            InputKind::Guess,
            mode == ViewMode::Guessing && !ctx.buffer.guess_locked(),
        );
    }

    /// Waiting view shown when there is no usable state.
    pub fn render_waiting(&mut self, view: &mut dyn View, game: GameKind) {
        self.set_mode(view, ViewMode::Waiting);
        self.set_text(view, TextSlot::Status, status_label(ViewMode::Waiting, game));
        for slot in [TextSlot::Round, TextSlot::Prompt, TextSlot::Timer, TextSlot::Reveal] {
            self.set_text(view, slot, "");
        }
        for input in [InputKind::Answers, InputKind::Votes, InputKind::Guess] {
            self.set_enabled(view, input, false);
        }
    }

    pub fn render_connection_error(&mut self, view: &mut dyn View) {
        self.set_text(view, TextSlot::Status, CONNECTION_ERROR);
    }

    /// Refresh the countdown text only.
    pub fn tick(&mut self, view: &mut dyn View, phase: Phase, ends_at: Option<i64>, now: i64) {
        let label = if phase.has_deadline() {
            countdown_label(ends_at, now)
        } else {
            String::new()
        };
        self.set_text(view, TextSlot::Timer, &label);
    }

    /// The user typed into an answer input; the view already shows `value`.
    pub fn record_answer(&mut self, category: CategoryId, value: &str) {
        if let Some(RowContent::AnswerInput { value: shown, .. }) =
            self.rows.get_mut(&RowKey::Answer(category))
        {
            *shown = value.to_string();
        }
    }

    /// The user changed a verdict; the view already shows `verdict`.
    pub fn record_vote(&mut self, key: VoteKey, verdict: Verdict) {
        if let Some(RowContent::VoteControl { verdict: shown, .. }) =
            self.rows.get_mut(&RowKey::Vote(key))
        {
            *shown = verdict;
        }
    }

    /// Verdict currently displayed for `key`.
    pub fn shown_verdict(&self, key: VoteKey) -> Verdict {
        match self.rows.get(&RowKey::Vote(key)) {
            Some(RowContent::VoteControl { verdict, .. }) => *verdict,
            _ => Verdict::Unset,
        }
    }

    /// Forget everything shown (restart).
    pub fn reset(&mut self, view: &mut dyn View) {
        self.teardown(view);
        self.rendered_round = None;
        self.mode = None;
        self.texts.clear();
        self.enabled.clear();
    }

    // ── Rows ────────────────────────────────────────────────────────

    fn reconcile_answers(&mut self, view: &mut dyn View, ctx: &RenderContext<'_>) {
        for category in &ctx.snapshot.categories {
            let key = RowKey::Answer(category.id);
            let content = RowContent::AnswerInput {
                label: category.display_name.clone(),
                value: ctx.buffer.answer(category.id).unwrap_or_default().to_string(),
            };
            if ctx.buffer.answer_pending(category.id) && self.rows.contains_key(&key) {
                continue;
            }
            self.upsert(view, key, content);
        }
    }

    fn reconcile_votes(&mut self, view: &mut dyn View, ctx: &RenderContext<'_>) {
        let snapshot = ctx.snapshot;
        for category in &snapshot.categories {
            for player in snapshot.players.iter().filter(|p| p.user_id != ctx.self_id) {
                let Some(answer) = snapshot
                    .answer_of(player.user_id, category.id)
                    .filter(|a| !a.trim().is_empty())
                else {
                    continue;
                };
                let key = VoteKey::new(player.user_id, category.id);
                let server = Verdict::from_server(snapshot.verdict_of(
                    ctx.self_id,
                    player.user_id,
                    category.id,
                ));
                let verdict = match ctx.buffer.vote(key) {
                    Some(local) => local,
                    None => match self.rows.get(&RowKey::Vote(key)) {
                        Some(RowContent::VoteControl { verdict, .. }) if *verdict != Verdict::Unset => {
                            *verdict
                        }
                        _ => server,
                    },
                };
                let content = RowContent::VoteControl {
                    category: category.display_name.clone(),
                    target_name: player.display_name.clone(),
                    answer: answer.to_string(),
                    verdict,
                };
                self.upsert(view, RowKey::Vote(key), content);
            }
        }
    }

    fn reconcile_scoreboard(&mut self, view: &mut dyn View, ctx: &RenderContext<'_>) {
        let snapshot = ctx.snapshot;
        let players = if snapshot.players.is_empty() {
            ctx.roster
        } else {
            snapshot.players.as_slice()
        };
        let mut lines: Vec<ScoreLine> = players
            .iter()
            .map(|p| ScoreLine {
                user_id: p.user_id,
                name: p.display_name.clone(),
                score: snapshot.score_of(p.user_id).unwrap_or(p.score),
                is_me: p.user_id == ctx.self_id,
            })
            .collect();
        if lines.is_empty() {
            lines = snapshot
                .scores
                .iter()
                .map(|s| ScoreLine {
                    user_id: s.user_id,
                    name: s.user_id.to_string(),
                    score: s.score,
                    is_me: s.user_id == ctx.self_id,
                })
                .collect();
        }
        if self.scoreboard.as_ref() != Some(&lines) {
            view.render_scoreboard(&lines);
            self.scoreboard = Some(lines);
        }
    }

    fn upsert(&mut self, view: &mut dyn View, key: RowKey, content: RowContent) {
        match self.rows.get(&key) {
            None => {
                view.mount_row(key, &content);
                self.rows.insert(key, content);
            }
            Some(shown) if *shown != content => {
                view.update_row(key, &content);
                self.rows.insert(key, content);
            }
            Some(_) => {}
        }
    }

    fn teardown(&mut self, view: &mut dyn View) {
        view.clear_rows();
        self.rows.clear();
        self.scoreboard = None;
    }

    // ── Cached setters ──────────────────────────────────────────────

    fn set_mode(&mut self, view: &mut dyn View, mode: ViewMode) {
        if self.mode != Some(mode) {
            view.show_mode(mode);
            self.mode = Some(mode);
        }
    }

    fn set_text(&mut self, view: &mut dyn View, slot: TextSlot, text: &str) {
        if self.texts.get(&slot).map(String::as_str) != Some(text) {
            view.set_text(slot, text);
            self.texts.insert(slot, text.to_string());
        }
    }

    fn set_enabled(&mut self, view: &mut dyn View, input: InputKind, enabled: bool) {
        if self.enabled.get(&input) != Some(&enabled) {
            view.set_input_enabled(input, enabled);
            self.enabled.insert(input, enabled);
        }
    }
}

fn status_label(mode: ViewMode, game: GameKind) -> &'static str {
    match mode {
        ViewMode::Waiting => match game {
            GameKind::Word => WAITING_WORD,
            GameKind::Music => WAITING_MUSIC,
        },
        ViewMode::Answering | ViewMode::Guessing => YOUR_TURN,
        ViewMode::Voting => VOTING,
        ViewMode::Revealing => "",
        ViewMode::Scoreboard => GAME_OVER,
    }
}
