//! Debounced autosave deadlines.
//!
//! The scheduler only tracks deadlines; the sync loop sleeps until
//! [`AutosaveScheduler::next_due`] and collects whatever became due.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Default quiet period before an edit is flushed.
pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_millis(2000);

/// What a flush sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushTarget {
    Answers,
    Votes,
}

impl fmt::Display for FlushTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Answers => "answers",
            Self::Votes => "votes",
        })
    }
}

/// One debounce timer per flush target.
#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    delay: Duration,
    answers: Option<Instant>,
    votes: Option<Instant>,
}

impl Default for AutosaveScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_AUTOSAVE_DELAY)
    }
}

impl AutosaveScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            answers: None,
            votes: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)start the timer for `target`. A running timer is replaced, not stacked.
    pub fn arm(&mut self, target: FlushTarget, now: Instant) {
        *self.slot(target) = Some(now + self.delay);
    }

    pub fn cancel(&mut self, target: FlushTarget) {
        *self.slot(target) = None;
    }

    pub fn cancel_all(&mut self) {
        self.answers = None;
        self.votes = None;
    }

    pub fn is_armed(&self, target: FlushTarget) -> bool {
        match target {
            FlushTarget::Answers => self.answers.is_some(),
            FlushTarget::Votes => self.votes.is_some(),
        }
    }

    /// Earliest armed deadline.
    pub fn next_due(&self) -> Option<Instant> {
        match (self.answers, self.votes) {
            (Some(a), Some(v)) => Some(a.min(v)),
            (a, v) => a.or(v),
        }
    }

    /// Disarm and return every target whose deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Vec<FlushTarget> {
        let mut due = Vec::new();
        for target in [FlushTarget::Answers, FlushTarget::Votes] {
            let slot = self.slot(target);
            if slot.is_some_and(|deadline| deadline <= now) {
                *slot = None;
                due.push(target);
            }
        }
        due
    }

    fn slot(&mut self, target: FlushTarget) -> &mut Option<Instant> {
        match target {
            FlushTarget::Answers => &mut self.answers,
            FlushTarget::Votes => &mut self.votes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rearming_pushes_the_deadline_back() {
        let start = Instant::now();
        let mut scheduler = AutosaveScheduler::default();
        scheduler.arm(FlushTarget::Answers, start);
        scheduler.arm(FlushTarget::Answers, start + Duration::from_millis(1500));

        assert!(scheduler.take_due(start + Duration::from_millis(2000)).is_empty());
        assert_eq!(
            scheduler.take_due(start + Duration::from_millis(3500)),
            vec![FlushTarget::Answers]
        );
        assert!(scheduler.next_due().is_none());
    }

    #[test]
    fn targets_are_independent() {
        let start = Instant::now();
        let mut scheduler = AutosaveScheduler::new(Duration::from_secs(1));
        scheduler.arm(FlushTarget::Votes, start);
        scheduler.arm(FlushTarget::Answers, start + Duration::from_millis(500));
        assert_eq!(scheduler.next_due(), Some(start + Duration::from_secs(1)));

        scheduler.cancel(FlushTarget::Votes);
        assert!(!scheduler.is_armed(FlushTarget::Votes));
        assert_eq!(
            scheduler.next_due(),
            Some(start + Duration::from_millis(1500))
        );
    }

    #[test]
    fn cancel_all_disarms_everything() {
        let now = Instant::now();
        let mut scheduler = AutosaveScheduler::default();
        scheduler.arm(FlushTarget::Answers, now);
        scheduler.arm(FlushTarget::Votes, now);
        scheduler.cancel_all();
        assert!(scheduler.take_due(now + Duration::from_secs(10)).is_empty());
    }
}
