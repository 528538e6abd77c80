//! Wall clock and phase countdown.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default refresh period of the countdown display.
pub const DEFAULT_COUNTDOWN_TICK: Duration = Duration::from_millis(500);

/// Source of the current time in Unix seconds.
///
/// Deadlines are absolute server timestamps, so the countdown needs wall
/// time rather than the runtime's monotonic clock.
pub trait Clock: Send + Sync + fmt::Debug + 'static {
    fn now_unix(&self) -> i64;
}

/// [`Clock`] backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
    }
}

/// Whole seconds left until `ends_at`, never negative.
pub fn remaining_secs(ends_at: i64, now: i64) -> i64 {
    ends_at.saturating_sub(now).max(0)
}

/// Text of the countdown display; blank once the deadline has passed.
pub fn countdown_label(ends_at: Option<i64>, now: i64) -> String {
    match ends_at.map(|t| remaining_secs(t, now)) {
        Some(left) if left > 0 => format!("Temps restant : {left}s"),
        _ => String::new(),
    }
}

/// Whether the countdown still needs ticking.
pub fn is_running(ends_at: Option<i64>, now: i64) -> bool {
    ends_at.is_some_and(|t| remaining_secs(t, now) > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_counts_down_then_blanks() {
        assert_eq!(countdown_label(Some(100), 70), "Temps restant : 30s");
        assert_eq!(countdown_label(Some(100), 100), "");
        assert_eq!(countdown_label(Some(100), 130), "");
        assert_eq!(countdown_label(None, 0), "");
    }

    #[test]
    fn running_only_before_deadline() {
        assert!(is_running(Some(10), 9));
        assert!(!is_running(Some(10), 10));
        assert!(!is_running(None, 0));
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_unix() > 1_577_836_800);
    }
}
