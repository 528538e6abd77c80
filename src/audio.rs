//! Preview playback for music rounds.

use tracing::debug;

use crate::phase::Phase;

/// Audio output the session drives.
pub trait AudioSink: Send + 'static {
    /// Replace the current source and start playing it from the start.
    fn load_and_play(&mut self, src: &str);
    /// Play the loaded source again from the start.
    fn restart(&mut self);
    fn pause(&mut self);
}

/// Sink for clients without audio (word games, headless runs).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAudio;

impl AudioSink for NoAudio {
    fn load_and_play(&mut self, _src: &str) {}
    fn restart(&mut self) {}
    fn pause(&mut self) {}
}

/// Owns the single audio sink and the loop policy.
pub struct AudioDirector {
    sink: Box<dyn AudioSink>,
    playing: Option<String>,
}

impl AudioDirector {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        Self {
            sink,
            playing: None,
        }
    }

    /// Source currently looping, if any.
    pub fn current(&self) -> Option<&str> {
        self.playing.as_deref()
    }

    /// Loop `src`. Already looping the same source is a no-op.
    pub fn ensure_loop(&mut self, src: &str) {
        if self.playing.as_deref() == Some(src) {
            return;
        }
        if self.playing.is_some() {
            self.sink.pause();
        }
        debug!(src, "starting preview loop");
        self.sink.load_and_play(src);
        self.playing = Some(src.to_string());
    }

    pub fn stop(&mut self) {
        if self.playing.take().is_some() {
            debug!("stopping preview loop");
            self.sink.pause();
        }
    }

    /// The sink reached the end of the track.
    ///
    /// Replays while the round is still open; returns whether it did.
    pub fn on_ended(&mut self, phase: Phase, ends_at: Option<i64>, now: i64) -> bool {
        let open = phase == Phase::Playing && ends_at.is_some_and(|t| now < t);
        if open && self.playing.is_some() {
            self.sink.restart();
            true
        } else {
            false
        }
    }
}

impl std::fmt::Debug for AudioDirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDirector")
            .field("playing", &self.playing)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<String>>>);

    impl AudioSink for Log {
        fn load_and_play(&mut self, src: &str) {
            self.0.lock().unwrap().push(format!("play {src}"));
        }
        fn restart(&mut self) {
            self.0.lock().unwrap().push("restart".into());
        }
        fn pause(&mut self) {
            self.0.lock().unwrap().push("pause".into());
        }
    }

    #[test]
    fn same_preview_is_not_restarted() {
        let log = Log::default();
        let mut director = AudioDirector::new(Box::new(log.clone()));
        director.ensure_loop("a.mp3");
        director.ensure_loop("a.mp3");
        director.ensure_loop("b.mp3");
        assert_eq!(
            *log.0.lock().unwrap(),
            vec!["play a.mp3", "pause", "play b.mp3"]
        );
    }

    #[test]
    fn replays_only_while_round_is_open() {
        let log = Log::default();
        let mut director = AudioDirector::new(Box::new(log.clone()));
        director.ensure_loop("a.mp3");
        assert!(director.on_ended(Phase::Playing, Some(100), 90));
        assert!(!director.on_ended(Phase::Playing, Some(100), 100));
        assert!(!director.on_ended(Phase::Reveal, Some(100), 90));
        director.stop();
        director.stop();
        assert_eq!(
            *log.0.lock().unwrap(),
            vec!["play a.mp3", "restart", "pause"]
        );
    }
}
