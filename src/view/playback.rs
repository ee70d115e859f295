//! Playback state machine and fixed-rate clock.
//!
//! # States
//!
//! - `Idle`: nothing loaded, or after reset
//! - `Seeking { target, resume }`: waiting for `target` (zero-based) to
//!   arrive; `resume` remembers whether playback was running
//! - `Playing`: clock ticks advance the frame
//! - `Paused`: a frame is shown, clock stopped
//!
//! Seeking while playing keeps `resume = true`, so playback continues once
//! the frame lands. Stopping during a seek clears `resume`.

use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Seeking { target: usize, resume: bool },
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Seeking { .. } => "seeking",
            Self::Playing => "playing",
            Self::Paused => "paused",
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing | Self::Seeking { resume: true, .. })
    }

    pub fn is_seeking(&self) -> bool {
        matches!(self, Self::Seeking { .. })
    }

    /// A seek to `target` starts (or replaces the running seek).
    pub fn on_seek(self, target: usize) -> Self {
        Self::Seeking {
            target,
            resume: self.is_playing(),
        }
    }

    /// The sought frame arrived. `None` if `target` is not the running seek.
    pub fn on_seek_done(self, target: usize) -> Option<Self> {
        match self {
            Self::Seeking { target: t, resume } if t == target => {
                Some(if resume { Self::Playing } else { Self::Paused })
            }
            _ => None,
        }
    }

    /// Start playback. `None` when there is nothing to play (`Idle`).
    pub fn on_play(self) -> Option<Self> {
        match self {
            Self::Idle => None,
            Self::Playing => Some(Self::Playing),
            Self::Paused => Some(Self::Playing),
            Self::Seeking { target, .. } => Some(Self::Seeking { target, resume: true }),
        }
    }

    pub fn on_stop(self) -> Self {
        match self {
            Self::Idle => Self::Idle,
            Self::Seeking { target, .. } => Self::Seeking { target, resume: false },
            Self::Playing | Self::Paused => Self::Paused,
        }
    }

    pub fn on_reset(self) -> Self {
        Self::Idle
    }
}

pub const MIN_FPS: f32 = 0.01;
pub const MAX_FPS: f32 = 1000.0;

/// Fixed-rate tick source: one tick per `1/fps` seconds.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    interval: Duration,
    last_tick: Option<Instant>,
}

impl PlaybackClock {
    pub fn new(fps: f32) -> Self {
        let mut clock = Self {
            interval: Duration::ZERO,
            last_tick: None,
        };
        clock.set_fps(fps);
        clock
    }

    /// Non-finite or non-positive rates fall back to 24; others clamp to `MIN_FPS..=MAX_FPS`.
    pub fn set_fps(&mut self, fps: f32) {
        let fps = if fps.is_finite() && fps > 0.0 {
            fps.clamp(MIN_FPS, MAX_FPS)
        } else {
            24.0
        };
        self.interval = Duration::from_secs_f32(1.0 / fps);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start(&mut self, now: Instant) {
        self.last_tick = Some(now);
    }

    pub fn stop(&mut self) {
        self.last_tick = None;
    }

    pub fn is_running(&self) -> bool {
        self.last_tick.is_some()
    }

    /// True once per elapsed interval. Late ticks don't accumulate: a slow
    /// caller gets one tick, not a burst.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(last) = self.last_tick else {
            return false;
        };
        if now.saturating_duration_since(last) >= self.interval {
            self.last_tick = Some(now);
            true
        } else {
            false
        }
    }

    /// Time until the next tick is due.
    pub fn until_next(&self, now: Instant) -> Option<Duration> {
        self.last_tick
            .map(|last| (last + self.interval).saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_from_pause_and_play() {
        let paused = PlaybackState::Paused.on_seek(4);
        assert_eq!(paused, PlaybackState::Seeking { target: 4, resume: false });
        assert_eq!(paused.on_seek_done(4), Some(PlaybackState::Paused));

        let playing = PlaybackState::Playing.on_seek(4);
        assert!(playing.is_playing());
        assert_eq!(playing.on_seek_done(4), Some(PlaybackState::Playing));
    }

    #[test]
    fn test_superseded_seek_ignored() {
        let state = PlaybackState::Idle.on_seek(1).on_seek(9);
        assert_eq!(state.on_seek_done(1), None);
        assert_eq!(state.on_seek_done(9), Some(PlaybackState::Paused));
    }

    #[test]
    fn test_play_stop_transitions() {
        assert_eq!(PlaybackState::Idle.on_play(), None);
        assert_eq!(PlaybackState::Paused.on_play(), Some(PlaybackState::Playing));
        assert_eq!(PlaybackState::Playing.on_stop(), PlaybackState::Paused);

        let seeking = PlaybackState::Seeking { target: 2, resume: false };
        assert_eq!(
            seeking.on_play(),
            Some(PlaybackState::Seeking { target: 2, resume: true })
        );
        assert_eq!(
            PlaybackState::Seeking { target: 2, resume: true }.on_stop(),
            seeking
        );
        assert_eq!(PlaybackState::Playing.on_reset(), PlaybackState::Idle);
    }

    #[test]
    fn test_clock_ticks_at_interval() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::new(10.0);
        assert!(!clock.tick(t0));

        clock.start(t0);
        assert!(!clock.tick(t0 + Duration::from_millis(50)));
        assert!(clock.tick(t0 + Duration::from_millis(110)));
        assert!(!clock.tick(t0 + Duration::from_millis(150)));
        // One tick for a long stall
        assert!(clock.tick(t0 + Duration::from_millis(1000)));
        assert!(!clock.tick(t0 + Duration::from_millis(1001)));

        clock.stop();
        assert!(!clock.is_running());
    }

    #[test]
    fn test_invalid_fps_falls_back() {
        let clock = PlaybackClock::new(0.0);
        assert_eq!(clock.interval(), Duration::from_secs_f32(1.0 / 24.0));
    }

    #[test]
    fn test_extreme_fps_is_clamped() {
        let slow = PlaybackClock::new(1e-20);
        assert_eq!(slow.interval(), Duration::from_secs_f32(1.0 / MIN_FPS));

        let fast = PlaybackClock::new(1e20);
        assert_eq!(fast.interval(), Duration::from_secs_f32(1.0 / MAX_FPS));
    }
}
