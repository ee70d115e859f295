//! Video view events.

use super::playback::PlaybackState;

// === Frame ===

/// The displayed frame changed; geometry bound to the old frame is stale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameChangedEvent {
    pub origin: i32,
    pub zero_based: usize,
}

// === Playback ===

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackStateChanged {
    pub from: PlaybackState,
    pub to: PlaybackState,
}
