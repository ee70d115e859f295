//! Playback side: index translation, playback state and the video view.

pub mod item;
pub mod playback;
pub mod translator;
pub mod video_view;
pub mod view_events;
pub mod viewport;

pub use item::{ItemKind, VideoItem};
pub use playback::{PlaybackClock, PlaybackState};
pub use translator::FrameIndexTranslator;
pub use video_view::{LoadedFrame, VideoView};
pub use view_events::{FrameChangedEvent, PlaybackStateChanged};
pub use viewport::{Viewport, ViewportMode};
