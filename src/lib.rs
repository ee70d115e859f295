//! framestream - frame streaming pipeline for annotation canvases
//!
//! Re-exports all modules for use by the binary target.

// Loading engine (sections, cache, loader, transport, workers)
pub mod core;

// Playback and rendering
pub mod render;
pub mod view;

// App modules
pub mod cli;
pub mod config;
pub mod manifest;
pub mod paths;

// Re-export commonly used types
pub use crate::core::event_bus::{BoxedEvent, EventBus, downcast_event};
pub use crate::core::{CacheManager, FrameLoaderWorker, LoadError, Tier, TransportConfig};
pub use render::{Canvas, RenderLayer};
pub use view::{FrameIndexTranslator, PlaybackState, VideoItem, VideoView};
