//! Render layers and paint targets.

pub mod canvas;
pub mod layer;

pub use canvas::Canvas;
pub use layer::{Drawable, ListenerId, RenderLayer};
