//! Displayed frame plus zoom/pan state.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::{FrameImage, ObjectUrl, Tier};
use crate::render::Canvas;

const ZOOM_STEP: f32 = 0.025;
const ZOOM_IN_FACTOR: f32 = 1.0 + ZOOM_STEP;
const ZOOM_OUT_FACTOR: f32 = 1.0 / ZOOM_IN_FACTOR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewportMode {
    /// User controls zoom/pan, nothing auto-adjusts
    Manual,
    /// Image fits the canvas, re-fits on resize and on zoom reset
    AutoFit,
    /// 1:1 pixels
    Auto100,
}

/// The frame on screen.
#[derive(Debug, Clone)]
pub struct ShownImage {
    pub url: ObjectUrl,
    pub tier: Tier,
    pub image: Arc<FrameImage>,
}

#[derive(Debug, Clone)]
pub struct Viewport {
    pub zoom: f32,
    pub pan: [f32; 2],
    pub mode: ViewportMode,
    size: [f32; 2],
    shown: Option<ShownImage>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: [0.0, 0.0],
            mode: ViewportMode::AutoFit,
            size: [1920.0, 1080.0],
            shown: None,
        }
    }
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: [width.max(1) as f32, height.max(1) as f32],
            ..Self::default()
        }
    }

    pub fn shown(&self) -> Option<&ShownImage> {
        self.shown.as_ref()
    }

    pub fn shown_url(&self) -> Option<&ObjectUrl> {
        self.shown.as_ref().map(|s| &s.url)
    }

    pub fn shown_tier(&self) -> Option<Tier> {
        self.shown.as_ref().map(|s| s.tier)
    }

    /// Swap the displayed frame. `reset_zoom` re-applies the viewport mode
    /// (or fit, from manual).
    pub fn set_image(&mut self, url: ObjectUrl, tier: Tier, image: Arc<FrameImage>, reset_zoom: bool) {
        self.shown = Some(ShownImage { url, tier, image });
        if reset_zoom {
            self.reset_view();
        }
    }

    pub fn clear_image(&mut self) {
        self.shown = None;
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.size = [width.max(1) as f32, height.max(1) as f32];
        if self.mode == ViewportMode::AutoFit {
            self.apply_fit();
        }
    }

    pub fn reset_view(&mut self) {
        match self.mode {
            ViewportMode::Auto100 => self.apply_100(),
            ViewportMode::AutoFit | ViewportMode::Manual => {
                self.mode = ViewportMode::AutoFit;
                self.apply_fit();
            }
        }
    }

    pub fn set_mode_100(&mut self) {
        info!("Viewport mode: Auto100");
        self.mode = ViewportMode::Auto100;
        self.apply_100();
    }

    /// Step zoom in or out around the canvas center (switches to Manual).
    pub fn handle_zoom(&mut self, zoom_delta: f32) {
        if zoom_delta.abs() < 0.001 {
            return;
        }
        self.mode = ViewportMode::Manual;
        let factor = if zoom_delta > 0.0 { ZOOM_IN_FACTOR } else { ZOOM_OUT_FACTOR };
        self.zoom = (self.zoom * factor).clamp(0.01, 100.0);
        debug!("Zoom: {:.2}x", self.zoom);
    }

    pub fn handle_pan(&mut self, dx: f32, dy: f32) {
        self.mode = ViewportMode::Manual;
        self.pan[0] += dx;
        self.pan[1] += dy;
    }

    fn apply_fit(&mut self) {
        let Some(shown) = &self.shown else {
            return;
        };
        let (w, h) = (shown.image.width() as f32, shown.image.height() as f32);
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        self.zoom = (self.size[0] / w).min(self.size[1] / h);
        self.pan = [0.0, 0.0];
    }

    fn apply_100(&mut self) {
        self.zoom = 1.0;
        self.pan = [0.0, 0.0];
    }

    /// Paint the shown frame centered on the canvas at the current zoom/pan.
    pub fn paint(&self, canvas: &mut Canvas) -> anyhow::Result<()> {
        let Some(shown) = &self.shown else {
            anyhow::bail!("no frame to paint");
        };
        let src = shown.image.pixels();
        let w = ((src.width() as f32 * self.zoom).round() as u32).max(1);
        let h = ((src.height() as f32 * self.zoom).round() as u32).max(1);

        canvas.fill([0, 0, 0, 255]);
        let x = ((canvas.width() as f32 - w as f32) / 2.0 + self.pan[0]).round() as i64;
        let y = ((canvas.height() as f32 - h as f32) / 2.0 + self.pan[1]).round() as i64;
        if (w, h) == src.dimensions() {
            canvas.overlay(src, x, y);
        } else {
            let scaled = imageops::resize(src, w, h, FilterType::Triangle);
            canvas.overlay(&scaled, x, y);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ObjectUrlStore;
    use image::{Rgba, RgbaImage};

    fn shown(store: &ObjectUrlStore, w: u32, h: u32) -> (ObjectUrl, Arc<FrameImage>) {
        let image = Arc::new(FrameImage::new(RgbaImage::from_pixel(w, h, Rgba([200, 0, 0, 255]))));
        (store.create(Arc::clone(&image)), image)
    }

    #[test]
    fn test_fit_on_reset() {
        let store = ObjectUrlStore::new();
        let mut vp = Viewport::new(100, 50);
        let (url, image) = shown(&store, 20, 20);

        vp.set_image(url, Tier::Lq, image, true);
        assert_eq!(vp.mode, ViewportMode::AutoFit);
        assert!((vp.zoom - 2.5).abs() < 1e-6);

        vp.handle_zoom(1.0);
        assert_eq!(vp.mode, ViewportMode::Manual);

        // Swapping without reset keeps the user's zoom
        let (url, image) = shown(&store, 80, 80);
        let zoom = vp.zoom;
        vp.set_image(url, Tier::Hq, image, false);
        assert_eq!(vp.zoom, zoom);
        assert_eq!(vp.shown_tier(), Some(Tier::Hq));
    }

    #[test]
    fn test_paint_centered() {
        let store = ObjectUrlStore::new();
        let mut vp = Viewport::new(4, 4);
        vp.set_mode_100();
        let (url, image) = shown(&store, 2, 2);
        vp.set_image(url, Tier::Lq, image, true);

        let mut canvas = Canvas::new(4, 4);
        vp.paint(&mut canvas).unwrap();
        assert_eq!(canvas.pixels().get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(canvas.pixels().get_pixel(1, 1).0, [200, 0, 0, 255]);
        assert_eq!(canvas.pixels().get_pixel(2, 2).0, [200, 0, 0, 255]);
    }

    #[test]
    fn test_paint_without_image_fails() {
        let vp = Viewport::new(4, 4);
        assert!(vp.paint(&mut Canvas::new(4, 4)).is_err());
    }
}
