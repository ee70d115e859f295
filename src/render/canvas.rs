//! CPU paint target for render layers.

use image::{Rgba, RgbaImage, imageops};

#[derive(Debug, Clone)]
pub struct Canvas {
    pixels: RgbaImage,
    paints: u64,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width.max(1), height.max(1)),
            paints: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Completed render passes
    pub fn paint_count(&self) -> u64 {
        self.paints
    }

    pub(crate) fn mark_painted(&mut self) {
        self.paints += 1;
    }

    pub fn fill(&mut self, color: [u8; 4]) {
        for px in self.pixels.pixels_mut() {
            *px = Rgba(color);
        }
    }

    /// Reallocate to `width` x `height`. Content is dropped.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.pixels.dimensions() != (width.max(1), height.max(1)) {
            self.pixels = RgbaImage::new(width.max(1), height.max(1));
        }
    }

    /// Blend `image` with its top-left corner at (`x`, `y`); off-canvas parts are clipped.
    pub fn overlay(&mut self, image: &RgbaImage, x: i64, y: i64) {
        imageops::overlay(&mut self.pixels, image, x, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_clips() {
        let mut canvas = Canvas::new(2, 2);
        canvas.fill([1, 2, 3, 255]);
        assert_eq!(canvas.pixels().get_pixel(1, 1).0, [1, 2, 3, 255]);

        let img = RgbaImage::from_pixel(4, 3, Rgba([9, 9, 9, 255]));
        canvas.overlay(&img, 1, -1);
        assert_eq!(canvas.pixels().get_pixel(0, 0).0, [1, 2, 3, 255]);
        assert_eq!(canvas.pixels().get_pixel(1, 1).0, [9, 9, 9, 255]);

        canvas.resize(4, 3);
        assert_eq!((canvas.width(), canvas.height()), (4, 3));
    }
}
