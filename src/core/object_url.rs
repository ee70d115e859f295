//! Blob registry: decoded frames addressed by opaque object URLs.
//!
//! A loaded frame lives here as `Arc<FrameImage>` under a
//! `blob:framestream/<uuid>` key until it is revoked. The loader creates
//! URLs, the cache revokes them on eviction, and views resolve them to pixels.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use image::RgbaImage;
use log::trace;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SCHEME: &str = "blob:framestream/";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    fn generate() -> Self {
        Self(format!("{}{}", SCHEME, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded RGBA8 frame.
#[derive(Debug, Clone)]
pub struct FrameImage {
    pixels: RgbaImage,
}

impl FrameImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
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

    /// Bytes held by the pixel buffer
    pub fn mem(&self) -> usize {
        self.pixels.as_raw().len()
    }
}

/// Shared URL -> image registry. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlStore {
    blobs: Arc<Mutex<HashMap<ObjectUrl, Arc<FrameImage>>>>,
}

impl ObjectUrlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image under a fresh URL.
    pub fn create(&self, image: Arc<FrameImage>) -> ObjectUrl {
        let url = ObjectUrl::generate();
        trace!("Object URL created: {} ({}x{})", url, image.width(), image.height());
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.clone(), image);
        url
    }

    pub fn resolve(&self, url: &ObjectUrl) -> Option<Arc<FrameImage>> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
    }

    /// Drop the image behind `url`. Returns the image if it was registered.
    pub fn revoke(&self, url: &ObjectUrl) -> Option<Arc<FrameImage>> {
        let removed = self
            .blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(url);
        if removed.is_some() {
            trace!("Object URL revoked: {}", url);
        }
        removed
    }

    pub fn contains(&self, url: &ObjectUrl) -> bool {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
