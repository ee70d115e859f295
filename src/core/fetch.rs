//! Frame fetching and decoding.
//!
//! `FrameFetcher` turns a section URL into encoded bytes; `decode_frame`
//! turns bytes into RGBA pixels. Both run on fetch pool threads.

use std::sync::Arc;
use std::time::Duration;

use log::trace;

use super::error::LoadError;
use super::object_url::FrameImage;

/// Upper bound on a single frame download.
const MAX_FRAME_BYTES: u64 = 256 * 1024 * 1024;

/// Source of encoded frame bytes.
pub trait FrameFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError>;
}

impl<T: FrameFetcher + ?Sized> FrameFetcher for Arc<T> {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        (**self).fetch(url)
    }
}

/// http(s) through `ureq`, `file://` and bare paths through the filesystem.
pub struct UrlFetcher {
    agent: ureq::Agent,
}

impl UrlFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { agent }
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let fail = |reason: String| LoadError::Fetch {
            url: url.to_owned(),
            reason,
        };

        let resp = self.agent.get(url).call().map_err(|e| fail(e.to_string()))?;
        let mut body = resp.into_body();
        body.with_config()
            .limit(MAX_FRAME_BYTES)
            .read_to_vec()
            .map_err(|e| fail(e.to_string()))
    }
}

impl FrameFetcher for UrlFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        trace!("Fetching {}", url);
        if url.starts_with("http://") || url.starts_with("https://") {
            return self.fetch_http(url);
        }
        let path = url.strip_prefix("file://").unwrap_or(url);
        std::fs::read(path).map_err(|e| LoadError::Fetch {
            url: url.to_owned(),
            reason: e.to_string(),
        })
    }
}

/// Decode any format `image` understands into RGBA8.
pub fn decode_frame(url: &str, bytes: &[u8]) -> Result<FrameImage, LoadError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| LoadError::Decode {
        url: url.to_owned(),
        reason: e.to_string(),
    })?;
    Ok(FrameImage::new(decoded.into_rgba8()))
}

pub fn fetch_and_decode(fetcher: &dyn FrameFetcher, url: &str) -> Result<Arc<FrameImage>, LoadError> {
    let bytes = fetcher.fetch(url)?;
    let image = decode_frame(url, &bytes)?;
    trace!(
        "Decoded {} ({} bytes -> {}x{})",
        url,
        bytes.len(),
        image.width(),
        image.height()
    );
    Ok(Arc::new(image))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    pub(crate) fn png_bytes(w: u32, h: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, Rgba(color));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_decode_png() {
        let bytes = png_bytes(3, 2, [255, 0, 0, 255]);
        let frame = decode_frame("mem://red", &bytes).unwrap();
        assert_eq!((frame.width(), frame.height()), (3, 2));
        assert_eq!(frame.pixels().get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode_frame("mem://bad", b"not an image").unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
    }

    #[test]
    fn test_file_fetch() {
        let path = std::env::temp_dir().join(format!("framestream-fetch-{}.png", uuid::Uuid::new_v4()));
        std::fs::write(&path, png_bytes(1, 1, [0, 0, 0, 255])).unwrap();

        let fetcher = UrlFetcher::new(Duration::from_secs(5));
        let url = format!("file://{}", path.display());
        let frame = fetch_and_decode(&fetcher, &url).unwrap();
        assert_eq!(frame.width(), 1);

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(fetcher.fetch(&url), Err(LoadError::Fetch { .. })));
    }

    #[test]
    fn test_http_fetch() {
        let png = png_bytes(4, 4, [0, 255, 0, 255]);
        let server = rouille::Server::new("127.0.0.1:0", move |request| {
            if request.url() == "/frames/1.png" {
                rouille::Response::from_data("image/png", png.clone())
            } else {
                rouille::Response::empty_404()
            }
        })
        .unwrap();
        let addr = server.server_addr();
        let (handle, stop) = server.stoppable();

        let fetcher = UrlFetcher::new(Duration::from_secs(5));
        let frame = fetch_and_decode(&fetcher, &format!("http://{}/frames/1.png", addr)).unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 4));

        let missing = fetcher.fetch(&format!("http://{}/frames/2.png", addr));
        assert!(matches!(missing, Err(LoadError::Fetch { .. })));

        stop.send(()).unwrap();
        handle.join().unwrap();
    }
}
