//! Item manifests: a JSON description of one item and its sections.
//!
//! ```json
//! { "id": "clip-1", "kind": "video", "fps": 25,
//!   "sections": [ { "section_index": 0, "lq_url": "lq/0000.jpg", "hq_url": "hq/0000.png" } ] }
//! ```
//!
//! Relative URLs resolve against the manifest's directory.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::{SectionSource, SlotSection};
use crate::view::{ItemKind, VideoItem};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemManifest {
    pub id: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub fps: Option<f32>,
    /// Origin indexes; defaults to every section index
    #[serde(default)]
    pub frames: Vec<i32>,
    pub sections: Vec<SlotSection>,
}

impl ItemManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let mut manifest: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
        if manifest.sections.is_empty() {
            bail!("Manifest {} has no sections", path.display());
        }

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for section in &mut manifest.sections {
            section.lq_url = section.lq_url.take().map(|url| resolve_url(base, url));
            section.hq_url = section.hq_url.take().map(|url| resolve_url(base, url));
        }
        info!(
            "Manifest '{}' ({:?}): {} sections",
            manifest.id,
            manifest.kind,
            manifest.sections.len()
        );
        Ok(manifest)
    }

    pub fn into_item(self) -> VideoItem {
        let source = ManifestSource::new(self.sections);
        let frames = if self.frames.is_empty() {
            source.indexes()
        } else {
            self.frames
        };
        VideoItem {
            id: self.id,
            kind: self.kind,
            fps: self.fps,
            frames,
            sections: Arc::new(source),
        }
    }
}

fn resolve_url(base: &Path, url: String) -> String {
    if url.contains("://") || Path::new(&url).is_absolute() {
        return url;
    }
    base.join(&url).to_string_lossy().into_owned()
}

/// Serves section pages from an in-memory manifest.
#[derive(Debug, Default)]
pub struct ManifestSource {
    sections: BTreeMap<i32, SlotSection>,
}

impl ManifestSource {
    pub fn new(sections: impl IntoIterator<Item = SlotSection>) -> Self {
        Self {
            sections: sections.into_iter().map(|s| (s.section_index, s)).collect(),
        }
    }

    pub fn indexes(&self) -> Vec<i32> {
        self.sections.keys().copied().collect()
    }
}

impl SectionSource for ManifestSource {
    fn load_page(&self, offset: i32, limit: usize) -> Result<Vec<SlotSection>> {
        let end = offset.saturating_add(i32::try_from(limit).unwrap_or(i32::MAX));
        let page: Vec<SlotSection> = self
            .sections
            .range(offset..end)
            .map(|(_, s)| s.clone())
            .collect();
        debug!("Manifest page {}..{}: {} sections", offset, end, page.len());
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(name: &str, body: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("framestream_manifest_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("item.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_resolves_relative_urls() {
        let path = write_manifest(
            "urls",
            r#"{ "id": "clip", "kind": "video", "fps": 25,
                 "sections": [
                   { "section_index": 3, "lq_url": "lq/3.jpg", "hq_url": "https://cdn/hq/3.png" },
                   { "section_index": 1, "lq_url": "/abs/1.jpg" }
                 ] }"#,
        );
        let manifest = ItemManifest::load(&path).unwrap();
        let dir = path.parent().unwrap();

        let s3 = manifest.sections.iter().find(|s| s.section_index == 3).unwrap();
        let expected = dir.join("lq/3.jpg").to_string_lossy().into_owned();
        assert_eq!(s3.lq_url.as_deref(), Some(expected.as_str()));
        assert_eq!(s3.hq_url.as_deref(), Some("https://cdn/hq/3.png"));

        let item = manifest.into_item();
        assert_eq!(item.kind, ItemKind::Video);
        assert_eq!(item.frames, vec![1, 3]);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_empty_manifest_rejected() {
        let path = write_manifest("empty", r#"{ "id": "x", "kind": "pdf", "sections": [] }"#);
        assert!(ItemManifest::load(&path).is_err());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_pages_are_index_ranges() {
        let source = ManifestSource::new(
            [0, 4, 5, 9, 10, 12].map(|i| SlotSection::new(i, Some("lq"), None)),
        );
        let page: Vec<i32> = source
            .load_page(5, 5)
            .unwrap()
            .iter()
            .map(|s| s.section_index)
            .collect();
        assert_eq!(page, vec![5, 9]);
        assert!(source.load_page(100, 10).unwrap().is_empty());
    }
}
