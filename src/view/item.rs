//! The media item a view plays.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::SectionSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Video,
    Dicom,
    Pdf,
    Image,
}

impl ItemKind {
    /// DICOM and PDF frames come in one quality only; no HQ upgrades.
    pub fn upgrades_to_hq(self) -> bool {
        !matches!(self, Self::Dicom | Self::Pdf)
    }
}

#[derive(Clone)]
pub struct VideoItem {
    pub id: String,
    pub kind: ItemKind,
    pub fps: Option<f32>,
    /// Every origin index of the item, in any order
    pub frames: Vec<i32>,
    pub sections: Arc<dyn SectionSource>,
}

impl fmt::Debug for VideoItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoItem")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("fps", &self.fps)
            .field("frames", &self.frames.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_upgrade_rule() {
        assert!(ItemKind::Video.upgrades_to_hq());
        assert!(ItemKind::Image.upgrades_to_hq());
        assert!(!ItemKind::Dicom.upgrades_to_hq());
        assert!(!ItemKind::Pdf.upgrades_to_hq());

        let kind: ItemKind = serde_json::from_str("\"dicom\"").unwrap();
        assert_eq!(kind, ItemKind::Dicom);
    }
}
