//! Events published by the loader transport.

use super::frame_cache::Tier;
use super::object_url::ObjectUrl;

/// A frame finished loading and is registered under `url`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameLoadedEvent {
    pub index: i32,
    pub url: ObjectUrl,
    pub tier: Tier,
}

impl FrameLoadedEvent {
    pub fn is_hq(&self) -> bool {
        self.tier.is_hq()
    }
}

/// The host failed to provide the section page containing `index`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionPageFailedEvent {
    pub index: i32,
    pub offset: i32,
    pub reason: String,
}
