//! Section registry: origin index -> fetchable URLs.
//!
//! Sections arrive from the host in pages. A loader that needs a missing
//! section registers a pull request with a deadline; the request is
//! fulfilled by the next `insert` carrying that index, or expires.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use super::frame_cache::Tier;

/// URLs for one frame. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSection {
    pub section_index: i32,
    #[serde(default)]
    pub lq_url: Option<String>,
    #[serde(default)]
    pub hq_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl SlotSection {
    pub fn new(section_index: i32, lq_url: Option<&str>, hq_url: Option<&str>) -> Self {
        Self {
            section_index,
            lq_url: lq_url.map(str::to_owned),
            hq_url: hq_url.map(str::to_owned),
            width: None,
            height: None,
        }
    }

    /// URL to fetch for `tier`.
    ///
    /// A missing tier URL falls back to the HQ URL, and the returned tier is
    /// promoted to `Hq` accordingly. `None` when neither applies.
    pub fn resolve_url(&self, tier: Tier) -> Option<(&str, Tier)> {
        let preferred = match tier {
            Tier::Lq => self.lq_url.as_deref(),
            Tier::Hq => self.hq_url.as_deref(),
        };
        match preferred {
            Some(url) => Some((url, tier)),
            None => self.hq_url.as_deref().map(|url| (url, Tier::Hq)),
        }
    }
}

/// Host side supplier of section pages.
///
/// `offset` is the first origin index of the page, aligned to `limit`.
pub trait SectionSource: Send + Sync {
    fn load_page(&self, offset: i32, limit: usize) -> anyhow::Result<Vec<SlotSection>>;
}

/// First index of the page holding `index`.
pub fn page_offset(index: i32, page_size: usize) -> i32 {
    let size = i32::try_from(page_size.max(1)).unwrap_or(i32::MAX);
    index.div_euclid(size) * size
}

#[derive(Debug)]
pub struct SectionRegistry {
    sections: HashMap<i32, SlotSection>,
    /// Outstanding pulls: index -> deadline
    requests: HashMap<i32, Instant>,
    timeout: Duration,
}

impl SectionRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sections: HashMap::new(),
            requests: HashMap::new(),
            timeout,
        }
    }

    pub fn get(&self, index: i32) -> Option<&SlotSection> {
        self.sections.get(&index)
    }

    pub fn contains(&self, index: i32) -> bool {
        self.sections.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Store sections, replacing any earlier record for the same index.
    /// Returns the indexes that fulfilled an outstanding pull.
    pub fn insert(&mut self, sections: impl IntoIterator<Item = SlotSection>) -> Vec<i32> {
        let mut fulfilled = Vec::new();
        let mut added = 0usize;
        for section in sections {
            let index = section.section_index;
            if self.requests.remove(&index).is_some() {
                fulfilled.push(index);
            }
            if self.sections.insert(index, section).is_none() {
                added += 1;
            }
        }
        debug!(
            "Sections registered: {} new, {} pulls fulfilled, {} total",
            added,
            fulfilled.len(),
            self.sections.len()
        );
        fulfilled
    }

    /// Start a pull for `index`. Returns false when one is already outstanding
    /// (the host was asked already) or the section is known.
    pub fn request(&mut self, index: i32, now: Instant) -> bool {
        if self.sections.contains_key(&index) || self.requests.contains_key(&index) {
            return false;
        }
        trace!("Section pull: {}", index);
        self.requests.insert(index, now + self.timeout);
        true
    }

    pub fn is_requested(&self, index: i32) -> bool {
        self.requests.contains_key(&index)
    }

    /// Remove and return pulls whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<i32> {
        let mut expired: Vec<i32> = self
            .requests
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(index, _)| *index)
            .collect();
        expired.sort_unstable();
        for index in &expired {
            self.requests.remove(index);
        }
        expired
    }

    /// Earliest outstanding pull deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.requests.values().min().copied()
    }

    pub fn clear(&mut self) {
        self.sections.clear();
        self.requests.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url_fallback() {
        let both = SlotSection::new(1, Some("lq"), Some("hq"));
        assert_eq!(both.resolve_url(Tier::Lq), Some(("lq", Tier::Lq)));
        assert_eq!(both.resolve_url(Tier::Hq), Some(("hq", Tier::Hq)));

        let hq_only = SlotSection::new(2, None, Some("hq"));
        assert_eq!(hq_only.resolve_url(Tier::Lq), Some(("hq", Tier::Hq)));

        let lq_only = SlotSection::new(3, Some("lq"), None);
        assert_eq!(lq_only.resolve_url(Tier::Hq), None);
        assert_eq!(SlotSection::new(4, None, None).resolve_url(Tier::Lq), None);
    }

    #[test]
    fn test_page_offset_alignment() {
        assert_eq!(page_offset(0, 500), 0);
        assert_eq!(page_offset(499, 500), 0);
        assert_eq!(page_offset(500, 500), 500);
        assert_eq!(page_offset(1234, 500), 1000);
        assert_eq!(page_offset(-1, 500), -500);
    }

    #[test]
    fn test_section_json_field_names() {
        let json = r#"{"section_index": 7, "lq_url": "a.jpg", "hq_url": null}"#;
        let section: SlotSection = serde_json::from_str(json).unwrap();
        assert_eq!(section, SlotSection::new(7, Some("a.jpg"), None));
    }

    #[test]
    fn test_pull_fulfilled_by_insert() {
        let mut reg = SectionRegistry::new(Duration::from_secs(10));
        let now = Instant::now();

        assert!(reg.request(5, now));
        assert!(!reg.request(5, now));
        assert!(reg.request(6, now));

        let fulfilled = reg.insert([SlotSection::new(5, Some("5.jpg"), None)]);
        assert_eq!(fulfilled, vec![5]);
        assert!(!reg.is_requested(5));
        assert!(reg.is_requested(6));
        assert!(!reg.request(5, now));
    }

    #[test]
    fn test_pull_expires_individually() {
        let mut reg = SectionRegistry::new(Duration::from_millis(100));
        let t0 = Instant::now();
        reg.request(1, t0);
        reg.request(2, t0 + Duration::from_millis(50));

        assert_eq!(reg.next_deadline(), Some(t0 + Duration::from_millis(100)));
        assert!(reg.expire(t0 + Duration::from_millis(99)).is_empty());
        assert_eq!(reg.expire(t0 + Duration::from_millis(100)), vec![1]);
        assert_eq!(reg.expire(t0 + Duration::from_millis(200)), vec![2]);
        assert_eq!(reg.next_deadline(), None);
    }

    #[test]
    fn test_latest_record_wins() {
        let mut reg = SectionRegistry::new(Duration::from_secs(1));
        reg.insert([SlotSection::new(1, Some("a"), None)]);
        reg.insert([SlotSection::new(1, Some("b"), None)]);
        assert_eq!(reg.get(1).and_then(|s| s.lq_url.as_deref()), Some("b"));
        assert_eq!(reg.len(), 1);
        reg.clear();
        assert!(reg.is_empty());
    }
}
