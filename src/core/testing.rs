//! In-memory fetcher and section source for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::LoadError;
use super::fetch::FrameFetcher;
use super::fetch::tests::png_bytes;
use super::sections::{SectionSource, SlotSection};

/// Serves PNGs registered per URL, optionally after a delay.
#[derive(Default)]
pub struct MemoryFetcher {
    frames: Mutex<HashMap<String, Vec<u8>>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `lq/<i>` and `hq/<i>` for every index, LQ 2x2 and HQ 8x8.
    pub fn with_frames(indexes: impl IntoIterator<Item = i32>) -> Arc<Self> {
        let fetcher = Self::new();
        for i in indexes {
            fetcher.add(&format!("lq/{i}"), png_bytes(2, 2, [i as u8, 0, 0, 255]));
            fetcher.add(&format!("hq/{i}"), png_bytes(8, 8, [i as u8, 0, 0, 255]));
        }
        fetcher
    }

    pub fn add(&self, url: &str, bytes: Vec<u8>) {
        self.frames.lock().unwrap().insert(url.to_owned(), bytes);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FrameFetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.frames
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| LoadError::Fetch {
                url: url.to_owned(),
                reason: "404".into(),
            })
    }
}

/// Section pages built from a fixed index list with `lq/<i>` / `hq/<i>` URLs,
/// optionally under a prefix and after a delay.
pub struct StaticSource {
    indexes: Vec<i32>,
    prefix: Option<String>,
    delay: Mutex<Option<Duration>>,
    pages: Mutex<Vec<i32>>,
}

impl StaticSource {
    pub fn new(indexes: impl IntoIterator<Item = i32>) -> Arc<Self> {
        Arc::new(Self {
            indexes: indexes.into_iter().collect(),
            prefix: None,
            delay: Mutex::new(None),
            pages: Mutex::new(Vec::new()),
        })
    }

    /// URLs become `<prefix>/lq/<i>` / `<prefix>/hq/<i>`.
    pub fn with_prefix(prefix: &str, indexes: impl IntoIterator<Item = i32>) -> Arc<Self> {
        Arc::new(Self {
            indexes: indexes.into_iter().collect(),
            prefix: Some(prefix.to_owned()),
            delay: Mutex::new(None),
            pages: Mutex::new(Vec::new()),
        })
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Offsets requested so far.
    pub fn pages(&self) -> Vec<i32> {
        self.pages.lock().unwrap().clone()
    }

    pub fn section(&self, i: i32) -> SlotSection {
        match &self.prefix {
            Some(prefix) => SlotSection::new(
                i,
                Some(&format!("{prefix}/lq/{i}")),
                Some(&format!("{prefix}/hq/{i}")),
            ),
            None => section(i),
        }
    }
}

pub fn section(i: i32) -> SlotSection {
    SlotSection::new(i, Some(&format!("lq/{i}")), Some(&format!("hq/{i}")))
}

impl SectionSource for StaticSource {
    fn load_page(&self, offset: i32, limit: usize) -> anyhow::Result<Vec<SlotSection>> {
        self.pages.lock().unwrap().push(offset);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let end = offset.saturating_add(limit as i32);
        Ok(self
            .indexes
            .iter()
            .copied()
            .filter(|i| (offset..end).contains(i))
            .map(|i| self.section(i))
            .collect())
    }
}
