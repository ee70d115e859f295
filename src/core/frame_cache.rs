//! Bounded cache of loaded frames, one entry per origin index.
//!
//! Each entry holds the object URL of the best tier loaded so far. Two rules
//! shape every insert:
//! - an HQ entry is never replaced by LQ
//! - when over capacity (entry count or memory budget) the entry farthest
//!   from the focus index is evicted and its object URL revoked
//!
//! Owned by the loader actor, so no internal locking beyond the shared
//! statistics counters.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use log::debug;
use serde::{Deserialize, Serialize};

use super::cache_man::CacheManager;
use super::object_url::{FrameImage, ObjectUrl, ObjectUrlStore};
use super::pending::FrameRef;

/// Frame quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    Lq,
    Hq,
}

impl Tier {
    pub fn is_hq(self) -> bool {
        self == Tier::Hq
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFrame {
    pub url: ObjectUrl,
    pub tier: Tier,
    pub bytes: usize,
}

impl CachedFrame {
    pub fn to_ref(&self) -> FrameRef {
        FrameRef {
            url: self.url.clone(),
            tier: self.tier,
        }
    }
}

/// Outcome of `FrameCache::insert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheInsert {
    /// New object URL registered for this index
    Stored(FrameRef),
    /// Existing entry was at least as good; the new image was discarded
    Kept(FrameRef),
}

impl CacheInsert {
    pub fn frame(&self) -> &FrameRef {
        match self {
            Self::Stored(frame) | Self::Kept(frame) => frame,
        }
    }
}

/// Cache counters, shared with the host for monitoring.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    entries: AtomicUsize,
    hq_entries: AtomicUsize,
}

/// Point-in-time copy of `CacheStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub hq_entries: usize,
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    fn set_sizes(&self, entries: usize, hq_entries: usize) {
        self.entries.store(entries, Ordering::Relaxed);
        self.hq_entries.store(hq_entries, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            evictions: self.evictions(),
            entries: self.entries.load(Ordering::Relaxed),
            hq_entries: self.hq_entries.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct FrameCache {
    frames: BTreeMap<i32, CachedFrame>,
    hq_indexes: HashSet<i32>,
    store: ObjectUrlStore,
    manager: Arc<CacheManager>,
    stats: Arc<CacheStats>,
    max_frames: usize,
}

impl FrameCache {
    pub fn new(max_frames: usize, manager: Arc<CacheManager>, store: ObjectUrlStore) -> Self {
        let max_frames = max_frames.max(1);
        debug!("FrameCache created: max_frames={}", max_frames);
        Self {
            frames: BTreeMap::new(),
            hq_indexes: HashSet::new(),
            store,
            manager,
            stats: Arc::new(CacheStats::new()),
            max_frames,
        }
    }

    /// Lookup that counts towards hit/miss statistics.
    pub fn get(&self, index: i32) -> Option<&CachedFrame> {
        let found = self.frames.get(&index);
        if found.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        found
    }

    /// Lookup without touching statistics.
    pub fn peek(&self, index: i32) -> Option<&CachedFrame> {
        self.frames.get(&index)
    }

    pub fn contains(&self, index: i32) -> bool {
        self.frames.contains_key(&index)
    }

    pub fn has_hq(&self, index: i32) -> bool {
        self.hq_indexes.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn indexes(&self) -> impl Iterator<Item = i32> + '_ {
        self.frames.keys().copied()
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn store(&self) -> &ObjectUrlStore {
        &self.store
    }

    /// Cache a decoded frame.
    ///
    /// An existing HQ entry, or an existing entry of the same tier, wins and
    /// the image is dropped without registering a URL. Replacing LQ with HQ
    /// revokes the LQ URL. After storing, entries are evicted until both
    /// limits hold again, farthest from `focus` first; `index` itself is
    /// never evicted by its own insert.
    pub fn insert(
        &mut self,
        index: i32,
        tier: Tier,
        image: Arc<FrameImage>,
        focus: Option<i32>,
    ) -> CacheInsert {
        if let Some(existing) = self.frames.get(&index) {
            if existing.tier == Tier::Hq || existing.tier == tier {
                debug!(
                    "Frame {} already cached as {:?}, dropping {:?} result",
                    index, existing.tier, tier
                );
                return CacheInsert::Kept(existing.to_ref());
            }
        }

        let bytes = image.mem();
        let url = self.store.create(image);
        let entry = CachedFrame {
            url: url.clone(),
            tier,
            bytes,
        };

        if let Some(old) = self.frames.insert(index, entry) {
            self.release(&old);
            debug!("Frame {} upgraded {:?} -> {:?}", index, old.tier, tier);
        }
        if tier.is_hq() {
            self.hq_indexes.insert(index);
        }
        self.manager.add_memory(bytes);

        self.evict(focus.unwrap_or(index), index);
        self.sync_sizes();

        CacheInsert::Stored(FrameRef { url, tier })
    }

    fn over_budget(&self) -> bool {
        self.frames.len() > self.max_frames || self.manager.check_memory_limit()
    }

    fn evict(&mut self, focus: i32, protected: i32) {
        while self.over_budget() {
            // Farthest from focus; on equal distance the lower index goes first
            let victim = self
                .frames
                .keys()
                .copied()
                .filter(|&idx| idx != protected)
                .max_by(|a, b| {
                    let da = (i64::from(*a) - i64::from(focus)).abs();
                    let db = (i64::from(*b) - i64::from(focus)).abs();
                    da.cmp(&db).then_with(|| b.cmp(a))
                });

            let Some(victim) = victim else {
                break;
            };
            self.remove(victim);
            self.stats.record_eviction();
            debug!("Evicted frame {} (focus {})", victim, focus);
        }
    }

    fn release(&self, entry: &CachedFrame) {
        self.store.revoke(&entry.url);
        self.manager.free_memory(entry.bytes);
    }

    /// Drop one entry and revoke its URL.
    pub fn remove(&mut self, index: i32) -> bool {
        let Some(entry) = self.frames.remove(&index) else {
            return false;
        };
        self.hq_indexes.remove(&index);
        self.release(&entry);
        self.sync_sizes();
        true
    }

    /// Drop everything, revoking every URL.
    pub fn clear(&mut self) {
        let count = self.frames.len();
        for (_, entry) in std::mem::take(&mut self.frames) {
            self.release(&entry);
        }
        self.hq_indexes.clear();
        self.sync_sizes();
        if count > 0 {
            debug!("FrameCache cleared: {} frames", count);
        }
    }

    fn sync_sizes(&self) {
        self.stats.set_sizes(self.frames.len(), self.hq_indexes.len());
    }
}

impl Drop for FrameCache {
    fn drop(&mut self) {
        self.clear();
    }
}
