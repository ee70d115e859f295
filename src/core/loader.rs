//! Frame loader: pending set, bounded scheduling, LQ/HQ fetches.
//!
//! The loader is a plain state machine. It never blocks and never spawns:
//! every operation updates state and queues `Effect`s (fetch jobs to run,
//! notifications for the host) that the owner drains with
//! `drain_effects()`. Finished fetches come back through `complete()`.
//!
//! Scheduling: while frames are pending and fewer than `concurrency` are in
//! the loading map, the loader takes the pending index nearest to `current`
//! (ties go forward), starts its LQ fetch and moves `current` there. A seek
//! (`set_next_frame_to_load`) starts its fetch immediately, outside the
//! bound, and re-centers the scan on the sought index.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use super::cache_man::CacheManager;
use super::error::LoadError;
use super::frame_cache::{CacheInsert, CacheStats, FrameCache, Tier};
use super::object_url::{FrameImage, ObjectUrlStore};
use super::pending::{FrameRef, FrameTicket, Pending};
use super::protocol::Notification;
use super::sections::{SectionRegistry, SlotSection};

pub type JobId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Scheduler slots (seeks and direct loads are not counted)
    pub concurrency: usize,
    /// Re-enqueues of a failed scheduled/seek fetch before giving up
    pub max_retries: u32,
    pub max_cached_frames: usize,
    pub section_timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_retries: 2,
            max_cached_frames: 2000,
            section_timeout: Duration::from_secs(10),
        }
    }
}

/// Who asked for a fetch. Ordered by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Origin {
    /// `load_lq_frame` / `load_hq_frame`
    Direct,
    /// Picked by the scheduler from the pending set
    Scheduled,
    /// `set_next_frame_to_load`
    Seek,
}

/// Work for the fetch pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub id: JobId,
    pub epoch: u64,
    pub index: i32,
    pub tier: Tier,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Fetch(FetchJob),
    Notify(Notification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    AwaitingSection,
    Fetching,
}

#[derive(Debug)]
struct Load {
    index: i32,
    /// Tier the caller asked for
    requested: Tier,
    /// Tier being fetched (promoted to HQ when only an HQ url exists)
    tier: Tier,
    origin: Origin,
    stage: Stage,
    ticket: FrameTicket,
}

/// Pending index nearest to `target`; on equal distance the higher one.
pub(crate) fn nearest(pending: &BTreeSet<i32>, target: i32) -> Option<i32> {
    let after = pending.range(target..).next().copied();
    let before = pending.range(..target).next_back().copied();
    match (before, after) {
        (Some(b), Some(a)) => {
            let da = i64::from(a) - i64::from(target);
            let db = i64::from(target) - i64::from(b);
            Some(if da <= db { a } else { b })
        }
        (b, a) => a.or(b),
    }
}

pub struct FrameLoader {
    config: LoaderConfig,
    manager: Arc<CacheManager>,
    cache: FrameCache,
    sections: SectionRegistry,
    pending: BTreeSet<i32>,
    /// Scheduler slots: index -> ticket of its in-flight fetch
    loading: HashMap<i32, FrameTicket>,
    loads: HashMap<JobId, Load>,
    current: Option<i32>,
    next: Option<i32>,
    failures: HashMap<i32, u32>,
    effects: Vec<Effect>,
    next_job_id: JobId,
}

impl FrameLoader {
    pub fn new(config: LoaderConfig, manager: Arc<CacheManager>, store: ObjectUrlStore) -> Self {
        let cache = FrameCache::new(config.max_cached_frames, Arc::clone(&manager), store);
        let sections = SectionRegistry::new(config.section_timeout);
        debug!(
            "FrameLoader created: concurrency={}, max_retries={}, section_timeout={:?}",
            config.concurrency, config.max_retries, config.section_timeout
        );
        Self {
            config,
            manager,
            cache,
            sections,
            pending: BTreeSet::new(),
            loading: HashMap::new(),
            loads: HashMap::new(),
            current: None,
            next: None,
            failures: HashMap::new(),
            effects: Vec::new(),
            next_job_id: 1,
        }
    }

    // ========== Host operations ==========

    /// Replace the pending set and restart the scan from its lowest index.
    /// An empty set stops scheduling; in-flight fetches still finish.
    pub fn set_frames_to_load(&mut self, indexes: impl IntoIterator<Item = i32>) {
        self.pending = indexes.into_iter().collect();
        if let Some(first) = self.pending.first() {
            self.current = Some(*first);
        }
        debug!("Frames to load: {} pending, current {:?}", self.pending.len(), self.current);
        self.pump();
    }

    /// Union into the pending set; the scan position is kept.
    pub fn add_frames_to_load(&mut self, indexes: impl IntoIterator<Item = i32>) {
        let before = self.pending.len();
        self.pending.extend(indexes);
        debug!("Frames added: {} -> {} pending", before, self.pending.len());
        self.pump();
    }

    /// Seek: fetch `index` now and re-center scheduling on it.
    ///
    /// A fetch already in the loading map for `index` is shared: the same
    /// ticket is returned.
    pub fn set_next_frame_to_load(&mut self, index: i32) -> FrameTicket {
        self.next = Some(index);

        if let Some(ticket) = self.loading.get(&index) {
            trace!("Seek {} joins in-flight fetch", index);
            let ticket = ticket.clone();
            self.pump();
            return ticket;
        }

        let ticket = self.load_frame(index, Tier::Lq, true, Origin::Seek);
        if !ticket.is_resolved() {
            self.loading.insert(index, ticket.clone());
        }
        self.pending.remove(&index);
        self.pump();
        ticket
    }

    pub fn load_lq_frame(&mut self, index: i32) -> FrameTicket {
        self.load_frame(index, Tier::Lq, true, Origin::Direct)
    }

    pub fn load_hq_frame(&mut self, index: i32) -> FrameTicket {
        self.load_frame(index, Tier::Hq, true, Origin::Direct)
    }

    /// Register sections and resume fetches that were waiting for them.
    pub fn push_sections(&mut self, sections: Vec<SlotSection>) {
        self.sections.insert(sections);

        let mut ready: Vec<JobId> = self
            .loads
            .iter()
            .filter(|(_, load)| {
                load.stage == Stage::AwaitingSection && self.sections.contains(load.index)
            })
            .map(|(id, _)| *id)
            .collect();
        ready.sort_unstable();
        for id in ready {
            self.dispatch(id);
        }
        self.pump();
    }

    /// A fetch job finished. Results from before the last `cleanup()` are dropped.
    pub fn complete(&mut self, id: JobId, epoch: u64, result: Result<Arc<FrameImage>, LoadError>) {
        if epoch != self.epoch() {
            debug!("Dropping stale result for job {} (epoch {} != {})", id, epoch, self.epoch());
            return;
        }
        let Some(load) = self.loads.remove(&id) else {
            trace!("Result for unknown job {}", id);
            return;
        };

        match result {
            Ok(image) => {
                let inserted = self.cache.insert(load.index, load.tier, image, self.current);
                if let CacheInsert::Stored(frame) = &inserted {
                    self.effects.push(Effect::Notify(Notification::FrameLoaded {
                        index: load.index,
                        frame_object_url: frame.url.clone(),
                        is_hq: frame.is_hq(),
                    }));
                }
                trace!("Frame {} loaded ({:?})", load.index, inserted.frame().tier);
                self.failures.remove(&load.index);
                self.settle(&load, Some(inserted.frame().clone()));
            }
            Err(err) => self.fail(load, err),
        }
        self.pump();
    }

    /// Fail fetches whose section pull passed its deadline.
    pub fn expire_sections(&mut self, now: Instant) {
        let expired = self.sections.expire(now);
        if expired.is_empty() {
            return;
        }
        for index in expired {
            let mut ids: Vec<JobId> = self
                .loads
                .iter()
                .filter(|(_, load)| load.index == index && load.stage == Stage::AwaitingSection)
                .map(|(id, _)| *id)
                .collect();
            ids.sort_unstable();
            for id in ids {
                if let Some(load) = self.loads.remove(&id) {
                    self.fail(load, LoadError::SectionTimeout { index });
                }
            }
        }
        self.pump();
    }

    /// Earliest section-pull deadline, for the owner's wait loop.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sections.next_deadline()
    }

    /// Reset to the freshly constructed state. Outstanding tickets resolve
    /// to `None`, cached URLs are revoked, and results of fetches already
    /// running are discarded when they arrive.
    pub fn cleanup(&mut self) {
        let epoch = self.manager.increment_epoch();
        let outstanding = self.loads.len();

        for (_, load) in self.loads.drain() {
            load.ticket.resolve(None);
        }
        for (_, ticket) in self.loading.drain() {
            ticket.resolve(None);
        }
        self.pending.clear();
        self.sections.clear();
        self.cache.clear();
        self.failures.clear();
        self.effects.clear();
        self.current = None;
        self.next = None;

        info!("FrameLoader cleanup: epoch {}, {} loads cancelled", epoch, outstanding);
    }

    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // ========== Queries ==========

    pub fn epoch(&self) -> u64 {
        self.manager.current_epoch()
    }

    pub fn current(&self) -> Option<i32> {
        self.current
    }

    pub fn next(&self) -> Option<i32> {
        self.next
    }

    pub fn pending(&self) -> &BTreeSet<i32> {
        &self.pending
    }

    pub fn is_pending(&self, index: i32) -> bool {
        self.pending.contains(&index)
    }

    /// Indexes occupying scheduler slots.
    pub fn loading_indexes(&self) -> Vec<i32> {
        let mut indexes: Vec<i32> = self.loading.keys().copied().collect();
        indexes.sort_unstable();
        indexes
    }

    pub fn in_flight(&self) -> usize {
        self.loading.len()
    }

    /// Every unfinished fetch, scheduled or not.
    pub fn outstanding(&self) -> usize {
        self.loads.len()
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> Arc<CacheStats> {
        self.cache.stats()
    }

    pub fn sections(&self) -> &SectionRegistry {
        &self.sections
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    // ========== Internals ==========

    fn pump(&mut self) {
        if let Some(next) = self.next.take() {
            self.current = Some(next);
        }

        while self.loading.len() < self.config.concurrency {
            let Some(&first) = self.pending.first() else {
                break;
            };
            let target = self.current.unwrap_or(first);
            let Some(index) = nearest(&self.pending, target) else {
                break;
            };

            // Must run while `index` is still pending
            let ticket = self.load_frame(index, Tier::Lq, false, Origin::Scheduled);
            self.pending.remove(&index);
            if !ticket.is_resolved() {
                self.loading.insert(index, ticket);
            }
            self.current = Some(index);
        }
    }

    fn load_frame(&mut self, index: i32, tier: Tier, force: bool, origin: Origin) -> FrameTicket {
        if let Some(cached) = self.cache.get(index) {
            if tier == Tier::Lq || cached.tier == Tier::Hq {
                trace!("Frame {} cache hit ({:?})", index, cached.tier);
                return Pending::resolved(Some(cached.to_ref()));
            }
        }

        let hq_upgrade = tier == Tier::Hq && !self.cache.has_hq(index);
        if !force && !self.pending.contains(&index) && !hq_upgrade {
            trace!("Frame {} no longer wanted", index);
            return Pending::resolved(None);
        }

        if let Some(load) = self
            .loads
            .values_mut()
            .find(|load| load.index == index && load.requested == tier)
        {
            load.origin = load.origin.max(origin);
            return load.ticket.clone();
        }

        let id = self.next_job_id;
        self.next_job_id += 1;
        let ticket = Pending::new();
        self.loads.insert(
            id,
            Load {
                index,
                requested: tier,
                tier,
                origin,
                stage: Stage::AwaitingSection,
                ticket: ticket.clone(),
            },
        );

        if self.sections.contains(index) {
            self.dispatch(id);
        } else if self.sections.request(index, Instant::now()) {
            debug!("Frame {} waits for its section", index);
            self.effects
                .push(Effect::Notify(Notification::GetSection { index }));
        }
        ticket
    }

    fn dispatch(&mut self, id: JobId) {
        let epoch = self.epoch();
        let Some(load) = self.loads.get_mut(&id) else {
            return;
        };
        let resolved = self
            .sections
            .get(load.index)
            .and_then(|section| section.resolve_url(load.requested))
            .map(|(url, tier)| (url.to_owned(), tier));

        match resolved {
            Some((url, tier)) => {
                load.stage = Stage::Fetching;
                load.tier = tier;
                trace!("Fetch job {}: frame {} {:?} <- {}", id, load.index, tier, url);
                self.effects.push(Effect::Fetch(FetchJob {
                    id,
                    epoch,
                    index: load.index,
                    tier,
                    url,
                }));
            }
            None => {
                let index = load.index;
                if let Some(load) = self.loads.remove(&id) {
                    self.fail(load, LoadError::MissingUrl { index });
                }
            }
        }
    }

    fn settle(&mut self, load: &Load, value: Option<FrameRef>) {
        load.ticket.resolve(value);
        let owns_slot = self
            .loading
            .get(&load.index)
            .is_some_and(|ticket| ticket.ptr_eq(&load.ticket));
        if owns_slot {
            self.loading.remove(&load.index);
        }
    }

    fn fail(&mut self, load: Load, err: LoadError) {
        warn!("Frame {} ({:?}) failed: {}", load.index, load.tier, err);
        self.settle(&load, None);

        if load.origin == Origin::Direct || !err.is_retryable() {
            return;
        }
        let attempts = self.failures.entry(load.index).or_insert(0);
        *attempts += 1;
        if *attempts <= self.config.max_retries {
            debug!("Frame {} re-enqueued (attempt {})", load.index, attempts);
            self.pending.insert(load.index);
        } else {
            debug!("Frame {} dropped after {} failures", load.index, attempts);
        }
    }
}
