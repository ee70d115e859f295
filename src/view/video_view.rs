//! Video view: drives the loader for one item and shows its frames.
//!
//! The view never blocks on the loader. Requests return tickets that are
//! polled from `update(now)`; `FrameLoadedEvent`s arrive through a bus
//! subscription into an inbox channel and are applied on the next update.
//!
//! Frame data is mirrored per origin index in `LoadedFrame`. A mirror entry
//! that has HQ never goes back to LQ, and events for indexes outside the
//! current frame set are dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, info, trace, warn};

use crate::core::event_bus::Subscription;
use crate::core::sections::page_offset;
use crate::core::{FrameLoadedEvent, FrameLoaderWorker, FrameRef, FrameTicket, ObjectUrl, Tier};
use crate::render::{Canvas, RenderLayer};

use super::item::VideoItem;
use super::playback::{PlaybackClock, PlaybackState};
use super::translator::FrameIndexTranslator;
use super::view_events::{FrameChangedEvent, PlaybackStateChanged};
use super::viewport::Viewport;

/// Render entry painting the current frame
pub const IMAGE_ENTRY: &str = "image";

/// Object URLs known for one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedFrame {
    pub lq: Option<ObjectUrl>,
    pub hq: Option<ObjectUrl>,
}

impl LoadedFrame {
    /// HQ when present, else LQ.
    pub fn best(&self) -> Option<(&ObjectUrl, Tier)> {
        match (&self.hq, &self.lq) {
            (Some(hq), _) => Some((hq, Tier::Hq)),
            (None, Some(lq)) => Some((lq, Tier::Lq)),
            (None, None) => None,
        }
    }

    /// Apply a loaded URL. Returns false when nothing changed.
    fn record(&mut self, url: ObjectUrl, tier: Tier) -> bool {
        match tier {
            Tier::Hq => {
                if self.hq.as_ref() == Some(&url) {
                    return false;
                }
                self.hq = Some(url);
                self.lq = None;
                true
            }
            Tier::Lq => {
                if self.hq.is_some() || self.lq.as_ref() == Some(&url) {
                    return false;
                }
                self.lq = Some(url);
                true
            }
        }
    }
}

#[derive(Debug)]
struct SeekRequest {
    zero: usize,
    origin: i32,
    ticket: FrameTicket,
    reset_zoom: bool,
}

pub struct VideoView {
    worker: Arc<FrameLoaderWorker>,
    default_fps: f32,

    item: Option<VideoItem>,
    frames_group: Option<Vec<i32>>,
    translator: FrameIndexTranslator,
    loaded: HashMap<i32, LoadedFrame>,

    current: usize,
    shown_origin: Option<i32>,
    state: PlaybackState,
    clock: PlaybackClock,

    seek: Option<SeekRequest>,
    upgrades: HashMap<i32, FrameTicket>,
    /// Playback waits here for a frame that had no data on its tick
    holding: Option<(i32, FrameTicket)>,

    inbox_tx: Sender<FrameLoadedEvent>,
    inbox_rx: Receiver<FrameLoadedEvent>,
    subscription: Option<Subscription>,

    viewport: Arc<Mutex<Viewport>>,
    layer: RenderLayer<Canvas>,
    canvas: Canvas,
}

impl VideoView {
    pub fn new(worker: Arc<FrameLoaderWorker>, default_fps: f32, width: u32, height: u32) -> Self {
        let (inbox_tx, inbox_rx) = unbounded();
        let mut layer = RenderLayer::new("video");
        layer.on_render(|canvas: &mut Canvas| canvas.mark_painted());

        Self {
            worker,
            default_fps,
            item: None,
            frames_group: None,
            translator: FrameIndexTranslator::new(),
            loaded: HashMap::new(),
            current: 0,
            shown_origin: None,
            state: PlaybackState::Idle,
            clock: PlaybackClock::new(default_fps),
            seek: None,
            upgrades: HashMap::new(),
            holding: None,
            inbox_tx,
            inbox_rx,
            subscription: None,
            viewport: Arc::new(Mutex::new(Viewport::new(width, height))),
            layer,
            canvas: Canvas::new(width, height),
        }
    }

    // ========== Item ==========

    /// Load `item` and show its first frame. `frames_group` restricts the
    /// playable frames to a subset of the item's indexes.
    pub fn set_item(&mut self, item: VideoItem, frames_group: Option<Vec<i32>>) -> anyhow::Result<()> {
        let item_changed = self.item.as_ref().is_some_and(|prev| prev.id != item.id);

        self.release_subscription();
        self.reset_frame_state();
        self.subscribe();
        self.install_image_entry();

        if item_changed {
            info!("Item changed, cleaning loader");
            self.worker.cleanup()?;
        }

        self.clock.set_fps(item.fps.unwrap_or(self.default_fps));
        self.worker.set_section_source(Some(Arc::clone(&item.sections)));

        let page_size = self.worker.page_size();
        let first = item.frames.iter().min().copied().unwrap_or(0);
        let offset = page_offset(first, page_size);
        let page = match item.sections.load_page(offset, page_size) {
            Ok(page) => page,
            Err(err) => {
                // The loader pulls the page again on demand
                warn!("First section page of '{}' failed: {:#}", item.id, err);
                Vec::new()
            }
        };

        let frames: Vec<i32> = match frames_group.as_ref().filter(|g| !g.is_empty()) {
            Some(group) => group.clone(),
            None if !item.frames.is_empty() => item.frames.clone(),
            None => page.iter().map(|s| s.section_index).collect(),
        };
        if !page.is_empty() {
            self.worker.push_page(offset, page)?;
        }

        self.translator.set_frames_indexes(frames);
        if !item_changed {
            self.seed_from_cache()?;
        }
        let missing: Vec<i32> = self
            .translator
            .indexes()
            .iter()
            .copied()
            .filter(|i| !self.has_frame_data(*i))
            .collect();
        debug!("Item '{}': {} frames, {} to load", item.id, self.translator.total_frames(), missing.len());
        self.worker.set_frames_to_load(missing)?;

        info!("Item '{}' ({:?}) set", item.id, item.kind);
        self.item = Some(item);
        self.frames_group = frames_group;
        self.jump_to_frame(0, true);
        Ok(())
    }

    /// Stop playback and drop the item, its frames and the loader state.
    pub fn cleanup(&mut self) {
        self.release_subscription();
        self.reset_frame_state();
        self.item = None;
        self.frames_group = None;
        self.translator.clear();
        self.layer.clear();
        self.worker.set_section_source(None);
        if let Err(err) = self.worker.cleanup() {
            warn!("Loader cleanup failed: {}", err);
        }
    }

    // ========== Seeking ==========

    /// Show the frame at zero-based `zero_index`. Out of range is a no-op.
    pub fn jump_to_frame(&mut self, zero_index: usize, reset_zoom: bool) {
        if self.item.is_none() || self.translator.is_empty() {
            trace!("Seek to {} ignored: nothing loaded", zero_index);
            return;
        }
        if zero_index >= self.translator.total_frames() {
            trace!(
                "Seek to {} ignored: {} frames",
                zero_index,
                self.translator.total_frames()
            );
            return;
        }

        let origin = self.translator.to_origin_based(zero_index);
        self.current = zero_index;
        self.holding = None;

        match self.worker.set_next_frame_to_load(origin) {
            Ok(ticket) => {
                debug!("Seek to frame {} ({})", origin, zero_index);
                self.seek = Some(SeekRequest {
                    zero: zero_index,
                    origin,
                    ticket,
                    reset_zoom,
                });
                self.set_state(self.state.on_seek(zero_index));
                self.poll_seek();
            }
            Err(err) => warn!("Seek to frame {} failed: {}", origin, err),
        }
    }

    fn poll_seek(&mut self) {
        let Some(result) = self.seek.as_ref().and_then(|s| s.ticket.try_get()) else {
            return;
        };
        let Some(seek) = self.seek.take() else {
            return;
        };

        match result {
            Some(frame) => {
                self.apply_frame(seek.origin, frame);
                if self.current == seek.zero {
                    self.show_frame(seek.origin, seek.reset_zoom);
                    self.request_upgrade(seek.origin);
                }
            }
            None => warn!("Frame {} did not load", seek.origin),
        }

        if let Some(next) = self.state.on_seek_done(seek.zero) {
            self.set_state(next);
        }
    }

    /// Block until the running seek resolves, then apply everything that
    /// arrived. Returns false on timeout.
    pub fn settle(&mut self, timeout: Duration) -> bool {
        if let Some(seek) = &self.seek {
            if seek.ticket.wait_timeout(timeout).is_none() {
                return false;
            }
        }
        self.drain_inbox();
        self.poll_seek();
        self.poll_upgrades();
        self.seek.is_none()
    }

    // ========== Playback ==========

    pub fn play_video(&mut self, now: Instant) {
        let Some(next) = self.state.on_play() else {
            debug!("Play ignored: nothing loaded");
            return;
        };
        self.clock.start(now);
        self.set_state(next);
    }

    /// Stop playback and upgrade the displayed frame to HQ where the item supports it.
    pub fn stop_video(&mut self) {
        self.clock.stop();
        self.holding = None;
        self.set_state(self.state.on_stop());
        if let Some(origin) = self.current_frame_index() {
            self.request_upgrade(origin);
        }
    }

    /// Apply arrived frames, resolved tickets and due playback ticks.
    pub fn update(&mut self, now: Instant) {
        self.drain_inbox();
        self.poll_seek();
        self.poll_upgrades();
        self.poll_holding();
        self.tick_playback(now);
    }

    fn tick_playback(&mut self, now: Instant) {
        if self.state != PlaybackState::Playing || !self.clock.tick(now) {
            return;
        }
        let total = self.translator.total_frames();
        if total == 0 {
            return;
        }

        let next_zero = (self.current + 1) % total;
        let origin = self.translator.to_origin_based(next_zero);
        if self.has_frame_data(origin) {
            self.current = next_zero;
            self.show_frame(origin, false);
            return;
        }

        if self.holding.as_ref().is_some_and(|(held, _)| *held == origin) {
            trace!("Playback holding at frame {}", origin);
            return;
        }
        match self.worker.set_next_frame_to_load(origin) {
            Ok(ticket) => {
                debug!("Playback holding: frame {} has no data", origin);
                self.holding = Some((origin, ticket));
            }
            Err(err) => warn!("Frame {} request failed: {}", origin, err),
        }
    }

    fn poll_holding(&mut self) {
        let Some(result) = self.holding.as_ref().and_then(|(_, t)| t.try_get()) else {
            return;
        };
        let Some((origin, _)) = self.holding.take() else {
            return;
        };
        match result {
            Some(frame) => self.apply_frame(origin, frame),
            None => debug!("Held frame {} did not load, retrying on next tick", origin),
        }
    }

    // ========== Frames ==========

    fn drain_inbox(&mut self) {
        while let Ok(event) = self.inbox_rx.try_recv() {
            self.apply_frame(
                event.index,
                FrameRef {
                    url: event.url,
                    tier: event.tier,
                },
            );
        }
    }

    fn poll_upgrades(&mut self) {
        let done: Vec<(i32, Option<FrameRef>)> = self
            .upgrades
            .iter()
            .filter_map(|(origin, ticket)| ticket.try_get().map(|r| (*origin, r)))
            .collect();
        for (origin, result) in done {
            self.upgrades.remove(&origin);
            match result {
                Some(frame) => self.apply_frame(origin, frame),
                None => debug!("HQ upgrade of frame {} did not load", origin),
            }
        }
    }

    /// Record a loaded frame and refresh the viewport if it is on screen.
    fn apply_frame(&mut self, origin: i32, frame: FrameRef) {
        if !self.translator.contains(origin) {
            trace!("Dropping frame {}: not in the current set", origin);
            return;
        }
        let tier = frame.tier;
        if !self.loaded.entry(origin).or_default().record(frame.url, tier) {
            return;
        }

        if self.current_frame_index() != Some(origin) {
            return;
        }
        let better = self.shown_origin != Some(origin)
            || self.viewport_lock().shown_tier().is_none_or(|shown| shown < tier);
        if better {
            self.show_frame(origin, false);
        }
    }

    /// Put the best known data for `origin` on screen.
    fn show_frame(&mut self, origin: i32, reset_zoom: bool) -> bool {
        let Some((url, tier)) = self
            .loaded
            .get(&origin)
            .and_then(|f| f.best())
            .map(|(url, tier)| (url.clone(), tier))
        else {
            return false;
        };
        let Some(image) = self.worker.store().resolve(&url) else {
            debug!("Frame {} was evicted", origin);
            self.loaded.remove(&origin);
            return false;
        };

        self.viewport_lock().set_image(url, tier, image, reset_zoom);
        if self.shown_origin != Some(origin) {
            self.shown_origin = Some(origin);
            self.worker.bus().emit(FrameChangedEvent {
                origin,
                zero_based: self.current,
            });
        }
        self.layer.changed();
        trace!("Showing frame {} ({:?})", origin, tier);
        true
    }

    fn request_upgrade(&mut self, origin: i32) {
        let Some(item) = &self.item else {
            return;
        };
        if !item.kind.upgrades_to_hq()
            || self.upgrades.contains_key(&origin)
            || self.loaded.get(&origin).is_some_and(|f| f.hq.is_some())
        {
            return;
        }
        match self.worker.load_hq_frame(origin) {
            Ok(ticket) => {
                trace!("HQ upgrade requested for frame {}", origin);
                self.upgrades.insert(origin, ticket);
            }
            Err(err) => warn!("HQ upgrade of frame {} failed: {}", origin, err),
        }
    }

    /// Mirror frames the loader already holds, since cache hits emit no `FrameLoadedEvent`.
    fn seed_from_cache(&mut self) -> anyhow::Result<()> {
        let cached = self.worker.cached_frames(self.translator.indexes().to_vec())?;
        let count = cached.len();
        for (origin, frame) in cached {
            self.loaded.entry(origin).or_default().record(frame.url, frame.tier);
        }
        if count > 0 {
            debug!("{} frames already cached", count);
        }
        Ok(())
    }

    fn has_frame_data(&self, origin: i32) -> bool {
        self.loaded
            .get(&origin)
            .and_then(|f| f.best())
            .is_some_and(|(url, _)| self.worker.store().contains(url))
    }

    // ========== Rendering ==========

    /// Paint the layer if anything changed. Returns whether a pass ran.
    pub fn render(&mut self) -> bool {
        self.layer.render(&mut self.canvas)
    }

    fn install_image_entry(&mut self) {
        let viewport = Arc::clone(&self.viewport);
        self.layer.add(IMAGE_ENTRY, move |canvas: &mut Canvas| {
            viewport.lock().unwrap_or_else(|e| e.into_inner()).paint(canvas)
        });
    }

    // ========== State ==========

    fn set_state(&mut self, next: PlaybackState) {
        if next == self.state {
            return;
        }
        if !next.is_playing() {
            self.clock.stop();
        }
        debug!("Playback: {} -> {}", self.state.name(), next.name());
        let from = std::mem::replace(&mut self.state, next);
        self.worker.bus().emit(PlaybackStateChanged { from, to: next });
    }

    fn subscribe(&mut self) {
        let tx = self.inbox_tx.clone();
        let sub = self
            .worker
            .bus()
            .subscribe::<FrameLoadedEvent, _>(move |event| {
                let _ = tx.send(event.clone());
            });
        self.subscription = Some(sub);
    }

    fn release_subscription(&mut self) {
        if let Some(sub) = self.subscription.take() {
            self.worker.bus().unsubscribe(sub);
        }
    }

    fn reset_frame_state(&mut self) {
        self.clock.stop();
        self.set_state(self.state.on_reset());
        self.loaded.clear();
        self.seek = None;
        self.upgrades.clear();
        self.holding = None;
        self.current = 0;
        self.shown_origin = None;
        self.viewport_lock().clear_image();
        while self.inbox_rx.try_recv().is_ok() {}
    }

    fn viewport_lock(&self) -> MutexGuard<'_, Viewport> {
        self.viewport.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========== Queries ==========

    /// Origin index of the current frame.
    pub fn current_frame_index(&self) -> Option<i32> {
        if self.item.is_none() || self.translator.is_empty() {
            return None;
        }
        Some(self.translator.to_origin_based(self.current))
    }

    pub fn zero_based_current_frame(&self) -> usize {
        self.current
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// True while a seek or a held playback frame is outstanding.
    pub fn is_image_loading(&self) -> bool {
        self.seek.is_some() || self.holding.is_some()
    }

    pub fn loaded_frame(&self, origin: i32) -> Option<&LoadedFrame> {
        self.loaded.get(&origin)
    }

    pub fn translator(&self) -> &FrameIndexTranslator {
        &self.translator
    }

    pub fn viewport(&self) -> &Arc<Mutex<Viewport>> {
        &self.viewport
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn item(&self) -> Option<&VideoItem> {
        self.item.as_ref()
    }

    pub fn frames_group(&self) -> Option<&[i32]> {
        self.frames_group.as_deref()
    }

    pub fn layer_mut(&mut self) -> &mut RenderLayer<Canvas> {
        &mut self.layer
    }

    pub fn worker(&self) -> &Arc<FrameLoaderWorker> {
        &self.worker
    }
}

impl Drop for VideoView {
    fn drop(&mut self) {
        self.release_subscription();
    }
}
