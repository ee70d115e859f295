//! Loader actor and its host-side handle.
//!
//! `FrameLoaderWorker::spawn` starts three pieces:
//! - the actor thread, sole owner of the `FrameLoader`, fed by a channel of
//!   envelopes (host actions, finished fetches, shutdown)
//! - the fetch pool, running `FetchJob`s and posting results back
//! - the dispatcher thread, turning loader notifications into bus events
//!   and answering section pulls from the host's `SectionSource`
//!
//! Frame requests answer with the loader's `FrameTicket`; other actions
//! answer with an `Ack` that resolves once the actor applied them.

use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use log::{debug, info, trace, warn};
use thiserror::Error;

use super::cache_man::CacheManager;
use super::error::LoadError;
use super::event_bus::EventBus;
use super::fetch::{FrameFetcher, fetch_and_decode};
use super::frame_cache::{CacheStats, CacheStatsSnapshot, Tier};
use super::frame_events::{FrameLoadedEvent, SectionPageFailedEvent};
use super::loader::{Effect, FrameLoader, JobId, LoaderConfig};
use super::object_url::{FrameImage, ObjectUrlStore};
use super::pending::{Ack, FrameRef, FrameTicket, Pending};
use super::protocol::{Action, Notification};
use super::sections::{SectionSource, SlotSection, page_offset};
use super::workers::Workers;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("frame loader worker is not running")]
    Disconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub loader: LoaderConfig,
    pub fetch_workers: usize,
    pub page_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            loader: LoaderConfig::default(),
            fetch_workers: 4,
            page_size: 500,
        }
    }
}

enum Reply {
    Frame(Sender<FrameTicket>),
    Ack(Ack),
}

enum Envelope {
    Post { action: Action, reply: Reply },
    Fetched {
        id: JobId,
        epoch: u64,
        result: Result<Arc<FrameImage>, LoadError>,
    },
    /// A page the dispatcher pulled, tagged with the host generation it was pulled in
    Served {
        generation: u64,
        sections: Vec<SlotSection>,
    },
    /// Read cached frames for the given indexes
    Cached {
        indexes: Vec<i32>,
        reply: Sender<Vec<(i32, FrameRef)>>,
    },
    Shutdown,
}

/// Host state shared with the dispatcher.
///
/// `generation` counts cleanups. The actor counts the `Cleanup` actions it
/// applied the same way, so a page pulled in an older generation is dropped.
#[derive(Default)]
struct HostState {
    inner: Mutex<HostInner>,
}

#[derive(Default)]
struct HostInner {
    source: Option<Arc<dyn SectionSource>>,
    generation: u64,
    /// Page offsets already pushed in this generation
    served_pages: HashSet<i32>,
}

/// What the dispatcher may do about a pull.
enum Claim {
    Serve {
        generation: u64,
        source: Arc<dyn SectionSource>,
    },
    AlreadyServed,
    NoSource,
}

impl HostState {
    fn lock(&self) -> std::sync::MutexGuard<'_, HostInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_source(&self, source: Option<Arc<dyn SectionSource>>) {
        self.lock().source = source;
    }

    fn mark_served(&self, offset: i32) {
        self.lock().served_pages.insert(offset);
    }

    /// Claim `offset` for serving, capturing the source of the current generation.
    fn claim(&self, offset: i32) -> Claim {
        let mut inner = self.lock();
        let Some(source) = inner.source.clone() else {
            return Claim::NoSource;
        };
        if !inner.served_pages.insert(offset) {
            return Claim::AlreadyServed;
        }
        Claim::Serve {
            generation: inner.generation,
            source,
        }
    }

    /// Forget a failed page, unless a cleanup happened meanwhile.
    fn unmark_served(&self, offset: i32, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.served_pages.remove(&offset);
        }
    }

    /// Start a new generation. The source belongs to the old one and is dropped.
    fn next_generation(&self) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.served_pages.clear();
        inner.source = None;
        inner.generation
    }
}

/// Host handle to the loader actor. Dropping it stops the actor.
pub struct FrameLoaderWorker {
    tx: Sender<Envelope>,
    actor: Option<thread::JoinHandle<()>>,
    dispatcher: Option<thread::JoinHandle<()>>,
    host: Arc<HostState>,
    store: ObjectUrlStore,
    stats: Arc<CacheStats>,
    manager: Arc<CacheManager>,
    bus: EventBus,
    page_size: usize,
}

impl FrameLoaderWorker {
    pub fn spawn(
        config: TransportConfig,
        manager: Arc<CacheManager>,
        fetcher: Arc<dyn FrameFetcher>,
        bus: EventBus,
    ) -> io::Result<Self> {
        let store = ObjectUrlStore::new();
        let loader = FrameLoader::new(config.loader.clone(), Arc::clone(&manager), store.clone());
        let stats = loader.cache_stats();
        let workers = Workers::new(config.fetch_workers, manager.epoch_ref())?;

        let (tx, rx) = unbounded::<Envelope>();
        let (notify_tx, notify_rx) = unbounded::<Notification>();
        let host = Arc::new(HostState::default());

        let actor = {
            let tx = tx.clone();
            thread::Builder::new()
                .name("framestream-loader".into())
                .spawn(move || run_actor(loader, rx, tx, notify_tx, workers, fetcher))?
        };

        let dispatcher = {
            let tx = tx.clone();
            let bus = bus.clone();
            let host = Arc::clone(&host);
            let page_size = config.page_size;
            thread::Builder::new()
                .name("framestream-dispatch".into())
                .spawn(move || run_dispatcher(notify_rx, tx, bus, host, page_size))?
        };

        info!(
            "Frame loader worker started: concurrency={}, fetch_workers={}, page_size={}",
            config.loader.concurrency, config.fetch_workers, config.page_size
        );

        Ok(Self {
            tx,
            actor: Some(actor),
            dispatcher: Some(dispatcher),
            host,
            store,
            stats,
            manager,
            bus,
            page_size: config.page_size,
        })
    }

    // ========== Actions ==========

    pub fn push_sections(&self, sections: Vec<SlotSection>) -> Result<Ack, TransportError> {
        self.request_ack(Action::PushSections { sections })
    }

    /// Push a page fetched by the host itself, so the dispatcher won't ask for it again.
    pub fn push_page(&self, offset: i32, sections: Vec<SlotSection>) -> Result<Ack, TransportError> {
        self.host.mark_served(offset);
        self.push_sections(sections)
    }

    pub fn load_lq_frame(&self, index: i32) -> Result<FrameTicket, TransportError> {
        self.request_frame(Action::LoadLqFrame { index })
    }

    pub fn load_hq_frame(&self, index: i32) -> Result<FrameTicket, TransportError> {
        self.request_frame(Action::LoadHqFrame { index })
    }

    pub fn load_frame(&self, index: i32, tier: Tier) -> Result<FrameTicket, TransportError> {
        match tier {
            Tier::Lq => self.load_lq_frame(index),
            Tier::Hq => self.load_hq_frame(index),
        }
    }

    pub fn set_frames_to_load(&self, frames_indexes: Vec<i32>) -> Result<Ack, TransportError> {
        self.request_ack(Action::SetFramesToLoad { frames_indexes })
    }

    pub fn add_frames_to_load(&self, frames_indexes: Vec<i32>) -> Result<Ack, TransportError> {
        self.request_ack(Action::AddFramesToLoad { frames_indexes })
    }

    pub fn set_next_frame_to_load(&self, index: i32) -> Result<FrameTicket, TransportError> {
        self.request_frame(Action::SetNextFrameToLoad { index })
    }

    /// Reset the loader for a new item. Also clears the section source, so
    /// pages pulled from the previous item's source are never applied.
    pub fn cleanup(&self) -> Result<Ack, TransportError> {
        let generation = self.host.next_generation();
        debug!("Cleanup, host generation {}", generation);
        self.request_ack(Action::Cleanup)
    }

    /// Frames the loader has cached among `indexes`. Statistics are not touched.
    pub fn cached_frames(&self, indexes: Vec<i32>) -> Result<Vec<(i32, FrameRef)>, TransportError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(Envelope::Cached {
            indexes,
            reply: reply_tx,
        })?;
        reply_rx.recv().map_err(|_| TransportError::Disconnected)
    }

    // ========== Host state ==========

    /// Where section pulls are answered from. `None` leaves pulls to time out.
    pub fn set_section_source(&self, source: Option<Arc<dyn SectionSource>>) {
        self.host.set_source(source);
    }

    pub fn store(&self) -> &ObjectUrlStore {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// (usage, limit) in bytes
    pub fn mem(&self) -> (usize, usize) {
        self.manager.mem()
    }

    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.tx.send(envelope).map_err(|_| TransportError::Disconnected)
    }

    fn request_frame(&self, action: Action) -> Result<FrameTicket, TransportError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(Envelope::Post {
            action,
            reply: Reply::Frame(reply_tx),
        })?;
        reply_rx.recv().map_err(|_| TransportError::Disconnected)
    }

    fn request_ack(&self, action: Action) -> Result<Ack, TransportError> {
        let ack = Pending::new();
        self.send(Envelope::Post {
            action,
            reply: Reply::Ack(ack.clone()),
        })?;
        Ok(ack)
    }
}

impl Drop for FrameLoaderWorker {
    fn drop(&mut self) {
        let _ = self.tx.send(Envelope::Shutdown);
        if let Some(actor) = self.actor.take() {
            let _ = actor.join();
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }
        debug!("Frame loader worker stopped");
    }
}

// ========== Actor ==========

fn run_actor(
    mut loader: FrameLoader,
    rx: Receiver<Envelope>,
    tx: Sender<Envelope>,
    notify: Sender<Notification>,
    workers: Workers,
    fetcher: Arc<dyn FrameFetcher>,
) {
    let mut generation = 0u64;
    loop {
        let received = match loader.next_deadline() {
            Some(deadline) => rx.recv_deadline(deadline),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Envelope::Post { action, reply }) => {
                let name = action.name();
                if log::log_enabled!(log::Level::Trace) {
                    trace!("<- {}", serde_json::to_string(&action).unwrap_or_default());
                }
                if matches!(action, Action::Cleanup) {
                    generation += 1;
                }
                let ticket = apply(&mut loader, action);
                match reply {
                    Reply::Frame(sender) => {
                        let _ = sender.send(ticket.unwrap_or_else(|| Pending::resolved(None)));
                    }
                    Reply::Ack(ack) => {
                        ack.resolve(());
                        trace!("{} applied", name);
                    }
                }
            }
            Ok(Envelope::Fetched { id, epoch, result }) => loader.complete(id, epoch, result),
            Ok(Envelope::Served {
                generation: pulled_in,
                sections,
            }) => {
                if pulled_in == generation {
                    loader.push_sections(sections);
                } else {
                    debug!(
                        "Dropping {} sections pulled before cleanup (generation {} != {})",
                        sections.len(),
                        pulled_in,
                        generation
                    );
                }
            }
            Ok(Envelope::Cached { indexes, reply }) => {
                let frames = indexes
                    .into_iter()
                    .filter_map(|i| loader.cache().peek(i).map(|f| (i, f.to_ref())))
                    .collect();
                let _ = reply.send(frames);
            }
            Ok(Envelope::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        loader.expire_sections(Instant::now());
        flush(&mut loader, &workers, &fetcher, &tx, &notify);
    }

    loader.cleanup();
    debug!("Loader actor exited");
}

fn apply(loader: &mut FrameLoader, action: Action) -> Option<FrameTicket> {
    match action {
        Action::PushSections { sections } => {
            loader.push_sections(sections);
            None
        }
        Action::LoadLqFrame { index } => Some(loader.load_lq_frame(index)),
        Action::LoadHqFrame { index } => Some(loader.load_hq_frame(index)),
        Action::SetFramesToLoad { frames_indexes } => {
            loader.set_frames_to_load(frames_indexes);
            None
        }
        Action::AddFramesToLoad { frames_indexes } => {
            loader.add_frames_to_load(frames_indexes);
            None
        }
        Action::SetNextFrameToLoad { index } => Some(loader.set_next_frame_to_load(index)),
        Action::Cleanup => {
            loader.cleanup();
            None
        }
    }
}

fn flush(
    loader: &mut FrameLoader,
    workers: &Workers,
    fetcher: &Arc<dyn FrameFetcher>,
    tx: &Sender<Envelope>,
    notify: &Sender<Notification>,
) {
    for effect in loader.drain_effects() {
        match effect {
            Effect::Fetch(job) => {
                let fetcher = Arc::clone(fetcher);
                let tx = tx.clone();
                workers.execute_with_epoch(job.epoch, move || {
                    let result = fetch_and_decode(fetcher.as_ref(), &job.url);
                    let _ = tx.send(Envelope::Fetched {
                        id: job.id,
                        epoch: job.epoch,
                        result,
                    });
                });
            }
            Effect::Notify(note) => {
                let _ = notify.send(note);
            }
        }
    }
}

// ========== Dispatcher ==========

fn run_dispatcher(
    rx: Receiver<Notification>,
    tx: Sender<Envelope>,
    bus: EventBus,
    host: Arc<HostState>,
    page_size: usize,
) {
    for note in rx.iter() {
        match note {
            Notification::FrameLoaded {
                index,
                frame_object_url,
                is_hq,
            } => {
                bus.emit(FrameLoadedEvent {
                    index,
                    url: frame_object_url,
                    tier: if is_hq { Tier::Hq } else { Tier::Lq },
                });
            }
            Notification::GetSection { index } => serve_page(index, &tx, &bus, &host, page_size),
        }
    }
    trace!("Dispatcher exited");
}

fn serve_page(index: i32, tx: &Sender<Envelope>, bus: &EventBus, host: &HostState, page_size: usize) {
    let offset = page_offset(index, page_size);
    let (generation, source) = match host.claim(offset) {
        Claim::Serve { generation, source } => (generation, source),
        Claim::AlreadyServed => {
            trace!("Page {} already served, frame {} waits for timeout", offset, index);
            return;
        }
        Claim::NoSource => {
            warn!("No section source for frame {}", index);
            return;
        }
    };

    match source.load_page(offset, page_size) {
        Ok(sections) => {
            debug!("Serving page {} ({} sections) for frame {}", offset, sections.len(), index);
            let _ = tx.send(Envelope::Served { generation, sections });
        }
        Err(err) => {
            warn!("Section page {} for frame {} failed: {:#}", offset, index, err);
            host.unmark_served(offset, generation);
            bus.emit(SectionPageFailedEvent {
                index,
                offset,
                reason: err.to_string(),
            });
        }
    }
}

/// Wait for an ack, giving up after `timeout`.
pub fn wait_ack(ack: &Ack, timeout: Duration) -> bool {
    ack.wait_timeout(timeout).is_some()
}
