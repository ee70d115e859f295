//! Loading engine - sections, cache, scheduler, transport
//!
//! Independent of any view: everything here is driven through
//! `FrameLoaderWorker` and observed through the `EventBus`.

pub mod cache_man;
pub mod error;
pub mod event_bus;
pub mod fetch;
pub mod frame_cache;
pub mod frame_events;
pub mod loader;
pub mod object_url;
pub mod pending;
pub mod protocol;
pub mod sections;
pub mod transport;
pub mod workers;

#[cfg(test)]
pub(crate) mod testing;

pub use cache_man::CacheManager;
pub use error::LoadError;
pub use event_bus::EventBus;
pub use fetch::{FrameFetcher, UrlFetcher};
pub use frame_cache::{CacheStatsSnapshot, FrameCache, Tier};
pub use frame_events::FrameLoadedEvent;
pub use loader::{FrameLoader, LoaderConfig};
pub use object_url::{FrameImage, ObjectUrl, ObjectUrlStore};
pub use pending::{Ack, FrameRef, FrameTicket, Pending};
pub use protocol::{Action, Notification};
pub use sections::{SectionSource, SlotSection};
pub use transport::{FrameLoaderWorker, TransportConfig, TransportError};
pub use workers::Workers;
