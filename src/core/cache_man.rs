//! Memory budget for decoded frames plus the loader epoch.
//!
//! The frame cache reports every decoded image it holds here; once usage
//! crosses the limit the cache evicts frames farthest from the playhead.
//! The epoch counter is shared with the fetch pool: `cleanup()` bumps it so
//! queued fetches from the previous item are skipped.

use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use sysinfo::System;

#[derive(Debug)]
pub struct CacheManager {
    /// Bytes of decoded pixels currently held
    memory_usage: Arc<AtomicUsize>,
    /// Limit in bytes
    max_memory_bytes: AtomicUsize,
    /// Bumped on cleanup, checked by fetch jobs
    current_epoch: Arc<AtomicU64>,
}

fn usable_memory(mem_fraction: f64, reserve_gb: f64) -> (usize, usize, usize) {
    let mut sys = System::new();
    sys.refresh_memory();

    let available = sys.available_memory() as usize;
    let reserve = (reserve_gb * 1024.0 * 1024.0 * 1024.0) as usize;
    let usable = available.saturating_sub(reserve);
    let limit = (usable as f64 * mem_fraction.clamp(0.0, 1.0)) as usize;
    (available, reserve, limit)
}

impl CacheManager {
    /// Budget a fraction of available memory, keeping `reserve_gb` for the system.
    pub fn new(mem_fraction: f64, reserve_gb: f64) -> Self {
        let (available, reserve, max_memory_bytes) = usable_memory(mem_fraction, reserve_gb);

        info!(
            "CacheManager init: available={} MB, reserve={} MB, limit={} MB ({}%)",
            available / 1024 / 1024,
            reserve / 1024 / 1024,
            max_memory_bytes / 1024 / 1024,
            (mem_fraction * 100.0) as u32
        );

        Self::with_limit(max_memory_bytes)
    }

    /// Fixed byte limit, no system query.
    pub fn with_limit(max_memory_bytes: usize) -> Self {
        Self {
            memory_usage: Arc::new(AtomicUsize::new(0)),
            max_memory_bytes: AtomicUsize::new(max_memory_bytes),
            current_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Increment epoch and return new value
    pub fn increment_epoch(&self) -> u64 {
        let new_epoch = self.current_epoch.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Epoch incremented: {}", new_epoch);
        new_epoch
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::Relaxed)
    }

    /// Shared epoch counter (for Workers)
    pub fn epoch_ref(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.current_epoch)
    }

    pub fn check_memory_limit(&self) -> bool {
        self.memory_usage.load(Ordering::Relaxed) > self.max_memory_bytes.load(Ordering::Relaxed)
    }

    /// (usage, limit) in bytes
    pub fn mem(&self) -> (usize, usize) {
        let usage = self.memory_usage.load(Ordering::Relaxed);
        let limit = self.max_memory_bytes.load(Ordering::Relaxed);
        (usage, limit)
    }

    pub fn mem_usage_fraction(&self) -> f64 {
        let (usage, limit) = self.mem();
        if limit == 0 {
            0.0
        } else {
            usage as f64 / limit as f64
        }
    }

    pub fn add_memory(&self, bytes: usize) {
        let new_usage = self.memory_usage.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let limit = self.max_memory_bytes.load(Ordering::Relaxed);
        if new_usage > limit {
            debug!(
                "Memory limit exceeded: {} MB / {} MB",
                new_usage / 1024 / 1024,
                limit / 1024 / 1024
            );
        }
    }

    /// Saturating: never underflows
    pub fn free_memory(&self, bytes: usize) {
        let _ = self
            .memory_usage
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    pub fn set_memory_limit(&self, mem_fraction: f64, reserve_gb: f64) {
        let (_, _, new_limit) = usable_memory(mem_fraction, reserve_gb);
        self.max_memory_bytes.store(new_limit, Ordering::Relaxed);

        info!(
            "Memory limit updated: {} MB ({}%)",
            new_limit / 1024 / 1024,
            (mem_fraction * 100.0) as u32
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_manager_creation() {
        let manager = CacheManager::new(0.5, 1.0);
        assert_eq!(manager.current_epoch(), 0);

        let (usage, _limit) = manager.mem();
        assert_eq!(usage, 0);
    }

    #[test]
    fn test_epoch_increment() {
        let manager = CacheManager::with_limit(1024);
        let shared = manager.epoch_ref();

        assert_eq!(manager.increment_epoch(), 1);
        assert_eq!(manager.increment_epoch(), 2);
        assert_eq!(shared.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_memory_tracking() {
        let manager = CacheManager::with_limit(1024 * 1024);

        manager.add_memory(1024 * 1024);
        assert!(!manager.check_memory_limit());
        manager.add_memory(1);
        assert!(manager.check_memory_limit());

        manager.free_memory(512 * 1024);
        assert_eq!(manager.mem().0, 512 * 1024 + 1);

        manager.free_memory(usize::MAX);
        assert_eq!(manager.mem().0, 0);
    }
}
