//! One-shot result slot shared between the loader actor and its callers.
//!
//! A `Pending<T>` is the Rust counterpart of a promise: it is created empty,
//! resolved exactly once, and can be cloned freely. All clones observe the
//! same slot, so handing the same `Pending` to two callers is how request
//! de-duplication is expressed (see `FrameLoader::set_next_frame_to_load`).
//!
//! Waiting blocks on a `Condvar`; callers that must not block use
//! `try_get()` from their update loop instead.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use super::object_url::ObjectUrl;
use super::Tier;

struct Slot<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

/// Shareable one-shot value.
pub struct Pending<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Pending<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone> Default for Pending<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Pending<T> {
    /// Create an unresolved slot.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Slot {
                value: Mutex::new(None),
                ready: Condvar::new(),
            }),
        }
    }

    /// Create a slot that is already resolved.
    pub fn resolved(value: T) -> Self {
        let pending = Self::new();
        pending.resolve(value);
        pending
    }

    /// Store the value and wake all waiters.
    ///
    /// First write wins: returns false (and drops `value`) if the slot was
    /// already resolved.
    pub fn resolve(&self, value: T) -> bool {
        let mut guard = self.slot.value.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return false;
        }
        *guard = Some(value);
        drop(guard);
        self.slot.ready.notify_all();
        true
    }

    pub fn is_resolved(&self) -> bool {
        self.slot
            .value
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Non-blocking read.
    pub fn try_get(&self) -> Option<T> {
        self.slot
            .value
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Block until resolved.
    pub fn wait(&self) -> T {
        let mut guard = self.slot.value.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(value) = guard.as_ref() {
                return value.clone();
            }
            guard = self
                .slot
                .ready
                .wait(guard)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block until resolved or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.slot.value.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(value) = guard.as_ref() {
                return Some(value.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (next, _) = self
                .slot
                .ready
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            guard = next;
        }
    }

    /// True when both handles point at the same slot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").field("value", &self.try_get()).finish()
    }
}

/// A frame that finished loading: its object URL and the tier it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRef {
    pub url: ObjectUrl,
    pub tier: Tier,
}

impl FrameRef {
    pub fn is_hq(&self) -> bool {
        self.tier == Tier::Hq
    }
}

/// Result of a frame request. `None` means "not loaded" (stale, failed or cancelled).
pub type FrameTicket = Pending<Option<FrameRef>>;

/// Acknowledgement that the loader processed an action.
pub type Ack = Pending<()>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_resolve_once() {
        let p: Pending<i32> = Pending::new();
        assert!(!p.is_resolved());
        assert!(p.resolve(1));
        assert!(!p.resolve(2));
        assert_eq!(p.try_get(), Some(1));
    }

    #[test]
    fn test_clones_share_slot() {
        let a: Pending<&'static str> = Pending::new();
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Pending::new()));

        b.resolve("done");
        assert_eq!(a.try_get(), Some("done"));
    }

    #[test]
    fn test_wait_across_threads() {
        let p: Pending<u64> = Pending::new();
        let producer = p.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.resolve(42);
        });
        assert_eq!(p.wait(), 42);
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_expires() {
        let p: Pending<u8> = Pending::new();
        assert_eq!(p.wait_timeout(Duration::from_millis(5)), None);
        p.resolve(3);
        assert_eq!(p.wait_timeout(Duration::from_millis(5)), Some(3));
    }
}
