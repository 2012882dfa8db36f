//! # Monotonic Counter Clock
//!
//! The sale never reads wall-clock time. Its only notion of "now" is a
//! monotonic counter supplied by the host (a block height, in the node).
//! Only non-decrease is guaranteed, not a uniform rate of advance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A host-supplied monotonic counter.
pub trait Clock: Send + Sync {
    /// Current counter value. Never decreases between calls.
    fn now(&self) -> u64;
}

/// A counter advanced explicitly by its holder.
///
/// Clones share the same underlying counter, so a test (or the node's tick
/// loop) can keep one handle and move time forward under a sale that owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    counter: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock starting at `initial`.
    pub fn new(initial: u64) -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(initial)),
        }
    }

    /// Advances the counter by `delta` and returns the new value.
    pub fn advance(&self, delta: u64) -> u64 {
        let previous = self
            .counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                Some(c.saturating_add(delta))
            })
            .unwrap_or_else(|c| c);
        previous.saturating_add(delta)
    }

    /// Moves the counter to `value`. Values below the current counter are
    /// ignored: the clock never goes backwards.
    pub fn set(&self, value: u64) -> u64 {
        let previous = self.counter.fetch_max(value, Ordering::SeqCst);
        previous.max(value)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> u64 {
        (**self).now()
    }
}
