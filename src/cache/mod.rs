//! Queue of signals waiting to be sent.
//!
//! Producers on any thread call [`SignalCache::add`]; the dispatch loop calls
//! [`SignalCache::empty`]. Every method takes the cache's own lock, so callers
//! never hold a lock across calls.

pub mod memory;
pub mod persistent;

pub use memory::MemorySignalCache;
pub use persistent::PersistentSignalCache;

use crate::signal::Signal;
use std::sync::Arc;

/// A FIFO store of pending signals.
pub trait SignalCache: Send + Sync {
    /// Append a signal.
    fn add(&self, signal: Signal);

    /// Append several signals, keeping their relative order.
    fn add_all(&self, signals: Vec<Signal>) {
        for signal in signals {
            self.add(signal);
        }
    }

    /// Detach and return everything queued, leaving the cache empty.
    ///
    /// No signal is ever returned by two calls.
    fn empty(&self) -> Vec<Signal>;

    /// Number of queued signals.
    fn count(&self) -> usize;
}

/// Thread-safe shared cache.
pub type SharedSignalCache = Arc<dyn SignalCache>;
