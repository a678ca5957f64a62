//! In-memory signal cache. Contents are lost when the process exits.

use crate::cache::SignalCache;
use crate::signal::Signal;
use std::sync::Mutex;

/// Signal cache backed by a plain vector.
#[derive(Debug, Default)]
pub struct MemorySignalCache {
    signals: Mutex<Vec<Signal>>,
}

impl MemorySignalCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalCache for MemorySignalCache {
    fn add(&self, signal: Signal) {
        self.signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(signal);
    }

    fn add_all(&self, signals: Vec<Signal>) {
        self.signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(signals);
    }

    fn empty(&self) -> Vec<Signal> {
        std::mem::take(&mut *self.signals.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn count(&self) -> usize {
        self.signals.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
