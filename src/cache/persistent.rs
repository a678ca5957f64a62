//! Disk-backed signal cache.
//!
//! Same semantics as the in-memory cache, but every mutation rewrites the
//! whole queue to a JSON file so a crash or kill does not lose queued
//! signals. A previous file is picked up on construction.

use crate::cache::SignalCache;
use crate::signal::Signal;
use crate::store::JsonFile;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Signal cache mirrored to a JSON file.
#[derive(Debug)]
pub struct PersistentSignalCache {
    file: JsonFile,
    signals: Mutex<Vec<Signal>>,
}

impl PersistentSignalCache {
    /// Open the cache at `path`, recovering any signals left from a previous run.
    ///
    /// A file that cannot be parsed is logged and ignored.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let file = JsonFile::new(path);

        let recovered = match file.load::<Vec<Signal>>() {
            Ok(Some(signals)) => {
                debug!(count = signals.len(), "Recovered queued signals");
                signals
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(
                    path = %file.path().display(),
                    error = %e,
                    "Could not read signal cache, starting empty"
                );
                Vec::new()
            }
        };

        Self {
            file,
            signals: Mutex::new(recovered),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    // Called with the lock held so the file always matches some queue state.
    fn persist(&self, signals: &[Signal]) {
        self.file.save_logged(signals);
    }
}

impl SignalCache for PersistentSignalCache {
    fn add(&self, signal: Signal) {
        let mut signals = self.signals.lock().unwrap_or_else(|e| e.into_inner());
        signals.push(signal);
        self.persist(&signals);
    }

    fn add_all(&self, batch: Vec<Signal>) {
        if batch.is_empty() {
            return;
        }
        let mut signals = self.signals.lock().unwrap_or_else(|e| e.into_inner());
        signals.extend(batch);
        self.persist(&signals);
    }

    fn empty(&self) -> Vec<Signal> {
        let mut signals = self.signals.lock().unwrap_or_else(|e| e.into_inner());
        let drained = std::mem::take(&mut *signals);
        self.persist(&signals);
        drained
    }

    fn count(&self) -> usize {
        self.signals.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
