//! Delivery transparency log.
//!
//! Counts signals as they move through the pipeline. Only counts are kept,
//! never signal contents or identities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::store::JsonFile;

/// Delivery counters for the current process, optionally carried across runs.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Signals accepted into the queue
    signals_recorded: AtomicU64,
    /// Signals the transport acknowledged
    signals_sent: AtomicU64,
    /// Signals put back in the queue after a failed send
    signals_requeued: AtomicU64,
    /// Signals dropped for exceeding the staleness window
    signals_expired: AtomicU64,
    /// Batches the transport accepted
    batches_sent: AtomicU64,
    /// Batches the transport rejected
    batches_failed: AtomicU64,
    /// Process start time
    started_at: DateTime<Utc>,
    /// Where counters are persisted
    persist_file: Option<JsonFile>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            signals_recorded: AtomicU64::new(0),
            signals_sent: AtomicU64::new(0),
            signals_requeued: AtomicU64::new(0),
            signals_expired: AtomicU64::new(0),
            batches_sent: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_file: None,
        }
    }

    /// Create a transparency log with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_file = Some(JsonFile::new(path));

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "Could not load previous transparency stats");
        }

        log
    }

    /// Record a signal accepted into the queue.
    pub fn record_signal(&self) {
        self.signals_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch the transport accepted.
    pub fn record_batch_sent(&self, count: u64) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.signals_sent.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a batch the transport rejected and that went back to the queue.
    pub fn record_batch_failed(&self, count: u64) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.signals_requeued.fetch_add(count, Ordering::Relaxed);
    }

    /// Record signals dropped as stale.
    pub fn record_expired(&self, count: u64) {
        self.signals_expired.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            signals_recorded: self.signals_recorded.load(Ordering::Relaxed),
            signals_sent: self.signals_sent.load(Ordering::Relaxed),
            signals_requeued: self.signals_requeued.load(Ordering::Relaxed),
            signals_expired: self.signals_expired.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Delivery Statistics:\n\
             - Signals recorded: {}\n\
             - Signals sent: {} (in {} batches)\n\
             - Failed batches: {} ({} signals re-queued)\n\
             - Signals expired unsent: {}\n\
             - Uptime: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - User identifiers leave the device only as salted SHA-256 digests\n\
             - Signals older than 24 hours are discarded, never sent",
            stats.signals_recorded,
            stats.signals_sent,
            stats.batches_sent,
            stats.batches_failed,
            stats.signals_requeued,
            stats.signals_expired,
            stats.uptime_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref file) = self.persist_file {
            let stats = self.stats();
            let persisted = PersistedStats {
                signals_recorded: stats.signals_recorded,
                signals_sent: stats.signals_sent,
                signals_requeued: stats.signals_requeued,
                signals_expired: stats.signals_expired,
                batches_sent: stats.batches_sent,
                batches_failed: stats.batches_failed,
                last_updated: Utc::now(),
            };
            file.save(&persisted)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref file) = self.persist_file {
            if let Some(persisted) = file.load::<PersistedStats>()? {
                self.signals_recorded
                    .store(persisted.signals_recorded, Ordering::Relaxed);
                self.signals_sent
                    .store(persisted.signals_sent, Ordering::Relaxed);
                self.signals_requeued
                    .store(persisted.signals_requeued, Ordering::Relaxed);
                self.signals_expired
                    .store(persisted.signals_expired, Ordering::Relaxed);
                self.batches_sent
                    .store(persisted.batches_sent, Ordering::Relaxed);
                self.batches_failed
                    .store(persisted.batches_failed, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.signals_recorded.store(0, Ordering::Relaxed);
        self.signals_sent.store(0, Ordering::Relaxed);
        self.signals_requeued.store(0, Ordering::Relaxed);
        self.signals_expired.store(0, Ordering::Relaxed);
        self.batches_sent.store(0, Ordering::Relaxed);
        self.batches_failed.store(0, Ordering::Relaxed);
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub signals_recorded: u64,
    pub signals_sent: u64,
    pub signals_requeued: u64,
    pub signals_expired: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    signals_recorded: u64,
    signals_sent: u64,
    signals_requeued: u64,
    signals_expired: u64,
    batches_sent: u64,
    batches_failed: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
