//! Periodic dispatch of queued signals.

use crate::cache::SharedSignalCache;
use crate::dispatch::transport::SharedTransport;
use crate::signal::Signal;
use crate::transparency::SharedTransparencyLog;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Signals older than this are dropped instead of sent.
pub const STALENESS_WINDOW_HOURS: i64 = 24;

/// Configuration for the dispatch loop.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Time between ticks. The first tick also waits this long.
    pub flush_interval: Duration,
    /// Maximum age of a signal that is still worth sending.
    pub staleness_window: chrono::Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(10),
            staleness_window: chrono::Duration::hours(STALENESS_WINDOW_HOURS),
        }
    }
}

/// Result of one dispatch tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing fresh was queued.
    Idle,
    /// This many signals were delivered.
    Sent(usize),
    /// Delivery failed and this many signals went back into the cache.
    Requeued(usize),
}

struct Dispatcher {
    cache: SharedSignalCache,
    transport: SharedTransport,
    log: SharedTransparencyLog,
    config: DispatchConfig,
}

impl Dispatcher {
    async fn flush_at(&self, now: DateTime<Utc>) -> FlushOutcome {
        let drained = self.cache.empty();
        let total = drained.len();

        let batch: Vec<Signal> = drained
            .into_iter()
            .filter(|s| now - s.received_at <= self.config.staleness_window)
            .collect();

        let expired = total - batch.len();
        if expired > 0 {
            debug!(count = expired, "Dropped stale signals");
            self.log.record_expired(expired as u64);
        }

        if batch.is_empty() {
            return FlushOutcome::Idle;
        }

        let count = batch.len();
        match self.transport.send(&batch).await {
            Ok(()) => {
                debug!(count, "Signal batch delivered");
                self.log.record_batch_sent(count as u64);
                FlushOutcome::Sent(count)
            }
            Err(e) => {
                warn!(count, error = %e, "Signal batch failed, re-queueing");
                // Original timestamps are kept so the staleness clock keeps running.
                self.cache.add_all(batch);
                self.log.record_batch_failed(count as u64);
                FlushOutcome::Requeued(count)
            }
        }
    }
}

/// Background loop draining the cache into the transport.
///
/// The scheduler is either stopped or running exactly one loop.
pub struct DispatchScheduler {
    dispatcher: Arc<Dispatcher>,
    running: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchScheduler {
    /// Create a stopped scheduler.
    pub fn new(
        cache: SharedSignalCache,
        transport: SharedTransport,
        log: SharedTransparencyLog,
        config: DispatchConfig,
    ) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher {
                cache,
                transport,
                log,
                config,
            }),
            running: Mutex::new(None),
        }
    }

    /// Start the loop. A loop that is already running is cancelled and
    /// joined first, so two loops never drain the same cache.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            previous.abort();
            let _ = previous.await;
            debug!("Replaced running dispatch loop");
        }

        let dispatcher = self.dispatcher.clone();
        *running = Some(tokio::spawn(run_loop(dispatcher)));

        info!(
            flush_interval_ms = self.dispatcher.config.flush_interval.as_millis() as u64,
            "Dispatch scheduler started"
        );
    }

    /// Stop the loop. A send already in flight is not awaited and finishes
    /// on its own, re-queueing on failure as usual.
    pub async fn stop(&self) {
        if let Some(handle) = self.running.lock().await.take() {
            handle.abort();
            let _ = handle.await;
            info!("Dispatch scheduler stopped");
        }
    }

    /// Returns true while the loop is running.
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Run one tick immediately.
    pub async fn flush(&self) -> FlushOutcome {
        self.dispatcher.flush_at(Utc::now()).await
    }

    #[cfg(test)]
    async fn flush_at(&self, now: DateTime<Utc>) -> FlushOutcome {
        self.dispatcher.flush_at(now).await
    }
}

async fn run_loop(dispatcher: Arc<Dispatcher>) {
    let period = dispatcher.config.flush_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        // Delivery runs as its own task; aborting this loop leaves it running.
        let tick = dispatcher.clone();
        let delivery = tokio::spawn(async move { tick.flush_at(Utc::now()).await });

        if let Err(e) = delivery.await {
            if e.is_panic() {
                error!(error = %e, "Dispatch tick panicked");
            }
        }
    }
}
