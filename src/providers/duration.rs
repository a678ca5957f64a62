//! Duration signals.
//!
//! `start_tracking(name)` remembers when a measurement began;
//! `stop_tracking(name)` turns the elapsed time into a parameter under
//! [`keys::DURATION_IN_SECONDS`]. Time the app spends in the background is
//! excluded: on every foreground transition each open start time is pushed
//! forward by exactly the length of the background interval.

use crate::providers::{SignalProvider, SignalSink};
use crate::signal::keys;
use crate::signal::Payload;
use crate::store::JsonFile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, error};

/// One in-flight measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedData {
    /// Start time, already shifted past any background intervals
    pub start_time: DateTime<Utc>,
    /// Parameters given at start
    pub parameters: Payload,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct DurationState {
    signals: BTreeMap<String, CachedData>,
    backgrounded_at: Option<DateTime<Utc>>,
}

/// Tracks named duration measurements across background intervals and restarts.
pub struct DurationTracker {
    file: JsonFile,
    state: Mutex<DurationState>,
}

impl DurationTracker {
    /// Create a tracker persisting to `path`, resuming any open measurements.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let file = JsonFile::new(path);
        let state = file.load_or_default::<DurationState>();
        Self {
            file,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DurationState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start measuring `name` now. Restarting a running name replaces it.
    pub fn start_tracking(&self, name: &str, parameters: Payload) {
        self.start_tracking_at(name, parameters, Utc::now());
    }

    /// Start measuring `name` at `at`.
    pub fn start_tracking_at(&self, name: &str, parameters: Payload, at: DateTime<Utc>) {
        let mut state = self.lock();
        let replaced = state
            .signals
            .insert(
                name.to_string(),
                CachedData {
                    start_time: at,
                    parameters,
                },
            )
            .is_some();
        if replaced {
            debug!(signal_type = %name, "Restarted duration signal");
        }
        self.file.save_logged(&*state);
    }

    /// Stop measuring `name` now.
    ///
    /// See [`DurationTracker::stop_tracking_at`].
    pub fn stop_tracking(&self, name: &str, parameters: Payload) -> Option<Payload> {
        self.stop_tracking_at(name, parameters, Utc::now())
    }

    /// Stop measuring `name` at `at` and return the parameters to send.
    ///
    /// Start and stop parameters are merged with stop winning, and the elapsed
    /// seconds are added with millisecond precision. Returns `None` if `name`
    /// was never started.
    pub fn stop_tracking_at(
        &self,
        name: &str,
        parameters: Payload,
        at: DateTime<Utc>,
    ) -> Option<Payload> {
        let mut state = self.lock();
        let Some(cached) = state.signals.remove(name) else {
            error!(signal_type = %name, "Duration signal stopped without being started");
            return None;
        };
        self.file.save_logged(&*state);

        let elapsed_ms = (at - cached.start_time).num_milliseconds().max(0);
        let seconds = format!("{:.3}", elapsed_ms as f64 / 1000.0);

        let mut merged = cached.parameters.merge(parameters);
        merged.insert(keys::DURATION_IN_SECONDS, seconds);
        Some(merged)
    }

    /// Names of all running measurements.
    pub fn tracked(&self) -> Vec<String> {
        self.lock().signals.keys().cloned().collect()
    }

    /// Start time of a running measurement.
    pub fn start_time(&self, name: &str) -> Option<DateTime<Utc>> {
        self.lock().signals.get(name).map(|c| c.start_time)
    }

    /// Handle a background transition at `at`.
    pub fn background_at(&self, at: DateTime<Utc>) {
        let mut state = self.lock();
        if state.backgrounded_at.is_none() {
            state.backgrounded_at = Some(at);
            self.file.save_logged(&*state);
        }
    }

    /// Handle a foreground transition at `at`.
    pub fn foreground_at(&self, at: DateTime<Utc>) {
        let mut state = self.lock();
        let Some(backgrounded_at) = state.backgrounded_at.take() else {
            return;
        };

        let away = (at - backgrounded_at).max(chrono::Duration::zero());
        for cached in state.signals.values_mut() {
            cached.start_time += away;
        }
        if !state.signals.is_empty() {
            debug!(
                count = state.signals.len(),
                background_ms = away.num_milliseconds(),
                "Shifted duration signals past background interval"
            );
        }
        self.file.save_logged(&*state);
    }
}

impl SignalProvider for DurationTracker {
    fn name(&self) -> &'static str {
        "duration"
    }

    fn on_foreground(&self, at: DateTime<Utc>, _sink: &dyn SignalSink) {
        self.foreground_at(at);
    }

    fn on_background(&self, at: DateTime<Utc>) {
        self.background_at(at);
    }
}
