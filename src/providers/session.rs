//! Session tracking.
//!
//! Sessions follow app-level foreground/background transitions:
//!
//! ```text
//!   NoSession ──foreground──▶ Open ──background──▶ Backgrounded
//!                              ▲                        │
//!                              └──────foreground────────┘
//!                                (previous session closed,
//!                                 new session opened)
//! ```
//!
//! Going to the background only records when it happened. The session is
//! closed by the next foreground, with its duration ending at the recorded
//! background time, so time spent in the background never counts.
//!
//! State is written to disk after every transition.

use crate::providers::{day_string, local_date, SignalProvider, SignalSink, DAY_FORMAT};
use crate::signal::keys;
use crate::signal::{Payload, SignalRequest};
use crate::store::JsonFile;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

/// Sessions older than this are pruned.
pub const SESSION_RETENTION_DAYS: i64 = 90;

/// Window for the "distinct days used last month" metric.
const LAST_MONTH_DAYS: i64 = 30;

/// One contiguous foreground interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// When the session opened
    pub first_start: DateTime<Utc>,
    /// When the session closed; `None` while it is the open session
    pub ended: Option<DateTime<Utc>>,
    /// Foreground time, set when the session closes
    pub duration_millis: i64,
    /// Last background transition while this session was open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backgrounded_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    fn open(at: DateTime<Utc>) -> Self {
        Self {
            first_start: at,
            ended: None,
            duration_millis: 0,
            backgrounded_at: None,
        }
    }

    /// Returns true while the session has not been closed.
    pub fn is_open(&self) -> bool {
        self.ended.is_none()
    }

    fn close(&mut self) {
        // A session never backgrounded (process killed in the foreground)
        // has no known end and counts as zero length.
        let end = self.backgrounded_at.take().unwrap_or(self.first_start);
        self.ended = Some(end);
        self.duration_millis = (end - self.first_start).num_milliseconds().max(0);
    }
}

/// Persisted session history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingState {
    /// Sessions in start order; only the last one may be open
    pub sessions: Vec<SessionRecord>,
    /// Distinct calendar days the app was used
    pub distinct_days: Vec<String>,
    /// Day of the very first session, kept after that session is pruned
    pub first_session_date: Option<String>,
}

impl TrackingState {
    fn record_day(&mut self, day: String) {
        if !self
            .distinct_days
            .iter()
            .any(|d| d.eq_ignore_ascii_case(&day))
        {
            self.distinct_days.push(day);
        }
    }

    fn prune(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|s| s.is_open() || s.first_start >= cutoff);
        before - self.sessions.len()
    }

    fn closed_sessions(&self) -> impl Iterator<Item = &SessionRecord> {
        self.sessions.iter().filter(|s| !s.is_open())
    }
}

/// Tracks sessions and exposes retention metrics as enrichment.
pub struct SessionTracker {
    file: JsonFile,
    state: Mutex<TrackingState>,
    send_session_started: bool,
    retention: Duration,
}

impl SessionTracker {
    /// Create a tracker persisting to `path`, loading any previous history.
    pub fn new(path: impl Into<PathBuf>, send_session_started: bool) -> Self {
        let file = JsonFile::new(path);
        let state = file.load_or_default::<TrackingState>();

        Self {
            file,
            state: Mutex::new(state),
            send_session_started,
            retention: Duration::days(SESSION_RETENTION_DAYS),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> TrackingState {
        self.lock().clone()
    }

    /// Snapshot of the session list.
    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.lock().sessions.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Handle a foreground transition at `at`.
    pub fn foreground_at(&self, at: DateTime<Utc>, sink: &dyn SignalSink) {
        let today = day_string(at);

        // Emitted before the new session exists; the lock is not held so the
        // pipeline can call back into `enrich`.
        let first_ever = self.lock().sessions.is_empty();
        if first_ever {
            info!(day = %today, "New install detected");
            sink.emit(
                SignalRequest::new(keys::NEW_INSTALL_DETECTED)
                    .param(keys::FIRST_SESSION_DATE, today.clone()),
            );
        }

        {
            let mut state = self.lock();
            if let Some(last) = state.sessions.last_mut().filter(|s| s.is_open()) {
                last.close();
            }
            state.sessions.push(SessionRecord::open(at));
            if state.first_session_date.is_none() {
                state.first_session_date = Some(today.clone());
            }
            state.record_day(today);
            self.file.save_logged(&*state);
            debug!(sessions = state.sessions.len(), "Session opened");
        }

        if self.send_session_started {
            sink.emit(SignalRequest::new(keys::SESSION_STARTED));
        }
    }

    /// Handle a background transition at `at`.
    pub fn background_at(&self, at: DateTime<Utc>) {
        let mut state = self.lock();

        if let Some(last) = state.sessions.last_mut().filter(|s| s.is_open()) {
            // Repeated backgrounds keep the earliest time.
            last.backgrounded_at.get_or_insert(at);
        }

        let pruned = state.prune(at - self.retention);
        if pruned > 0 {
            debug!(count = pruned, "Pruned expired sessions");
        }

        self.file.save_logged(&*state);
    }

    /// Retention metrics derived from the current history.
    pub fn retention_parameters(&self, now: DateTime<Utc>) -> Payload {
        let state = self.lock();
        let mut params = Payload::new();

        if state.sessions.is_empty() {
            return params;
        }

        params.insert(
            keys::RETENTION_TOTAL_SESSIONS,
            state.sessions.len().to_string(),
        );
        params.insert(
            keys::RETENTION_DISTINCT_DAYS,
            state.distinct_days.len().to_string(),
        );

        let month_ago = local_date(now - Duration::days(LAST_MONTH_DAYS));
        let recent_days = state
            .distinct_days
            .iter()
            .filter_map(|d| NaiveDate::parse_from_str(d, DAY_FORMAT).ok())
            .filter(|d| *d >= month_ago)
            .count();
        params.insert(
            keys::RETENTION_DISTINCT_DAYS_LAST_MONTH,
            recent_days.to_string(),
        );

        let closed: Vec<i64> = state.closed_sessions().map(|s| s.duration_millis).collect();
        if let Some(previous) = closed.last() {
            params.insert(
                keys::RETENTION_PREVIOUS_SESSION_SECONDS,
                (previous / 1000).to_string(),
            );
            let average = closed.iter().sum::<i64>() / closed.len() as i64;
            params.insert(
                keys::RETENTION_AVERAGE_SESSION_SECONDS,
                (average / 1000).to_string(),
            );
        }

        if let Some(ref first) = state.first_session_date {
            params.insert(keys::FIRST_SESSION_DATE, first.clone());
        }

        params
    }
}

impl SignalProvider for SessionTracker {
    fn name(&self) -> &'static str {
        "session"
    }

    fn enrich(&self, _signal_type: &str, _client_user: Option<&str>, _payload: &Payload) -> Payload {
        self.retention_parameters(Utc::now())
    }

    fn on_foreground(&self, at: DateTime<Utc>, sink: &dyn SignalSink) {
        self.foreground_at(at, sink);
    }

    fn on_background(&self, at: DateTime<Utc>) {
        self.background_at(at);
    }
}
