//! Pluggable signal providers.
//!
//! A provider is a value in an ordered list. The pipeline walks that list
//! twice per signal: once calling [`SignalProvider::enrich`] to collect extra
//! parameters, then once calling [`SignalProvider::transform`] to rewrite the
//! staged signal. Both default to doing nothing.
//!
//! Providers that react to app lifecycle get a [`SignalSink`] when the app
//! comes to the foreground, which is the only way they can emit signals.
//! They never hold a reference back to the client.

pub mod calendar;
pub mod duration;
pub mod environment;
pub mod navigation;
pub mod prefix;
pub mod session;

pub use calendar::CalendarProvider;
pub use duration::DurationTracker;
pub use environment::{
    AccessibilitySettings, DeviceMetadata, EnvironmentProvider, HostMetadata, MetadataSource,
};
pub use navigation::NavigationTracker;
pub use prefix::PrefixProvider;
pub use session::{SessionRecord, SessionTracker, TrackingState};

use crate::signal::{Payload, SignalRequest, SignalTransform};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use std::sync::Arc;

/// Narrow capability for emitting signals from inside a provider.
pub trait SignalSink {
    /// Run `request` through the pipeline and queue the result.
    fn emit(&self, request: SignalRequest);
}

/// A component contributing enrichment, transformation or lifecycle signals.
pub trait SignalProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Return parameters to add to `payload`.
    ///
    /// Keys already present in `payload` are ignored by the pipeline, so a
    /// provider can never overwrite the caller or an earlier provider.
    fn enrich(&self, _signal_type: &str, _client_user: Option<&str>, _payload: &Payload) -> Payload {
        Payload::new()
    }

    /// Rewrite the staged signal. May change any field, including the type.
    fn transform(&self, transform: SignalTransform) -> SignalTransform {
        transform
    }

    /// The app came to the foreground.
    fn on_foreground(&self, _at: DateTime<Utc>, _sink: &dyn SignalSink) {}

    /// The app went to the background.
    fn on_background(&self, _at: DateTime<Utc>) {}
}

/// Thread-safe shared provider.
pub type SharedProvider = Arc<dyn SignalProvider>;

/// Format of persisted day strings.
pub(crate) const DAY_FORMAT: &str = "%Y-%m-%d";

/// Local calendar date of `at`, the same day the calendar provider reports.
pub(crate) fn local_date(at: DateTime<Utc>) -> NaiveDate {
    date_in(at, &Local)
}

fn date_in<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    at.with_timezone(tz).date_naive()
}

/// Calendar day string used for distinct-day counting and first-use dates.
pub(crate) fn day_string(at: DateTime<Utc>) -> String {
    local_date(at).format(DAY_FORMAT).to_string()
}
