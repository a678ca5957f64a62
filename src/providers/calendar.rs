//! Calendar parameters in the user's local time.

use crate::providers::SignalProvider;
use crate::signal::Payload;
use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Weekday};

/// Adds `TelemetryDeck.Calendar.*` keys computed at enrichment time.
#[derive(Debug, Default)]
pub struct CalendarProvider;

impl CalendarProvider {
    pub fn new() -> Self {
        Self
    }
}

impl SignalProvider for CalendarProvider {
    fn name(&self) -> &'static str {
        "calendar"
    }

    fn enrich(&self, _signal_type: &str, _client_user: Option<&str>, _payload: &Payload) -> Payload {
        calendar_parameters(&Local::now())
    }
}

/// Calendar keys for `at`. Weekdays are ISO numbered, Monday = 1.
pub fn calendar_parameters<Tz: TimeZone>(at: &DateTime<Tz>) -> Payload {
    let weekday = at.weekday();
    let is_weekend = matches!(weekday, Weekday::Sat | Weekday::Sun);

    Payload::new()
        .with("TelemetryDeck.Calendar.dayOfMonth", at.day().to_string())
        .with(
            "TelemetryDeck.Calendar.dayOfWeek",
            weekday.number_from_monday().to_string(),
        )
        .with("TelemetryDeck.Calendar.dayOfYear", at.ordinal().to_string())
        .with(
            "TelemetryDeck.Calendar.weekOfYear",
            at.iso_week().week().to_string(),
        )
        .with("TelemetryDeck.Calendar.isWeekend", is_weekend.to_string())
        .with("TelemetryDeck.Calendar.monthOfYear", at.month().to_string())
        .with(
            "TelemetryDeck.Calendar.quarterOfYear",
            ((at.month() - 1) / 3 + 1).to_string(),
        )
        .with("TelemetryDeck.Calendar.hourOfDay", at.hour().to_string())
}
