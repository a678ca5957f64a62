//! Navigation path signals.
//!
//! Remembers the last destination so callers that only know where they are
//! going can still report a full `source -> destination` edge.

use crate::signal::keys;
use crate::signal::SignalRequest;
use std::sync::Mutex;

/// Version of the navigation payload layout.
pub const NAVIGATION_SCHEMA_VERSION: &str = "1";

/// Builds `TelemetryDeck.Navigation.pathChanged` requests.
#[derive(Debug, Default)]
pub struct NavigationTracker {
    previous: Mutex<Option<String>>,
}

impl NavigationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last recorded destination.
    pub fn current_path(&self) -> Option<String> {
        self.previous.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Request for navigating from `source` to `destination`.
    pub fn navigate(&self, source: &str, destination: &str) -> SignalRequest {
        *self.previous.lock().unwrap_or_else(|e| e.into_inner()) = Some(destination.to_string());

        SignalRequest::new(keys::NAVIGATION_PATH_CHANGED)
            .param(keys::NAVIGATION_SCHEMA_VERSION, NAVIGATION_SCHEMA_VERSION)
            .param(keys::NAVIGATION_IDENTIFIER, format!("{source} -> {destination}"))
            .param(keys::NAVIGATION_SOURCE_PATH, source)
            .param(keys::NAVIGATION_DESTINATION_PATH, destination)
    }

    /// Request for navigating from the last destination (or an empty path) to `destination`.
    pub fn navigate_to(&self, destination: &str) -> SignalRequest {
        let source = self.current_path().unwrap_or_default();
        self.navigate(&source, destination)
    }
}
