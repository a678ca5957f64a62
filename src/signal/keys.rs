//! Reserved signal types and payload keys.
//!
//! Everything under [`RESERVED_NAMESPACE`] belongs to the pipeline itself and
//! is never rewritten by prefix transforms.

/// Namespace owned by the pipeline.
pub const RESERVED_NAMESPACE: &str = "TelemetryDeck.";

/// Returns true if `name` lives in the reserved namespace.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_NAMESPACE)
}

// Signal types

pub const NEW_INSTALL_DETECTED: &str = "TelemetryDeck.Acquisition.newInstallDetected";
pub const SESSION_STARTED: &str = "TelemetryDeck.Session.started";
pub const NAVIGATION_PATH_CHANGED: &str = "TelemetryDeck.Navigation.pathChanged";
pub const ERROR_OCCURRED: &str = "TelemetryDeck.Error.occurred";
pub const USER_ACQUIRED: &str = "TelemetryDeck.Acquisition.userAcquired";
pub const LEAD_STARTED: &str = "TelemetryDeck.Acquisition.leadStarted";
pub const LEAD_CONVERTED: &str = "TelemetryDeck.Acquisition.leadConverted";
pub const ONBOARDING_COMPLETED: &str = "TelemetryDeck.Activation.onboardingCompleted";

// Payload keys

pub const DURATION_IN_SECONDS: &str = "TelemetryDeck.Signal.durationInSeconds";
pub const FIRST_SESSION_DATE: &str = "TelemetryDeck.Acquisition.firstSessionDate";
pub const ACQUISITION_CHANNEL: &str = "TelemetryDeck.Acquisition.channel";
pub const ACQUISITION_LEAD_ID: &str = "TelemetryDeck.Acquisition.leadID";

pub const RETENTION_TOTAL_SESSIONS: &str = "TelemetryDeck.Retention.totalSessionsCount";
pub const RETENTION_DISTINCT_DAYS: &str = "TelemetryDeck.Retention.distinctDaysUsed";
pub const RETENTION_DISTINCT_DAYS_LAST_MONTH: &str =
    "TelemetryDeck.Retention.distinctDaysUsedLastMonth";
pub const RETENTION_AVERAGE_SESSION_SECONDS: &str = "TelemetryDeck.Retention.averageSessionSeconds";
pub const RETENTION_PREVIOUS_SESSION_SECONDS: &str =
    "TelemetryDeck.Retention.previousSessionSeconds";

pub const NAVIGATION_SCHEMA_VERSION: &str = "TelemetryDeck.Navigation.schemaVersion";
pub const NAVIGATION_IDENTIFIER: &str = "TelemetryDeck.Navigation.identifier";
pub const NAVIGATION_SOURCE_PATH: &str = "TelemetryDeck.Navigation.sourcePath";
pub const NAVIGATION_DESTINATION_PATH: &str = "TelemetryDeck.Navigation.destinationPath";

pub const ERROR_ID: &str = "TelemetryDeck.Error.id";
pub const ERROR_CATEGORY: &str = "TelemetryDeck.Error.category";
pub const ERROR_MESSAGE: &str = "TelemetryDeck.Error.message";
