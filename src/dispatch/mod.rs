//! Delivery of queued signals.
//!
//! A [`DispatchScheduler`] wakes on a fixed period, drains the cache, drops
//! stale signals and hands the rest to a [`Transport`] as one batch. A failed
//! batch goes back into the cache untouched and is retried on the next tick.

pub mod scheduler;
pub mod transport;

pub use scheduler::{DispatchConfig, DispatchScheduler, FlushOutcome, STALENESS_WINDOW_HOURS};
pub use transport::{service_url, SharedTransport, Transport, TransportError};

#[cfg(feature = "http")]
pub use transport::HttpTransport;
