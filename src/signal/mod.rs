//! Signal model.
//!
//! A [`Signal`] is the canonical event record that gets queued and sent.
//! Before it exists, a [`SignalRequest`] carries what the caller asked for
//! and a [`SignalTransform`] carries the staging state between enrichment
//! and identity resolution.

pub mod keys;
pub mod payload;
pub mod types;

pub use payload::{parse_entry, Payload};
pub use types::{Signal, SignalRequest, SignalTransform};
