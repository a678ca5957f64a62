//! Transparency module for the signal pipeline.
//!
//! Tracks what the pipeline recorded and delivered, so a host can show its
//! users exactly how much telemetry left the device.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
