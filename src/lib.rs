//! Signal Relay - privacy-first client-side telemetry pipeline.
//!
//! Application code records named signals. Each one is enriched with
//! session, device and calendar context, stamped with a salted and hashed
//! user identity, queued durably and delivered in periodic batches. Failed
//! batches are put back in the queue and retried until they go stale.
//!
//! # Privacy Guarantees
//!
//! - **No raw identities**: user identifiers leave the device only as salted SHA-256 digests
//! - **Resettable**: the anonymous identifier can be deleted at any time
//! - **Bounded retention**: session history is pruned after 90 days, queued signals after 24 hours
//! - **Transparency**: delivery counts are logged and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          SignalClient                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  signal() ─▶ ┌──────────────┐   ┌──────────────┐   ┌───────────┐ │
//! │              │   Pipeline   │──▶│   Identity   │──▶│   Cache   │ │
//! │              │ enrich/xform │   │ salt + hash  │   │  (queue)  │ │
//! │              └──────────────┘   └──────────────┘   └───────────┘ │
//! │                     ▲                                    │       │
//! │              ┌──────────────┐                    ┌───────────┐   │
//! │              │  Providers   │                    │ Scheduler │   │
//! │              │ session, ... │                    │ (10s tick)│   │
//! │              └──────────────┘                    └───────────┘   │
//! │                                                        │         │
//! │              ┌──────────────┐                    ┌───────────┐   │
//! │              │ Transparency │◀───────────────────│ Transport │   │
//! │              │     Log      │                    │  (HTTP)   │   │
//! │              └──────────────┘                    └───────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use signal_relay::{Config, Payload, SignalClient};
//!
//! # async fn run() -> signal_relay::Result<()> {
//! let config = Config::new("32CB6574-6732-4238-879F-582FEBEB6536");
//! let client = SignalClient::builder(config).build()?;
//!
//! client.start().await;
//! client.foreground();
//! client.signal("App.launched", Payload::new().with("theme", "dark"));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod pipeline;
pub mod providers;
pub mod signal;
pub mod store;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use cache::{MemorySignalCache, PersistentSignalCache, SharedSignalCache, SignalCache};
pub use client::{SignalClient, SignalClientBuilder};
pub use config::{Config, ConfigError};
pub use dispatch::{
    DispatchConfig, DispatchScheduler, FlushOutcome, SharedTransport, Transport, TransportError,
};
pub use error::{Result, SignalError};
pub use identity::{hash_identity, FileIdentityProvider, IdentityProvider};
pub use pipeline::Pipeline;
pub use providers::{SharedProvider, SignalProvider, SignalSink};
pub use signal::{Payload, Signal, SignalRequest, SignalTransform};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

#[cfg(feature = "http")]
pub use dispatch::HttpTransport;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║               SIGNAL RELAY - PRIVACY DECLARATION                 ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This app sends anonymous usage signals.                         ║
║                                                                  ║
║  ✓ WHAT WE SEND:                                                 ║
║    • Named events and the parameters the app attaches            ║
║    • Session counts and lengths                                  ║
║    • Device type, OS, locale and calendar context                ║
║                                                                  ║
║  ✗ WHAT WE NEVER SEND:                                           ║
║    • Your user name or any raw identifier                        ║
║      (only a salted SHA-256 digest)                              ║
║    • Events older than 24 hours                                  ║
║                                                                  ║
║  Session history older than 90 days is deleted locally.          ║
║  Your anonymous identifier can be reset at any time with:        ║
║    signal-relay reset-identity                                   ║
║                                                                  ║
║  You can view delivery statistics anytime with:                  ║
║    signal-relay status                                           ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
