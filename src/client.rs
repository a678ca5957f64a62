//! The signal client.
//!
//! [`SignalClient`] is the explicit context object the host app threads
//! through its composition root. It owns the pipeline, the queue, the
//! dispatch scheduler and the stateful trackers. Build one with
//! [`SignalClientBuilder`].

use crate::cache::{MemorySignalCache, PersistentSignalCache, SharedSignalCache};
use crate::config::Config;
use crate::dispatch::{DispatchConfig, DispatchScheduler, FlushOutcome, SharedTransport};
use crate::error::Result;
use crate::identity::{FileIdentityProvider, IdentityProvider};
use crate::pipeline::Pipeline;
use crate::providers::{
    CalendarProvider, DurationTracker, EnvironmentProvider, HostMetadata, MetadataSource,
    NavigationTracker, PrefixProvider, SessionTracker, SharedProvider, SignalSink,
};
use crate::signal::{keys, Payload, Signal, SignalRequest};
use crate::transparency::{
    create_shared_log_with_persistence, SharedTransparencyLog, TransparencyStats,
};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

fn new_session_id() -> String {
    Uuid::new_v4().to_string().to_uppercase()
}

/// Builder for [`SignalClient`].
///
/// Anything not supplied falls back to the default for the configuration:
/// the HTTP transport, a persistent or in-memory queue per `persist_cache`,
/// a file-backed identity and host metadata.
pub struct SignalClientBuilder {
    config: Config,
    transport: Option<SharedTransport>,
    cache: Option<SharedSignalCache>,
    identity: Option<Arc<dyn IdentityProvider>>,
    metadata: Option<Box<dyn MetadataSource>>,
    providers: Vec<SharedProvider>,
    duration_tracking: bool,
}

impl SignalClientBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
            cache: None,
            identity: None,
            metadata: None,
            providers: Vec::new(),
            duration_tracking: true,
        }
    }

    /// Use a custom transport.
    pub fn transport(mut self, transport: SharedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom queue.
    pub fn cache(mut self, cache: SharedSignalCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a custom identity provider.
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Use a custom metadata source for the environment provider.
    pub fn metadata(mut self, source: impl MetadataSource + 'static) -> Self {
        self.metadata = Some(Box::new(source));
        self
    }

    /// Append a provider after the built-in ones.
    pub fn provider(mut self, provider: SharedProvider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Enable or disable duration signals (enabled by default).
    pub fn duration_tracking(mut self, enabled: bool) -> Self {
        self.duration_tracking = enabled;
        self
    }

    /// Validate the configuration and assemble the client.
    ///
    /// Fails if the app id is missing or invalid, or if no transport can be
    /// created.
    pub fn build(self) -> Result<SignalClient> {
        let config = self.config;
        let app_id = config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(&config)?,
        };

        let cache: SharedSignalCache = match self.cache {
            Some(cache) => cache,
            None if config.persist_cache => {
                Arc::new(PersistentSignalCache::open(config.cache_path()))
            }
            None => Arc::new(MemorySignalCache::new()),
        };

        let identity = self
            .identity
            .unwrap_or_else(|| Arc::new(FileIdentityProvider::new(config.identity_path())));

        let metadata = self
            .metadata
            .unwrap_or_else(|| Box::new(HostMetadata::new(config.app_version.clone())));

        let log = create_shared_log_with_persistence(config.transparency_path());

        let sessions = Arc::new(SessionTracker::new(
            config.sessions_path(),
            config.send_new_session_began_signal,
        ));
        let durations = self
            .duration_tracking
            .then(|| Arc::new(DurationTracker::new(config.durations_path())));

        let mut pipeline = Pipeline::new(app_id, identity, &config);
        pipeline.push_provider(sessions.clone());
        if let Some(ref durations) = durations {
            pipeline.push_provider(durations.clone());
        }
        pipeline.push_provider(Arc::new(EnvironmentProvider::new(metadata.as_ref())));
        pipeline.push_provider(Arc::new(CalendarProvider::new()));

        let prefix = PrefixProvider::new(
            config.default_signal_prefix.clone(),
            config.default_parameter_prefix.clone(),
        );
        if prefix.is_active() {
            pipeline.push_provider(Arc::new(prefix));
        }
        for provider in self.providers {
            pipeline.push_provider(provider);
        }

        let scheduler = DispatchScheduler::new(
            cache.clone(),
            transport.clone(),
            log.clone(),
            DispatchConfig {
                flush_interval: config.flush_interval,
                ..DispatchConfig::default()
            },
        );

        info!(
            app_id = %pipeline.app_id(),
            url = %transport.service_url(),
            providers = pipeline.providers().len(),
            queued = cache.count(),
            "Signal client ready"
        );

        Ok(SignalClient {
            config,
            pipeline,
            cache,
            transport,
            scheduler,
            log,
            session_id: Mutex::new(new_session_id()),
            sessions,
            durations,
            navigation: NavigationTracker::new(),
        })
    }
}

#[cfg(feature = "http")]
fn default_transport(config: &Config) -> Result<SharedTransport> {
    let transport =
        crate::dispatch::HttpTransport::new(&config.base_url, config.namespace.as_deref())?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "http"))]
fn default_transport(_config: &Config) -> Result<SharedTransport> {
    Err(crate::config::ConfigError::MissingTransport.into())
}

/// Records, queues and dispatches signals for one application.
pub struct SignalClient {
    config: Config,
    pipeline: Pipeline,
    cache: SharedSignalCache,
    transport: SharedTransport,
    scheduler: DispatchScheduler,
    log: SharedTransparencyLog,
    session_id: Mutex<String>,
    sessions: Arc<SessionTracker>,
    durations: Option<Arc<DurationTracker>>,
    navigation: NavigationTracker,
}

impl SignalClient {
    /// Start building a client for `config`.
    pub fn builder(config: Config) -> SignalClientBuilder {
        SignalClientBuilder::new(config)
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Queue a signal with the given parameters.
    pub fn signal(&self, signal_type: &str, parameters: Payload) {
        self.record(SignalRequest::new(signal_type).parameters(parameters));
    }

    /// Run `request` through the pipeline and queue the result.
    pub fn record(&self, request: SignalRequest) {
        let signal = self.build_signal(request);
        debug!(signal_type = %signal.signal_type, "Signal queued");
        self.cache.add(signal);
        self.log.record_signal();
    }

    /// Build a signal and send it right away, bypassing the queue.
    ///
    /// Unlike [`SignalClient::record`], a failure is returned to the caller
    /// and the signal is not retried.
    pub async fn send(&self, request: SignalRequest) -> Result<()> {
        let signal = self.build_signal(request);
        self.log.record_signal();
        self.transport.send(std::slice::from_ref(&signal)).await?;
        self.log.record_batch_sent(1);
        Ok(())
    }

    fn build_signal(&self, request: SignalRequest) -> Signal {
        self.pipeline.build(request, Some(self.session_id()))
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Start the periodic dispatch loop.
    pub async fn start(&self) {
        self.scheduler.start().await;
    }

    /// Stop the dispatch loop and persist delivery counters.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
        if let Err(e) = self.save_stats() {
            warn!(error = %e, "Could not save transparency stats");
        }
    }

    /// Write the delivery counters to disk.
    pub fn save_stats(&self) -> Result<()> {
        self.log.save()?;
        Ok(())
    }

    /// Drain the queue once, now.
    pub async fn flush(&self) -> FlushOutcome {
        self.scheduler.flush().await
    }

    /// Returns true while the dispatch loop is running.
    pub async fn is_running(&self) -> bool {
        self.scheduler.is_running().await
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// The app came to the foreground.
    pub fn foreground(&self) {
        self.foreground_at(Utc::now());
    }

    /// The app came to the foreground at `at`. Starts a new session.
    pub fn foreground_at(&self, at: DateTime<Utc>) {
        self.new_session();
        for provider in self.pipeline.providers() {
            provider.on_foreground(at, self);
        }
    }

    /// The app went to the background.
    pub fn background(&self) {
        self.background_at(Utc::now());
    }

    /// The app went to the background at `at`.
    pub fn background_at(&self, at: DateTime<Utc>) {
        for provider in self.pipeline.providers() {
            provider.on_background(at);
        }
    }

    /// Replace the session id stamped on new signals.
    pub fn new_session(&self) {
        let id = new_session_id();
        debug!(session_id = %id, "Session id rotated");
        *self.session_id.lock().unwrap_or_else(|e| e.into_inner()) = id;
    }

    /// Current session id.
    pub fn session_id(&self) -> String {
        self.session_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Forget the anonymous identifier. Signals without an explicit or
    /// default user get a new, unrelated identity afterwards.
    pub fn reset_identity(&self) {
        self.pipeline.identity().reset_identity();
    }

    // ------------------------------------------------------------------
    // Durations
    // ------------------------------------------------------------------

    /// Start measuring a duration signal.
    pub fn start_duration_signal(&self, signal_type: &str, parameters: Payload) {
        match self.durations {
            Some(ref durations) => durations.start_tracking(signal_type, parameters),
            None => error!(signal_type = %signal_type, "Duration tracking is disabled"),
        }
    }

    /// Stop measuring and queue the signal with its duration attached.
    pub fn stop_and_send_duration_signal(&self, signal_type: &str, parameters: Payload) {
        let Some(ref durations) = self.durations else {
            error!(signal_type = %signal_type, "Duration tracking is disabled");
            return;
        };
        if let Some(parameters) = durations.stop_tracking(signal_type, parameters) {
            self.record(SignalRequest::new(signal_type).parameters(parameters));
        }
    }

    // ------------------------------------------------------------------
    // Convenience signals
    // ------------------------------------------------------------------

    /// Record a navigation from `source` to `destination`.
    pub fn navigate(&self, source: &str, destination: &str) {
        self.record(self.navigation.navigate(source, destination));
    }

    /// Record a navigation from the last destination to `destination`.
    pub fn navigate_to(&self, destination: &str) {
        self.record(self.navigation.navigate_to(destination));
    }

    /// Record an error.
    pub fn error_occurred(&self, id: &str, category: Option<&str>, message: Option<&str>) {
        let mut request = SignalRequest::new(keys::ERROR_OCCURRED).param(keys::ERROR_ID, id);
        if let Some(category) = category {
            request = request.param(keys::ERROR_CATEGORY, category);
        }
        if let Some(message) = message {
            request = request.param(keys::ERROR_MESSAGE, message);
        }
        self.record(request);
    }

    /// Record that a user was acquired through `channel`.
    pub fn acquired_user(&self, channel: &str) {
        self.record(
            SignalRequest::new(keys::USER_ACQUIRED).param(keys::ACQUISITION_CHANNEL, channel),
        );
    }

    /// Record that a lead entered the funnel.
    pub fn lead_started(&self, lead_id: &str) {
        self.record(
            SignalRequest::new(keys::LEAD_STARTED).param(keys::ACQUISITION_LEAD_ID, lead_id),
        );
    }

    /// Record that a lead converted.
    pub fn lead_converted(&self, lead_id: &str) {
        self.record(
            SignalRequest::new(keys::LEAD_CONVERTED).param(keys::ACQUISITION_LEAD_ID, lead_id),
        );
    }

    /// Record that onboarding finished.
    pub fn onboarding_completed(&self) {
        self.record(SignalRequest::new(keys::ONBOARDING_COMPLETED));
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Number of signals waiting to be sent.
    pub fn queued(&self) -> usize {
        self.cache.count()
    }

    /// Delivery counters.
    pub fn stats(&self) -> TransparencyStats {
        self.log.stats()
    }

    /// The shared transparency log.
    pub fn transparency(&self) -> &SharedTransparencyLog {
        &self.log
    }

    /// Configuration the client was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// URL signals are posted to.
    pub fn service_url(&self) -> String {
        self.transport.service_url()
    }

    /// Session history tracker.
    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }
}

impl SignalSink for SignalClient {
    fn emit(&self, request: SignalRequest) {
        self.record(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SignalCache;
    use crate::config::ConfigError;
    use crate::dispatch::{Transport, TransportError};
    use crate::identity::hash_identity;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    const APP_ID: &str = "32CB6574-6732-4238-879F-582FEBEB6536";

    #[derive(Default)]
    struct RecordingTransport {
        batches: Mutex<Vec<Vec<Signal>>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, batch: &[Signal]) -> std::result::Result<(), TransportError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportError::Network("offline".to_string()));
            }
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        }

        fn service_url(&self) -> String {
            "https://nom.example.com/v2/".to_string()
        }
    }

    struct Fixture {
        _tmp: TempDir,
        cache: Arc<MemorySignalCache>,
        transport: Arc<RecordingTransport>,
        client: SignalClient,
    }

    fn fixture_with(configure: impl FnOnce(&mut Config)) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::new(APP_ID);
        config.data_path = tmp.path().to_path_buf();
        configure(&mut config);

        let cache = Arc::new(MemorySignalCache::new());
        let transport = Arc::new(RecordingTransport::default());
        let client = SignalClient::builder(config)
            .cache(cache.clone())
            .transport(transport.clone())
            .build()
            .unwrap();

        Fixture {
            _tmp: tmp,
            cache,
            transport,
            client,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(|_| {})
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_build_requires_app_id() {
        let result = SignalClient::builder(Config::default())
            .transport(Arc::new(RecordingTransport::default()))
            .build();
        assert!(matches!(
            result,
            Err(crate::SignalError::Config(ConfigError::MissingAppId))
        ));
    }

    #[test]
    fn test_signal_is_queued_and_stamped() {
        let f = fixture();
        f.client.signal("App.opened", Payload::new().with("screen", "home"));

        let queued = f.cache.empty();
        assert_eq!(queued.len(), 1);
        let signal = &queued[0];
        assert_eq!(signal.signal_type, "App.opened");
        assert_eq!(signal.app_id, APP_ID);
        assert_eq!(signal.session_id.as_deref(), Some(f.client.session_id().as_str()));
        assert_eq!(signal.parameters().get("screen"), Some("home"));
        assert_eq!(signal.payload.last().map(String::as_str), Some("screen:home"));
        assert!(signal.parameters().contains_key("TelemetryDeck.SDK.name"));
        assert!(signal.parameters().contains_key("TelemetryDeck.Calendar.hourOfDay"));
        assert_eq!(f.client.stats().signals_recorded, 1);
    }

    #[test]
    fn test_explicit_user_is_hashed() {
        let f = fixture();
        f.client.record(SignalRequest::new("x").user("clientUser"));

        let signal = f.cache.empty().remove(0);
        assert_eq!(
            signal.client_user,
            "6721870580401922549fe8fdb09a064dba5b8792fa018d3bd9ffa90fe37a0149"
        );
    }

    #[test]
    fn test_reset_identity_changes_anonymous_user() {
        let f = fixture();
        f.client.signal("a", Payload::new());
        f.client.signal("b", Payload::new());
        f.client.reset_identity();
        f.client.signal("c", Payload::new());

        let users: Vec<String> = f.cache.empty().into_iter().map(|s| s.client_user).collect();
        assert_eq!(users[0], users[1]);
        assert_ne!(users[1], users[2]);
    }

    #[test]
    fn test_first_foreground_emits_install_and_session_started() {
        let f = fixture();
        let before = f.client.session_id();

        f.client.foreground_at(t0());

        let types: Vec<String> = f.cache.empty().into_iter().map(|s| s.signal_type).collect();
        assert_eq!(types, vec![keys::NEW_INSTALL_DETECTED, keys::SESSION_STARTED]);
        assert_ne!(f.client.session_id(), before);
        assert_eq!(f.client.sessions().sessions().len(), 1);
    }

    #[test]
    fn test_session_started_can_be_disabled() {
        let f = fixture_with(|c| c.send_new_session_began_signal = false);

        f.client.foreground_at(t0());
        f.client.background_at(t0() + Duration::seconds(30));
        f.client.foreground_at(t0() + Duration::seconds(60));

        let types: Vec<String> = f.cache.empty().into_iter().map(|s| s.signal_type).collect();
        assert_eq!(types, vec![keys::NEW_INSTALL_DETECTED]);
    }

    #[test]
    fn test_duration_excludes_background() {
        let f = fixture();
        let durations = f.client.durations.clone().unwrap();

        durations.start_tracking_at("checkout", Payload::new().with("cart", "2"), t0());
        f.client.background_at(t0() + Duration::seconds(1));
        f.client.foreground_at(t0() + Duration::seconds(101));
        let params = durations
            .stop_tracking_at("checkout", Payload::new(), t0() + Duration::seconds(105))
            .unwrap();

        assert_eq!(params.get(keys::DURATION_IN_SECONDS), Some("5.000"));
        assert_eq!(params.get("cart"), Some("2"));
    }

    #[test]
    fn test_stop_and_send_duration_signal_queues() {
        let f = fixture();
        f.client.start_duration_signal("load", Payload::new());
        f.client.stop_and_send_duration_signal("load", Payload::new().with("ok", "true"));

        let signal = f.cache.empty().remove(0);
        assert_eq!(signal.signal_type, "load");
        let params = signal.parameters();
        assert!(params.contains_key(keys::DURATION_IN_SECONDS));
        assert_eq!(params.get("ok"), Some("true"));
    }

    #[test]
    fn test_duration_misuse_is_a_noop() {
        let f = fixture();
        f.client.stop_and_send_duration_signal("never-started", Payload::new());
        assert_eq!(f.cache.count(), 0);

        let disabled = {
            let tmp = TempDir::new().unwrap();
            let mut config = Config::new(APP_ID);
            config.data_path = tmp.path().to_path_buf();
            let client = SignalClient::builder(config)
                .cache(Arc::new(MemorySignalCache::new()))
                .transport(Arc::new(RecordingTransport::default()))
                .duration_tracking(false)
                .build()
                .unwrap();
            client.start_duration_signal("x", Payload::new());
            client.stop_and_send_duration_signal("x", Payload::new());
            client.queued()
        };
        assert_eq!(disabled, 0);
    }

    #[test]
    fn test_convenience_signals() {
        let f = fixture();
        f.client.navigate_to("home");
        f.client.navigate_to("settings");
        f.client.error_occurred("E1", Some("network"), None);
        f.client.acquired_user("newsletter");
        f.client.lead_started("L1");
        f.client.lead_converted("L1");
        f.client.onboarding_completed();

        let signals = f.cache.empty();
        let types: Vec<&str> = signals.iter().map(|s| s.signal_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                keys::NAVIGATION_PATH_CHANGED,
                keys::NAVIGATION_PATH_CHANGED,
                keys::ERROR_OCCURRED,
                keys::USER_ACQUIRED,
                keys::LEAD_STARTED,
                keys::LEAD_CONVERTED,
                keys::ONBOARDING_COMPLETED,
            ]
        );
        assert_eq!(
            signals[1].parameters().get(keys::NAVIGATION_IDENTIFIER),
            Some("home -> settings")
        );
        assert_eq!(signals[2].parameters().get(keys::ERROR_CATEGORY), Some("network"));
        assert!(!signals[2].parameters().contains_key(keys::ERROR_MESSAGE));
    }

    #[test]
    fn test_prefix_configuration() {
        let f = fixture_with(|c| {
            c.default_signal_prefix = Some("Shop.".to_string());
            c.default_parameter_prefix = Some("Shop.".to_string());
        });
        f.client.signal("opened", Payload::new().with("screen", "home"));
        f.client.onboarding_completed();

        let signals = f.cache.empty();
        assert_eq!(signals[0].signal_type, "Shop.opened");
        assert_eq!(signals[0].parameters().get("Shop.screen"), Some("home"));
        assert_eq!(signals[1].signal_type, keys::ONBOARDING_COMPLETED);
    }

    #[test]
    fn test_default_user_from_config() {
        let f = fixture_with(|c| {
            c.default_user = Some("someone".to_string());
            c.salt = "s".to_string();
        });
        f.client.signal("x", Payload::new());
        assert_eq!(f.cache.empty()[0].client_user, hash_identity("someone", "s"));
    }

    #[tokio::test]
    async fn test_flush_delivers_queue() {
        let f = fixture();
        f.client.signal("a", Payload::new());
        f.client.signal("b", Payload::new());

        assert_eq!(f.client.flush().await, FlushOutcome::Sent(2));
        assert_eq!(f.client.queued(), 0);
        assert_eq!(f.transport.batches.lock().unwrap()[0].len(), 2);
        assert_eq!(f.client.stats().signals_sent, 2);
    }

    #[tokio::test]
    async fn test_send_surfaces_failure_without_queueing() {
        let f = fixture();
        f.client.send(SignalRequest::new("ok")).await.unwrap();
        assert_eq!(f.transport.batches.lock().unwrap().len(), 1);

        f.transport.fail.store(true, Ordering::SeqCst);
        let result = f.client.send(SignalRequest::new("lost")).await;
        assert!(matches!(result, Err(crate::SignalError::Transport(_))));
        assert_eq!(f.client.queued(), 0);
    }

    #[tokio::test]
    async fn test_stop_persists_stats() {
        let f = fixture();
        f.client.start().await;
        assert!(f.client.is_running().await);
        f.client.signal("a", Payload::new());
        f.client.stop().await;
        assert!(!f.client.is_running().await);

        assert!(f.client.config().transparency_path().exists());
    }

    #[test]
    fn test_save_stats_surfaces_io_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let mut config = Config::new(APP_ID);
        config.data_path = blocker;
        let client = SignalClient::builder(config)
            .cache(Arc::new(MemorySignalCache::new()))
            .transport(Arc::new(RecordingTransport::default()))
            .build()
            .unwrap();

        client.signal("a", Payload::new());
        assert!(matches!(
            client.save_stats(),
            Err(crate::SignalError::Io(_))
        ));
    }

    #[test]
    fn test_save_stats_round_trips_counters() {
        let f = fixture();
        f.client.signal("a", Payload::new());
        f.client.save_stats().unwrap();

        let reloaded = crate::transparency::TransparencyLog::with_persistence(
            f.client.config().transparency_path(),
        );
        assert_eq!(reloaded.stats().signals_recorded, 1);
    }
}
