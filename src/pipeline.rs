//! Enrichment and transform pipeline.
//!
//! Turns a [`SignalRequest`] into a finished [`Signal`]:
//!
//! 1. seed the payload with the caller's parameters
//! 2. let every provider add keys (first writer wins)
//! 3. let every provider rewrite the staged [`SignalTransform`]
//! 4. resolve and hash the user, stamp session, time and test mode
//!
//! A provider that panics is logged and skipped. The signal is still built
//! from what the other providers produced.

use crate::config::Config;
use crate::identity::{hash_identity, IdentityProvider};
use crate::providers::{SharedProvider, SignalProvider};
use crate::signal::{Payload, Signal, SignalRequest, SignalTransform};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Ordered provider chain plus everything needed to finish a signal.
pub struct Pipeline {
    providers: Vec<SharedProvider>,
    identity: Arc<dyn IdentityProvider>,
    app_id: String,
    salt: String,
    default_user: Option<String>,
    test_mode: bool,
}

impl Pipeline {
    /// Create a pipeline with no providers.
    pub fn new(app_id: Uuid, identity: Arc<dyn IdentityProvider>, config: &Config) -> Self {
        Self {
            providers: Vec::new(),
            identity,
            app_id: app_id.hyphenated().to_string().to_uppercase(),
            salt: config.salt.clone(),
            default_user: config.default_user.clone(),
            test_mode: config.test_mode,
        }
    }

    /// Append a provider to the end of the chain.
    pub fn push_provider(&mut self, provider: SharedProvider) {
        self.providers.push(provider);
    }

    /// Providers in registration order.
    pub fn providers(&self) -> &[SharedProvider] {
        &self.providers
    }

    /// Application identifier stamped on every signal.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Identity provider used for `clientUser` resolution.
    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    /// Build a signal stamped with the current time.
    pub fn build(&self, request: SignalRequest, session_id: Option<String>) -> Signal {
        self.build_at(request, session_id, Signal::now())
    }

    /// Build a signal stamped with `received_at`.
    pub fn build_at(
        &self,
        request: SignalRequest,
        session_id: Option<String>,
        received_at: DateTime<Utc>,
    ) -> Signal {
        let SignalRequest {
            signal_type,
            client_user,
            parameters,
            float_value,
        } = request;

        let payload = self.enrich(&signal_type, client_user.as_deref(), parameters);
        let staged = self.transform(SignalTransform {
            signal_type,
            client_user,
            additional_payload: payload,
            float_value,
        });

        let identity = self
            .identity
            .calculate_identity(staged.client_user.as_deref(), self.default_user.as_deref());

        Signal {
            received_at,
            app_id: self.app_id.clone(),
            client_user: hash_identity(&identity, &self.salt),
            session_id,
            signal_type: staged.signal_type,
            payload: staged.additional_payload.flatten(),
            is_test_mode: self.test_mode.to_string(),
            float_value: staged.float_value,
        }
    }

    /// Run every provider's `enrich`. Provider keys come first in the
    /// result, in chain order, followed by the caller's keys.
    fn enrich(&self, signal_type: &str, client_user: Option<&str>, caller: Payload) -> Payload {
        let caller_keys: HashSet<String> = caller.keys().map(str::to_string).collect();
        let mut payload = caller;

        for provider in &self.providers {
            let added = catch_unwind(AssertUnwindSafe(|| {
                provider.enrich(signal_type, client_user, &payload)
            }));
            match added {
                Ok(added) => payload.extend_missing(added),
                Err(_) => log_panic(provider.as_ref(), "enrich", signal_type),
            }
        }

        let (from_caller, from_providers) = payload.partition(|k| caller_keys.contains(k));
        from_providers.merge(from_caller)
    }

    fn transform(&self, mut staged: SignalTransform) -> SignalTransform {
        for provider in &self.providers {
            let input = staged.clone();
            match catch_unwind(AssertUnwindSafe(|| provider.transform(input))) {
                Ok(next) => staged = next,
                Err(_) => log_panic(provider.as_ref(), "transform", &staged.signal_type),
            }
        }
        staged
    }
}

fn log_panic(provider: &dyn SignalProvider, stage: &str, signal_type: &str) {
    error!(
        provider = provider.name(),
        stage,
        signal_type = %signal_type,
        "Provider panicked, skipping it for this signal"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::FileIdentityProvider;
    use crate::providers::PrefixProvider;
    use crate::signal::keys;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const APP_ID: &str = "32CB6574-6732-4238-879F-582FEBEB6536";

    struct Adds(&'static str, &'static [(&'static str, &'static str)]);

    impl SignalProvider for Adds {
        fn name(&self) -> &'static str {
            self.0
        }

        fn enrich(&self, _: &str, _: Option<&str>, _: &Payload) -> Payload {
            self.1.iter().copied().collect()
        }
    }

    struct Panics;

    impl SignalProvider for Panics {
        fn name(&self) -> &'static str {
            "panics"
        }

        fn enrich(&self, _: &str, _: Option<&str>, _: &Payload) -> Payload {
            panic!("enrich failed");
        }

        fn transform(&self, _: SignalTransform) -> SignalTransform {
            panic!("transform failed");
        }
    }

    struct Renames;

    impl SignalProvider for Renames {
        fn name(&self) -> &'static str {
            "renames"
        }

        fn transform(&self, mut t: SignalTransform) -> SignalTransform {
            t.signal_type = format!("{}.renamed", t.signal_type);
            t.client_user = Some("rewritten".to_string());
            t
        }
    }

    fn pipeline(tmp: &TempDir, config: &Config) -> Pipeline {
        let identity = Arc::new(FileIdentityProvider::new(tmp.path().join("identity")));
        Pipeline::new(Uuid::parse_str(APP_ID).unwrap(), identity, config)
    }

    #[test]
    fn test_known_hash_vector() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(APP_ID);
        let pipeline = pipeline(&tmp, &config);

        let signal = pipeline.build(SignalRequest::new("x").user("clientUser"), None);
        assert_eq!(signal.app_id, APP_ID);
        assert_eq!(
            signal.client_user,
            "6721870580401922549fe8fdb09a064dba5b8792fa018d3bd9ffa90fe37a0149"
        );
    }

    #[test]
    fn test_default_user_and_salt() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::new(APP_ID);
        config.default_user = Some("someone".to_string());
        config.salt = "pepper".to_string();
        let pipeline = pipeline(&tmp, &config);

        let signal = pipeline.build(SignalRequest::new("x"), None);
        assert_eq!(signal.client_user, hash_identity("someone", "pepper"));
    }

    #[test]
    fn test_stamps_session_time_and_test_mode() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::new(APP_ID);
        config.test_mode = true;
        let pipeline = pipeline(&tmp, &config);

        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let signal = pipeline.build_at(
            SignalRequest::new("x").float_value(2.5),
            Some("S1".to_string()),
            at,
        );

        assert_eq!(signal.received_at, at);
        assert_eq!(signal.session_id.as_deref(), Some("S1"));
        assert_eq!(signal.is_test_mode, "true");
        assert_eq!(signal.float_value, Some(2.5));
    }

    #[test]
    fn test_caller_keys_win_and_come_last() {
        let tmp = TempDir::new().unwrap();
        let mut pipeline = pipeline(&tmp, &Config::new(APP_ID));
        pipeline.push_provider(Arc::new(Adds("first", &[("shared", "first"), ("a", "1")])));
        pipeline.push_provider(Arc::new(Adds("second", &[("shared", "second"), ("a", "2"), ("b", "2")])));

        let signal = pipeline.build(
            SignalRequest::new("x").param("shared", "caller").param("c", "3"),
            None,
        );

        assert_eq!(
            signal.payload,
            vec!["a:1", "b:2", "shared:caller", "c:3"]
        );
    }

    #[test]
    fn test_panicking_provider_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let mut pipeline = pipeline(&tmp, &Config::new(APP_ID));
        pipeline.push_provider(Arc::new(Adds("before", &[("before", "1")])));
        pipeline.push_provider(Arc::new(Panics));
        pipeline.push_provider(Arc::new(Adds("after", &[("after", "1")])));

        let signal = pipeline.build(SignalRequest::new("x"), None);
        assert_eq!(signal.signal_type, "x");
        assert_eq!(signal.payload, vec!["before:1", "after:1"]);
    }

    #[test]
    fn test_transform_rewrites_type_and_user() {
        let tmp = TempDir::new().unwrap();
        let mut pipeline = pipeline(&tmp, &Config::new(APP_ID));
        pipeline.push_provider(Arc::new(Renames));

        let signal = pipeline.build(SignalRequest::new("x").user("original"), None);
        assert_eq!(signal.signal_type, "x.renamed");
        assert_eq!(signal.client_user, hash_identity("rewritten", ""));
    }

    #[test]
    fn test_prefix_transform_in_chain() {
        let tmp = TempDir::new().unwrap();
        let mut pipeline = pipeline(&tmp, &Config::new(APP_ID));
        pipeline.push_provider(Arc::new(Adds("env", &[("TelemetryDeck.SDK.name", "x")])));
        pipeline.push_provider(Arc::new(PrefixProvider::new(
            Some("App.".into()),
            Some("App.".into()),
        )));

        let signal = pipeline.build(SignalRequest::new("opened").param("screen", "home"), None);
        assert_eq!(signal.signal_type, "App.opened");
        assert_eq!(signal.payload, vec!["TelemetryDeck.SDK.name:x", "App.screen:home"]);

        let reserved = pipeline.build(SignalRequest::new(keys::SESSION_STARTED), None);
        assert_eq!(reserved.signal_type, keys::SESSION_STARTED);
    }

    #[test]
    fn test_colon_keys_are_escaped() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp, &Config::new(APP_ID));

        let signal = pipeline.build(SignalRequest::new("x").param("a:b", "c:d"), None);
        assert_eq!(signal.payload, vec!["a_b:c:d"]);
    }
}
