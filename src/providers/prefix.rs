//! Default prefixes for signal types and parameter keys.

use crate::providers::SignalProvider;
use crate::signal::keys::is_reserved;
use crate::signal::SignalTransform;

/// Prepends configured prefixes to non-reserved names.
///
/// Names under the reserved namespace and names that already carry the
/// prefix are left alone.
#[derive(Debug, Clone, Default)]
pub struct PrefixProvider {
    signal_prefix: Option<String>,
    parameter_prefix: Option<String>,
}

impl PrefixProvider {
    pub fn new(signal_prefix: Option<String>, parameter_prefix: Option<String>) -> Self {
        let non_empty = |p: Option<String>| p.filter(|p| !p.is_empty());
        Self {
            signal_prefix: non_empty(signal_prefix),
            parameter_prefix: non_empty(parameter_prefix),
        }
    }

    /// Returns true if at least one prefix is configured.
    pub fn is_active(&self) -> bool {
        self.signal_prefix.is_some() || self.parameter_prefix.is_some()
    }
}

fn apply_prefix(prefix: &str, name: String) -> String {
    if is_reserved(&name) || name.starts_with(prefix) {
        name
    } else {
        format!("{prefix}{name}")
    }
}

impl SignalProvider for PrefixProvider {
    fn name(&self) -> &'static str {
        "prefix"
    }

    fn transform(&self, mut transform: SignalTransform) -> SignalTransform {
        if let Some(prefix) = &self.signal_prefix {
            transform.signal_type = apply_prefix(prefix, transform.signal_type);
        }
        if let Some(prefix) = &self.parameter_prefix {
            transform.additional_payload = transform
                .additional_payload
                .map_keys(|key| apply_prefix(prefix, key));
        }
        transform
    }
}
