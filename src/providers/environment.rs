//! Device, run-context and accessibility metadata.
//!
//! The OS lookups live behind [`MetadataSource`] so the provider itself is a
//! pure mapping from a snapshot to payload keys. The snapshot is taken once
//! at construction; enriching a signal never touches the OS.

use crate::providers::SignalProvider;
use crate::signal::Payload;
use chrono::Local;

/// SDK name reported with every signal.
pub const SDK_NAME: &str = "SignalRelay";

/// Accessibility preferences of the host, where they are known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessibilitySettings {
    pub reduce_motion: Option<bool>,
    pub bold_text: Option<bool>,
    pub invert_colors: Option<bool>,
    pub reduce_transparency: Option<bool>,
    pub preferred_content_size: Option<String>,
}

/// Read-only description of the host the app runs on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMetadata {
    /// Operating system family, e.g. `linux`
    pub operating_system: String,
    /// Full OS version, if known
    pub system_version: Option<String>,
    /// CPU architecture, e.g. `x86_64`
    pub architecture: String,
    /// Platform name, e.g. `Desktop`
    pub platform: String,
    /// Hardware model, if known
    pub model_name: Option<String>,
    /// UTC offset like `UTC+2`
    pub time_zone: String,
    /// BCP-47-ish locale like `en_US`
    pub locale: Option<String>,
    /// App version as configured by the host app
    pub app_version: Option<String>,
    /// App build number
    pub build_number: Option<String>,
    /// Debug build of the host app
    pub is_debug: bool,
    /// Running under a simulator or emulator
    pub is_simulator: bool,
    pub accessibility: AccessibilitySettings,
}

/// Supplier of [`DeviceMetadata`].
pub trait MetadataSource: Send + Sync {
    fn metadata(&self) -> DeviceMetadata;
}

/// Metadata from compile-time target info and the process environment.
#[derive(Debug, Clone, Default)]
pub struct HostMetadata {
    app_version: Option<String>,
}

impl HostMetadata {
    pub fn new(app_version: Option<String>) -> Self {
        Self { app_version }
    }
}

impl MetadataSource for HostMetadata {
    fn metadata(&self) -> DeviceMetadata {
        DeviceMetadata {
            operating_system: std::env::consts::OS.to_string(),
            system_version: None,
            architecture: std::env::consts::ARCH.to_string(),
            platform: platform_name().to_string(),
            model_name: None,
            time_zone: utc_offset_label(Local::now().offset().local_minus_utc()),
            locale: ["LC_ALL", "LC_MESSAGES", "LANG"]
                .iter()
                .find_map(|var| std::env::var(var).ok())
                .and_then(|raw| normalize_locale(&raw)),
            app_version: self.app_version.clone(),
            build_number: None,
            is_debug: cfg!(debug_assertions),
            is_simulator: false,
            accessibility: AccessibilitySettings::default(),
        }
    }
}

#[cfg(any(target_os = "ios", target_os = "android"))]
fn platform_name() -> &'static str {
    "Mobile"
}

#[cfg(target_arch = "wasm32")]
fn platform_name() -> &'static str {
    "Web"
}

#[cfg(not(any(target_os = "ios", target_os = "android", target_arch = "wasm32")))]
fn platform_name() -> &'static str {
    "Desktop"
}

/// Format a UTC offset in seconds as `UTC`, `UTC+2` or `UTC+5:30`.
fn utc_offset_label(seconds: i32) -> String {
    if seconds == 0 {
        return "UTC".to_string();
    }
    let sign = if seconds < 0 { '-' } else { '+' };
    let minutes = seconds.unsigned_abs() / 60;
    match (minutes / 60, minutes % 60) {
        (h, 0) => format!("UTC{sign}{h}"),
        (h, m) => format!("UTC{sign}{h}:{m:02}"),
    }
}

/// `en_US.UTF-8` -> `en_US`. `C` and `POSIX` carry no locale.
fn normalize_locale(raw: &str) -> Option<String> {
    let locale = raw.split(['.', '@']).next()?.trim();
    match locale {
        "" | "C" | "POSIX" => None,
        other => Some(other.to_string()),
    }
}

/// Adds `TelemetryDeck.Device.*`, `RunContext.*`, `SDK.*`, `AppInfo.*` and
/// `Accessibility.*` keys from a one-time metadata snapshot.
pub struct EnvironmentProvider {
    parameters: Payload,
}

impl EnvironmentProvider {
    pub fn new(source: &dyn MetadataSource) -> Self {
        Self {
            parameters: environment_parameters(&source.metadata()),
        }
    }

    /// The parameters added to every signal.
    pub fn parameters(&self) -> &Payload {
        &self.parameters
    }
}

impl SignalProvider for EnvironmentProvider {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn enrich(&self, _signal_type: &str, _client_user: Option<&str>, _payload: &Payload) -> Payload {
        self.parameters.clone()
    }
}

fn environment_parameters(meta: &DeviceMetadata) -> Payload {
    let mut p = Payload::new();

    if let Some(version) = &meta.app_version {
        p.insert("TelemetryDeck.AppInfo.version", version);
        if let Some(build) = &meta.build_number {
            p.insert("TelemetryDeck.AppInfo.buildNumber", build);
            p.insert(
                "TelemetryDeck.AppInfo.versionAndBuildNumber",
                format!("{version} (build {build})"),
            );
        }
    }

    p.insert("TelemetryDeck.Device.architecture", &meta.architecture);
    p.insert("TelemetryDeck.Device.operatingSystem", &meta.operating_system);
    p.insert("TelemetryDeck.Device.platform", &meta.platform);
    p.insert("TelemetryDeck.Device.timeZone", &meta.time_zone);
    if let Some(model) = &meta.model_name {
        p.insert("TelemetryDeck.Device.modelName", model);
    }
    if let Some(version) = &meta.system_version {
        p.insert("TelemetryDeck.Device.systemVersion", version);
        let mut parts = version.split('.');
        if let Some(major) = parts.next() {
            p.insert("TelemetryDeck.Device.systemMajorVersion", major);
            if let Some(minor) = parts.next() {
                p.insert(
                    "TelemetryDeck.Device.systemMajorMinorVersion",
                    format!("{major}.{minor}"),
                );
            }
        }
    }

    p.insert("TelemetryDeck.RunContext.isDebug", meta.is_debug.to_string());
    p.insert("TelemetryDeck.RunContext.isSimulator", meta.is_simulator.to_string());
    if let Some(locale) = &meta.locale {
        p.insert("TelemetryDeck.RunContext.locale", locale);
        if let Some(language) = locale.split(['_', '-']).next() {
            p.insert("TelemetryDeck.RunContext.language", language);
        }
    }

    p.insert("TelemetryDeck.SDK.name", SDK_NAME);
    p.insert("TelemetryDeck.SDK.version", crate::VERSION);
    p.insert(
        "TelemetryDeck.SDK.nameAndVersion",
        format!("{SDK_NAME} {}", crate::VERSION),
    );

    let a = &meta.accessibility;
    let flags = [
        ("TelemetryDeck.Accessibility.isReduceMotionEnabled", a.reduce_motion),
        ("TelemetryDeck.Accessibility.isBoldTextEnabled", a.bold_text),
        ("TelemetryDeck.Accessibility.isInvertColorsEnabled", a.invert_colors),
        (
            "TelemetryDeck.Accessibility.isReduceTransparencyEnabled",
            a.reduce_transparency,
        ),
    ];
    for (key, value) in flags {
        if let Some(value) = value {
            p.insert(key, value.to_string());
        }
    }
    if let Some(size) = &a.preferred_content_size {
        p.insert("TelemetryDeck.Accessibility.preferredContentSizeCategory", size);
    }

    p
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedMetadata(DeviceMetadata);

    impl MetadataSource for FixedMetadata {
        fn metadata(&self) -> DeviceMetadata {
            self.0.clone()
        }
    }

    fn phone() -> DeviceMetadata {
        DeviceMetadata {
            operating_system: "iOS".to_string(),
            system_version: Some("17.4.1".to_string()),
            architecture: "arm64".to_string(),
            platform: "Mobile".to_string(),
            model_name: Some("iPhone15,2".to_string()),
            time_zone: "UTC+2".to_string(),
            locale: Some("de_DE".to_string()),
            app_version: Some("2.1.0".to_string()),
            build_number: Some("42".to_string()),
            is_debug: false,
            is_simulator: false,
            accessibility: AccessibilitySettings {
                reduce_motion: Some(true),
                preferred_content_size: Some("UICTContentSizeCategoryL".to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_device_and_app_keys() {
        let provider = EnvironmentProvider::new(&FixedMetadata(phone()));
        let p = provider.parameters();

        assert_eq!(p.get("TelemetryDeck.AppInfo.version"), Some("2.1.0"));
        assert_eq!(
            p.get("TelemetryDeck.AppInfo.versionAndBuildNumber"),
            Some("2.1.0 (build 42)")
        );
        assert_eq!(p.get("TelemetryDeck.Device.systemMajorVersion"), Some("17"));
        assert_eq!(p.get("TelemetryDeck.Device.systemMajorMinorVersion"), Some("17.4"));
        assert_eq!(p.get("TelemetryDeck.Device.modelName"), Some("iPhone15,2"));
        assert_eq!(p.get("TelemetryDeck.RunContext.language"), Some("de"));
        assert_eq!(p.get("TelemetryDeck.SDK.name"), Some(SDK_NAME));
    }

    #[test]
    fn test_unknown_accessibility_settings_are_omitted() {
        let provider = EnvironmentProvider::new(&FixedMetadata(phone()));
        let p = provider.parameters();

        assert_eq!(
            p.get("TelemetryDeck.Accessibility.isReduceMotionEnabled"),
            Some("true")
        );
        assert!(!p.contains_key("TelemetryDeck.Accessibility.isBoldTextEnabled"));
    }

    #[test]
    fn test_enrich_returns_snapshot() {
        let provider = EnvironmentProvider::new(&FixedMetadata(phone()));
        let added = provider.enrich("x", None, &Payload::new());
        assert_eq!(&added, provider.parameters());
    }

    #[test]
    fn test_host_metadata_uses_target_info() {
        let meta = HostMetadata::new(Some("1.0".to_string())).metadata();
        assert_eq!(meta.operating_system, std::env::consts::OS);
        assert_eq!(meta.architecture, std::env::consts::ARCH);
        assert_eq!(meta.app_version.as_deref(), Some("1.0"));
        assert!(meta.time_zone.starts_with("UTC"));
    }

    #[test]
    fn test_utc_offset_label() {
        assert_eq!(utc_offset_label(0), "UTC");
        assert_eq!(utc_offset_label(7200), "UTC+2");
        assert_eq!(utc_offset_label(-18_000), "UTC-5");
        assert_eq!(utc_offset_label(19_800), "UTC+5:30");
    }

    #[test]
    fn test_normalize_locale() {
        assert_eq!(normalize_locale("en_US.UTF-8").as_deref(), Some("en_US"));
        assert_eq!(normalize_locale("de_DE@euro").as_deref(), Some("de_DE"));
        assert_eq!(normalize_locale("C"), None);
        assert_eq!(normalize_locale(""), None);
    }
}
