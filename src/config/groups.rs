use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Per-channel switches for the convenience tracking calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelToggles {
    pub clicks: bool,
    /// Also controls the synthetic error event recorded after a failed delivery.
    pub errors: bool,
    pub performance: bool,
    pub navigation: bool,
}

impl Default for ChannelToggles {
    fn default() -> Self {
        Self {
            clicks: true,
            errors: true,
            performance: false,
            navigation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    pub consent_required: bool,
    pub respect_do_not_track: bool,
    pub collect_environment_data: bool,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            consent_required: false,
            respect_do_not_track: true,
            collect_environment_data: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub endpoint: String,
    #[serde(with = "super::serde_helpers")]
    pub timeout: Duration,
    #[serde(with = "super::serde_helpers")]
    pub connection_timeout: Duration,
    pub max_connections: usize,
    #[serde(with = "super::serde_helpers")]
    pub keep_alive_timeout: Duration,
    pub user_agent: String,
    pub enable_compression: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/api/analytics/events".to_string(),
            timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(5),
            max_connections: 4,
            keep_alive_timeout: Duration::from_secs(60),
            user_agent: format!("play-analytics/{}", env!("CARGO_PKG_VERSION")),
            enable_compression: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub storage_dir: PathBuf,
    pub storage_key: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage_dir: std::env::temp_dir().join("play-analytics"),
            storage_key: "play_analytics_queue".to_string(),
        }
    }
}

// Partial counterparts used for field-by-field merging. Every field left as
// `None` keeps the default.

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelOptions {
    pub clicks: Option<bool>,
    pub errors: Option<bool>,
    pub performance: Option<bool>,
    pub navigation: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyOptions {
    pub consent_required: Option<bool>,
    pub respect_do_not_track: Option<bool>,
    pub collect_environment_data: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryOptions {
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
    pub connection_timeout_ms: Option<u64>,
    pub max_connections: Option<usize>,
    pub user_agent: Option<String>,
    pub enable_compression: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceOptions {
    pub enabled: Option<bool>,
    pub storage_dir: Option<PathBuf>,
    pub storage_key: Option<String>,
}

impl ChannelToggles {
    pub(crate) fn merge(&mut self, options: ChannelOptions) {
        merge_field(&mut self.clicks, options.clicks);
        merge_field(&mut self.errors, options.errors);
        merge_field(&mut self.performance, options.performance);
        merge_field(&mut self.navigation, options.navigation);
    }
}

impl PrivacyConfig {
    pub(crate) fn merge(&mut self, options: PrivacyOptions) {
        merge_field(&mut self.consent_required, options.consent_required);
        merge_field(&mut self.respect_do_not_track, options.respect_do_not_track);
        merge_field(
            &mut self.collect_environment_data,
            options.collect_environment_data,
        );
    }
}

impl DeliveryConfig {
    pub(crate) fn merge(&mut self, options: DeliveryOptions) {
        merge_field(&mut self.endpoint, options.endpoint);
        merge_field(
            &mut self.timeout,
            options.timeout_ms.map(Duration::from_millis),
        );
        merge_field(
            &mut self.connection_timeout,
            options.connection_timeout_ms.map(Duration::from_millis),
        );
        merge_field(&mut self.max_connections, options.max_connections);
        merge_field(&mut self.user_agent, options.user_agent);
        merge_field(&mut self.enable_compression, options.enable_compression);
    }
}

impl PersistenceConfig {
    pub(crate) fn merge(&mut self, options: PersistenceOptions) {
        merge_field(&mut self.enabled, options.enabled);
        merge_field(&mut self.storage_dir, options.storage_dir);
        merge_field(&mut self.storage_key, options.storage_key);
    }
}

pub(crate) fn merge_field<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}
