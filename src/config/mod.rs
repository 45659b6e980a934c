pub mod groups;
pub mod serde_helpers;
mod validation;

use crate::buffer::OverflowPolicy;
use crate::domain::SessionContext;
use groups::merge_field;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub use groups::{
    ChannelOptions, ChannelToggles, DeliveryConfig, DeliveryOptions, PersistenceConfig,
    PersistenceOptions, PrivacyConfig, PrivacyOptions,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Complete, validated engine configuration.
///
/// Built once from `EngineOptions` at initialize time and never changed
/// afterwards; the engine only hands out shared references to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub enabled: bool,
    pub debug: bool,
    /// Session identifiers attached to events that do not carry their own.
    pub session: SessionContext,
    pub sample_rate: f64,
    /// Queue size that triggers an immediate flush after a push.
    pub batch_size: usize,
    /// Recurring flush period; zero disables the timer.
    #[serde(with = "serde_helpers")]
    pub flush_interval: Duration,
    pub max_queue_size: usize,
    pub overflow_policy: OverflowPolicy,
    /// Period of the performance sampler; zero disables it.
    #[serde(with = "serde_helpers")]
    pub performance_interval: Duration,
    pub channels: ChannelToggles,
    pub privacy: PrivacyConfig,
    pub delivery: DeliveryConfig,
    pub persistence: PersistenceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debug: false,
            session: SessionContext::default(),
            sample_rate: 1.0,
            batch_size: 10,
            flush_interval: Duration::from_secs(5),
            max_queue_size: 1000,
            overflow_policy: OverflowPolicy::DiscardOldest,
            performance_interval: Duration::from_secs(30),
            channels: ChannelToggles::default(),
            privacy: PrivacyConfig::default(),
            delivery: DeliveryConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

/// Caller-supplied configuration. Every field is optional; supplied values
/// replace the defaults field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub enabled: Option<bool>,
    pub debug: Option<bool>,
    pub game_id: Option<String>,
    pub play_id: Option<String>,
    pub sample_rate: Option<f64>,
    pub batch_size: Option<usize>,
    pub flush_interval_ms: Option<u64>,
    pub max_queue_size: Option<usize>,
    pub overflow_policy: Option<OverflowPolicy>,
    pub performance_interval_ms: Option<u64>,
    pub channels: ChannelOptions,
    pub privacy: PrivacyOptions,
    pub delivery: DeliveryOptions,
    pub persistence: PersistenceOptions,
}

impl EngineOptions {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Overlays `other` on top of `self`; values set in `other` win.
    pub fn overlay(mut self, other: EngineOptions) -> Self {
        merge_opt(&mut self.enabled, other.enabled);
        merge_opt(&mut self.debug, other.debug);
        merge_opt(&mut self.game_id, other.game_id);
        merge_opt(&mut self.play_id, other.play_id);
        merge_opt(&mut self.sample_rate, other.sample_rate);
        merge_opt(&mut self.batch_size, other.batch_size);
        merge_opt(&mut self.flush_interval_ms, other.flush_interval_ms);
        merge_opt(&mut self.max_queue_size, other.max_queue_size);
        merge_opt(&mut self.overflow_policy, other.overflow_policy);
        merge_opt(
            &mut self.performance_interval_ms,
            other.performance_interval_ms,
        );

        merge_opt(&mut self.channels.clicks, other.channels.clicks);
        merge_opt(&mut self.channels.errors, other.channels.errors);
        merge_opt(&mut self.channels.performance, other.channels.performance);
        merge_opt(&mut self.channels.navigation, other.channels.navigation);

        merge_opt(
            &mut self.privacy.consent_required,
            other.privacy.consent_required,
        );
        merge_opt(
            &mut self.privacy.respect_do_not_track,
            other.privacy.respect_do_not_track,
        );
        merge_opt(
            &mut self.privacy.collect_environment_data,
            other.privacy.collect_environment_data,
        );

        merge_opt(&mut self.delivery.endpoint, other.delivery.endpoint);
        merge_opt(&mut self.delivery.timeout_ms, other.delivery.timeout_ms);
        merge_opt(
            &mut self.delivery.connection_timeout_ms,
            other.delivery.connection_timeout_ms,
        );
        merge_opt(
            &mut self.delivery.max_connections,
            other.delivery.max_connections,
        );
        merge_opt(&mut self.delivery.user_agent, other.delivery.user_agent);
        merge_opt(
            &mut self.delivery.enable_compression,
            other.delivery.enable_compression,
        );

        merge_opt(&mut self.persistence.enabled, other.persistence.enabled);
        merge_opt(
            &mut self.persistence.storage_dir,
            other.persistence.storage_dir,
        );
        merge_opt(
            &mut self.persistence.storage_key,
            other.persistence.storage_key,
        );

        self
    }
}

fn merge_opt<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

impl EngineConfig {
    /// Merges `options` over the defaults and validates the result.
    pub fn from_options(options: EngineOptions) -> Result<Self, ConfigError> {
        let mut config = EngineConfig::default();
        config.merge(options);
        config.validate()?;
        Ok(config)
    }

    pub fn merge(&mut self, options: EngineOptions) {
        merge_field(&mut self.enabled, options.enabled);
        merge_field(&mut self.debug, options.debug);
        if options.game_id.is_some() {
            self.session.game_id = options.game_id;
        }
        if options.play_id.is_some() {
            self.session.play_id = options.play_id;
        }
        merge_field(&mut self.sample_rate, options.sample_rate);
        merge_field(&mut self.batch_size, options.batch_size);
        merge_field(
            &mut self.flush_interval,
            options.flush_interval_ms.map(Duration::from_millis),
        );
        merge_field(&mut self.max_queue_size, options.max_queue_size);
        merge_field(&mut self.overflow_policy, options.overflow_policy);
        merge_field(
            &mut self.performance_interval,
            options.performance_interval_ms.map(Duration::from_millis),
        );
        self.channels.merge(options.channels);
        self.privacy.merge(options.privacy);
        self.delivery.merge(options.delivery);
        self.persistence.merge(options.persistence);
    }
}
