use super::initialization::{LogFormat, LogLevel};
use crate::buffer::OverflowPolicy;
use crate::config::{
    ConfigError, DeliveryOptions, EngineOptions, PersistenceOptions, PrivacyOptions,
};
use clap::Parser;
use clap::builder::BoolishValueParser;
use std::path::PathBuf;
use url::Url;

/// Command line of the `play-analytics` binary.
///
/// Every engine setting is optional here; unset values fall through to the
/// config file (if any) and then to the engine defaults.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Collection endpoint URL
    #[arg(long, env = "ANALYTICS_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Game identifier attached to every event
    #[arg(long, env = "GAME_ID")]
    pub game_id: Option<String>,

    /// Play session identifier attached to every event
    #[arg(long, env = "PLAY_ID")]
    pub play_id: Option<String>,

    /// Queue size that triggers a flush
    #[arg(long, env = "BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Recurring flush interval in milliseconds (0 disables the timer)
    #[arg(long, env = "FLUSH_INTERVAL_MS")]
    pub flush_interval_ms: Option<u64>,

    /// Maximum number of queued events
    #[arg(long, env = "MAX_QUEUE_SIZE")]
    pub max_queue_size: Option<usize>,

    /// Overflow policy: discard-oldest, discard-newest or reject
    #[arg(long, env = "OVERFLOW_POLICY")]
    pub overflow_policy: Option<OverflowPolicy>,

    /// Fraction of events kept, between 0 and 1
    #[arg(long, env = "SAMPLE_RATE")]
    pub sample_rate: Option<f64>,

    /// Require consent before tracking (see --grant-consent)
    #[arg(long, env = "CONSENT_REQUIRED", value_parser = BoolishValueParser::new())]
    pub consent_required: bool,

    /// Record that the user granted consent
    #[arg(long, env = "GRANT_CONSENT", value_parser = BoolishValueParser::new())]
    pub grant_consent: bool,

    /// Directory holding the persisted queue
    #[arg(long, env = "STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Disable queue persistence
    #[arg(long, env = "NO_PERSISTENCE", value_parser = BoolishValueParser::new())]
    pub no_persistence: bool,

    /// Gzip large batches
    #[arg(long, env = "ENABLE_COMPRESSION", value_parser = BoolishValueParser::new())]
    pub enable_compression: bool,

    /// Request timeout in milliseconds
    #[arg(long, env = "DELIVERY_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Engine debug mode (per-event logs at info level)
    #[arg(long, env = "ANALYTICS_DEBUG", value_parser = BoolishValueParser::new())]
    pub debug: bool,

    /// TOML file with engine options
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Extra log directives such as `play_analytics::delivery=debug`
    #[arg(long = "log-directive", env = "LOG_DIRECTIVES", value_delimiter = ',')]
    pub log_directives: Vec<String>,
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config =
            Config::try_parse_from(args).map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.endpoint {
            Url::parse(endpoint).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid endpoint URL '{endpoint}': {e}"))
            })?;
        }

        if self.batch_size == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }
        if self.max_queue_size == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "Max queue size must be greater than 0".to_string(),
            ));
        }

        if let Some(rate) = self.sample_rate
            && !(0.0..=1.0).contains(&rate)
        {
            return Err(ConfigError::InvalidConfig(format!(
                "Sample rate must be between 0 and 1, got {rate}"
            )));
        }

        if self.timeout_ms == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "Delivery timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Options set on the command line or through the environment.
    pub fn to_options(&self) -> EngineOptions {
        EngineOptions {
            debug: self.debug.then_some(true),
            game_id: self.game_id.clone(),
            play_id: self.play_id.clone(),
            sample_rate: self.sample_rate,
            batch_size: self.batch_size,
            flush_interval_ms: self.flush_interval_ms,
            max_queue_size: self.max_queue_size,
            overflow_policy: self.overflow_policy,
            privacy: PrivacyOptions {
                consent_required: self.consent_required.then_some(true),
                ..PrivacyOptions::default()
            },
            delivery: DeliveryOptions {
                endpoint: self.endpoint.clone(),
                timeout_ms: self.timeout_ms,
                enable_compression: self.enable_compression.then_some(true),
                ..DeliveryOptions::default()
            },
            persistence: PersistenceOptions {
                enabled: self.no_persistence.then_some(false),
                storage_dir: self.storage_dir.clone(),
                ..PersistenceOptions::default()
            },
            ..EngineOptions::default()
        }
    }

    /// Config file options overlaid with command line options.
    pub fn engine_options(&self) -> Result<EngineOptions, ConfigError> {
        let base = match &self.config_file {
            Some(path) => EngineOptions::from_file(path)?,
            None => EngineOptions::default(),
        };
        Ok(base.overlay(self.to_options()))
    }
}
