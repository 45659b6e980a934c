use super::{ConfigError, EngineConfig};
use url::Url;

const MAX_QUEUE_SIZE: usize = 1_000_000;

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate endpoint URL
        let endpoint = Url::parse(&self.delivery.endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid endpoint URL '{}': {}",
                self.delivery.endpoint, e
            ))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "Endpoint must use http or https: {}",
                self.delivery.endpoint
            )));
        }

        // Rates outside [0, 1] are meaningful (always reject / always admit)
        if !self.sample_rate.is_finite() {
            return Err(ConfigError::InvalidConfig(format!(
                "Sample rate must be a finite number, got {}",
                self.sample_rate
            )));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.max_queue_size == 0 || self.max_queue_size > MAX_QUEUE_SIZE {
            return Err(ConfigError::InvalidConfig(format!(
                "Max queue size must be between 1 and {MAX_QUEUE_SIZE}, got {}",
                self.max_queue_size
            )));
        }

        if self.max_queue_size < self.batch_size {
            return Err(ConfigError::InvalidConfig(format!(
                "Max queue size ({}) must be at least as large as batch size ({})",
                self.max_queue_size, self.batch_size
            )));
        }

        if self.delivery.timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Delivery timeout must be greater than 0".to_string(),
            ));
        }

        if self.persistence.enabled {
            let key = &self.persistence.storage_key;
            let valid_key = !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
            if !valid_key || key.starts_with('.') {
                return Err(ConfigError::InvalidConfig(format!(
                    "Storage key '{key}' must be non-empty and use only [A-Za-z0-9_.-]"
                )));
            }
        }

        Ok(())
    }
}
