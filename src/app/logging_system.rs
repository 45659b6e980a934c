use super::initialization::{
    FallbackStrategy, InitializationError, LogDirective, LogFormat, LogLevel,
};
use parking_lot::RwLock;
use std::sync::{Arc, Once};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Collects `EnvFilter` directives and installs the global subscriber.
pub struct LoggingSystem {
    directives: Arc<RwLock<Vec<LogDirective>>>,
    fallback_level: LogLevel,
}

impl LoggingSystem {
    pub fn new() -> Self {
        Self {
            directives: Arc::new(RwLock::new(Vec::new())),
            fallback_level: LogLevel::Info,
        }
    }

    /// Adds a `target=level` directive. A bad level falls back to the default
    /// level; a malformed directive is skipped.
    pub fn add_directive(&self, directive_str: &str) -> Result<(), InitializationError> {
        match LogDirective::parse(directive_str) {
            Ok(directive) => {
                self.directives.write().push(directive);
                Ok(())
            }
            Err(e) => match e.fallback_strategy() {
                FallbackStrategy::UseDefaultLevel => {
                    eprintln!("Warning: {e}, using default level");
                    let target = directive_str.split('=').next().unwrap_or_default().trim();
                    self.directives
                        .write()
                        .push(LogDirective::new(target, self.fallback_level));
                    Ok(())
                }
                FallbackStrategy::SkipDirective => {
                    eprintln!("Warning: {e}, skipping directive");
                    Ok(())
                }
                FallbackStrategy::AbortStartup => Err(e),
            },
        }
    }

    /// Quiets the HTTP stack underneath the delivery client.
    pub fn add_default_directives(&self) {
        let mut directives = self.directives.write();
        for target in ["hyper", "hyper_util", "reqwest", "h2", "rustls"] {
            directives.push(LogDirective::new(target, LogLevel::Warn));
        }
    }

    pub fn build_filter_string(&self, default_level: LogLevel) -> String {
        let directives = self.directives.read();

        let mut filter_parts = Vec::with_capacity(directives.len() + 1);
        filter_parts.push(default_level.as_str().to_string());
        filter_parts.extend(directives.iter().map(LogDirective::to_filter_string));
        filter_parts.join(",")
    }

    /// Installs the global subscriber. Logs go to stderr so stdout stays
    /// free for the delivery summary.
    pub fn initialize_tracing(
        &self,
        default_level: LogLevel,
        format: LogFormat,
    ) -> Result<(), InitializationError> {
        let filter_string = self.build_filter_string(default_level);
        let env_filter = EnvFilter::try_new(&filter_string).map_err(|e| {
            InitializationError::LoggingInitFailed {
                details: format!("Failed to create EnvFilter with '{filter_string}'"),
                source: Box::new(e),
            }
        })?;

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = match format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_current_span(true)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
            LogFormat::Compact => registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr)
                        .compact(),
                )
                .try_init(),
        };

        result.map_err(|e| InitializationError::LoggingInitFailed {
            details: "Failed to set global tracing subscriber".to_string(),
            source: Box::new(e),
        })
    }

    pub fn directive_count(&self) -> usize {
        self.directives.read().len()
    }
}

impl Default for LoggingSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs logging once per process. Later calls report whether the first
/// one succeeded.
pub fn setup_logging_safe(
    level: LogLevel,
    format: LogFormat,
    extra_directives: &[String],
) -> Result<(), InitializationError> {
    static INIT: Once = Once::new();
    static INIT_SUCCESS: parking_lot::Mutex<bool> = parking_lot::Mutex::new(false);

    INIT.call_once(|| {
        let logging_system = LoggingSystem::new();
        logging_system.add_default_directives();

        let mut result = Ok(());
        for directive in extra_directives {
            if let Err(e) = logging_system.add_directive(directive) {
                result = Err(e);
                break;
            }
        }
        let result = result.and_then(|()| logging_system.initialize_tracing(level, format));

        match result {
            Ok(()) => *INIT_SUCCESS.lock() = true,
            Err(e) => eprintln!("Failed to initialize logging: {e}"),
        }
    });

    if *INIT_SUCCESS.lock() {
        Ok(())
    } else {
        Err(InitializationError::LoggingInitFailed {
            details: "Logging system initialization failed".to_string(),
            source: Box::new(std::io::Error::other("Logging initialization error")),
        })
    }
}
