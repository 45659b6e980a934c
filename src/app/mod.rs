pub mod cli;
pub mod initialization;
pub mod input;
pub mod logging_system;
pub mod shutdown;

pub use cli::Config;
pub use initialization::{InitializationError, LogDirective, LogFormat, LogLevel};
pub use input::{InputStats, LineReceiver};
pub use logging_system::{LoggingSystem, setup_logging_safe};

use crate::buffer::BufferState;
use crate::delivery::{DeliveryState, FlushOutcome};
use crate::engine::AnalyticsEngine;
use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{error, info};

/// End-of-run report printed to stdout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub input: InputStats,
    pub buffer: BufferState,
    pub delivery: DeliveryState,
    pub final_flush: String,
}

pub struct App {
    engine: AnalyticsEngine,
}

impl App {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let options = config
            .engine_options()
            .context("Failed to load engine options")?;
        let engine = AnalyticsEngine::initialize(options)
            .await
            .context("Failed to initialize analytics engine")?;

        if config.grant_consent {
            engine.set_consent(true);
        }

        Ok(Self { engine })
    }

    pub fn engine(&self) -> &AnalyticsEngine {
        &self.engine
    }

    /// Tracks events from `lines` until end of input or a shutdown signal,
    /// then tears the engine down.
    pub async fn run(self, mut lines: LineReceiver) -> anyhow::Result<RunSummary> {
        let mut stats = InputStats::default();

        tokio::select! {
            result = input::pump(&self.engine, &mut lines, &mut stats) => {
                result.context("Failed to read events from input")?;
                info!(lines = stats.lines, "End of input");
            }
            signal = shutdown::wait_for_signal() => {
                info!(?signal, "Stopping on signal");
            }
        }

        let final_flush = match self.engine.shutdown().await {
            Some(FlushOutcome::Delivered { removed, .. }) => format!("delivered {removed} events"),
            Some(FlushOutcome::Failed { error, .. }) => format!("failed: {error}"),
            Some(FlushOutcome::Skipped(reason)) => format!("skipped: {reason}"),
            None => "already shut down".to_string(),
        };

        Ok(RunSummary {
            input: stats,
            buffer: self.engine.buffer_state(),
            delivery: self.engine.delivery_state(),
            final_flush,
        })
    }
}

pub async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    config.validate()?;

    match setup_logging_safe(config.log_level, config.log_format, &config.log_directives) {
        Ok(()) => {}
        Err(e) if e.is_recoverable() => eprintln!("Continuing with default logging: {e}"),
        Err(e) => return Err(e).context("Failed to initialize logging"),
    }
    info!("Starting play-analytics v{}", crate::VERSION);

    let app = App::from_config(&config).await?;
    let lines = input::spawn_line_reader(std::io::BufReader::new(std::io::stdin()))
        .context("Failed to start input reader")?;
    let summary = match app.run(lines).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Run failed: {:#}", e);
            return Err(e);
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
