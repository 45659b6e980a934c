use crate::domain::PartialEvent;
use crate::engine::{AnalyticsEngine, TrackOutcome};
use serde::Serialize;
use std::io::{self, BufRead};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const LINE_CHANNEL_CAPACITY: usize = 1024;

pub type LineReceiver = mpsc::Receiver<io::Result<String>>;

/// Counts of what happened to each input line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputStats {
    pub lines: u64,
    pub queued: u64,
    pub dropped: u64,
    pub discarded: u64,
    pub rejected: u64,
    pub invalid: u64,
}

/// Reads `reader` line by line on a dedicated OS thread.
///
/// A blocked read stays on that thread, so neither a shutdown signal nor
/// runtime teardown has to wait for the producer to write or close.
pub fn spawn_line_reader<R>(reader: R) -> io::Result<LineReceiver>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    thread::Builder::new()
        .name("input-reader".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Tracks one event per non-empty line of newline-delimited JSON until the
/// reader thread reaches end of input.
pub async fn pump(
    engine: &AnalyticsEngine,
    lines: &mut LineReceiver,
    stats: &mut InputStats,
) -> io::Result<()> {
    while let Some(line) = lines.recv().await {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;
        track_line(engine, line, stats);
    }
    Ok(())
}

fn track_line(engine: &AnalyticsEngine, line: &str, stats: &mut InputStats) {
    let partial: PartialEvent = match serde_json::from_str(line) {
        Ok(partial) => partial,
        Err(e) => {
            warn!(line = stats.lines, "Skipping invalid event: {}", e);
            stats.invalid += 1;
            return;
        }
    };

    match engine.track(partial) {
        Ok(TrackOutcome::Queued(_)) => stats.queued += 1,
        Ok(TrackOutcome::Dropped(reason)) => {
            debug!(line = stats.lines, ?reason, "Event dropped");
            stats.dropped += 1;
        }
        Ok(TrackOutcome::Discarded) => stats.discarded += 1,
        Err(e) => {
            warn!(line = stats.lines, "Event rejected: {}", e);
            stats.rejected += 1;
        }
    }
}
