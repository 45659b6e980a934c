use super::EventBatch;
use crate::domain::Event;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::io::Write;
use thiserror::Error;

// Maximum safe buffer size to prevent memory allocation issues
const MAX_SAFE_BUFFER_SIZE: usize = 100 * 1024 * 1024; // 100MB
const ESTIMATED_EVENT_SIZE: usize = 512; // bytes per event
const ENVELOPE_OVERHEAD: usize = 16;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error during serialization: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Batch is empty")]
    EmptyBatch,
}

/// Request body: `{"events": [...]}`.
#[derive(Serialize)]
struct Payload<'a> {
    events: &'a [Event],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadSerializer;

impl PayloadSerializer {
    pub fn new() -> Self {
        Self
    }

    pub fn serialize(&self, batch: &EventBatch) -> Result<Vec<u8>, SerializationError> {
        if batch.is_empty() {
            return Err(SerializationError::EmptyBatch);
        }

        let capacity = self.estimate_serialized_size(batch).min(MAX_SAFE_BUFFER_SIZE);
        let mut buffer = Vec::with_capacity(capacity);
        serde_json::to_writer(
            &mut buffer,
            &Payload {
                events: &batch.events,
            },
        )?;
        Ok(buffer)
    }

    pub fn serialize_compressed(&self, batch: &EventBatch) -> Result<Vec<u8>, SerializationError> {
        let data = self.serialize(batch)?;
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::fast());
        encoder.write_all(&data)?;
        Ok(encoder.finish()?)
    }

    pub fn estimate_serialized_size(&self, batch: &EventBatch) -> usize {
        batch
            .len()
            .saturating_mul(ESTIMATED_EVENT_SIZE)
            .saturating_add(ENVELOPE_OVERHEAD)
    }
}
