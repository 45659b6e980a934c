use super::serialization::PayloadSerializer;
use super::{
    ClientConfig, ClientError, DeliveryError, DeliveryReceipt, EventBatch, HttpClient, Transport,
};
use futures::future::BoxFuture;
use reqwest::header::{
    CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT,
};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Batches larger than this are gzip-encoded when compression is enabled.
pub const COMPRESSION_THRESHOLD: usize = 100;

/// Delivers batches to the collection endpoint over HTTP.
#[derive(Clone)]
pub struct HttpTransport {
    pub client: HttpClient,
    serializer: PayloadSerializer,
}

impl HttpTransport {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            serializer: PayloadSerializer::new(),
        }
    }

    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::new(HttpClient::new(config)?))
    }

    pub async fn send_batch(&self, batch: EventBatch) -> Result<DeliveryReceipt, DeliveryError> {
        let start = Instant::now();
        let batch_id = batch.batch_id.clone();
        let batch_size = batch.len();

        debug!("Sending batch {} with {} events", batch_id, batch_size);

        let use_compression =
            self.client.config.enable_compression && batch_size > COMPRESSION_THRESHOLD;
        let payload = if use_compression {
            self.serializer.serialize_compressed(&batch)?
        } else {
            self.serializer.serialize(&batch)?
        };
        let bytes_sent = payload.len();
        let headers = self.build_headers(&batch, use_compression)?;

        let result = self
            .client
            .client
            .post(self.client.endpoint_url().clone())
            .headers(headers)
            .timeout(self.client.config.timeout)
            .body(payload)
            .send()
            .await;
        let latency = start.elapsed();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.client.stats.record_request(false, latency);
                warn!("Failed to send batch {}: {}", batch_id, e);
                return Err(if e.is_timeout() {
                    DeliveryError::Timeout
                } else {
                    DeliveryError::Network(e)
                });
            }
        };

        let status_code = response.status().as_u16();
        let success = response.status().is_success();
        self.client.stats.record_request(success, latency);

        if !success {
            warn!("Failed to send batch {}: HTTP {}", batch_id, status_code);
            return Err(DeliveryError::HttpStatus {
                status: status_code,
                batch_id,
            });
        }

        info!(
            "Successfully sent batch {} ({} events, {} bytes) in {:?}",
            batch_id, batch_size, bytes_sent, latency
        );

        Ok(DeliveryReceipt {
            batch_id,
            status_code,
            events: batch_size,
            bytes_sent,
            compressed: use_compression,
            latency,
        })
    }

    pub fn build_headers(
        &self,
        batch: &EventBatch,
        compressed: bool,
    ) -> Result<HeaderMap, DeliveryError> {
        let mut headers = HeaderMap::new();

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if compressed {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }

        // Session identifiers
        if let Some(game_id) = &batch.session.game_id {
            headers.insert(HeaderName::from_static("x-game-id"), header_value("game id", game_id)?);
        }
        if let Some(play_id) = &batch.session.play_id {
            headers.insert(HeaderName::from_static("x-play-id"), header_value("play id", play_id)?);
        }

        // Batch metadata
        headers.insert(
            HeaderName::from_static("x-batch-id"),
            header_value("batch id", &batch.batch_id)?,
        );
        headers.insert(
            HeaderName::from_static("x-batch-size"),
            header_value("batch size", &batch.len().to_string())?,
        );
        headers.insert(
            HeaderName::from_static("x-collector-version"),
            HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
        );
        headers.insert(
            USER_AGENT,
            header_value("user agent", &self.client.config.user_agent)?,
        );

        Ok(headers)
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, DeliveryError> {
    HeaderValue::from_str(value)
        .map_err(|e| DeliveryError::InvalidHeaderValue(format!("Invalid {name}: {e}")))
}

impl Transport for HttpTransport {
    fn submit(&self, batch: EventBatch) -> BoxFuture<'_, Result<DeliveryReceipt, DeliveryError>> {
        Box::pin(self.send_batch(batch))
    }
}
