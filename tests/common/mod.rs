#![allow(dead_code)]

use futures::future::BoxFuture;
use parking_lot::Mutex;
use play_analytics::config::{EngineOptions, PersistenceOptions};
use play_analytics::domain::EnvironmentSnapshot;
use play_analytics::enrich::StaticEnvironment;
use play_analytics::sender::{DeliveryError, DeliveryReceipt, EventBatch, Transport};
use play_analytics::{AnalyticsEngine, EngineBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// In-memory transport that records every batch it is handed.
#[derive(Default)]
pub struct StubTransport {
    calls: AtomicUsize,
    batches: Mutex<Vec<EventBatch>>,
    fail_status: Mutex<Option<u16>>,
    gate: Option<Semaphore>,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every submission waits for a permit from `release`.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        let transport = Self::default();
        *transport.fail_status.lock() = Some(status);
        Arc::new(transport)
    }

    pub fn set_fail_status(&self, status: Option<u16>) {
        *self.fail_status.lock() = status;
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<EventBatch> {
        self.batches.lock().clone()
    }
}

impl Transport for StubTransport {
    fn submit(&self, batch: EventBatch) -> BoxFuture<'_, Result<DeliveryReceipt, DeliveryError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate closed").forget();
            }

            let batch_id = batch.batch_id.clone();
            let events = batch.len();
            let status = *self.fail_status.lock();
            self.batches.lock().push(batch);

            match status {
                Some(status) => Err(DeliveryError::HttpStatus { status, batch_id }),
                None => Ok(DeliveryReceipt {
                    batch_id,
                    status_code: 200,
                    events,
                    bytes_sent: 0,
                    compressed: false,
                    latency: Duration::ZERO,
                }),
            }
        })
    }
}

/// Options with timers and persistence switched off.
pub fn quiet_options() -> EngineOptions {
    EngineOptions {
        flush_interval_ms: Some(0),
        performance_interval_ms: Some(0),
        persistence: PersistenceOptions {
            enabled: Some(false),
            ..PersistenceOptions::default()
        },
        ..EngineOptions::default()
    }
}

pub fn test_environment() -> StaticEnvironment {
    StaticEnvironment::new(EnvironmentSnapshot::new().with("os", "test-os"))
}

pub fn builder(transport: Arc<StubTransport>) -> EngineBuilder {
    AnalyticsEngine::builder()
        .transport(transport)
        .environment(Arc::new(test_environment()))
}

pub async fn engine(transport: Arc<StubTransport>, options: EngineOptions) -> AnalyticsEngine {
    builder(transport)
        .initialize(options)
        .await
        .expect("engine should initialize")
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}
