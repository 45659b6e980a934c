use super::AnalyticsEngine;
use super::error::EngineError;
use super::inner::{EngineState, Inner};
use super::timers;
use crate::buffer::{FixedCapacityQueue, QueueConfig};
use crate::config::{EngineConfig, EngineOptions};
use crate::delivery::{DeliveryController, Outbox};
use crate::domain::Event;
use crate::enrich::{EnvironmentProvider, EventEnricher, EventTransform, HostEnvironment};
use crate::reliability::{FileStore, PersistenceAdapter, SnapshotStore};
use crate::sampling::ConsentState;
use crate::sender::{ClientConfig, HttpTransport, Transport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Collaborators for an engine. Anything left unset gets the default:
/// HTTP delivery to the configured endpoint, a `FileStore` under the
/// configured storage directory, and `HostEnvironment`.
#[derive(Default)]
pub struct EngineBuilder {
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn SnapshotStore>>,
    environment: Option<Arc<dyn EnvironmentProvider>>,
    transform: Option<Arc<dyn EventTransform>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn environment(mut self, environment: Arc<dyn EnvironmentProvider>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn transform(mut self, transform: Arc<dyn EventTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Merges `options` over the defaults, restores persisted events and
    /// arms the timers. Must run inside a tokio runtime; background work is
    /// spawned onto it.
    pub async fn initialize(self, options: EngineOptions) -> Result<AnalyticsEngine, EngineError> {
        let config = EngineConfig::from_options(options)?;
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::from_config(ClientConfig::from(
                config.delivery.clone(),
            ))?),
        };
        let environment = self
            .environment
            .unwrap_or_else(|| Arc::new(HostEnvironment::new()));

        let persistence = if config.persistence.enabled {
            let store = self.store.unwrap_or_else(|| {
                Arc::new(FileStore::new(config.persistence.storage_dir.clone()))
            });
            Some(Arc::new(PersistenceAdapter::new(
                store,
                config.persistence.storage_key.clone(),
            )))
        } else {
            None
        };

        let mut queue = FixedCapacityQueue::new(QueueConfig::new(
            config.max_queue_size,
            config.overflow_policy,
        ))?;
        if let Some(adapter) = &persistence {
            let restored = restore(adapter.clone()).await;
            let total = restored.len();
            for event in restored {
                if let Err(e) = queue.push(event) {
                    warn!("Stopped restoring persisted events: {}", e);
                    break;
                }
            }
            if total > 0 {
                info!(restored = queue.len(), persisted = total, "Restored persisted events");
            }
            if queue.len() < total {
                warn!(
                    dropped = total - queue.len(),
                    "Persisted snapshot exceeded queue capacity"
                );
            }
        }

        let mut enricher = EventEnricher::new(
            config.session.clone(),
            config.privacy.collect_environment_data,
            environment.clone(),
        );
        if let Some(transform) = self.transform {
            enricher = enricher.with_transform(transform);
        }

        let state = EngineState {
            outbox: Outbox::new(queue),
            enabled: config.enabled,
            debug: config.debug,
            consent: ConsentState {
                granted: None,
                do_not_track: environment.do_not_track(),
            },
            bindings: HashMap::new(),
        };

        let inner = Arc::new(Inner {
            delivery: DeliveryController::new(transport, config.session.clone()),
            config,
            state: Mutex::new(state),
            enricher,
            persistence,
            runtime,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            persist_scheduled: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            next_binding_id: AtomicU64::new(1),
            started_at: Instant::now(),
        });

        timers::arm(&inner);

        info!(
            endpoint = %inner.config.delivery.endpoint,
            batch_size = inner.config.batch_size,
            max_queue_size = inner.config.max_queue_size,
            sample_rate = inner.config.sample_rate,
            "Analytics engine initialized"
        );

        Ok(AnalyticsEngine { inner })
    }
}

/// Loads the persisted snapshot. Unreadable snapshots are logged and skipped.
async fn restore(adapter: Arc<PersistenceAdapter>) -> Vec<Event> {
    let loaded = tokio::task::spawn_blocking(move || adapter.load()).await;
    match loaded {
        Ok(Ok(events)) => events,
        Ok(Err(e)) => {
            warn!("Ignoring unreadable persisted events: {}", e);
            Vec::new()
        }
        Err(e) => {
            warn!("Restore task failed: {}", e);
            Vec::new()
        }
    }
}
