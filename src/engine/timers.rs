use super::inner::Inner;
use crate::domain::PartialEvent;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, warn};

/// Starts the recurring flush and, when enabled, the performance sampler.
/// Both hold only a weak reference and stop on cancellation.
pub(super) fn arm(inner: &Arc<Inner>) {
    let flush_interval = inner.config.flush_interval;
    if !flush_interval.is_zero() {
        spawn_periodic(inner, flush_interval, "flush", |inner| async move {
            inner.flush_now().await;
        });
    }

    let perf_interval = inner.config.performance_interval;
    if inner.config.channels.performance && !perf_interval.is_zero() {
        spawn_periodic(inner, perf_interval, "performance", |inner| async move {
            sample_performance(&inner);
        });
    }
}

fn spawn_periodic<F, Fut>(inner: &Arc<Inner>, period: Duration, name: &'static str, tick: F)
where
    F: Fn(Arc<Inner>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let token = inner.cancel.clone();

    inner.tracker.spawn_on(
        async move {
            // First tick one period from now, not immediately
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(timer = name, ?period, "Timer armed");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        tick(inner).await;
                    }
                }
            }

            debug!(timer = name, "Timer disarmed");
        },
        &inner.runtime,
    );
}

fn sample_performance(inner: &Arc<Inner>) {
    let (buffer, delivery) = {
        let state = inner.state.lock();
        (state.outbox.queue.state(), state.outbox.delivery.clone())
    };

    let partial = PartialEvent::new("performance")
        .with_target("engine")
        .with_metadata("uptimeMs", inner.started_at.elapsed().as_millis() as u64)
        .with_metadata("queueSize", buffer.size as u64)
        .with_metadata("overflowCount", buffer.overflow_count)
        .with_metadata("evictedCount", buffer.evicted_count)
        .with_metadata("successfulSubmissions", delivery.successful_submission_count)
        .with_metadata("failedSubmissions", delivery.failed_submission_count);

    if let Err(e) = inner.track(partial, true) {
        warn!("Could not record performance sample: {}", e);
    }
}
