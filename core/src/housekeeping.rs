//! Per-breaker background maintenance
//!
//! One task per breaker advances the bucket ring through quiet periods,
//! sweeps expired diagnostic outcomes and reseeds the jitter pool. The task
//! is owned by the breaker and aborted on shutdown or drop; nothing here is
//! process-global.

use crate::jitter::JitterSource;
use crate::metrics::SlidingWindowMetrics;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug)]
pub(crate) struct Housekeeping {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Housekeeping {
    /// Spawn the maintenance loop on the current tokio runtime
    ///
    /// Outside a runtime nothing is spawned; buckets still rotate on record
    /// and the jitter pool still reseeds lazily on draw.
    pub(crate) fn start(
        circuit: &str,
        metrics: Arc<SlidingWindowMetrics>,
        jitter: Arc<JitterSource>,
        period: Duration,
    ) -> Self {
        let task = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let circuit = circuit.to_string();
                let period = period.max(Duration::from_millis(1));
                Some(handle.spawn(run(circuit, metrics, jitter, period)))
            }
            Err(_) => {
                tracing::debug!(circuit, "no tokio runtime, housekeeping disabled");
                None
            }
        };

        Self {
            task: Mutex::new(task),
        }
    }

    /// Abort the task; returns true if one was running
    pub(crate) fn stop(&self) -> bool {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match task {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Housekeeping {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    circuit: String,
    metrics: Arc<SlidingWindowMetrics>,
    jitter: Arc<JitterSource>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        metrics.rotate_if_stale();

        let swept = metrics.sweep_outcomes();
        if swept > 0 {
            tracing::trace!(circuit = %circuit, swept, "expired outcomes swept");
        }

        jitter.reseed_if_due();
    }
}
