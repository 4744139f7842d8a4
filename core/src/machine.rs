//! Circuit lifecycle as a guarded state machine
//!
//! Closed → Open → HalfOpen → {Closed, Open}. Guards read the shared context,
//! so every edge is checked against live metrics at the moment it fires.

use crate::circuit::Config;
use crate::metrics::{SlidingWindowMetrics, WindowSnapshot};
use crate::threshold::AdaptiveThresholdEngine;
use state_machines::state_machine;
use std::sync::Arc;
use tokio::time::Instant;

/// Circuit breaker context - shared data across all states
#[derive(Clone)]
pub struct CircuitContext {
    pub name: String,
    pub config: Config,
    pub metrics: Arc<SlidingWindowMetrics>,
    pub engine: AdaptiveThresholdEngine,
}

impl CircuitContext {
    pub fn new(name: String, config: Config) -> Self {
        let metrics = Arc::new(SlidingWindowMetrics::with_capacity(
            config.window_buckets,
            config.outcome_retention,
        ));
        let engine = AdaptiveThresholdEngine::new(
            config.error_percentage_threshold,
            config.volume_threshold,
            config.adaptive.clone(),
        );

        Self {
            name,
            config,
            metrics,
            engine,
        }
    }

    /// Recent window plus, when adaptation is on, the baseline window
    pub fn windows(&self) -> (WindowSnapshot, WindowSnapshot) {
        let recent = self.metrics.recent_metrics(self.config.monitoring_period);
        let baseline = if self.engine.is_adaptive() {
            self.metrics.baseline_metrics(self.engine.baseline_window())
        } else {
            WindowSnapshot::default()
        };
        (recent, baseline)
    }
}

impl Default for CircuitContext {
    fn default() -> Self {
        Self::new(String::new(), Config::default())
    }
}

impl std::fmt::Debug for CircuitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitContext")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    /// Earliest instant a probe may be admitted
    pub next_attempt_at: Option<Instant>,
}

/// Data specific to the HalfOpen state
#[derive(Debug, Clone, Default)]
pub struct HalfOpenData {
    /// Probes currently admitted (only tracked when probes are limited)
    pub probes: usize,
    pub successes: usize,
}

state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen(HalfOpenData),
    ],
    events {
        trip {
            guards: [should_open],
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [recovery_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            guards: [should_close],
            transition: { from: HalfOpen, to: Closed }
        }
    }
}

impl Circuit<Closed> {
    /// Volume floor met and recent error percentage at the effective threshold
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        let (recent, baseline) = ctx.windows();
        ctx.engine.should_open(&recent, &baseline)
    }
}

impl Circuit<HalfOpen> {
    /// Any failure during probation reopens the circuit
    fn should_open(&self, _ctx: &CircuitContext) -> bool {
        true
    }

    fn should_close(&self, ctx: &CircuitContext) -> bool {
        self.state_data_half_open()
            .is_some_and(|data| data.successes >= ctx.config.success_threshold)
    }
}

impl Circuit<Open> {
    fn recovery_elapsed(&self, _ctx: &CircuitContext) -> bool {
        self.state_data_open()
            .and_then(|data| data.next_attempt_at)
            .is_none_or(|at| Instant::now() >= at)
    }
}
