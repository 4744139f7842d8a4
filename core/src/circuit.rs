//! Circuit breaker implementation using state machines
//!
//! This module wires the state machine, sliding-window metrics, bulkhead and
//! jitter source into one breaker that is safe to share between tasks.

use crate::{
    bulkhead::BulkheadLimiter,
    callbacks::Callbacks,
    errors::CircuitError,
    housekeeping::Housekeeping,
    jitter::{DEFAULT_MAX_JITTER, DEFAULT_RESEED_INTERVAL, JitterSource},
    machine::{CircuitContext, CircuitEvent, DynamicCircuit},
    metrics::{
        DEFAULT_BUCKETS, DEFAULT_OUTCOME_RETENTION, ErrorSample, RequestOutcome, WindowSnapshot,
    },
    stats::CircuitStats,
    threshold::AdaptiveConfig,
};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Far enough ahead that an open circuit only recovers through `reset()`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Error percentage (0-100) in the monitoring period that opens the circuit
    pub error_percentage_threshold: f64,

    /// Minimum calls in the monitoring period before the circuit may open
    pub volume_threshold: usize,

    /// Recent window the open decision is based on
    pub monitoring_period: Duration,

    /// Time an open circuit waits (plus jitter) before admitting probes
    pub recovery_timeout: Duration,

    /// Number of successful probes required to close from HalfOpen
    pub success_threshold: usize,

    /// Probes admitted concurrently while HalfOpen; `None` admits every call
    ///
    /// Calls over the limit get `CircuitError::Open` with a zero `retry_after`
    /// while `state()` still reports HalfOpen: a slot frees as soon as a
    /// running probe settles. `Some(0)` is treated as `Some(1)`.
    pub half_open_max_calls: Option<usize>,

    /// Bulkhead size: maximum calls in flight
    pub max_concurrent_requests: usize,

    /// Deadline for a single call unless overridden per call
    pub call_timeout: Duration,

    /// Baseline-relative threshold adaptation
    pub adaptive: AdaptiveConfig,

    /// Upper bound of the random delay added to `recovery_timeout`
    pub max_jitter: Duration,

    /// How often the jitter pool is reseeded from OS entropy
    pub jitter_reseed_interval: Duration,

    /// Number of one-second buckets in the metrics ring
    pub window_buckets: usize,

    /// How long per-call outcomes are kept for diagnostics
    pub outcome_retention: Duration,

    /// Tick of the background housekeeping task
    pub housekeeping_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            error_percentage_threshold: 50.0,
            volume_threshold: 10,
            monitoring_period: Duration::from_secs(10),
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
            half_open_max_calls: None,
            max_concurrent_requests: 100,
            call_timeout: Duration::from_secs(30),
            adaptive: AdaptiveConfig::default(),
            max_jitter: DEFAULT_MAX_JITTER,
            jitter_reseed_interval: DEFAULT_RESEED_INTERVAL,
            window_buckets: DEFAULT_BUCKETS,
            outcome_retention: DEFAULT_OUTCOME_RETENTION,
            housekeeping_interval: Duration::from_secs(1),
        }
    }
}

/// Circuit lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }

    fn of(machine: &DynamicCircuit) -> Self {
        match machine.current_state() {
            "Open" => CircuitState::Open,
            "HalfOpen" => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides `Config::call_timeout` for this call
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

struct Inner {
    machine: DynamicCircuit,
    failure_count: u64,
    success_count: u64,
    /// Bumped on every entry into HalfOpen so stale probe slots are ignored
    half_open_epoch: u64,
}

/// Circuit breaker public API
///
/// Share it behind an `Arc`; every method takes `&self`. One breaker should
/// guard exactly one downstream dependency.
pub struct CircuitBreaker {
    context: CircuitContext,
    inner: Mutex<Inner>,
    bulkhead: Arc<BulkheadLimiter>,
    jitter: Arc<JitterSource>,
    callbacks: Callbacks,
    housekeeping: Housekeeping,
}

impl CircuitBreaker {
    /// Create a new circuit breaker (use builder() for more options)
    ///
    /// # Panics
    ///
    /// Panics if `max_concurrent_requests` or `window_buckets` is 0.
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        Self::with_parts(name.into(), config, Callbacks::new(), None)
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }

    pub(crate) fn with_parts(
        name: String,
        mut config: Config,
        callbacks: Callbacks,
        jitter_seed: Option<u64>,
    ) -> Self {
        config.success_threshold = config.success_threshold.max(1);
        config.half_open_max_calls = config.half_open_max_calls.map(|limit| limit.max(1));

        let bulkhead = Arc::new(BulkheadLimiter::new(config.max_concurrent_requests));
        let jitter = Arc::new(match jitter_seed {
            Some(seed) => {
                JitterSource::with_seed(config.max_jitter, config.jitter_reseed_interval, seed)
            }
            None => JitterSource::new(config.max_jitter, config.jitter_reseed_interval),
        });

        let context = CircuitContext::new(name, config);
        let housekeeping = Housekeeping::start(
            &context.name,
            context.metrics.clone(),
            jitter.clone(),
            context.config.housekeeping_interval,
        );
        let inner = Inner {
            machine: DynamicCircuit::new(context.clone()),
            failure_count: 0,
            success_count: 0,
            half_open_epoch: 0,
        };

        Self {
            context,
            inner: Mutex::new(inner),
            bulkhead,
            jitter,
            callbacks,
            housekeeping,
        }
    }

    /// Execute an async operation with circuit breaker protection
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute_with(f, CallOptions::default()).await
    }

    /// Execute with per-call options
    ///
    /// The operation is invoked at most once. On timeout its future is
    /// dropped, but anything it already spawned keeps running; propagate
    /// cancellation into `f` if the downstream needs it.
    pub async fn execute_with<F, Fut, T, E>(
        &self,
        f: F,
        options: CallOptions,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let _probe = self.pass_gate()?;

        let Some(_permit) = self.bulkhead.try_admit() else {
            tracing::debug!(circuit = %self.context.name, "bulkhead full, rejecting call");
            return Err(CircuitError::BulkheadFull {
                circuit: self.context.name.clone(),
                limit: self.bulkhead.limit(),
            });
        };

        let timeout = options.timeout.unwrap_or(self.context.config.call_timeout);
        let start = Instant::now();
        let result = tokio::time::timeout(timeout, f()).await;
        let duration = start.elapsed();

        match result {
            Ok(Ok(value)) => {
                self.on_success(duration);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.on_failure(duration, &e.to_string());
                Err(CircuitError::Execution(e))
            }
            Err(_) => {
                self.on_failure(duration, "timeout");
                Err(CircuitError::Timeout {
                    circuit: self.context.name.clone(),
                    timeout,
                })
            }
        }
    }

    /// Fail fast when open, move to HalfOpen once recovery is due, and take
    /// a probe slot when probes are limited
    fn pass_gate<E>(&self) -> Result<Option<ProbeSlot<'_>>, CircuitError<E>> {
        let mut inner = self.lock();
        let mut half_opened = false;

        if CircuitState::of(&inner.machine) == CircuitState::Open {
            if inner.machine.handle(CircuitEvent::AttemptReset).is_err() {
                let retry_after = inner
                    .machine
                    .open_data()
                    .and_then(|data| data.next_attempt_at)
                    .map(|at| at.saturating_duration_since(Instant::now()))
                    .unwrap_or_default();
                tracing::debug!(
                    circuit = %self.context.name,
                    ?retry_after,
                    "circuit open, rejecting call"
                );
                return Err(CircuitError::Open {
                    circuit: self.context.name.clone(),
                    retry_after,
                });
            }
            inner.half_open_epoch += 1;
            half_opened = true;
            tracing::info!(circuit = %self.context.name, "circuit half-open, admitting probes");
        }

        let slot = self.take_probe_slot(&mut inner);
        drop(inner);

        if half_opened {
            self.callbacks.trigger_transition(
                &self.context.name,
                CircuitState::Open,
                CircuitState::HalfOpen,
            );
        }
        slot
    }

    fn take_probe_slot<E>(
        &self,
        inner: &mut Inner,
    ) -> Result<Option<ProbeSlot<'_>>, CircuitError<E>> {
        let Some(limit) = self.context.config.half_open_max_calls else {
            return Ok(None);
        };
        let epoch = inner.half_open_epoch;
        let Some(data) = inner.machine.half_open_data_mut() else {
            return Ok(None);
        };

        if data.probes >= limit {
            tracing::debug!(
                circuit = %self.context.name,
                limit,
                "probe limit reached, rejecting call"
            );
            return Err(CircuitError::Open {
                circuit: self.context.name.clone(),
                retry_after: Duration::ZERO,
            });
        }
        data.probes += 1;

        Ok(Some(ProbeSlot {
            breaker: self,
            epoch,
        }))
    }

    fn on_success(&self, duration: Duration) {
        let closed = {
            let mut inner = self.lock();

            self.context.metrics.record_success(duration);
            inner.success_count += 1;

            if CircuitState::of(&inner.machine) != CircuitState::HalfOpen {
                return;
            }
            if let Some(data) = inner.machine.half_open_data_mut() {
                data.successes += 1;
            }
            let closed = inner.machine.handle(CircuitEvent::Close).is_ok();
            if closed {
                inner.failure_count = 0;
                tracing::info!(circuit = %self.context.name, "circuit closed");
            }
            closed
        };

        if closed {
            self.callbacks.trigger_transition(
                &self.context.name,
                CircuitState::HalfOpen,
                CircuitState::Closed,
            );
        }
    }

    fn on_failure(&self, duration: Duration, error: &str) {
        let opened_from = {
            let mut inner = self.lock();

            self.context.metrics.record_failure(duration, Some(error));
            inner.failure_count += 1;

            let from = CircuitState::of(&inner.machine);
            if inner.machine.handle(CircuitEvent::Trip).is_err() {
                return;
            }
            self.mark_open(&mut inner, from);
            from
        };

        self.callbacks
            .trigger_transition(&self.context.name, opened_from, CircuitState::Open);
    }

    /// Apply Open-state bookkeeping (next attempt + log)
    fn mark_open(&self, inner: &mut Inner, from: CircuitState) {
        let delay = self
            .context
            .config
            .recovery_timeout
            .saturating_add(self.jitter.next_jitter());
        let now = Instant::now();
        let next_attempt_at = now
            .checked_add(delay)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        if let Some(data) = inner.machine.open_data_mut() {
            data.next_attempt_at = Some(next_attempt_at);
        }

        let recent = self
            .context
            .metrics
            .recent_metrics(self.context.config.monitoring_period);
        tracing::warn!(
            circuit = %self.context.name,
            %from,
            error_rate = recent.error_percentage(),
            requests = recent.total_requests,
            retry_in = ?delay,
            "circuit opened"
        );
    }

    fn release_probe(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.half_open_epoch != epoch {
            return;
        }
        if let Some(data) = inner.machine.half_open_data_mut() {
            data.probes = data.probes.saturating_sub(1);
        }
    }

    /// Snapshot of counters and recent-window statistics
    pub fn stats(&self) -> CircuitStats {
        let inner = self.lock();
        let recent = self
            .context
            .metrics
            .recent_metrics(self.context.config.monitoring_period);
        let state = CircuitState::of(&inner.machine);
        let next_attempt = match state {
            CircuitState::Open => inner.machine.open_data().and_then(|d| d.next_attempt_at),
            _ => None,
        };

        CircuitStats {
            name: self.context.name.clone(),
            state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            current_requests: self.bulkhead.in_flight(),
            error_rate: recent.error_percentage(),
            average_response_time: recent.average_duration(),
            next_attempt,
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::of(&self.lock().machine)
    }

    /// Get current state name
    pub fn state_name(&self) -> &'static str {
        self.state().as_str()
    }

    /// Check if circuit is open
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Check if circuit is closed
    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == CircuitState::HalfOpen
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Calls currently in flight
    pub fn in_flight(&self) -> usize {
        self.bulkhead.in_flight()
    }

    /// Highest number of calls ever in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.bulkhead.peak_in_flight()
    }

    /// Aggregate over the monitoring period
    pub fn recent_metrics(&self) -> WindowSnapshot {
        self.context
            .metrics
            .recent_metrics(self.context.config.monitoring_period)
    }

    /// Aggregate over the adaptive baseline window
    pub fn baseline_metrics(&self) -> WindowSnapshot {
        self.context
            .metrics
            .baseline_metrics(self.context.config.adaptive.baseline_window)
    }

    /// Threshold in percent the next Closed-state decision would use
    pub fn effective_threshold(&self) -> f64 {
        let (recent, baseline) = self.context.windows();
        self.context.engine.effective_threshold(&recent, &baseline)
    }

    /// Last `limit` call outcomes, oldest first
    pub fn recent_outcomes(&self, limit: usize) -> Vec<RequestOutcome> {
        self.context.metrics.recent_outcomes(limit)
    }

    /// Error samples from the monitoring period, oldest first
    pub fn recent_errors(&self) -> Vec<ErrorSample> {
        self.context
            .metrics
            .recent_errors(self.context.config.monitoring_period)
    }

    /// Whether the background housekeeping task is alive
    pub fn housekeeping_running(&self) -> bool {
        self.housekeeping.is_running()
    }

    /// Clear all metrics and counters and put the circuit back to Closed
    ///
    /// This is an administrative override outside the normal lifecycle and
    /// does not fire transition callbacks.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.context.metrics.clear();
        inner.machine = DynamicCircuit::new(self.context.clone());
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.half_open_epoch += 1;
    }

    /// Stop background work and drop recorded metrics
    ///
    /// Returns once the housekeeping task has been aborted. Safe to call more
    /// than once. The breaker keeps working afterwards, without timers.
    pub fn shutdown(&self) {
        if self.housekeeping.stop() {
            tracing::debug!(circuit = %self.context.name, "housekeeping stopped");
        }
        self.context.metrics.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(circuit = %self.context.name, "circuit lock poisoned, recovering");
            self.inner.clear_poison();
            poisoned.into_inner()
        })
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.context.name)
            .field("state", &self.state())
            .field("bulkhead", &self.bulkhead)
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

/// Held by a HalfOpen probe; gives its slot back however the call ends
struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
    epoch: u64,
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        self.breaker.release_probe(self.epoch);
    }
}
