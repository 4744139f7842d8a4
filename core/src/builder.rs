//! Builder API for ergonomic circuit breaker configuration

use crate::{
    callbacks::Callbacks,
    circuit::{CircuitBreaker, CircuitState, Config},
    threshold::AdaptiveConfig,
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
pub struct CircuitBuilder {
    name: String,
    config: Config,
    callbacks: Callbacks,
    jitter_seed: Option<u64>,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            callbacks: Callbacks::new(),
            jitter_seed: None,
        }
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Error percentage (0-100) that opens the circuit
    pub fn error_percentage_threshold(mut self, percent: f64) -> Self {
        self.config.error_percentage_threshold = percent.clamp(0.0, 100.0);
        self
    }

    /// Minimum calls in the monitoring period before the circuit may open
    pub fn volume_threshold(mut self, calls: usize) -> Self {
        self.config.volume_threshold = calls;
        self
    }

    /// Recent window used for the open decision and for stats
    pub fn monitoring_period(mut self, period: Duration) -> Self {
        self.config.monitoring_period = period;
        self
    }

    /// Base wait before an open circuit admits probes
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout = timeout;
        self
    }

    /// Successful probes needed to close from HalfOpen (default 1)
    pub fn success_threshold(mut self, threshold: usize) -> Self {
        self.config.success_threshold = threshold.max(1);
        self
    }

    /// Limit concurrent probes while HalfOpen
    ///
    /// By default every call is admitted once recovery is due. With a limit,
    /// calls beyond it fail fast with `CircuitError::Open` and a zero
    /// `retry_after` until a probe settles, while the state stays HalfOpen.
    pub fn half_open_max_calls(mut self, limit: usize) -> Self {
        self.config.half_open_max_calls = Some(limit.max(1));
        self
    }

    /// Set maximum concurrency limit (bulkheading)
    ///
    /// Calls beyond the limit are rejected with `BulkheadFull` whatever the
    /// circuit state.
    ///
    /// # Panics
    ///
    /// `build()` panics if `limit` is 0.
    pub fn max_concurrent_requests(mut self, limit: usize) -> Self {
        self.config.max_concurrent_requests = limit;
        self
    }

    /// Default deadline for each call
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Enable or tune baseline-relative threshold adaptation
    pub fn adaptive_thresholds(mut self, adaptive: AdaptiveConfig) -> Self {
        self.config.adaptive = adaptive;
        self
    }

    /// Upper bound of the random delay added to the recovery timeout;
    /// `Duration::ZERO` disables jitter
    pub fn max_jitter(mut self, max: Duration) -> Self {
        self.config.max_jitter = max;
        self
    }

    pub fn jitter_reseed_interval(mut self, interval: Duration) -> Self {
        self.config.jitter_reseed_interval = interval;
        self
    }

    /// Seed the first jitter draws for reproducible recovery times
    pub fn jitter_seed(mut self, seed: u64) -> Self {
        self.jitter_seed = Some(seed);
        self
    }

    /// Number of one-second buckets kept in the metrics ring
    pub fn window_buckets(mut self, buckets: usize) -> Self {
        self.config.window_buckets = buckets;
        self
    }

    pub fn outcome_retention(mut self, retention: Duration) -> Self {
        self.config.outcome_retention = retention;
        self
    }

    pub fn housekeeping_interval(mut self, interval: Duration) -> Self {
        self.config.housekeeping_interval = interval;
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Set callback for every transition, with old and new state
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.callbacks.on_state_change = Some(Arc::new(f));
        self
    }

    /// Build the circuit breaker
    ///
    /// Starts the housekeeping task when called inside a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `max_concurrent_requests` or `window_buckets` is 0.
    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::with_parts(self.name, self.config, self.callbacks, self.jitter_seed)
    }
}
