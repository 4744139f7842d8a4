//! Sliding-window metrics for circuit breaker decisions
//!
//! Outcomes are folded into a fixed ring of one-second buckets. The open/close
//! decision only ever reads bucket aggregates; the per-request outcome log is
//! kept for diagnostics and swept after its retention period.
//!
//! Time is measured on a monotonic clock anchored at construction, so NTP
//! adjustments never reorder buckets.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Default ring size: 60 one-second buckets
pub const DEFAULT_BUCKETS: usize = 60;

/// Width of a bucket in milliseconds
pub const BUCKET_WIDTH_MS: u64 = 1000;

/// Error samples kept per bucket; bounds memory during failure storms
pub const MAX_ERROR_SAMPLES: usize = 100;

/// Hard cap on the diagnostic outcome log, independent of retention
pub const MAX_RETAINED_OUTCOMES: usize = 10_000;

/// Default retention of the diagnostic outcome log
pub const DEFAULT_OUTCOME_RETENTION: Duration = Duration::from_secs(5 * 60);

/// Outcome type recorded by the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    Failure,
}

/// Error message captured alongside a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSample {
    /// Milliseconds since the window anchor
    pub timestamp_ms: u64,
    pub message: String,
}

/// A single request outcome kept for diagnostics
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub kind: OutcomeKind,
    pub duration: Duration,
    /// Milliseconds since the window anchor
    pub timestamp_ms: u64,
    pub error: Option<String>,
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

/// One second of aggregated traffic
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    /// Second-aligned start of this bucket, in ms since the window anchor
    pub timestamp_ms: u64,
    pub requests: u64,
    pub failures: u64,
    pub successes: u64,
    pub total_duration_ms: u64,
    pub error_samples: Vec<ErrorSample>,
}

impl Bucket {
    fn starting_at(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            ..Default::default()
        }
    }

    fn reset(&mut self, timestamp_ms: u64) {
        self.timestamp_ms = timestamp_ms;
        self.requests = 0;
        self.failures = 0;
        self.successes = 0;
        self.total_duration_ms = 0;
        self.error_samples.clear();
    }

    fn record(&mut self, kind: OutcomeKind, duration_ms: u64, error: Option<&str>, now_ms: u64) {
        self.requests += 1;
        self.total_duration_ms += duration_ms;

        match kind {
            OutcomeKind::Success => self.successes += 1,
            OutcomeKind::Failure => {
                self.failures += 1;
                if self.error_samples.len() < MAX_ERROR_SAMPLES {
                    if let Some(message) = error {
                        self.error_samples.push(ErrorSample {
                            timestamp_ms: now_ms,
                            message: message.to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Aggregate over a range of buckets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub total_requests: u64,
    pub failures: u64,
    pub successes: u64,
    pub total_duration_ms: u64,
}

impl WindowSnapshot {
    /// Failure fraction in `[0.0, 1.0]`, zero when the window is empty
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.total_requests as f64
        }
    }

    /// Failure percentage in `[0.0, 100.0]`
    pub fn error_percentage(&self) -> f64 {
        self.error_rate() * 100.0
    }

    /// Mean call duration, zero when the window is empty
    pub fn average_duration(&self) -> Duration {
        if self.total_requests == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(self.total_duration_ms / self.total_requests)
        }
    }

    fn add(&mut self, bucket: &Bucket) {
        self.total_requests += bucket.requests;
        self.failures += bucket.failures;
        self.successes += bucket.successes;
        self.total_duration_ms += bucket.total_duration_ms;
    }
}

#[derive(Debug, Default)]
struct Window {
    /// Grows lazily up to capacity, then slots are overwritten in ring order
    buckets: Vec<Bucket>,
    current: usize,
    outcomes: VecDeque<RequestOutcome>,
}

/// Thread-safe ring of one-second buckets
#[derive(Debug)]
pub struct SlidingWindowMetrics {
    window: Mutex<Window>,
    capacity: usize,
    retention: Duration,
    /// Monotonic time anchor
    anchor: Instant,
}

impl SlidingWindowMetrics {
    /// Create a window with the default 60 buckets and 5 minute outcome retention
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUCKETS, DEFAULT_OUTCOME_RETENTION)
    }

    /// Create a window with a custom ring size and outcome retention
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn with_capacity(capacity: usize, retention: Duration) -> Self {
        assert!(capacity > 0, "Metrics window needs at least one bucket");
        Self {
            window: Mutex::new(Window {
                buckets: Vec::with_capacity(capacity),
                ..Default::default()
            }),
            capacity,
            retention,
            anchor: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the window was created
    pub fn now_ms(&self) -> u64 {
        self.anchor.elapsed().as_millis() as u64
    }

    /// Record one outcome into the active bucket, rotating first if the
    /// active bucket belongs to an earlier second
    pub fn record_outcome(&self, kind: OutcomeKind, duration: Duration, error: Option<&str>) {
        let now_ms = self.now_ms();
        let duration_ms = duration.as_millis() as u64;
        let mut window = self.lock();

        let bucket = self.active_bucket(&mut window, now_ms);
        bucket.record(kind, duration_ms, error, now_ms);

        window.outcomes.push_back(RequestOutcome {
            kind,
            duration,
            timestamp_ms: now_ms,
            error: error.map(str::to_string),
        });
        if window.outcomes.len() > MAX_RETAINED_OUTCOMES {
            window.outcomes.pop_front();
        }
    }

    /// Record a successful operation
    pub fn record_success(&self, duration: Duration) {
        self.record_outcome(OutcomeKind::Success, duration, None);
    }

    /// Record a failed operation
    pub fn record_failure(&self, duration: Duration, error: Option<&str>) {
        self.record_outcome(OutcomeKind::Failure, duration, error);
    }

    /// Aggregate buckets that started within the last `window`
    pub fn recent_metrics(&self, window: Duration) -> WindowSnapshot {
        self.aggregate(window)
    }

    /// Same aggregation over the longer baseline horizon
    ///
    /// The horizon is bounded by what the ring still holds: with 60 buckets a
    /// five minute baseline covers at most the last 60 seconds of traffic.
    pub fn baseline_metrics(&self, window: Duration) -> WindowSnapshot {
        self.aggregate(window)
    }

    /// Error samples captured within the last `window`, oldest first
    pub fn recent_errors(&self, window: Duration) -> Vec<ErrorSample> {
        let now_ms = self.now_ms();
        let window_ms = window.as_millis() as u64;
        let guard = self.lock();

        let mut samples: Vec<ErrorSample> = guard
            .buckets
            .iter()
            .filter(|b| b.timestamp_ms + window_ms > now_ms)
            .flat_map(|b| b.error_samples.iter().cloned())
            .collect();
        samples.sort_by_key(|s| s.timestamp_ms);
        samples
    }

    /// Last `limit` outcomes, oldest first
    pub fn recent_outcomes(&self, limit: usize) -> Vec<RequestOutcome> {
        let guard = self.lock();
        let start = guard.outcomes.len().saturating_sub(limit);
        guard.outcomes.iter().skip(start).cloned().collect()
    }

    /// Advance the ring when the active bucket is from an earlier second
    ///
    /// Returns true if a rotation happened.
    pub fn rotate_if_stale(&self) -> bool {
        let now_ms = self.now_ms();
        let mut window = self.lock();

        let stale = window
            .buckets
            .get(window.current)
            .is_some_and(|b| b.timestamp_ms < align(now_ms));
        if stale {
            self.active_bucket(&mut window, now_ms);
        }
        stale
    }

    /// Drop outcomes older than the retention period, returning how many went
    pub fn sweep_outcomes(&self) -> usize {
        let now_ms = self.now_ms();
        let retention_ms = self.retention.as_millis() as u64;
        let mut window = self.lock();

        let before = window.outcomes.len();
        while window
            .outcomes
            .front()
            .is_some_and(|o| o.timestamp_ms + retention_ms <= now_ms)
        {
            window.outcomes.pop_front();
        }
        before - window.outcomes.len()
    }

    /// Forget every bucket and outcome
    pub fn clear(&self) {
        let mut window = self.lock();
        window.buckets.clear();
        window.current = 0;
        window.outcomes.clear();
    }

    /// Number of bucket slots created so far
    pub fn bucket_count(&self) -> usize {
        self.lock().buckets.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn aggregate(&self, window: Duration) -> WindowSnapshot {
        let now_ms = self.now_ms();
        let window_ms = window.as_millis() as u64;
        let guard = self.lock();

        let mut snapshot = WindowSnapshot::default();
        for bucket in guard
            .buckets
            .iter()
            .filter(|b| b.timestamp_ms + window_ms > now_ms)
        {
            snapshot.add(bucket);
        }
        snapshot
    }

    fn active_bucket<'w>(&self, window: &'w mut Window, now_ms: u64) -> &'w mut Bucket {
        let aligned = align(now_ms);

        if window.buckets.is_empty() {
            window.buckets.push(Bucket::starting_at(aligned));
            window.current = 0;
        } else if window.buckets[window.current].timestamp_ms < aligned {
            if window.buckets.len() < self.capacity {
                window.buckets.push(Bucket::starting_at(aligned));
                window.current = window.buckets.len() - 1;
            } else {
                window.current = (window.current + 1) % self.capacity;
                let current = window.current;
                window.buckets[current].reset(aligned);
            }
        }

        let current = window.current;
        &mut window.buckets[current]
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("metrics window lock poisoned, recovering");
            self.window.clear_poison();
            poisoned.into_inner()
        })
    }
}

impl Default for SlidingWindowMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn align(now_ms: u64) -> u64 {
    now_ms - now_ms % BUCKET_WIDTH_MS
}
