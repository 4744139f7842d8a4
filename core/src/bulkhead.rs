//! Bulkhead limiter for concurrency isolation
//!
//! Caps the number of calls in flight through one breaker, independent of
//! circuit state. Admission is a lock-free CAS loop; release happens when the
//! returned guard is dropped, so every exit path (success, error, timeout,
//! panic, cancelled future) gives the slot back.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Atomic in-flight counter bounded by a fixed limit
#[derive(Debug)]
pub struct BulkheadLimiter {
    /// Maximum number of concurrent calls
    limit: usize,
    /// Calls currently admitted
    in_flight: AtomicUsize,
    /// Highest `in_flight` ever observed
    peak: AtomicUsize,
}

impl BulkheadLimiter {
    /// Create a new limiter with the given concurrency limit
    ///
    /// # Panics
    ///
    /// Panics if `limit` is 0.
    pub fn new(limit: usize) -> Self {
        assert!(limit > 0, "Bulkhead limit must be greater than 0");
        Self {
            limit,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Try to admit a call without blocking
    ///
    /// Returns `Some(BulkheadGuard)` if a slot was taken, or `None` if the
    /// limiter is at capacity.
    pub fn try_admit(self: &Arc<Self>) -> Option<BulkheadGuard> {
        let mut current = self.in_flight.load(Ordering::Acquire);

        loop {
            if current >= self.limit {
                return None;
            }

            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(current + 1, Ordering::AcqRel);
                    return Some(BulkheadGuard {
                        limiter: Arc::clone(self),
                    });
                }
                // Lost the race, retry with the fresh value
                Err(actual) => current = actual,
            }
        }
    }

    /// Number of calls currently admitted
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Maximum number of concurrent calls
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.limit.saturating_sub(self.in_flight())
    }

    /// Highest concurrency ever admitted
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    fn release(&self) {
        self.in_flight.fetch_sub(1, Ordering::Release);
    }
}

/// Guard that releases a bulkhead slot when dropped
#[derive(Debug)]
pub struct BulkheadGuard {
    limiter: Arc<BulkheadLimiter>,
}

impl Drop for BulkheadGuard {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
