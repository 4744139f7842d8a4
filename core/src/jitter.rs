//! Jittered recovery delays
//!
//! Each breaker owns its own generator so that many breakers opened by the
//! same outage do not all retry on the same tick. The generator is reseeded
//! from OS entropy on a fixed interval.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Default upper bound for a single jitter draw
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(5000);

/// Default interval between entropy reseeds
pub const DEFAULT_RESEED_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Pool {
    rng: StdRng,
    seeded_at: Instant,
}

/// Bounded random delay generator owned by one breaker
#[derive(Debug)]
pub struct JitterSource {
    max: Duration,
    reseed_interval: Duration,
    pool: Mutex<Pool>,
    reseeds: AtomicU64,
}

impl JitterSource {
    pub fn new(max: Duration, reseed_interval: Duration) -> Self {
        Self::from_rng(max, reseed_interval, StdRng::from_entropy())
    }

    /// Deterministic first seed; later reseeds still draw from OS entropy
    pub fn with_seed(max: Duration, reseed_interval: Duration, seed: u64) -> Self {
        Self::from_rng(max, reseed_interval, StdRng::seed_from_u64(seed))
    }

    fn from_rng(max: Duration, reseed_interval: Duration, rng: StdRng) -> Self {
        Self {
            max,
            reseed_interval,
            pool: Mutex::new(Pool {
                rng,
                seeded_at: Instant::now(),
            }),
            reseeds: AtomicU64::new(0),
        }
    }

    /// Draw a delay uniformly from `[0, max]`
    pub fn next_jitter(&self) -> Duration {
        let max_ms = self.max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }

        let mut pool = self.lock();
        if pool.seeded_at.elapsed() >= self.reseed_interval {
            self.reseed_locked(&mut pool);
        }
        Duration::from_millis(pool.rng.gen_range(0..=max_ms))
    }

    /// Replace the generator state with fresh OS entropy
    pub fn reseed(&self) {
        let mut pool = self.lock();
        self.reseed_locked(&mut pool);
    }

    /// Reseed only if the interval has elapsed; returns true when it did
    pub fn reseed_if_due(&self) -> bool {
        let mut pool = self.lock();
        if pool.seeded_at.elapsed() >= self.reseed_interval {
            self.reseed_locked(&mut pool);
            true
        } else {
            false
        }
    }

    pub fn max_jitter(&self) -> Duration {
        self.max
    }

    pub fn reseed_interval(&self) -> Duration {
        self.reseed_interval
    }

    /// How many times the pool has been reseeded since construction
    pub fn reseed_count(&self) -> u64 {
        self.reseeds.load(Ordering::Relaxed)
    }

    fn reseed_locked(&self, pool: &mut Pool) {
        pool.rng = StdRng::from_entropy();
        pool.seeded_at = Instant::now();
        self.reseeds.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("jitter pool reseeded");
    }

    fn lock(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("jitter pool lock poisoned, recovering");
            self.pool.clear_poison();
            poisoned.into_inner()
        })
    }
}

impl Default for JitterSource {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_JITTER, DEFAULT_RESEED_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_jitter_within_bounds() {
        let jitter = JitterSource::new(Duration::from_millis(250), DEFAULT_RESEED_INTERVAL);

        for _ in 0..500 {
            assert!(jitter.next_jitter() <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_jitter_produces_variance() {
        let jitter = JitterSource::default();

        let values: HashSet<Duration> = (0..20).map(|_| jitter.next_jitter()).collect();

        // 20 draws over 5001 values landing on one value is practically impossible
        assert!(
            values.len() >= 2,
            "Jitter should produce variance, got {} unique values",
            values.len()
        );
    }

    #[test]
    fn test_zero_max_disables_jitter() {
        let jitter = JitterSource::new(Duration::ZERO, DEFAULT_RESEED_INTERVAL);

        for _ in 0..10 {
            assert_eq!(jitter.next_jitter(), Duration::ZERO);
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let a = JitterSource::with_seed(DEFAULT_MAX_JITTER, DEFAULT_RESEED_INTERVAL, 7);
        let b = JitterSource::with_seed(DEFAULT_MAX_JITTER, DEFAULT_RESEED_INTERVAL, 7);

        let left: Vec<_> = (0..8).map(|_| a.next_jitter()).collect();
        let right: Vec<_> = (0..8).map(|_| b.next_jitter()).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn test_poisoned_pool_still_draws() {
        let jitter = JitterSource::new(Duration::from_millis(100), DEFAULT_RESEED_INTERVAL);

        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = jitter.pool.lock().unwrap();
            panic!("poison the jitter pool");
        }));
        assert!(jitter.pool.is_poisoned());

        assert!(jitter.next_jitter() <= Duration::from_millis(100));
        assert!(!jitter.pool.is_poisoned());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reseeds_after_interval() {
        let jitter = JitterSource::new(DEFAULT_MAX_JITTER, Duration::from_secs(60));

        assert!(!jitter.reseed_if_due());
        jitter.next_jitter();
        assert_eq!(jitter.reseed_count(), 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        jitter.next_jitter();
        assert_eq!(jitter.reseed_count(), 1, "draw past the interval reseeds");
        assert!(!jitter.reseed_if_due());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(jitter.reseed_if_due());
        assert_eq!(jitter.reseed_count(), 2);
    }
}
