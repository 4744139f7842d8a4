//! Point-in-time view of a breaker for dashboards and logs

use crate::circuit::CircuitState;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Snapshot returned by [`CircuitBreaker::stats`](crate::CircuitBreaker::stats)
///
/// Reading stats has no side effects; two snapshots taken with no call in
/// between carry the same counters.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    /// Calls currently admitted by the bulkhead
    pub current_requests: usize,
    /// Error percentage over the monitoring period (0-100)
    pub error_rate: f64,
    /// Mean call duration over the monitoring period
    pub average_response_time: Duration,
    /// When an open circuit will admit its next probe
    pub next_attempt: Option<Instant>,
}

impl CircuitStats {
    /// Error rate as `"NN.NN%"`
    pub fn formatted_error_rate(&self) -> String {
        format!("{:.2}%", self.error_rate)
    }

    /// Average response time as `"NNms"`
    pub fn formatted_average_response_time(&self) -> String {
        format!("{}ms", self.average_response_time.as_millis())
    }
}

impl fmt::Display for CircuitStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] failures={} successes={} in_flight={} error_rate={} avg={}",
            self.name,
            self.state,
            self.failure_count,
            self.success_count,
            self.current_requests,
            self.formatted_error_rate(),
            self.formatted_average_response_time(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatting() {
        let stats = CircuitStats {
            name: "search".into(),
            state: CircuitState::Closed,
            failure_count: 1,
            success_count: 2,
            current_requests: 0,
            error_rate: 100.0 / 3.0,
            average_response_time: Duration::from_millis(42),
            next_attempt: None,
        };

        assert_eq!(stats.formatted_error_rate(), "33.33%");
        assert_eq!(stats.formatted_average_response_time(), "42ms");
        assert_eq!(
            stats.to_string(),
            "search [Closed] failures=1 successes=2 in_flight=0 error_rate=33.33% avg=42ms"
        );
    }
}
