//! adaptive-breaker - Adaptive circuit breaker for async Rust
//!
//! This crate wraps calls to an unreliable dependency with:
//! - Sliding-window metrics over a ring of one-second buckets
//! - An open threshold that can adapt to the dependency's baseline error rate
//! - A bulkhead capping calls in flight, independent of circuit state
//! - Jittered recovery so breakers opened together do not retry together
//! - State machine for circuit breaker lifecycle (Closed → Open → HalfOpen)
//!
//! # Example
//!
//! ```rust
//! use adaptive_breaker::{CircuitBreaker, CircuitError};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let circuit = CircuitBreaker::builder("inventory_api")
//!     .error_percentage_threshold(50.0)
//!     .volume_threshold(10)
//!     .recovery_timeout(Duration::from_secs(30))
//!     .max_concurrent_requests(32)
//!     .on_open(|name| eprintln!("Circuit {} opened!", name))
//!     .build();
//!
//! let result = circuit
//!     .execute(|| async { Ok::<_, std::io::Error>("stock: 12") })
//!     .await;
//!
//! match result {
//!     Ok(body) => println!("{body}"),
//!     Err(CircuitError::Open { retry_after, .. }) => println!("try again in {retry_after:?}"),
//!     Err(e) => println!("call failed: {e}"),
//! }
//!
//! circuit.shutdown();
//! # }
//! ```

pub mod builder;
pub mod bulkhead;
pub mod callbacks;
pub mod circuit;
pub mod errors;
mod housekeeping;
pub mod jitter;
mod machine;
pub mod metrics;
pub mod stats;
pub mod threshold;

pub use builder::CircuitBuilder;
pub use bulkhead::{BulkheadGuard, BulkheadLimiter};
pub use circuit::{CallOptions, CircuitBreaker, CircuitState, Config};
pub use errors::{CircuitError, CircuitErrorKind};
pub use jitter::JitterSource;
pub use metrics::{
    Bucket, ErrorSample, OutcomeKind, RequestOutcome, SlidingWindowMetrics, WindowSnapshot,
};
pub use stats::CircuitStats;
pub use threshold::{AdaptiveConfig, AdaptiveThresholdEngine};
