//! Error types for circuit breaker operations

use std::error::Error;
use std::time::Duration;

/// Errors that can occur during circuit breaker operations
///
/// The first three variants are raised by the breaker itself and mean the
/// wrapped operation either never ran or its result was not awaited. The
/// operation's own error is passed through untouched as `Execution`.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E = Box<dyn Error + Send + Sync>> {
    /// Circuit is open, calls are being rejected
    #[error("Circuit '{circuit}' is open (next attempt in {retry_after:?})")]
    Open {
        circuit: String,
        retry_after: Duration,
    },
    /// Bulkhead is at capacity, cannot acquire permit
    #[error("Circuit '{circuit}' bulkhead is full (limit: {limit})")]
    BulkheadFull { circuit: String, limit: usize },
    /// The operation did not settle before its deadline
    #[error("Circuit '{circuit}' call timed out after {timeout:?}")]
    Timeout { circuit: String, timeout: Duration },
    /// The wrapped operation failed
    #[error("Circuit execution failed: {0}")]
    Execution(#[source] E),
}

/// Discriminant of a [`CircuitError`], handy for metrics labels and matching
/// without caring about the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitErrorKind {
    Open,
    BulkheadFull,
    Timeout,
    Execution,
}

impl CircuitErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitErrorKind::Open => "open",
            CircuitErrorKind::BulkheadFull => "bulkhead_full",
            CircuitErrorKind::Timeout => "timeout",
            CircuitErrorKind::Execution => "execution",
        }
    }
}

impl<E> CircuitError<E> {
    pub fn kind(&self) -> CircuitErrorKind {
        match self {
            CircuitError::Open { .. } => CircuitErrorKind::Open,
            CircuitError::BulkheadFull { .. } => CircuitErrorKind::BulkheadFull,
            CircuitError::Timeout { .. } => CircuitErrorKind::Timeout,
            CircuitError::Execution(_) => CircuitErrorKind::Execution,
        }
    }

    /// True when the breaker rejected the call without invoking the operation
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            CircuitError::Open { .. } | CircuitError::BulkheadFull { .. }
        )
    }

    /// Unwrap the operation's own error, if that is what this is
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_display_messages() {
        let open: CircuitError<io::Error> = CircuitError::Open {
            circuit: "payments".into(),
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(
            open.to_string(),
            "Circuit 'payments' is open (next attempt in 1.5s)"
        );

        let full: CircuitError<io::Error> = CircuitError::BulkheadFull {
            circuit: "payments".into(),
            limit: 4,
        };
        assert_eq!(
            full.to_string(),
            "Circuit 'payments' bulkhead is full (limit: 4)"
        );

        let timeout: CircuitError<io::Error> = CircuitError::Timeout {
            circuit: "payments".into(),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(
            timeout.to_string(),
            "Circuit 'payments' call timed out after 250ms"
        );
    }

    #[test]
    fn test_execution_error_exposes_source() {
        let err: CircuitError<io::Error> =
            CircuitError::Execution(io::Error::other("connection reset"));

        assert_eq!(err.kind(), CircuitErrorKind::Execution);
        assert!(!err.is_rejected());
        let source = err.source().expect("execution error has a source");
        assert_eq!(source.to_string(), "connection reset");
    }

    #[test]
    fn test_kinds_are_distinct() {
        let errors: Vec<CircuitError<&str>> = vec![
            CircuitError::Open {
                circuit: "a".into(),
                retry_after: Duration::ZERO,
            },
            CircuitError::BulkheadFull {
                circuit: "a".into(),
                limit: 1,
            },
            CircuitError::Timeout {
                circuit: "a".into(),
                timeout: Duration::from_secs(1),
            },
            CircuitError::Execution("boom"),
        ];

        let kinds: std::collections::HashSet<_> = errors.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.len(), 4);
        assert_eq!(errors[3].kind().as_str(), "execution");
    }

    #[test]
    fn test_into_execution() {
        let err: CircuitError<&str> = CircuitError::Execution("boom");
        assert_eq!(err.into_execution(), Some("boom"));

        let err: CircuitError<&str> = CircuitError::BulkheadFull {
            circuit: "a".into(),
            limit: 1,
        };
        assert!(err.is_rejected());
        assert_eq!(err.into_execution(), None);
    }
}
