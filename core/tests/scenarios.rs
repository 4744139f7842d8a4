use adaptive_breaker::{
    AdaptiveConfig, CircuitBreaker, CircuitError, CircuitErrorKind, CircuitState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn bulkhead_rejects_third_concurrent_call() {
    let circuit = Arc::new(
        CircuitBreaker::builder("scenario_a")
            .max_concurrent_requests(2)
            .build(),
    );

    let slow = |circuit: Arc<CircuitBreaker>| async move {
        circuit
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, String>("done")
            })
            .await
    };

    let first = tokio::spawn(slow(circuit.clone()));
    let second = tokio::spawn(slow(circuit.clone()));

    // Let both spawned calls get admitted before the third arrives
    while circuit.in_flight() < 2 {
        tokio::task::yield_now().await;
    }

    let third = slow(circuit.clone()).await;
    assert!(matches!(
        third,
        Err(CircuitError::BulkheadFull { limit: 2, .. })
    ));

    assert_eq!(first.await.unwrap().unwrap(), "done");
    assert_eq!(second.await.unwrap().unwrap(), "done");
    assert_eq!(circuit.in_flight(), 0);
    assert!(circuit.is_closed(), "bulkhead rejections are not failures");
}

#[tokio::test(start_paused = true)]
async fn recovery_waits_exactly_for_timeout_without_jitter() {
    let circuit = CircuitBreaker::builder("scenario_b")
        .volume_threshold(5)
        .error_percentage_threshold(50.0)
        .recovery_timeout(Duration::from_millis(1000))
        .max_jitter(Duration::ZERO)
        .build();

    for i in 0..5 {
        assert!(circuit.is_closed(), "still closed before call {i}");
        let result = circuit
            .execute(|| async { Err::<(), _>("downstream unavailable") })
            .await;
        assert_eq!(result.unwrap_err().kind(), CircuitErrorKind::Execution);
    }
    assert!(circuit.is_open(), "opens after the fifth failure");

    tokio::time::advance(Duration::from_millis(999)).await;
    let invoked = AtomicUsize::new(0);
    let early = circuit
        .execute(|| async {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(())
        })
        .await;
    match early {
        Err(CircuitError::Open { retry_after, .. }) => {
            assert_eq!(retry_after, Duration::from_millis(1));
        }
        other => panic!("Expected Open, got: {other:?}"),
    }
    assert_eq!(invoked.load(Ordering::SeqCst), 0);

    tokio::time::advance(Duration::from_millis(2)).await;
    let admitted = circuit
        .execute(|| async {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(())
        })
        .await;
    assert!(admitted.is_ok());
    assert_eq!(invoked.load(Ordering::SeqCst), 1);
    assert!(circuit.is_closed(), "successful probe closes the circuit");
}

#[tokio::test(start_paused = true)]
async fn jitter_delays_recovery_within_bounds() {
    let circuit = CircuitBreaker::builder("jittered")
        .volume_threshold(1)
        .recovery_timeout(Duration::from_secs(1))
        .max_jitter(Duration::from_millis(500))
        .jitter_seed(42)
        .build();

    let opened_at = tokio::time::Instant::now();
    let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;

    let next = circuit.stats().next_attempt.expect("open circuit has next attempt");
    let wait = next - opened_at;
    assert!(wait >= Duration::from_secs(1));
    assert!(wait <= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn transitions_follow_the_lifecycle() {
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let seen = transitions.clone();

    let circuit = CircuitBreaker::builder("lifecycle")
        .volume_threshold(2)
        .recovery_timeout(Duration::from_secs(1))
        .max_jitter(Duration::ZERO)
        .on_state_change(move |_, from, to| seen.lock().unwrap().push((from, to)))
        .build();

    for _ in 0..2 {
        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
    }
    tokio::time::advance(Duration::from_secs(1)).await;
    let _ = circuit.execute(|| async { Err::<(), _>("still down") }).await;
    tokio::time::advance(Duration::from_secs(1)).await;
    let _ = circuit.execute(|| async { Ok::<_, String>(()) }).await;

    use CircuitState::*;
    assert_eq!(
        *transitions.lock().unwrap(),
        vec![
            (Closed, Open),
            (Open, HalfOpen),
            (HalfOpen, Open),
            (Open, HalfOpen),
            (HalfOpen, Closed),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn adaptive_threshold_tolerates_noisy_baseline() {
    let adaptive = AdaptiveConfig {
        enabled: true,
        baseline_window: Duration::from_secs(60),
        adaptation_rate: 1.0,
        min_threshold: 30.0,
        max_threshold: 90.0,
    };
    let circuit = CircuitBreaker::builder("noisy")
        .volume_threshold(10)
        .error_percentage_threshold(50.0)
        .monitoring_period(Duration::from_secs(10))
        .adaptive_thresholds(adaptive)
        .build();

    // 40 seconds of background noise at 40% errors, spread through each second
    for second in 0..40 {
        for call in 0..10 {
            let fails = call % 5 == 1 || call % 5 == 3;
            let _ = circuit
                .execute(|| async move { if fails { Err("flaky") } else { Ok(()) } })
                .await;
        }
        assert!(circuit.is_closed(), "baseline noise tripped at second {second}");
        tokio::time::advance(Duration::from_secs(1)).await;
    }

    // Recent window now holds only this burst at 60% errors. A static 50%
    // threshold would trip; the adapted one sits above it.
    tokio::time::advance(Duration::from_secs(10)).await;
    for call in 0..10 {
        let fails = call >= 4;
        let _ = circuit
            .execute(|| async move { if fails { Err("flaky") } else { Ok(()) } })
            .await;
    }
    assert!(circuit.effective_threshold() > 60.0);
    assert!(circuit.is_closed());

    // A full outage still reaches the clamped maximum and trips
    tokio::time::advance(Duration::from_secs(11)).await;
    for _ in 0..10 {
        let _ = circuit.execute(|| async { Err::<(), _>("outage") }).await;
    }
    assert_eq!(circuit.effective_threshold(), 90.0);
    assert!(circuit.is_open());
}
