use adaptive_breaker::{CircuitBreaker, CircuitError, CircuitState};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Step {
    Succeed,
    Fail,
    Wait(u64),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => Just(Step::Succeed),
        3 => Just(Step::Fail),
        1 => (1u64..3_000).prop_map(Step::Wait),
    ]
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime")
}

fn allowed(from: CircuitState, to: CircuitState) -> bool {
    use CircuitState::*;
    matches!(
        (from, to),
        (Closed, Open) | (Open, HalfOpen) | (HalfOpen, Closed) | (HalfOpen, Open)
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever the call sequence, only lifecycle edges are ever taken and
    /// each transition starts where the previous one ended
    #[test]
    fn only_lifecycle_edges_are_observed(steps in prop::collection::vec(step(), 1..120)) {
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let seen = transitions.clone();

        paused_runtime().block_on(async {
            let circuit = CircuitBreaker::builder("prop")
                .volume_threshold(3)
                .recovery_timeout(Duration::from_millis(500))
                .max_jitter(Duration::from_millis(200))
                .on_state_change(move |_, from, to| seen.lock().unwrap().push((from, to)))
                .build();

            for step in &steps {
                match step {
                    Step::Succeed => {
                        let _ = circuit.execute(|| async { Ok::<_, String>(()) }).await;
                    }
                    Step::Fail => {
                        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
                    }
                    Step::Wait(ms) => tokio::time::advance(Duration::from_millis(*ms)).await,
                }
            }
            circuit.shutdown();
        });

        let transitions = transitions.lock().unwrap();
        let mut current = CircuitState::Closed;
        for &(from, to) in transitions.iter() {
            prop_assert!(allowed(from, to), "illegal edge {from} -> {to}");
            prop_assert_eq!(from, current);
            current = to;
        }
    }

    /// Randomised concurrent calls never push in-flight work past the limit
    #[test]
    fn concurrency_never_exceeds_bulkhead(
        limit in 1usize..8,
        delays in prop::collection::vec(0u64..50, 1..64),
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_time()
            .build()
            .expect("runtime");

        let (peak, admitted, rejected) = runtime.block_on(async {
            let circuit = Arc::new(
                CircuitBreaker::builder("bulkhead")
                    .max_concurrent_requests(limit)
                    .build(),
            );
            let running = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let mut tasks = Vec::new();
            for delay in delays.clone() {
                let circuit = circuit.clone();
                let running = running.clone();
                let peak = peak.clone();
                tasks.push(tokio::spawn(async move {
                    circuit
                        .execute(|| async move {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                            running.fetch_sub(1, Ordering::SeqCst);
                            Ok::<_, String>(())
                        })
                        .await
                }));
            }

            let mut admitted = 0;
            let mut rejected = 0;
            for task in tasks {
                match task.await.expect("task") {
                    Ok(()) => admitted += 1,
                    Err(CircuitError::BulkheadFull { .. }) => rejected += 1,
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }

            assert_eq!(circuit.in_flight(), 0);
            assert!(circuit.peak_in_flight() <= limit);
            circuit.shutdown();
            (peak.load(Ordering::SeqCst), admitted, rejected)
        });

        prop_assert!(peak <= limit, "observed {peak} concurrent calls, limit {limit}");
        prop_assert_eq!(admitted + rejected, delays.len());
    }
}
