//! Basic circuit breaker usage example

use adaptive_breaker::{CircuitBreaker, CircuitError};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Circuit Breaker Basic Example ===\n");

    let circuit = CircuitBreaker::builder("payment_api")
        .volume_threshold(4)
        .error_percentage_threshold(50.0)
        .recovery_timeout(Duration::from_secs(2))
        .max_jitter(Duration::from_millis(500))
        .max_concurrent_requests(8)
        .call_timeout(Duration::from_millis(300))
        .on_open(|name| println!("🔴 Circuit '{}' opened!", name))
        .on_close(|name| println!("🟢 Circuit '{}' closed!", name))
        .on_half_open(|name| println!("🟡 Circuit '{}' half-open, testing...", name))
        .build();

    println!("Initial state: {}\n", circuit.state_name());

    println!("--- Successful calls ---");
    for i in 1..=2 {
        match circuit
            .execute(move || async move { Ok::<_, String>(format!("Payment {}", i)) })
            .await
        {
            Ok(result) => println!("✓ {}", result),
            Err(e) => println!("✗ Error: {}", e),
        }
    }
    println!("State: {}\n", circuit.state_name());

    println!("--- Triggering failures ---");
    for i in 1..=2 {
        match circuit
            .execute(move || async move { Err::<String, _>(format!("Payment failed {}", i)) })
            .await
        {
            Ok(_) => println!("✓ Success"),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("State: {} (circuit opened)\n", circuit.state_name());

    println!("--- Attempting call while open ---");
    match circuit
        .execute(|| async { Ok::<_, String>("Should be rejected") })
        .await
    {
        Ok(_) => println!("✓ Success"),
        Err(CircuitError::Open { retry_after, .. }) => {
            println!("✗ Rejected, next attempt in {:?}", retry_after)
        }
        Err(e) => println!("✗ {}", e),
    }
    println!("{}\n", circuit.stats());

    println!("--- Waiting for recovery ---");
    tokio::time::sleep(Duration::from_millis(2600)).await;
    match circuit
        .execute(|| async { Ok::<_, String>("Payment successful") })
        .await
    {
        Ok(result) => println!("✓ {}", result),
        Err(e) => println!("✗ {}", e),
    }
    println!("State: {}\n", circuit.state_name());

    println!("--- Slow call hits the deadline ---");
    let slow = circuit
        .execute(|| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, String>("too late")
        })
        .await;
    if let Err(e) = slow {
        println!("✗ {} ({})", e, e.kind().as_str());
    }

    println!("\n{}", circuit.stats());
    circuit.shutdown();
}
