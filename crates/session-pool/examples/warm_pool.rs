//! Warm session pool example
//!
//! Pre-warms a pool, runs a burst of concurrent queries against it (more
//! callers than sessions, so some queue), then shuts it down.
//!
//! Run with `RUST_LOG=nebula_session_pool=debug` to see the lifecycle.

use std::time::Duration;

use nebula_session_pool::testing::MockDriver;
use nebula_session_pool::{Pool, PoolConfig, RetrySettings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let driver = MockDriver::new();
    driver.set_create_delay(Duration::from_millis(20));
    // The first create fails; the pool retries it in the background.
    driver.fail_next_creates(1);

    let config = PoolConfig {
        min_size: 2,
        spin_timeout: Duration::from_secs(5),
        ..PoolConfig::new(4)
    };
    let pool = Pool::new(driver.clone(), config)?;
    println!("=== Warm Session Pool Example ===\n");

    let workers: Vec<_> = (0..12)
        .map(|i| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let settings = RetrySettings::default();
                pool.retry_operation(&settings, |session| async move {
                    tokio::time::sleep(Duration::from_millis(15)).await;
                    session.execute(&format!("SELECT {i}"))
                })
                .await
            })
        })
        .collect();

    for worker in workers {
        println!("  {}", worker.await??);
    }

    let stats = pool.stats();
    println!("\nPool stats:");
    println!("  active:          {}", stats.active_size);
    println!("  free:            {}", stats.free_size);
    println!("  created:         {}", stats.created);
    println!("  create failures: {}", stats.create_failures);
    println!("  acquisitions:    {}", stats.acquisitions);

    pool.stop(Duration::from_secs(2)).await;
    println!("\nStopped; {} sessions deleted", driver.deletes());

    Ok(())
}
