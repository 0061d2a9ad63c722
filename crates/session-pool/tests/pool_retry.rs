//! Create retry and `retry_operation` tests

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use nebula_session_pool::testing::MockDriver;
use nebula_session_pool::{
    Error, Pool, PoolConfig, PoolEvent, RetryBackoff, RetrySettings, Session,
};

fn quick_retries(max_retries: u32) -> RetrySettings {
    RetrySettings {
        max_retries,
        backoff: RetryBackoff {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
        },
        acquire_timeout: Some(Duration::from_secs(1)),
    }
}

// ---------------------------------------------------------------------------
// Background create retry
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn transient_create_failure_is_invisible_to_caller() {
    let driver = MockDriver::new();
    driver.fail_next_creates(1);
    let pool = Pool::new(driver.clone(), PoolConfig::new(2)).unwrap();

    let session = pool
        .acquire_timeout(Duration::from_secs(5))
        .await
        .expect("caller should receive the retried session");

    assert!(session.is_initialized());
    assert_eq!(driver.creates(), 2);
    assert_eq!(driver.ready_checks(), 1, "retry is preceded by a connectivity probe");

    let stats = pool.stats();
    assert_eq!(stats.create_failures, 1);
    assert_eq!(stats.created, 1);
    assert_eq!(stats.active_size, 1, "the failed attempt must not leak a slot");
}

#[tokio::test(start_paused = true)]
async fn retry_proceeds_when_backend_reports_not_ready() {
    let driver = MockDriver::new();
    driver.fail_next_creates(1);
    driver.set_ready(false);
    let pool = Pool::new(driver.clone(), PoolConfig::new(1)).unwrap();

    let session = pool.acquire_timeout(Duration::from_secs(5)).await.unwrap();
    assert!(session.is_initialized());
    assert_eq!(driver.creates(), 2);
}

#[tokio::test(start_paused = true)]
async fn failure_chain_numbers_attempts() {
    let driver = MockDriver::new();
    driver.fail_next_creates(3);
    let pool = Pool::new(driver.clone(), PoolConfig::new(1)).unwrap();
    let mut events = pool.subscribe();

    let _session = pool.acquire_timeout(Duration::from_secs(10)).await.unwrap();

    let mut attempts = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PoolEvent::CreateFailed { attempt, .. } = event {
            attempts.push(attempt);
        }
    }
    assert_eq!(attempts, vec![1, 2, 3]);
    assert_eq!(driver.creates(), 4);
}

#[tokio::test(start_paused = true)]
async fn retries_hold_their_slot() {
    let driver = MockDriver::new();
    driver.fail_next_creates(u32::MAX);
    let pool = Pool::new(driver.clone(), PoolConfig::new(1)).unwrap();

    assert!(pool.try_acquire().is_err());
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(pool.active_size(), 1, "retrying create keeps its reservation");
    assert_eq!(pool.free_size(), 0);
    assert!(driver.creates() > 1);
    let creates = driver.creates();
    assert!(pool.try_acquire().is_err());
    tokio::task::yield_now().await;
    assert_eq!(driver.creates(), creates, "no second chain at capacity");
}

// ---------------------------------------------------------------------------
// retry_operation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn retry_operation_retries_transient_errors() {
    let pool = Pool::new(MockDriver::new(), PoolConfig::new(1)).unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let result = pool
        .retry_operation(&quick_retries(5), |session| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::transient("deadline exceeded"))
                } else {
                    session.execute("SELECT 1")
                }
            }
        })
        .await;

    assert!(result.unwrap().ends_with("SELECT 1"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(pool.free_size(), 1, "every attempt returns its session");
}

#[tokio::test(start_paused = true)]
async fn retry_operation_stops_on_permanent_error() {
    let pool = Pool::new(MockDriver::new(), PoolConfig::new(1)).unwrap();
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = pool
        .retry_operation(&quick_retries(5), |_session| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::driver("syntax error")) }
        })
        .await;

    assert!(matches!(result, Err(Error::Driver { retryable: false, .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_operation_gives_up_after_max_retries() {
    let pool = Pool::new(MockDriver::new(), PoolConfig::new(1)).unwrap();
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = pool
        .retry_operation(&quick_retries(2), |_session| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::transient("aborted")) }
        })
        .await;

    assert!(result.unwrap_err().is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn retry_operation_rejects_placeholders() {
    let pool = Pool::new(MockDriver::new(), PoolConfig::new(1)).unwrap();
    pool.stop(Duration::from_secs(1)).await;

    let result: Result<(), _> = pool
        .retry_operation(&quick_retries(3), |_session| async { Ok(()) })
        .await;
    assert!(matches!(result, Err(Error::Placeholder)));
}
