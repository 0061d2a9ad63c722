//! Waiters are served strictly in arrival order.

use std::sync::Arc;
use std::time::Duration;

use nebula_session_pool::testing::MockDriver;
use nebula_session_pool::{Pool, PoolConfig};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Queue a waiter that records its index once served, then releases.
async fn enqueue(
    pool: &Pool<MockDriver>,
    order: &Arc<Mutex<Vec<usize>>>,
    index: usize,
) -> JoinHandle<()> {
    let expected = pool.waiters_count() + 1;
    let handle = tokio::spawn({
        let pool = pool.clone();
        let order = Arc::clone(order);
        async move {
            let session = pool.acquire().await.unwrap();
            order.lock().push(index);
            drop(session);
        }
    });
    while pool.waiters_count() < expected {
        tokio::task::yield_now().await;
    }
    handle
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn waiters_are_served_fifo() {
    let pool = Pool::new(MockDriver::new(), PoolConfig::new(1)).unwrap();
    let held = pool.acquire().await.unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for index in 0..5 {
        handles.push(enqueue(&pool, &order, index).await);
    }

    drop(held);
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(pool.free_size(), 1);
}

#[tokio::test]
async fn cancelled_waiter_is_skipped() {
    let pool = Pool::new(MockDriver::new(), PoolConfig::new(1)).unwrap();
    let held = pool.acquire().await.unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = enqueue(&pool, &order, 0).await;
    let middle = enqueue(&pool, &order, 1).await;
    let last = enqueue(&pool, &order, 2).await;

    middle.abort();
    assert!(middle.await.unwrap_err().is_cancelled());
    assert_eq!(pool.waiters_count(), 2, "aborted acquire deregisters");

    drop(held);
    first.await.unwrap();
    last.await.unwrap();
    assert_eq!(*order.lock(), vec![0, 2]);
}

#[tokio::test(start_paused = true)]
async fn timed_out_waiter_does_not_block_the_queue() {
    let pool = Pool::new(MockDriver::new(), PoolConfig::new(1)).unwrap();
    let held = pool.acquire().await.unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let impatient = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire_timeout(Duration::from_millis(100)).await }
    });
    while pool.waiters_count() < 1 {
        tokio::task::yield_now().await;
    }
    let patient = enqueue(&pool, &order, 1).await;

    assert!(impatient.await.unwrap().is_err());
    assert_eq!(pool.waiters_count(), 1);

    drop(held);
    patient.await.unwrap();
    assert_eq!(*order.lock(), vec![1]);
}
