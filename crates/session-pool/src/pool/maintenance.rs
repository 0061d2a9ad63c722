//! Background maintenance loop.
//!
//! One task per pool. It serves deferred work (create retries) and, each
//! time it has been idle for `spin_timeout`, sweeps idle sessions that are
//! close to going stale. It holds only a `Weak` reference so an abandoned
//! pool is not kept alive by its own worker.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::mpsc;

use super::PoolInner;
use crate::driver::SessionDriver;

/// Work item for the maintenance loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Task {
    /// Stop the loop.
    Terminate,
    /// Retry a failed create. `attempt` is the number of the upcoming try.
    RetryCreate { attempt: u32 },
}

pub(crate) async fn run<D: SessionDriver>(
    pool: Weak<PoolInner<D>>,
    mut tasks: mpsc::UnboundedReceiver<Task>,
    spin_timeout: Duration,
) {
    tracing::debug!(?spin_timeout, "maintenance loop started");

    loop {
        match tokio::time::timeout(spin_timeout, tasks.recv()).await {
            Ok(Some(Task::RetryCreate { attempt })) => {
                let Some(pool) = pool.upgrade() else { break };
                pool.retry_create(attempt).await;
            }
            Ok(Some(Task::Terminate) | None) => break,
            Err(_) => {
                let Some(pool) = pool.upgrade() else { break };
                pool.sweep();
            }
        }
    }

    // Retries still queued hold a reserved slot each; give them back.
    tasks.close();
    let mut abandoned = 0usize;
    while let Ok(task) = tasks.try_recv() {
        if let Task::RetryCreate { .. } = task
            && let Some(pool) = pool.upgrade()
        {
            pool.abandon_create();
            abandoned += 1;
        }
    }
    tracing::debug!(abandoned, "maintenance loop stopped");
}
