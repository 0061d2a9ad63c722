//! Graceful shutdown.

use std::time::Duration;

use super::maintenance::Task;
use super::{Pool, bump, deadline_after};
use crate::driver::{Session, SessionDriver};
use crate::events::{DestroyReason, PoolEvent};

impl<D: SessionDriver> Pool<D> {
    /// Stop the pool.
    ///
    /// Marks the pool as stopping, wakes every queued caller with a
    /// placeholder, deletes all idle sessions and terminates the maintenance
    /// loop. Waits at most `timeout` for the loop to exit and the deletes to
    /// finish; anything still running after that is left to complete on its
    /// own.
    ///
    /// Sessions checked out at this point are destroyed when released.
    /// Calling `stop` again is harmless.
    pub async fn stop(&self, timeout: Duration) {
        let deadline = deadline_after(timeout);
        let inner = &self.inner;

        let (first_call, woken, drained, worker) = {
            let mut state = inner.state.lock();
            let first_call = !state.stopping;
            if first_call {
                state.stopping = true;
                // The loop only exits on this message, so a failed send means
                // it is already gone.
                let _ = inner.tasks.send(Task::Terminate);
            }

            let mut woken = 0usize;
            while let Some(waiter) = state.waiters.pop() {
                if waiter.send(inner.placeholder()).is_ok() {
                    woken += 1;
                }
            }

            let drained = state.idle.drain();
            state.active = state.active.saturating_sub(drained.len());
            (first_call, woken, drained, inner.maintenance.lock().take())
        };

        if first_call {
            tracing::info!(
                waiters = woken,
                idle = drained.len(),
                ?timeout,
                "stopping session pool"
            );
        }

        let deletes: Vec<_> = drained
            .into_iter()
            .map(|session| {
                bump(&inner.counters.destroyed);
                inner.events.emit(PoolEvent::SessionDestroyed {
                    session_id: session.id().map(str::to_owned),
                    reason: DestroyReason::Shutdown,
                });
                inner.issue_delete(session)
            })
            .collect();

        if let Some(worker) = worker {
            match tokio::time::timeout_at(deadline, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "maintenance loop ended abnormally"),
                Err(_) => tracing::warn!(?timeout, "maintenance loop did not stop in time"),
            }
        }

        if !deletes.is_empty()
            && tokio::time::timeout_at(deadline, futures::future::join_all(deletes))
                .await
                .is_err()
        {
            tracing::warn!(?timeout, "session deletes still running after stop timeout");
        }

        if first_call {
            inner.events.emit(PoolEvent::Stopped);
        }
    }
}
