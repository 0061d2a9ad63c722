//! Session pool: bounded, FIFO-fair and self-maintaining.
//!
//! All bookkeeping (`active`, `stopping`, the idle heap and the waiter
//! queue) lives in one [`PoolState`] behind a single `parking_lot::Mutex`.
//! Remote work is spawned onto the runtime captured at build time and
//! re-enters the lock only for the short bookkeeping step on completion;
//! the lock is never held across an `.await`.
//!
//! A session counted in `active` is always in exactly one place: checked
//! out by a caller, parked in the idle heap, or in flight (being created,
//! kept alive or waiting for a create retry).

mod idle;
mod maintenance;
mod shutdown;
mod waiters;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::{Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::driver::{Session, SessionDriver};
use crate::error::{Error, Result};
use crate::events::{DestroyReason, EventBus, PoolEvent};
use crate::guard::PooledSession;

use idle::IdlePool;
use maintenance::Task;
use waiters::{Delivery, Ticket, WaiterQueue};

/// Hook run once on every freshly created session before its first handout.
pub type Initializer<S> =
    Arc<dyn for<'a> Fn(&'a mut S) -> BoxFuture<'a, Result<()>> + Send + Sync>;

// ---------------------------------------------------------------------------
// PoolStats
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of a pool.
///
/// The size fields are read together under the pool lock, so
/// `active_size == free_size + busy_size` holds for every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions counted against `max_size`.
    pub active_size: usize,
    /// Sessions idle and ready for handout.
    pub free_size: usize,
    /// Sessions checked out or in transition.
    pub busy_size: usize,
    /// Configured maximum.
    pub max_size: usize,
    /// Callers queued for a session.
    pub waiters_count: usize,
    /// Sessions ever created successfully.
    pub created: u64,
    /// Sessions ever destroyed.
    pub destroyed: u64,
    /// Failed create attempts.
    pub create_failures: u64,
    /// Successful keep-alives.
    pub keep_alives: u64,
    /// Live sessions handed to callers.
    pub acquisitions: u64,
    /// Placeholders handed out after shutdown began.
    pub placeholders: u64,
}

#[derive(Default)]
struct Counters {
    created: AtomicU64,
    destroyed: AtomicU64,
    create_failures: AtomicU64,
    keep_alives: AtomicU64,
    acquisitions: AtomicU64,
    placeholders: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Longest span a deadline may cover. Larger durations are clamped to it.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The instant `after` from now, clamped to [`FAR_FUTURE`].
fn deadline_after(after: Duration) -> Instant {
    Instant::now() + after.min(FAR_FUTURE)
}

// ---------------------------------------------------------------------------
// Pool internals
// ---------------------------------------------------------------------------

struct PoolState<S> {
    active: usize,
    stopping: bool,
    idle: IdlePool<S>,
    waiters: WaiterQueue<S>,
}

/// Inner shared state for the pool.
pub(crate) struct PoolInner<D: SessionDriver> {
    driver: D,
    config: PoolConfig,
    initializer: Option<Initializer<D::Session>>,
    state: Mutex<PoolState<D::Session>>,
    /// Deferred work for the maintenance loop.
    tasks: mpsc::UnboundedSender<Task>,
    maintenance: Mutex<Option<JoinHandle<()>>>,
    /// Bounds driver calls in flight to `completion_workers`.
    completions: Semaphore,
    runtime: Handle,
    events: EventBus,
    counters: Counters,
}

enum Subscription<D: SessionDriver> {
    Ready(Delivery<D::Session>),
    Pending(Waiter<D>),
}

/// A queued acquire. Dropping it before it settles deregisters it, and
/// returns to the pool any session that was delivered in the meantime.
struct Waiter<D: SessionDriver> {
    pool: Arc<PoolInner<D>>,
    ticket: Ticket,
    rx: oneshot::Receiver<Delivery<D::Session>>,
    settled: bool,
}

impl<D: SessionDriver> Waiter<D> {
    async fn recv(&mut self) -> Option<Delivery<D::Session>> {
        let delivery = (&mut self.rx).await.ok();
        self.settled = true;
        delivery
    }

    fn try_take(&mut self) -> Option<Delivery<D::Session>> {
        let delivery = self.rx.try_recv().ok();
        self.settled = delivery.is_some();
        delivery
    }
}

impl<D: SessionDriver> Drop for Waiter<D> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if self.pool.state.lock().waiters.remove(self.ticket) {
            return;
        }
        // Dequeued by a concurrent release: the slot was filled under the
        // lock, so the session is already in the channel.
        if let Ok(Delivery::Session(session)) = self.rx.try_recv() {
            tracing::debug!("acquire gave up after fulfilment; returning session");
            self.pool.release_session(session);
        }
    }
}

impl<D: SessionDriver> PoolInner<D> {
    fn is_stopping(&self) -> bool {
        self.state.lock().stopping
    }

    /// Take an idle session, or queue a waiter and create if there is headroom.
    fn subscribe(self: &Arc<Self>) -> Subscription<D> {
        let mut state = self.state.lock();
        if state.stopping {
            drop(state);
            return Subscription::Ready(self.placeholder());
        }
        if let Some(entry) = state.idle.pop() {
            return Subscription::Ready(Delivery::Session(entry.session));
        }

        let (ticket, rx) = state.waiters.push();
        if state.active < self.config.max_size {
            self.create(&mut state);
        }
        drop(state);

        Subscription::Pending(Waiter {
            pool: Arc::clone(self),
            ticket,
            rx,
            settled: false,
        })
    }

    fn placeholder(&self) -> Delivery<D::Session> {
        bump(&self.counters.placeholders);
        Delivery::Placeholder(self.driver.new_session())
    }

    fn lease(self: &Arc<Self>, delivery: Delivery<D::Session>) -> PooledSession<D> {
        match delivery {
            Delivery::Session(session) => {
                bump(&self.counters.acquisitions);
                PooledSession::checked_out(session, Arc::clone(self))
            }
            Delivery::Placeholder(session) => PooledSession::placeholder(session),
        }
    }

    fn exhausted(&self) -> Error {
        let (active_size, waiters) = {
            let state = self.state.lock();
            (state.active, state.waiters.len())
        };
        self.events.emit(PoolEvent::Exhausted { waiters });
        Error::PoolEmpty {
            active_size,
            max_size: self.config.max_size,
            waiters,
        }
    }

    /// Return a session: destroy it if unusable, else hand it to the
    /// oldest waiter, else park it in the idle heap.
    pub(crate) fn release_session(self: &Arc<Self>, session: D::Session) {
        let mut state = self.state.lock();
        let unusable = if state.stopping {
            Some(DestroyReason::Stopping)
        } else if !session.is_initialized() || session.has_pending_operation() {
            Some(DestroyReason::Unhealthy)
        } else {
            None
        };
        if let Some(reason) = unusable {
            self.destroy(state, session, reason);
            return;
        }

        let mut session = session;
        while let Some(waiter) = state.waiters.pop() {
            match waiter.send(Delivery::Session(session)) {
                Ok(()) => return,
                Err(Delivery::Session(returned) | Delivery::Placeholder(returned)) => {
                    session = returned;
                }
            }
        }
        state
            .idle
            .push(session, deadline_after(self.config.idle_horizon));
    }

    pub(crate) fn discard_session(self: &Arc<Self>, session: D::Session) {
        let state = self.state.lock();
        self.destroy(state, session, DestroyReason::Discarded);
    }

    /// Reserve a slot and issue a remote create for it.
    ///
    /// The slot stays reserved through any retries until the session is
    /// released into the pool or the create is abandoned.
    fn create(self: &Arc<Self>, state: &mut PoolState<D::Session>) {
        if state.stopping || state.active >= self.config.max_size {
            return;
        }
        state.active += 1;
        self.issue_create(1);
    }

    fn issue_create(self: &Arc<Self>, attempt: u32) {
        let pool = Arc::clone(self);
        self.runtime
            .spawn(async move { pool.complete_create(attempt).await });
    }

    async fn complete_create(self: Arc<Self>, attempt: u32) {
        let outcome = {
            let _permit = self.completions.acquire().await.ok();
            let mut session = self.driver.new_session();
            match self.driver.create(&mut session).await {
                Err(e) => Err((e, None)),
                Ok(()) => {
                    let initialized = match &self.initializer {
                        Some(init) => init(&mut session).await,
                        None => Ok(()),
                    };
                    match initialized {
                        Ok(()) => Ok(session),
                        Err(e) => Err((e, Some(session))),
                    }
                }
            }
        };

        match outcome {
            Ok(session) => {
                bump(&self.counters.created);
                tracing::debug!(
                    session_id = session.id().unwrap_or("-"),
                    attempt,
                    "session created"
                );
                self.events.emit(PoolEvent::SessionCreated {
                    session_id: session.id().map(str::to_owned),
                });
                self.release_session(session);
            }
            Err((error, half_made)) => {
                if let Some(session) = half_made {
                    // The slot stays reserved for the retry, so `active` is left alone.
                    bump(&self.counters.destroyed);
                    self.events.emit(PoolEvent::SessionDestroyed {
                        session_id: session.id().map(str::to_owned),
                        reason: DestroyReason::InitializerFailed,
                    });
                    self.issue_delete(session);
                }
                self.create_failed(attempt, &error);
            }
        }
    }

    /// Hand a failed create to the maintenance loop, or abandon it if the
    /// pool is stopping.
    fn create_failed(self: &Arc<Self>, attempt: u32, error: &Error) {
        bump(&self.counters.create_failures);
        let failure = Error::CreateFailed {
            attempt,
            reason: error.to_string(),
        };
        self.events.emit(PoolEvent::CreateFailed {
            attempt,
            error: error.to_string(),
        });

        let mut state = self.state.lock();
        let scheduled = !state.stopping
            && self
                .tasks
                .send(Task::RetryCreate {
                    attempt: attempt + 1,
                })
                .is_ok();
        if scheduled {
            tracing::warn!(error = %failure, "scheduling session create retry");
        } else {
            tracing::warn!(error = %failure, "abandoning session create");
            state.active = state.active.saturating_sub(1);
        }
    }

    /// Drop the reservation of a create that will never be retried.
    fn abandon_create(&self) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
    }

    /// Wait up to `ready_timeout` for the backend, then retry the create
    /// whether or not it reported ready.
    async fn retry_create(self: &Arc<Self>, attempt: u32) {
        if self.is_stopping() {
            self.abandon_create();
            return;
        }
        if !self.driver.wait_ready(self.config.ready_timeout).await {
            tracing::debug!(
                attempt,
                timeout = ?self.config.ready_timeout,
                "backend not ready; retrying create anyway"
            );
        }
        let delay = self.config.retry_backoff.delay_for(attempt.saturating_sub(1));
        tokio::time::sleep(delay).await;

        if self.is_stopping() {
            self.abandon_create();
            return;
        }
        tracing::debug!(attempt, "retrying session create");
        self.issue_create(attempt);
    }

    /// Remove a session from the count, top the pool back up if callers
    /// are waiting or the floor was crossed, and issue its delete.
    fn destroy(
        self: &Arc<Self>,
        mut state: MutexGuard<'_, PoolState<D::Session>>,
        session: D::Session,
        reason: DestroyReason,
    ) {
        state.active = state.active.saturating_sub(1);
        if !state.waiters.is_empty() || state.active < self.config.min_size {
            self.create(&mut state);
        }
        drop(state);

        bump(&self.counters.destroyed);
        tracing::debug!(
            session_id = session.id().unwrap_or("-"),
            %reason,
            "destroying session"
        );
        self.events.emit(PoolEvent::SessionDestroyed {
            session_id: session.id().map(str::to_owned),
            reason,
        });
        self.issue_delete(session);
    }

    /// Fire-and-forget remote delete. Does not touch the count.
    fn issue_delete(self: &Arc<Self>, session: D::Session) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        self.runtime.spawn(async move {
            let _permit = pool.completions.acquire().await.ok();
            let session_id = session.id().map(str::to_owned);
            if let Err(e) = pool.driver.delete(session).await {
                tracing::warn!(
                    session_id = session_id.as_deref().unwrap_or("-"),
                    error = %e,
                    "session delete failed"
                );
            }
        })
    }

    /// Pop the earliest-deadline idle session if it is about to go stale;
    /// otherwise put it back untouched.
    ///
    /// Inspects a single entry per call.
    fn pick_for_keep_alive(&self) -> Option<D::Session> {
        let mut state = self.state.lock();
        if state.stopping {
            return None;
        }
        let entry = state.idle.pop()?;
        let remaining = entry.deadline.saturating_duration_since(Instant::now());
        if remaining < self.config.keep_alive_staleness {
            Some(entry.session)
        } else {
            state.idle.requeue(entry);
            None
        }
    }

    /// Keep alive every idle session that is due.
    fn sweep(self: &Arc<Self>) {
        while let Some(session) = self.pick_for_keep_alive() {
            self.issue_keep_alive(session);
        }
    }

    fn issue_keep_alive(self: &Arc<Self>, mut session: D::Session) {
        let pool = Arc::clone(self);
        self.runtime.spawn(async move {
            let result = {
                let _permit = pool.completions.acquire().await.ok();
                pool.driver.keep_alive(&mut session).await
            };
            match result {
                Ok(()) => {
                    bump(&pool.counters.keep_alives);
                    pool.events.emit(PoolEvent::KeptAlive {
                        session_id: session.id().map(str::to_owned),
                    });
                    pool.release_session(session);
                }
                Err(e) => {
                    let failure = Error::KeepAliveFailed {
                        session_id: session.id().unwrap_or("-").to_owned(),
                        reason: e.to_string(),
                    };
                    tracing::warn!(error = %failure, "destroying session");
                    let state = pool.state.lock();
                    pool.destroy(state, session, DestroyReason::KeepAliveFailed);
                }
            }
        });
    }
}

// ---------------------------------------------------------------------------
// PoolBuilder
// ---------------------------------------------------------------------------

/// Builder for [`Pool`], for settings that do not belong in [`PoolConfig`].
pub struct PoolBuilder<D: SessionDriver> {
    driver: D,
    config: PoolConfig,
    initializer: Option<Initializer<D::Session>>,
    event_capacity: usize,
}

impl<D: SessionDriver> PoolBuilder<D> {
    /// Run `init` once on every freshly created session before it is
    /// handed out. A failing initializer counts as a failed create.
    pub fn initializer<F>(mut self, init: F) -> Self
    where
        F: for<'a> Fn(&'a mut D::Session) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(init));
        self
    }

    /// Buffer size of the lifecycle event channel (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Validate the configuration, start the maintenance loop and begin
    /// creating `min_size` sessions.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the configuration is invalid or
    /// no Tokio runtime is available.
    pub fn build(self) -> Result<Pool<D>> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| {
            Error::configuration("a session pool must be built inside a Tokio runtime")
        })?;

        let (tasks, task_rx) = mpsc::unbounded_channel();
        let spin_timeout = self.config.spin_timeout;
        let inner = Arc::new(PoolInner {
            completions: Semaphore::new(self.config.completion_workers),
            state: Mutex::new(PoolState {
                active: 0,
                stopping: false,
                idle: IdlePool::new(self.config.max_size),
                waiters: WaiterQueue::new(),
            }),
            driver: self.driver,
            config: self.config,
            initializer: self.initializer,
            tasks,
            maintenance: Mutex::new(None),
            runtime,
            events: EventBus::new(self.event_capacity),
            counters: Counters::default(),
        });

        let worker = inner.runtime.spawn(maintenance::run(
            Arc::downgrade(&inner),
            task_rx,
            spin_timeout,
        ));
        *inner.maintenance.lock() = Some(worker);

        {
            let mut state = inner.state.lock();
            for _ in 0..inner.config.min_size {
                inner.create(&mut state);
            }
        }
        tracing::debug!(
            max_size = inner.config.max_size,
            min_size = inner.config.min_size,
            "session pool started"
        );

        Ok(Pool { inner })
    }
}

// ---------------------------------------------------------------------------
// Pool<D>
// ---------------------------------------------------------------------------

/// Bounded pool of remote-backed sessions.
///
/// Cloning is cheap; clones share the same sessions. Call [`stop`](Self::stop)
/// before dropping the last clone: idle sessions are only deleted remotely
/// by a stop.
pub struct Pool<D: SessionDriver> {
    inner: Arc<PoolInner<D>>,
}

impl<D: SessionDriver> Clone for Pool<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: SessionDriver> std::fmt::Debug for Pool<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("stats", &self.stats())
            .field("stopping", &self.is_stopping())
            .finish()
    }
}

impl<D: SessionDriver> Pool<D> {
    /// Create a pool with no initializer.
    ///
    /// # Errors
    /// Returns error if `config` is invalid (e.g. `min_size > max_size`).
    pub fn new(driver: D, config: PoolConfig) -> Result<Self> {
        Self::builder(driver, config).build()
    }

    /// Start building a pool.
    pub fn builder(driver: D, config: PoolConfig) -> PoolBuilder<D> {
        PoolBuilder {
            driver,
            config,
            initializer: None,
            event_capacity: 256,
        }
    }

    /// Acquire a session, waiting as long as it takes.
    pub async fn acquire(&self) -> Result<PooledSession<D>> {
        self.checkout(None).await
    }

    /// Acquire a session, waiting at most `timeout`.
    ///
    /// # Errors
    /// Returns [`Error::PoolEmpty`] if no session became available in time.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledSession<D>> {
        self.checkout(Some(timeout)).await
    }

    /// Acquire a session only if one can be handed out right now.
    ///
    /// A miss still starts a create when there is headroom, so a later
    /// call may succeed.
    ///
    /// # Errors
    /// Returns [`Error::PoolEmpty`] if no session is immediately available.
    pub fn try_acquire(&self) -> Result<PooledSession<D>> {
        match self.inner.subscribe() {
            Subscription::Ready(delivery) => Ok(self.inner.lease(delivery)),
            Subscription::Pending(mut waiter) => match waiter.try_take() {
                Some(delivery) => Ok(self.inner.lease(delivery)),
                None => {
                    drop(waiter);
                    Err(self.inner.exhausted())
                }
            },
        }
    }

    async fn checkout(&self, timeout: Option<Duration>) -> Result<PooledSession<D>> {
        let mut waiter = match self.inner.subscribe() {
            Subscription::Ready(delivery) => return Ok(self.inner.lease(delivery)),
            Subscription::Pending(waiter) => waiter,
        };

        let delivery = match timeout {
            None => waiter.recv().await,
            Some(timeout) => tokio::time::timeout(timeout, waiter.recv())
                .await
                .ok()
                .flatten(),
        };

        match delivery {
            Some(delivery) => Ok(self.inner.lease(delivery)),
            None => {
                drop(waiter);
                Err(self.inner.exhausted())
            }
        }
    }

    /// Return a session to the pool. Equivalent to dropping the guard.
    pub fn release(&self, session: PooledSession<D>) {
        drop(session);
    }

    /// Snapshot of sizes and lifetime counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let (active_size, free_size, waiters_count) = {
            let state = self.inner.state.lock();
            (state.active, state.idle.len(), state.waiters.len())
        };
        let counters = &self.inner.counters;
        PoolStats {
            active_size,
            free_size,
            busy_size: active_size.saturating_sub(free_size),
            max_size: self.inner.config.max_size,
            waiters_count,
            created: counters.created.load(Ordering::Relaxed),
            destroyed: counters.destroyed.load(Ordering::Relaxed),
            create_failures: counters.create_failures.load(Ordering::Relaxed),
            keep_alives: counters.keep_alives.load(Ordering::Relaxed),
            acquisitions: counters.acquisitions.load(Ordering::Relaxed),
            placeholders: counters.placeholders.load(Ordering::Relaxed),
        }
    }

    /// Sessions counted against `max_size`.
    #[must_use]
    pub fn active_size(&self) -> usize {
        self.inner.state.lock().active
    }

    /// Sessions idle and ready for handout.
    #[must_use]
    pub fn free_size(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Sessions checked out or in transition.
    #[must_use]
    pub fn busy_size(&self) -> usize {
        let state = self.inner.state.lock();
        state.active.saturating_sub(state.idle.len())
    }

    /// Configured maximum.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.inner.config.max_size
    }

    /// Callers queued for a session.
    #[must_use]
    pub fn waiters_count(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    /// Whether `stop` has been called.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.inner.is_stopping()
    }

    /// The configuration the pool was built with.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Subscribe to lifecycle events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.events.subscribe()
    }
}
