//! Testing utilities: an in-memory [`SessionDriver`] with scriptable failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::driver::{Session, SessionDriver};
use crate::error::{Error, Result};

/// Session produced by [`MockDriver`].
#[derive(Debug, Clone, Default)]
pub struct MockSession {
    id: Option<String>,
    initialized: bool,
    pending: bool,
}

impl MockSession {
    /// Mark an operation as in flight (or finished) on this session.
    pub fn set_pending_operation(&mut self, pending: bool) {
        self.pending = pending;
    }

    /// Pretend to run a query.
    ///
    /// # Errors
    /// Fails fast on a session that was never created remotely, which is
    /// what every placeholder is.
    pub fn execute(&self, query: &str) -> Result<String> {
        match &self.id {
            Some(id) if self.initialized => Ok(format!("{id}: {query}")),
            _ => Err(Error::Placeholder),
        }
    }
}

impl Session for MockSession {
    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn has_pending_operation(&self) -> bool {
        self.pending
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Default)]
struct MockState {
    creates: AtomicU64,
    keep_alives: AtomicU64,
    deletes: AtomicU64,
    ready_checks: AtomicU64,
    failing_creates: AtomicU32,
    failing_keep_alives: AtomicBool,
    not_ready: AtomicBool,
    in_flight_creates: AtomicUsize,
    peak_in_flight_creates: AtomicUsize,
    create_delay: Mutex<Duration>,
    deleted: Mutex<Vec<String>>,
}

/// In-memory driver that counts calls and fails on request.
///
/// Clones share state, so a test can keep one handle while the pool owns
/// another.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful and failed remote creates issued so far.
    pub fn creates(&self) -> u64 {
        self.state.creates.load(Ordering::SeqCst)
    }

    pub fn keep_alives(&self) -> u64 {
        self.state.keep_alives.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> u64 {
        self.state.deletes.load(Ordering::SeqCst)
    }

    /// Connectivity probes issued before create retries.
    pub fn ready_checks(&self) -> u64 {
        self.state.ready_checks.load(Ordering::SeqCst)
    }

    /// Ids of every session deleted so far, in completion order.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.state.deleted.lock().clone()
    }

    /// Highest number of creates observed running at the same time.
    pub fn peak_concurrent_creates(&self) -> usize {
        self.state.peak_in_flight_creates.load(Ordering::SeqCst)
    }

    /// Make the next `n` creates fail with a transient error.
    pub fn fail_next_creates(&self, n: u32) {
        self.state.failing_creates.store(n, Ordering::SeqCst);
    }

    /// Make every keep-alive fail until switched back.
    pub fn fail_keep_alives(&self, fail: bool) {
        self.state.failing_keep_alives.store(fail, Ordering::SeqCst);
    }

    /// Control what the connectivity probe reports.
    pub fn set_ready(&self, ready: bool) {
        self.state.not_ready.store(!ready, Ordering::SeqCst);
    }

    /// Latency of each remote create.
    pub fn set_create_delay(&self, delay: Duration) {
        *self.state.create_delay.lock() = delay;
    }

    fn take_create_failure(&self) -> bool {
        self.state
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl std::fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDriver")
            .field("creates", &self.creates())
            .field("keep_alives", &self.keep_alives())
            .field("deletes", &self.deletes())
            .finish()
    }
}

impl SessionDriver for MockDriver {
    type Session = MockSession;

    fn new_session(&self) -> MockSession {
        MockSession::default()
    }

    async fn create(&self, session: &mut MockSession) -> Result<()> {
        let state = &self.state;
        state.creates.fetch_add(1, Ordering::SeqCst);
        let running = state.in_flight_creates.fetch_add(1, Ordering::SeqCst) + 1;
        state
            .peak_in_flight_creates
            .fetch_max(running, Ordering::SeqCst);

        let delay = *state.create_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        state.in_flight_creates.fetch_sub(1, Ordering::SeqCst);

        if self.take_create_failure() {
            return Err(Error::transient("backend unavailable"));
        }
        session.id = Some(uuid::Uuid::new_v4().to_string());
        session.initialized = true;
        Ok(())
    }

    async fn keep_alive(&self, session: &mut MockSession) -> Result<()> {
        self.state.keep_alives.fetch_add(1, Ordering::SeqCst);
        if self.state.failing_keep_alives.load(Ordering::SeqCst) {
            session.initialized = false;
            return Err(Error::driver("session expired"));
        }
        Ok(())
    }

    async fn delete(&self, session: MockSession) -> Result<()> {
        self.state.deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(id) = session.id {
            self.state.deleted.lock().push(id);
        }
        Ok(())
    }

    async fn wait_ready(&self, _timeout: Duration) -> bool {
        self.state.ready_checks.fetch_add(1, Ordering::SeqCst);
        !self.state.not_ready.load(Ordering::SeqCst)
    }
}
