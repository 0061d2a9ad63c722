//! RAII guard for checked-out sessions

use std::sync::Arc;

use crate::driver::SessionDriver;
use crate::pool::PoolInner;

/// A session checked out of a [`Pool`](crate::Pool).
///
/// Dropping the guard releases the session: it is handed to the oldest
/// waiter, parked in the idle pool, or destroyed if it is no longer usable.
///
/// Once the pool is stopping, `acquire` hands out *placeholder* guards
/// wrapping an uninitialized session. Placeholders are not counted against
/// the pool size; dropping one does nothing.
pub struct PooledSession<D: SessionDriver> {
    session: Option<D::Session>,
    pool: Option<Arc<PoolInner<D>>>,
}

impl<D: SessionDriver> PooledSession<D> {
    pub(crate) fn checked_out(session: D::Session, pool: Arc<PoolInner<D>>) -> Self {
        Self {
            session: Some(session),
            pool: Some(pool),
        }
    }

    pub(crate) fn placeholder(session: D::Session) -> Self {
        Self {
            session: Some(session),
            pool: None,
        }
    }

    /// Whether this guard was issued after shutdown began.
    ///
    /// A placeholder's session is uninitialized; drivers fail any real
    /// work attempted on it.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.pool.is_none()
    }

    /// Destroy the session instead of returning it to the pool.
    ///
    /// Use this when the caller knows the session is broken even though
    /// it still reports itself as healthy.
    pub fn discard(mut self) {
        if let Some(session) = self.session.take()
            && let Some(pool) = self.pool.take()
        {
            pool.discard_session(session);
        }
    }
}

impl<D: SessionDriver> std::ops::Deref for PooledSession<D> {
    type Target = D::Session;

    fn deref(&self) -> &D::Session {
        self.session.as_ref().expect("session taken before guard drop")
    }
}

impl<D: SessionDriver> std::ops::DerefMut for PooledSession<D> {
    fn deref_mut(&mut self) -> &mut D::Session {
        self.session.as_mut().expect("session taken before guard drop")
    }
}

impl<D: SessionDriver> Drop for PooledSession<D> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take()
            && let Some(pool) = self.pool.take()
        {
            pool.release_session(session);
        }
    }
}

impl<D> std::fmt::Debug for PooledSession<D>
where
    D: SessionDriver,
    D::Session: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("session", &self.session)
            .field("placeholder", &self.is_placeholder())
            .finish()
    }
}
