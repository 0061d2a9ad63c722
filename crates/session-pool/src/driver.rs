//! The remote side of a pool: how sessions are created, kept alive and deleted.
//!
//! The pool never talks to the network itself. Everything remote goes
//! through a [`SessionDriver`], whose futures the pool runs on its
//! completion workers without holding the pool lock.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// An opaque, remote-backed session handle.
pub trait Session: Send + 'static {
    /// Whether a successful remote create has been applied to this handle.
    ///
    /// Handles minted by [`SessionDriver::new_session`] start uninitialized;
    /// placeholders handed out during shutdown stay that way.
    fn is_initialized(&self) -> bool;

    /// Whether an operation is still in flight on this session.
    ///
    /// A session released with a pending operation cannot be reused and is
    /// destroyed instead.
    fn has_pending_operation(&self) -> bool {
        false
    }

    /// Server-side identifier, once known.
    fn id(&self) -> Option<&str> {
        None
    }
}

/// Driver performing the remote operations on behalf of a pool.
pub trait SessionDriver: Send + Sync + 'static {
    /// The session type handed out by the pool.
    type Session: Session;

    /// Mint a fresh, uninitialized session handle. Must not block.
    fn new_session(&self) -> Self::Session;

    /// Create the session remotely and mark it initialized on success.
    fn create(&self, session: &mut Self::Session) -> impl Future<Output = Result<()>> + Send;

    /// Refresh the remote session so it does not expire while idle.
    fn keep_alive(&self, session: &mut Self::Session) -> impl Future<Output = Result<()>> + Send;

    /// Delete the session remotely. Best effort: failures are only logged.
    fn delete(&self, session: Self::Session) -> impl Future<Output = Result<()>> + Send;

    /// Wait until the backend looks reachable, for at most `timeout`.
    ///
    /// Returns `false` if the bound elapsed first.
    fn wait_ready(&self, _timeout: Duration) -> impl Future<Output = bool> + Send {
        async { true }
    }
}
