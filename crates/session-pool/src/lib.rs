//! # Nebula Session Pool
//!
//! A bounded, self-maintaining pool of remote-backed sessions.
//!
//! Callers [`acquire`](Pool::acquire) a session, use it, and drop the
//! returned [`PooledSession`] guard to give it back. The pool creates
//! sessions on demand up to `max_size`, keeps at least `min_size` alive,
//! hands returned sessions to waiting callers in FIFO order, and keeps idle
//! sessions from expiring server-side with periodic keep-alives. A failed
//! create is retried in the background, so callers only ever see a session,
//! [`Error::PoolEmpty`], or (once [`stop`](Pool::stop) has begun) a
//! placeholder.
//!
//! The remote side is abstracted behind [`SessionDriver`].
//!
//! ```no_run
//! use std::time::Duration;
//! use nebula_session_pool::testing::MockDriver;
//! use nebula_session_pool::{Pool, PoolConfig};
//!
//! # async fn demo() -> nebula_session_pool::Result<()> {
//! let pool = Pool::new(MockDriver::new(), PoolConfig { min_size: 1, ..PoolConfig::new(4) })?;
//! {
//!     let session = pool.acquire_timeout(Duration::from_secs(1)).await?;
//!     session.execute("SELECT 1")?;
//! }
//! pool.stop(Duration::from_secs(5)).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod guard;
pub mod pool;
pub mod retry;
pub mod testing;

pub use config::PoolConfig;
pub use driver::{Session, SessionDriver};
pub use error::{Error, Result};
pub use events::{DestroyReason, EventBus, PoolEvent};
pub use guard::PooledSession;
pub use pool::{Initializer, Pool, PoolBuilder, PoolStats};
pub use retry::{RetryBackoff, RetrySettings};
