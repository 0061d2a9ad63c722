//! Event broadcasting for session lifecycle observability.
//!
//! Provides [`PoolEvent`] variants emitted as sessions move through the
//! pool and an [`EventBus`] backed by `tokio::sync::broadcast`.

use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PoolEvent
// ---------------------------------------------------------------------------

/// Events emitted during session lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// A session was created remotely and entered the pool.
    SessionCreated {
        /// Server-side session identifier, if the driver exposes one.
        session_id: Option<String>,
    },
    /// A session was removed from the pool and its delete was issued.
    SessionDestroyed {
        /// Server-side session identifier, if the driver exposes one.
        session_id: Option<String>,
        /// Why the session was destroyed.
        reason: DestroyReason,
    },
    /// A remote create failed and a retry was scheduled (or abandoned).
    CreateFailed {
        /// 1-based attempt number within the failure chain.
        attempt: u32,
        /// Human-readable error description.
        error: String,
    },
    /// An idle session was kept alive successfully.
    KeptAlive {
        /// Server-side session identifier, if the driver exposes one.
        session_id: Option<String>,
    },
    /// A caller gave up waiting for a session.
    Exhausted {
        /// Callers still queued after this one left.
        waiters: usize,
    },
    /// The pool finished draining on `stop`.
    Stopped,
}

// ---------------------------------------------------------------------------
// DestroyReason
// ---------------------------------------------------------------------------

/// Reason a session was permanently removed from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    /// Released while uninitialized or with an operation still pending.
    Unhealthy,
    /// The caller discarded the session explicitly.
    Discarded,
    /// A keep-alive of the idle session failed.
    KeepAliveFailed,
    /// The session initializer failed on a freshly created session.
    InitializerFailed,
    /// Released or created after shutdown began.
    Stopping,
    /// Drained from the idle pool by `stop`.
    Shutdown,
}

impl std::fmt::Display for DestroyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unhealthy => "unhealthy",
            Self::Discarded => "discarded",
            Self::KeepAliveFailed => "keep-alive failed",
            Self::InitializerFailed => "initializer failed",
            Self::Stopping => "stopping",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for pool lifecycle events.
///
/// Emission is fire-and-forget: if no subscribers are listening or the
/// channel is full, events are dropped (no backpressure on the pool).
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size.max(1));
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: PoolEvent) {
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    ///
    /// A subscriber that falls behind by more than the buffer size
    /// receives a `Lagged` error and skips to the latest events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
