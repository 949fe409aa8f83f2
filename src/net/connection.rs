//! Session identity and accounting.
//!
//! # Responsibilities
//! - Generate unique session IDs for tracing
//! - Count live HTTP exchanges and WebSocket sessions for graceful shutdown
//! - Enforce the optional `max_sessions` cap

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::RelayError;

/// Global atomic counter for session IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one inbound connection and its upstream pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tracks live sessions and hands out slots when a cap is configured.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    /// Current count of live sessions.
    active_count: Arc<AtomicU64>,
    /// Slot pool, present only when `max_sessions` is set.
    limit: Option<Arc<Semaphore>>,
    max_sessions: Option<usize>,
}

impl SessionTracker {
    pub fn new(max_sessions: Option<usize>) -> Self {
        Self {
            active_count: Arc::new(AtomicU64::new(0)),
            limit: max_sessions.map(|n| Arc::new(Semaphore::new(n))),
            max_sessions,
        }
    }

    /// Register a new session, or fail fast when every slot is taken.
    ///
    /// The returned guard releases the slot when dropped, on every exit path.
    pub fn try_track(&self) -> Result<SessionGuard, RelayError> {
        let permit = match (&self.limit, self.max_sessions) {
            (Some(limit), Some(max)) => Some(
                limit
                    .clone()
                    .try_acquire_owned()
                    .map_err(|_| RelayError::AtCapacity(max))?,
            ),
            _ => None,
        };

        self.active_count.fetch_add(1, Ordering::SeqCst);
        Ok(SessionGuard {
            active_count: Arc::clone(&self.active_count),
            id: SessionId::new(),
            _permit: permit,
        })
    }

    /// Get current live session count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all sessions are gone or `grace` elapses.
    ///
    /// Returns `true` when the count reached zero in time.
    pub async fn wait_for_drain(&self, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        while self.active_count() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Guard that tracks a session's lifetime.
/// Decrements active count (and frees the slot) when dropped.
#[derive(Debug)]
pub struct SessionGuard {
    active_count: Arc<AtomicU64>,
    id: SessionId,
    _permit: Option<OwnedSemaphorePermit>,
}

impl SessionGuard {
    /// Get this session's ID.
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(session = %self.id, "Session released");
    }
}
