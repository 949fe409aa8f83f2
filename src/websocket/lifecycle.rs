//! Per-session state machine.
//!
//! ```text
//! Pending ──link()──▶ Linked ──terminate()──▶ Closing ──finish()──▶ Closed
//!    └──────────────terminate()──────────────────┘
//! ```
//!
//! `terminate` is the only way into `Closing`. It is a compare-and-swap, so
//! whichever side fails or closes first wins and every later call is a no-op.
//! The winning [`Termination`] is published on a watch channel that all tasks
//! of the session observe.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::watch;

use crate::websocket::frame::{CloseReason, CLOSE_GOING_AWAY, CLOSE_INTERNAL_ERROR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Upstream socket not yet open.
    Pending = 0,
    /// Both sides forwarding.
    Linked = 1,
    /// One side closed or failed; propagation in progress.
    Closing = 2,
    /// Both sides terminated.
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Pending,
            1 => SessionState::Linked,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// One half of a session pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Upstream,
}

impl Side {
    pub fn peer(self) -> Side {
        match self {
            Side::Client => Side::Upstream,
            Side::Upstream => Side::Client,
        }
    }

    /// Direction label for frames read from this side.
    pub fn direction(self) -> &'static str {
        match self {
            Side::Client => "client->upstream",
            Side::Upstream => "upstream->client",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => write!(f, "client"),
            Side::Upstream => write!(f, "upstream"),
        }
    }
}

/// Why a session pair is being torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// `by` sent a close frame (or ended its stream cleanly).
    Closed {
        by: Side,
        frame: Option<CloseReason>,
    },
    /// `by` failed: transport error, handshake failure or write error.
    Failed { by: Side, error: String },
    /// No traffic in either direction for the idle timeout.
    TimedOut,
    /// The relay is shutting down.
    Shutdown,
}

/// What the writer of one side emits before closing its socket.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloseDirective {
    /// JSON error frame sent ahead of the close.
    pub notice: Option<String>,
    /// Close frame to send; `None` completes the handshake without a status.
    pub frame: Option<CloseReason>,
}

impl Termination {
    /// Directive for the writer of `side`.
    pub fn directive(&self, side: Side) -> CloseDirective {
        match self {
            Termination::Closed { by, .. } if *by == side => CloseDirective::default(),
            Termination::Closed { frame, .. } => CloseDirective {
                notice: None,
                frame: frame.clone(),
            },
            Termination::Failed { by, .. } if *by == side => CloseDirective::default(),
            Termination::Failed {
                by: Side::Upstream,
                error,
            } => CloseDirective {
                notice: Some(format!("Target WebSocket error: {error}")),
                frame: Some(CloseReason::new(CLOSE_INTERNAL_ERROR, "Target WebSocket error")),
            },
            Termination::Failed { by: Side::Client, .. } => CloseDirective {
                notice: None,
                frame: Some(CloseReason::new(CLOSE_INTERNAL_ERROR, "Client WebSocket error")),
            },
            Termination::TimedOut => CloseDirective {
                notice: (side == Side::Client).then(|| "WebSocket session idle timeout".to_string()),
                frame: Some(CloseReason::new(CLOSE_GOING_AWAY, "Idle timeout")),
            },
            Termination::Shutdown => CloseDirective {
                notice: None,
                frame: Some(CloseReason::new(CLOSE_GOING_AWAY, "Proxy shutting down")),
            },
        }
    }
}

/// Shared lifecycle of one session pair.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
    termination: watch::Sender<Option<Termination>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (termination, _) = watch::channel(None);
        Self {
            state: AtomicU8::new(SessionState::Pending as u8),
            termination,
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// `Pending → Linked`. False if the session was already terminated.
    pub fn link(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Pending as u8,
                SessionState::Linked as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Enter `Closing` and publish `termination`.
    ///
    /// Returns true for the first call only.
    pub fn terminate(&self, termination: Termination) -> bool {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            match SessionState::from_u8(current) {
                SessionState::Pending | SessionState::Linked => {}
                SessionState::Closing | SessionState::Closed => return false,
            }
            match self.state.compare_exchange(
                current,
                SessionState::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.termination.send_replace(Some(termination));
        true
    }

    /// `Closing → Closed`, once every task of the session has exited.
    pub fn finish(&self) {
        self.state.store(SessionState::Closed as u8, Ordering::SeqCst);
    }

    /// The winning termination, if any.
    pub fn termination(&self) -> Option<Termination> {
        self.termination.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Termination>> {
        self.termination.subscribe()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once the session has been terminated.
pub async fn terminated(closing: &mut watch::Receiver<Option<Termination>>) {
    // An Err means the Lifecycle itself is gone, which also ends the session.
    let _ = closing.wait_for(Option::is_some).await;
}
