//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, fatal on failure)
//!     → axum::serve (HTTP/1.1, upgrades)
//!     → connection.rs (session id, live count, optional cap)
//!     → Hand off to the HTTP or WebSocket relay
//! ```
//!
//! # Design Decisions
//! - Unbounded by default; `max_sessions` turns on a fail-fast slot pool
//! - Every session tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::{SessionGuard, SessionId, SessionTracker};
pub use listener::{bind, ListenerError};
