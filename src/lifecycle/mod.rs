//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Trigger → stop accepting → close WebSocket sessions (1001) → drain → exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, close sessions, drain
//! - Shutdown has timeout: exit after `shutdown_grace_secs` even if sessions remain

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
