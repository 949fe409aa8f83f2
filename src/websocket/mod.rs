//! WebSocket relay subsystem.
//!
//! # Data Flow
//! ```text
//! Upgrade request (any path)
//!     → session.rs (accept, open upstream, pre-link queue, pumps)
//!     → frame.rs (axum / tungstenite messages ↔ Frame)
//!     → writer.rs (one task per socket, ordered, close directive)
//!     → lifecycle.rs (Pending → Linked → Closing → Closed)
//! ```
//!
//! # Design Decisions
//! - One upstream socket per client socket, never pooled
//! - Text stays text, binary stays binary; payloads are not inspected
//! - Ping/pong is answered per hop and not forwarded
//! - Whichever side closes or fails first decides how the other is closed

pub mod frame;
pub mod lifecycle;
pub mod session;
pub mod writer;

pub use frame::{CloseReason, Frame};
pub use lifecycle::{Lifecycle, SessionState, Side, Termination};
pub use session::{accept, connect_upstream, run_session, SessionContext};
