//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, RFC 3339 timestamps)
//!     → tower-http TraceLayer (one span per HTTP exchange)
//!     → ws_session span (one per WebSocket session)
//!
//! Consumers:
//!     → stdout
//! ```
//!
//! # Design Decisions
//! - Session and request IDs flow through every event
//! - Payload sizes at debug, payload text only at trace
//! - `RUST_LOG` overrides the configured level

pub mod logging;

pub use logging::init;
