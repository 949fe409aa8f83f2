//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, upgrade detection)
//!     → request.rs (rewrite URL, filter headers, stream body)
//!     → reqwest client → upstream
//!     → response.rs (status, filtered headers, no-store, streamed body)
//!     → Send to client
//! ```
//!
//! Upgrade requests leave this path at `server.rs` and are handed to
//! [`crate::websocket`].

pub mod headers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
