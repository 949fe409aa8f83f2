//! Upstream addressing.
//!
//! # Data Flow
//! ```text
//! TARGET_URL (validated)
//!     → target.rs (UpstreamTarget, built once at startup)
//!     → Arc<UpstreamTarget> in AppState
//!     → http relay:      http_url(path + query)
//!     → websocket relay: ws_url(path + query)
//! ```
//!
//! # Design Decisions
//! - The target is immutable; every per-request URL is derived, never stored
//! - Only the scheme changes between the HTTP and WebSocket forms

pub mod target;

pub use target::UpstreamTarget;
