//! Transparent HTTP and WebSocket relay for a single JSON-RPC upstream.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌───────────────────────────────────────────────────┐
//!                   │                      RELAY                        │
//!   Client request  │  ┌─────────┐    ┌─────────┐    ┌──────────────┐   │
//!   ────────────────┼─▶│   net   │───▶│  http   │───▶│   upstream   │───┼──▶ TARGET_URL
//!                   │  │listener │    │ server  │    │   target     │   │    + path + query
//!                   │  └─────────┘    └────┬────┘    └──────────────┘   │
//!                   │                      │ upgrade                    │
//!                   │                      ▼                            │
//!   Client socket   │               ┌─────────────┐                     │
//!   ◀──────────────▶┼──────────────▶│  websocket  │◀────────────────────┼──▶ ws(s)://TARGET
//!                   │               │   session   │                     │
//!                   │               └─────────────┘                     │
//!                   │  config · error · lifecycle · observability       │
//!                   └───────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod upstream;
pub mod websocket;

pub use config::schema::ProxyConfig;
pub use error::RelayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
