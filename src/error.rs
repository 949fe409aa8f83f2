//! Relay error taxonomy and its client-visible form.

use std::error::Error as StdError;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while pairing an inbound connection with the upstream.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The upstream URL (or a URL derived from it) is unusable.
    #[error("invalid upstream url: {0}")]
    InvalidTarget(String),

    /// Outbound HTTP request failed (DNS, refused, TLS, timeout, body stream).
    #[error("{}", describe(.0))]
    Upstream(#[from] reqwest::Error),

    /// Outbound WebSocket handshake or transport failure.
    #[error("{}", describe(.0))]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Outbound WebSocket did not open in time.
    #[error("upstream WebSocket connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The configured session cap is exhausted.
    #[error("session limit of {0} reached")]
    AtCapacity(usize),

    #[error("failed to build response: {0}")]
    Http(#[from] axum::http::Error),
}

impl RelayError {
    /// Status code reported to an HTTP client.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::AtCapacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

/// JSON body carried by every relay error response and error frame.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }

    /// Serialised form, used for WebSocket error frames.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"internal relay error"}"#.to_string())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

// reqwest and tungstenite keep the useful part ("Connection refused") in the
// source chain, so flatten it into one line.
fn describe(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
