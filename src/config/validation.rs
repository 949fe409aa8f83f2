//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (clap and serde handle syntax)
//! - Check the upstream URL is a usable base (scheme, host, no query)
//! - Validate value ranges (timeouts > 0, buffers > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::{PrelinkPolicy, ProxyConfig};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("upstream url '{url}' is not a valid URL: {reason}")]
    InvalidUpstreamUrl { url: String, reason: String },

    #[error("upstream url scheme '{0}' is not one of http, https, ws, wss")]
    UnsupportedScheme(String),

    #[error("upstream url '{0}' must not carry a query or fragment")]
    UpstreamHasQuery(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.upstream.url) {
        Ok(url) => {
            if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
                errors.push(ValidationError::UnsupportedScheme(url.scheme().to_string()));
            }
            if url.host_str().is_none() {
                errors.push(ValidationError::InvalidUpstreamUrl {
                    url: config.upstream.url.clone(),
                    reason: "missing host".to_string(),
                });
            }
            if url.query().is_some() || url.fragment().is_some() {
                errors.push(ValidationError::UpstreamHasQuery(config.upstream.url.clone()));
            }
        }
        Err(e) => errors.push(ValidationError::InvalidUpstreamUrl {
            url: config.upstream.url.clone(),
            reason: e.to_string(),
        }),
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero("connect timeout"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("request timeout"));
    }
    if config.listener.max_sessions == Some(0) {
        errors.push(ValidationError::Zero("max sessions"));
    }
    if config.websocket.send_buffer_capacity == 0 {
        errors.push(ValidationError::Zero("send buffer capacity"));
    }
    if config.websocket.prelink_policy == PrelinkPolicy::Queue
        && config.websocket.prelink_queue_capacity == 0
    {
        errors.push(ValidationError::Zero("pre-link queue capacity"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
