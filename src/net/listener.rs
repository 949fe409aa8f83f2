//! TCP listener binding.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Report bind failures as a distinct, fatal startup error

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
}

/// Bind the inbound listener.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| ListenerError::Bind {
            address: address.clone(),
            source,
        })?;

    if let Ok(local_addr) = listener.local_addr() {
        tracing::info!(
            address = %local_addr,
            max_sessions = ?config.max_sessions,
            "Listener bound"
        );
    }

    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_bind_on_same_port_fails() {
        let config = ListenerConfig {
            bind_host: "127.0.0.1".to_string(),
            port: 0,
            ..ListenerConfig::default()
        };
        let first = bind(&config).await.unwrap();
        let taken = ListenerConfig {
            port: first.local_addr().unwrap().port(),
            ..config
        };

        let err = bind(&taken).await.unwrap_err();
        assert!(err.to_string().contains("Failed to bind 127.0.0.1:"));
    }
}
