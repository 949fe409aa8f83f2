//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! Every section has a `Default` so a bare `ProxyConfig::default()` is a
//! working configuration pointed at the public mainnet endpoint.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upstream used when `TARGET_URL` is not set.
pub const DEFAULT_TARGET_URL: &str = "https://api.mainnet-beta.solana.com";

/// Port used when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 8080;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, session cap).
    pub listener: ListenerConfig,

    /// The single upstream RPC endpoint.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// WebSocket pairing settings.
    pub websocket: WebSocketConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host part of the bind address.
    pub bind_host: String,

    /// Listen port.
    pub port: u16,

    /// Maximum concurrent HTTP exchanges plus WebSocket sessions.
    /// `None` leaves concurrency unbounded.
    pub max_sessions: Option<usize>,

    /// How long shutdown waits for open sessions to drain.
    pub shutdown_grace_secs: u64,
}

impl ListenerConfig {
    /// `host:port` string handed to the TCP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_sessions: None,
            shutdown_grace_secs: 10,
        }
    }
}

/// Upstream endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL every inbound path and query is appended to.
    pub url: String,

    /// `User-Agent` sent on the outbound WebSocket handshake.
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_TARGET_URL.to_string(),
            user_agent: concat!("rpc-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Timeout configuration for outbound operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Outbound connect timeout (HTTP connect, full WebSocket handshake).
    pub connect_secs: u64,

    /// Total time for one HTTP exchange.
    pub request_secs: u64,

    /// WebSocket session idle timeout. 0 disables it.
    pub idle_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    /// Idle timeout, or `None` when disabled.
    pub fn idle(&self) -> Option<Duration> {
        (self.idle_secs > 0).then(|| Duration::from_secs(self.idle_secs))
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 60,
            idle_secs: 300,
        }
    }
}

/// What happens to client messages that arrive before the upstream socket opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrelinkPolicy {
    /// Hold them in a bounded queue and flush on link.
    #[default]
    Queue,
    /// Discard them.
    Drop,
}

impl fmt::Display for PrelinkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrelinkPolicy::Queue => write!(f, "queue"),
            PrelinkPolicy::Drop => write!(f, "drop"),
        }
    }
}

impl FromStr for PrelinkPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queue" => Ok(PrelinkPolicy::Queue),
            "drop" => Ok(PrelinkPolicy::Drop),
            other => Err(format!("unknown pre-link policy '{other}' (expected queue or drop)")),
        }
    }
}

/// WebSocket pairing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Pre-link message policy.
    pub prelink_policy: PrelinkPolicy,

    /// Maximum client messages held while the upstream socket is opening.
    pub prelink_queue_capacity: usize,

    /// Frames buffered per direction in front of each socket writer.
    pub send_buffer_capacity: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            prelink_policy: PrelinkPolicy::Queue,
            prelink_queue_capacity: 64,
            send_buffer_capacity: 256,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "rpc_relay=info,tower_http=info".to_string(),
        }
    }
}
