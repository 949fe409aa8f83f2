//! Configuration loading from the command line and environment.

use clap::Parser;
use thiserror::Error;

use crate::config::schema::{
    PrelinkPolicy, ProxyConfig, DEFAULT_PORT, DEFAULT_TARGET_URL,
};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid command line: {0}")]
    Cli(#[from] clap::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Command line of the relay binary.
///
/// `TARGET_URL` and `PORT` are the only environment variables read; the
/// remaining knobs are flags with hardened defaults.
#[derive(Debug, Parser)]
#[command(name = "rpc-relay")]
#[command(about = "Transparent HTTP and WebSocket relay for a single JSON-RPC upstream", long_about = None)]
pub struct Cli {
    /// Upstream base URL.
    #[arg(long, env = "TARGET_URL", default_value = DEFAULT_TARGET_URL)]
    pub target_url: String,

    /// Listen port.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Listen host.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind_host: String,

    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,

    #[arg(long, default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// WebSocket idle timeout, 0 disables.
    #[arg(long, default_value_t = 300)]
    pub idle_timeout_secs: u64,

    /// Cap on concurrent exchanges and sessions (unbounded when omitted).
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// What to do with client messages sent before the upstream socket opens.
    #[arg(long, default_value_t = PrelinkPolicy::Queue)]
    pub prelink_policy: PrelinkPolicy,

    #[arg(long, default_value_t = 64)]
    pub prelink_queue_capacity: usize,

    #[arg(long, default_value_t = 256)]
    pub send_buffer_capacity: usize,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "rpc_relay=info,tower_http=info")]
    pub log_level: String,
}

impl Cli {
    /// Build the configuration without validating it.
    pub fn into_config(self) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.upstream.url = self.target_url;
        config.listener.port = self.port;
        config.listener.bind_host = self.bind_host;
        config.listener.max_sessions = self.max_sessions;
        config.timeouts.connect_secs = self.connect_timeout_secs;
        config.timeouts.request_secs = self.request_timeout_secs;
        config.timeouts.idle_secs = self.idle_timeout_secs;
        config.websocket.prelink_policy = self.prelink_policy;
        config.websocket.prelink_queue_capacity = self.prelink_queue_capacity;
        config.websocket.send_buffer_capacity = self.send_buffer_capacity;
        config.observability.log_level = self.log_level;
        config
    }
}

/// Parse the process arguments and environment into a validated configuration.
pub fn load_config() -> Result<ProxyConfig, ConfigError> {
    let cli = Cli::try_parse()?;
    finish(cli)
}

/// Parse an explicit argument list (environment still applies).
pub fn load_config_from<I, T>(args: I) -> Result<ProxyConfig, ConfigError>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::try_parse_from(args)?;
    finish(cli)
}

fn finish(cli: Cli) -> Result<ProxyConfig, ConfigError> {
    let config = cli.into_config();
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = load_config_from([
            "rpc-relay",
            "--target-url",
            "http://127.0.0.1:8899",
            "--port",
            "9000",
            "--max-sessions",
            "32",
            "--prelink-policy",
            "drop",
        ])
        .unwrap();

        assert_eq!(config.upstream.url, "http://127.0.0.1:8899");
        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.listener.max_sessions, Some(32));
        assert_eq!(config.websocket.prelink_policy, PrelinkPolicy::Drop);
    }

    #[test]
    fn invalid_upstream_is_rejected() {
        let err = load_config_from(["rpc-relay", "--target-url", "gopher://node"]).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("gopher"));
    }

    #[test]
    fn unknown_flag_is_a_cli_error() {
        let err = load_config_from(["rpc-relay", "--retries", "3"]).unwrap_err();
        assert!(matches!(err, ConfigError::Cli(_)));
    }
}
