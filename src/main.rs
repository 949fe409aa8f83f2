//! rpc-relay binary.
//!
//! Loads configuration from flags and `TARGET_URL` / `PORT`, binds the
//! listener and relays until SIGINT or SIGTERM.

use std::process::ExitCode;

use rpc_relay::{config, lifecycle, net, observability, HttpServer, Shutdown};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match config::load_config() {
        Ok(config) => config,
        Err(config::ConfigError::Cli(e)) => e.exit(),
        Err(e) => {
            eprintln!("rpc-relay: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = observability::init(&config.observability.log_level) {
        eprintln!("rpc-relay: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rpc-relay starting");
    tracing::info!(
        target_url = %config.upstream.url,
        bind_address = %config.listener.bind_address(),
        max_sessions = ?config.listener.max_sessions,
        prelink_policy = %config.websocket.prelink_policy,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let listener = match net::bind(&config.listener).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let server = match HttpServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        lifecycle::wait_for_signal().await;
        signal.trigger();
    });

    if let Err(e) = server.run(listener, shutdown.subscribe()).await {
        tracing::error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
