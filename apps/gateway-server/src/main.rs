//! Unified gateway binary: one public listener multiplexing the ACS media
//! WebSocket and a reverse proxy to the local control-plane server.

mod control_plane;

use anyhow::{Context, Result};
use bridge_core::{bootstrap_gateway, start_server, ServerError};
use clap::Parser;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "bridge-gateway-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "BRIDGE_LOG_LEVEL")]
    log_level: log::LevelFilter,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("bridge gateway v{}", env!("CARGO_PKG_VERSION"));

    let state = bootstrap_gateway().context("invalid configuration")?;

    // Startup ordering matters: the reverse proxy must have somewhere to
    // send requests before the public listener accepts its first one.
    control_plane::start(&state.config.gateway.control_plane_uds)
        .await
        .context("failed to start control-plane server")?;

    let shutdown_state = state.clone();
    let server_handle = tokio::spawn(async move {
        match start_server(state).await {
            Ok(()) => {}
            Err(ServerError::Bind { addr, source })
                if source.kind() == std::io::ErrorKind::AddrInUse =>
            {
                log::error!(
                    "port {} is already in use - stop whatever else is bound to {addr} and retry",
                    addr.port()
                );
                std::process::exit(1);
            }
            Err(e) => {
                log::error!("gateway server error: {e}");
                std::process::exit(1);
            }
        }
    });

    shutdown_signal().await;
    log::info!("shutdown signal received");
    shutdown_state.begin_shutdown();
    log::info!(
        "cancelling {} active call(s)",
        shutdown_state.active_call_count()
    );
    server_handle.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
