//! Minimal control-plane HTTP server.
//!
//! The telephony call-control webhooks (incoming-call, callbacks, token
//! issuance) are thin adapters over the vendor call-automation SDK and are
//! out of scope here. This module only provides the `/api/health` target
//! the gateway needs to prove out its startup-ordering and reverse-proxy
//! path: the gateway must not bind its public listener until this server
//! is already accepting connections on the control-plane socket.

use std::path::Path;

use axum::routing::get;
use axum::{Json, Router};
use tokio::net::UnixListener;
use tokio::sync::oneshot;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Starts the control-plane server on the configured Unix domain socket
/// and returns once it is actually accepting connections.
pub async fn start(uds_path: &str) -> anyhow::Result<()> {
    let path = Path::new(uds_path);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // A leftover socket file from an unclean shutdown would otherwise make
    // the bind fail with AddrInUse.
    let _ = tokio::fs::remove_file(path).await;

    let listener = UnixListener::bind(path)?;
    let app = Router::new().route("/api/health", get(health));

    let (ready_tx, ready_rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = ready_tx.send(());
        if let Err(e) = axum::serve(listener, app).await {
            log::error!("control-plane server error: {e}");
        }
    });
    ready_rx.await.ok();
    log::info!("control-plane server listening on {uds_path}");
    Ok(())
}
