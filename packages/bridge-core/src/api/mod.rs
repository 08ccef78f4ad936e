//! The unified gateway: one public listener that upgrades ACS media
//! WebSocket connections and reverse-proxies everything else to the
//! local control-plane server.

pub mod proxy;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;
use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::grounding::{FoundryGroundingAgent, GroundingAgent};
use crate::session::Session;

/// Errors that can occur while starting the gateway's public listener.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Shared state reachable from every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub grounding: Option<Arc<dyn GroundingAgent>>,
    pub proxy_client: proxy::ProxyClient,
    /// Active calls keyed by `callConnectionId`, for observability only -
    /// no ingress/egress path reads another session's entry here.
    pub calls: Arc<DashMap<String, Arc<Session>>>,
    /// Parent token for every session's own `closed` token. Cancelling this
    /// signals all in-flight calls to wind down without waiting for their
    /// individual ACS sockets to error out.
    pub shutdown: Arc<RwLock<CancellationToken>>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        let grounding: Option<Arc<dyn GroundingAgent>> = if config.agent.enabled {
            FoundryGroundingAgent::from_config(&config.agent)
                .map(|a| Arc::new(a) as Arc<dyn GroundingAgent>)
        } else {
            None
        };
        let proxy_client = proxy::ProxyClient::new(config.gateway.control_plane_uds.clone());
        Self {
            config,
            grounding,
            proxy_client,
            calls: Arc::new(DashMap::new()),
            shutdown: Arc::new(RwLock::new(CancellationToken::new())),
        }
    }

    /// Cancels every session's `closed` token without waiting for their ACS
    /// sockets to close on their own.
    pub fn begin_shutdown(&self) {
        self.shutdown.read().cancel();
    }

    pub fn active_call_count(&self) -> usize {
        self.calls.len()
    }
}

fn router(state: AppState) -> Router {
    let media_path = state.config.gateway.media_ws_path.clone();
    Router::new()
        .route(&media_path, get(ws::ws_media_handler))
        .fallback(any(proxy::proxy_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds and serves the gateway's public listener. Addr-in-use is
/// reported as an actionable error rather than silently scanning for
/// another port - callers (and operators) need to know the configured
/// port is unavailable, not be handed a different one.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let addr: SocketAddr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port)
        .parse()
        .expect("GATEWAY_HOST/GATEWAY_PORT must form a valid socket address");

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    log::info!("gateway listening on {addr}");
    let app = router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|e| ServerError::Bind {
            addr,
            source: std::io::Error::other(e),
        })?;
    Ok(())
}
