//! Reverse proxy from the public gateway to the local control-plane
//! server, which listens on a Unix domain socket. Everything that isn't
//! the media WebSocket path lands here.

use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, Request, Response, StatusCode};
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;

use super::AppState;

const PROXY_TIMEOUT: Duration = Duration::from_secs(60);

/// Headers that must not be forwarded across a proxy hop (RFC 7230 §6.1),
/// in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

#[derive(Clone)]
pub struct ProxyClient {
    uds_path: String,
}

impl ProxyClient {
    pub fn new(uds_path: String) -> Self {
        Self { uds_path }
    }

    async fn send(
        &self,
        req: Request<Body>,
    ) -> Result<Response<Incoming>, crate::error::BridgeError> {
        use crate::error::BridgeError;

        let stream = UnixStream::connect(&self.uds_path)
            .await
            .map_err(|e| BridgeError::Proxy(format!("connecting to {}: {e}", self.uds_path)))?;
        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| BridgeError::Proxy(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                log::debug!("control-plane proxy connection closed: {e}");
            }
        });

        let (parts, body) = req.into_parts();
        let body_bytes = body
            .collect()
            .await
            .map_err(|e| BridgeError::Proxy(e.to_string()))?
            .to_bytes();
        let outbound = Request::from_parts(parts, http_body_util::Full::new(body_bytes));

        tokio::time::timeout(PROXY_TIMEOUT, sender.send_request(outbound))
            .await
            .map_err(|_| BridgeError::Proxy("control-plane request timed out".to_string()))?
            .map_err(|e| BridgeError::Proxy(e.to_string()))
    }
}

pub async fn proxy_handler(State(state): State<AppState>, req: Request<Body>) -> impl IntoResponse {
    let mut req = req;
    strip_hop_by_hop(req.headers_mut());

    match state.proxy_client.send(req).await {
        Ok(upstream) => {
            let status = upstream.status();
            let mut headers = upstream.headers().clone();
            strip_hop_by_hop(&mut headers);
            let body_bytes = match upstream.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(_) => bytes::Bytes::new(),
            };
            let mut response = Response::new(Body::from(body_bytes));
            *response.status_mut() = status;
            for (name, value) in headers.iter() {
                response.headers_mut().insert(name.clone(), value.clone());
            }
            response
        }
        Err(e) => {
            log::warn!("control-plane proxy failed: {e}");
            let mut response = Response::new(Body::from(format!("control-plane unavailable: {e}")));
            *response.status_mut() = StatusCode::BAD_GATEWAY;
            response
        }
    }
}

#[allow(dead_code)]
fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.iter().any(|h| name.as_str().eq_ignore_ascii_case(h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_by_hop_header_set_matches_rfc7230() {
        assert!(is_hop_by_hop(&HeaderName::from_static("connection")));
        assert!(is_hop_by_hop(&HeaderName::from_static("transfer-encoding")));
        assert!(!is_hop_by_hop(&HeaderName::from_static("content-type")));
    }
}
