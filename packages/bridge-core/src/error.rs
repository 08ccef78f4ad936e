//! Centralized error types for the bridge core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses
//!
//! Most failures inside an active call (AOAI disconnects, grounding
//! timeouts, resampler faults) are swallowed or retried by the session
//! mediator and never surface here - this type covers gateway-level
//! failures: missing configuration, bind failures, and the reverse proxy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the bridge gateway.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum BridgeError {
    /// Required configuration was missing or malformed at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Failed to connect to the AOAI realtime endpoint.
    #[error("AOAI connection failed: {0}")]
    AoaiConnect(String),

    /// Sending a message over an established AOAI connection failed.
    #[error("AOAI send failed: {0}")]
    AoaiSend(String),

    /// The grounding agent call failed or did not complete in time.
    #[error("grounding agent error: {0}")]
    Grounding(String),

    /// The reverse proxy to the control-plane server failed.
    #[error("control-plane proxy error: {0}")]
    Proxy(String),

    /// Client sent an invalid or malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal/unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorCode for BridgeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::AoaiConnect(_) => "aoai_connect_failed",
            Self::AoaiSend(_) => "aoai_send_failed",
            Self::Grounding(_) => "grounding_error",
            Self::Proxy(_) => "proxy_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl BridgeError {
    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Proxy(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_returns_correct_code() {
        let err = BridgeError::Configuration("missing AZURE_OPENAI_ENDPOINT".into());
        assert_eq!(err.code(), "configuration_error");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn proxy_error_returns_bad_gateway() {
        let err = BridgeError::Proxy("control-plane socket unreachable".into());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
