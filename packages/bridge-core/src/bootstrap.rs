//! Application bootstrap and dependency wiring.
//!
//! This module is the composition root - the single place that loads
//! configuration and wires the gateway's shared state together.

use std::sync::Arc;

use crate::api::AppState;
use crate::config::Config;
use crate::error::BridgeResult;

/// Loads configuration from the environment and builds the gateway's
/// shared application state. Fails fast if required configuration is
/// missing or inconsistent - the equivalent adapters this function stops
/// short of wiring (telephony call-control, AOAI) only construct lazily,
/// per call, once a media session actually starts.
pub fn bootstrap_gateway() -> BridgeResult<AppState> {
    let config = Arc::new(Config::from_env()?);
    Ok(AppState::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_succeeds_with_aoai_disabled() {
        // SAFETY: no other test in this process touches these vars.
        std::env::remove_var("AZURE_OPENAI_ENDPOINT");
        std::env::remove_var("AZURE_OPENAI_DEPLOYMENT");
        std::env::remove_var("MEDIA_WS_ENABLE_AOAI");
        std::env::remove_var("MEDIA_WS_AGENT_ENABLE");
        assert!(bootstrap_gateway().is_ok());
    }
}
