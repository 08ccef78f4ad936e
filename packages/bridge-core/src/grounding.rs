//! Web-grounding agent lookup, used to answer queries the realtime model
//! can't answer from its own knowledge (store hours, current promotions).
//!
//! The call is reduced to one bounded async operation: `run()` returns
//! `Some(answer)` on success, or `None` on timeout, empty result, or any
//! failure. A grounding failure is never allowed to end the call - the
//! mediator always has a disclaimer-prefixed fallback to fall back on.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::AgentConfig;

/// Abstraction over the grounding backend so the mediator never depends on
/// a concrete HTTP client or SDK.
#[async_trait]
pub trait GroundingAgent: Send + Sync {
    async fn run(&self, query: &str, correlation_id: &str) -> Option<String>;
}

/// Azure AI Foundry-backed grounding agent.
pub struct FoundryGroundingAgent {
    http: reqwest::Client,
    project_endpoint: String,
    agent_id: String,
    timeout: Duration,
    max_output_chars: usize,
}

impl FoundryGroundingAgent {
    pub fn from_config(config: &AgentConfig) -> Option<Self> {
        let project_endpoint = config.project_endpoint.clone()?;
        let agent_id = config.agent_id.clone()?;
        Some(Self {
            http: reqwest::Client::new(),
            project_endpoint,
            agent_id,
            timeout: config.timeout,
            max_output_chars: config.max_output_chars,
        })
    }

    async fn do_run(&self, query: &str, correlation_id: &str) -> anyhow::Result<Option<String>> {
        #[derive(Deserialize)]
        struct AgentRunResponse {
            #[serde(default)]
            output_text: Option<String>,
        }

        let url = format!(
            "{}/agents/{}/runs",
            self.project_endpoint.trim_end_matches('/'),
            self.agent_id
        );
        let response = self
            .http
            .post(&url)
            .header("x-correlation-id", correlation_id)
            .json(&serde_json::json!({ "input": query }))
            .send()
            .await?
            .error_for_status()?
            .json::<AgentRunResponse>()
            .await?;

        Ok(response.output_text.filter(|s| !s.trim().is_empty()))
    }
}

#[async_trait]
impl GroundingAgent for FoundryGroundingAgent {
    async fn run(&self, query: &str, correlation_id: &str) -> Option<String> {
        let result = tokio::time::timeout(self.timeout, self.do_run(query, correlation_id)).await;
        match result {
            Ok(Ok(Some(mut text))) => {
                if text.chars().count() > self.max_output_chars {
                    text = text.chars().take(self.max_output_chars).collect::<String>() + "...";
                }
                Some(text)
            }
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                log::warn!("grounding agent call failed: {e}");
                None
            }
            Err(_) => {
                log::warn!("grounding agent call timed out after {:?}", self.timeout);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubAgent(Option<String>);

    #[async_trait]
    impl GroundingAgent for StubAgent {
        async fn run(&self, _query: &str, _correlation_id: &str) -> Option<String> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn stub_agent_returns_configured_answer() {
        let agent = StubAgent(Some("today's hours are 9 to 21".to_string()));
        let out = agent.run("what are your hours", "corr-1").await;
        assert_eq!(out.as_deref(), Some("today's hours are 9 to 21"));
    }

    #[test]
    fn from_config_requires_both_endpoint_and_agent_id() {
        let config = AgentConfig {
            enabled: true,
            project_endpoint: None,
            agent_id: Some("agent-1".to_string()),
            timeout: Duration::from_millis(2000),
            max_output_chars: 1200,
            fallback_prefix: String::new(),
        };
        assert!(FoundryGroundingAgent::from_config(&config).is_none());
    }
}
