//! Client for one AOAI realtime WebSocket connection.
//!
//! `connect()` makes a single attempt and fails fast on any error; retry
//! and backoff are owned entirely by the session's AOAI supervisor, not by
//! this client.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::AoaiConfig;
use crate::error::{BridgeError, BridgeResult};

use super::protocol::{ClientMessage, ResponseCreateParams, ServerMessage, SessionUpdatePayload};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// A connected AOAI realtime session.
pub struct AoaiClient {
    sink: WsSink,
    events_rx: mpsc::Receiver<ServerMessage>,
    reader_task: tokio::task::JoinHandle<()>,
}

fn ws_url(endpoint: &str, deployment: &str) -> String {
    let base = endpoint
        .trim_end_matches('/')
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    format!("{base}/openai/v1/realtime?model={deployment}")
}

const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

#[derive(serde::Deserialize)]
struct EntraTokenResponse {
    access_token: String,
}

/// Fetches a bearer token via the Entra ID client-credentials grant, for
/// deployments that authenticate with a service principal instead of a
/// static API key (`AZURE_TENANT_ID` / `AZURE_CLIENT_ID` / `AZURE_CLIENT_SECRET`).
async fn bearer_token(config: &AoaiConfig) -> BridgeResult<String> {
    let (tenant_id, client_id, client_secret) = match (
        &config.tenant_id,
        &config.client_id,
        &config.client_secret,
    ) {
        (Some(t), Some(c), Some(s)) => (t, c, s),
        _ => {
            return Err(BridgeError::AoaiConnect(
                "no AZURE_OPENAI_API_KEY set and AZURE_TENANT_ID/AZURE_CLIENT_ID/AZURE_CLIENT_SECRET are not all set"
                    .to_string(),
            ))
        }
    };

    let url = format!("https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token");
    let response = reqwest::Client::new()
        .post(&url)
        .form(&[
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", COGNITIVE_SERVICES_SCOPE),
        ])
        .send()
        .await
        .map_err(|e| BridgeError::AoaiConnect(format!("entra token request failed: {e}")))?
        .error_for_status()
        .map_err(|e| BridgeError::AoaiConnect(format!("entra token request rejected: {e}")))?;

    let parsed: EntraTokenResponse = response
        .json()
        .await
        .map_err(|e| BridgeError::AoaiConnect(format!("entra token response malformed: {e}")))?;
    Ok(parsed.access_token)
}

impl AoaiClient {
    /// Connects, sends `session.update`, and returns the ready client.
    /// A single attempt only - callers that need retries own their own loop.
    pub async fn connect(config: &AoaiConfig, target_rate: u32) -> BridgeResult<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| BridgeError::Configuration("AZURE_OPENAI_ENDPOINT not set".to_string()))?;
        let deployment = config.deployment.as_deref().ok_or_else(|| {
            BridgeError::Configuration("AZURE_OPENAI_DEPLOYMENT not set".to_string())
        })?;

        let url = ws_url(endpoint, deployment);
        let mut request = url
            .into_client_request()
            .map_err(|e| BridgeError::AoaiConnect(e.to_string()))?;

        if let Some(key) = &config.api_key {
            request.headers_mut().insert(
                "api-key",
                HeaderValue::from_str(key).map_err(|e| BridgeError::AoaiConnect(e.to_string()))?,
            );
        } else {
            let token = bearer_token(config).await?;
            request.headers_mut().insert(
                "Authorization",
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| BridgeError::AoaiConnect(e.to_string()))?,
            );
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| BridgeError::AoaiConnect(e.to_string()))?;

        let (mut sink, mut stream) = ws_stream.split();

        let session = SessionUpdatePayload::new(
            config.instructions.clone(),
            config.voice.clone(),
            target_rate,
        );
        let update = ClientMessage::SessionUpdate {
            event_id: "session_update_1".to_string(),
            session,
        };
        send_message(&mut sink, &update).await?;

        let (events_tx, events_rx) = mpsc::channel(256);
        let reader_task = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(parsed) => {
                            if events_tx.send(parsed).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => log::warn!("failed to parse AOAI server message: {e}"),
                    },
                    Ok(Message::Close(_)) => {
                        log::info!("AOAI realtime socket closed by server");
                        break;
                    }
                    Err(e) => {
                        log::warn!("AOAI realtime socket error: {e}");
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok(Self {
            sink,
            events_rx,
            reader_task,
        })
    }

    /// Appends a chunk of 24kHz mono PCM16 audio to the input buffer.
    pub async fn append_audio(&mut self, pcm: &[u8]) -> BridgeResult<()> {
        use base64::Engine;
        let audio = base64::engine::general_purpose::STANDARD.encode(pcm);
        send_message(&mut self.sink, &ClientMessage::InputAudioBufferAppend { audio }).await
    }

    /// Requests a response be generated, optionally overriding instructions
    /// or temperature for this one response.
    pub async fn create_response(
        &mut self,
        event_id: &str,
        instructions: Option<String>,
        temperature: Option<f64>,
    ) -> BridgeResult<()> {
        let response = if instructions.is_some() || temperature.is_some() {
            Some(ResponseCreateParams {
                instructions,
                temperature,
            })
        } else {
            None
        };
        send_message(
            &mut self.sink,
            &ClientMessage::ResponseCreate {
                event_id: event_id.to_string(),
                response,
            },
        )
        .await
    }

    /// Requests cancellation of the in-flight response. Best-effort: AOAI
    /// may have already finished or may reject a cancel with no active
    /// response, neither of which is treated as a failure here.
    pub async fn cancel_response(&mut self, event_id: &str) {
        let msg = ClientMessage::ResponseCancel {
            event_id: event_id.to_string(),
        };
        if let Err(e) = send_message(&mut self.sink, &msg).await {
            log::debug!("response.cancel best-effort send failed: {e}");
        }
    }

    /// Returns the next decoded server event, or `None` once the
    /// connection has closed and all buffered events are drained.
    pub async fn next_event(&mut self) -> Option<ServerMessage> {
        self.events_rx.recv().await
    }

    /// Closes the connection. Idempotent.
    pub async fn close(&mut self) {
        let _ = self.sink.close().await;
        self.reader_task.abort();
    }
}

impl Drop for AoaiClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn send_message(sink: &mut WsSink, msg: &ClientMessage) -> BridgeResult<()> {
    let text = serde_json::to_string(msg).map_err(|e| BridgeError::AoaiSend(e.to_string()))?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| BridgeError::AoaiSend(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_converts_https_to_wss_and_appends_path() {
        let url = ws_url("https://my-resource.openai.azure.com", "gpt-realtime");
        assert_eq!(
            url,
            "wss://my-resource.openai.azure.com/openai/v1/realtime?model=gpt-realtime"
        );
    }

    #[test]
    fn ws_url_strips_trailing_slash() {
        let url = ws_url("https://my-resource.openai.azure.com/", "gpt-realtime");
        assert!(!url.contains("//openai"));
    }

    #[tokio::test]
    async fn bearer_token_fails_without_service_principal_config() {
        let config = AoaiConfig {
            endpoint: None,
            deployment: None,
            api_key: None,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            voice: "sage".to_string(),
            instructions: String::new(),
            enabled: true,
            auto_create_response: true,
            response_fallback_delay: std::time::Duration::from_millis(600),
            send_audio_to_acs: true,
            acs_send_min_chunk_bytes: 3200,
            acs_send_flush_on_done: true,
        };
        assert!(bearer_token(&config).await.is_err());
    }
}
