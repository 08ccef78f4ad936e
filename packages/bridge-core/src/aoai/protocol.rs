//! Wire types for the Azure OpenAI realtime API.
//!
//! The event set is wide and growing; client messages we send are modeled
//! exactly, but inbound server messages are represented as a tagged enum
//! with a catch-all `Other` variant carrying the raw payload so unknown or
//! future event types never fail to parse.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// PCM16 input/output format descriptor used throughout the session config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    pub rate: u32,
}

impl AudioFormat {
    pub fn pcm(rate: u32) -> Self {
        Self {
            format_type: "audio/pcm".to_string(),
            rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub model: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub detection_type: String,
    pub threshold: f64,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
    pub create_response: bool,
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self {
            detection_type: "server_vad".to_string(),
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 1000,
            create_response: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioInputConfig {
    pub format: AudioFormat,
    pub transcription: TranscriptionConfig,
    pub turn_detection: TurnDetection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioOutputConfig {
    pub voice: String,
    pub format: AudioFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAudioConfig {
    pub input: AudioInputConfig,
    pub output: AudioOutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUpdatePayload {
    #[serde(rename = "type")]
    pub session_type: String,
    pub instructions: String,
    pub output_modalities: Vec<String>,
    pub audio: SessionAudioConfig,
}

impl SessionUpdatePayload {
    pub fn new(instructions: String, voice: String, target_rate: u32) -> Self {
        Self {
            session_type: "realtime".to_string(),
            instructions,
            output_modalities: vec!["audio".to_string()],
            audio: SessionAudioConfig {
                input: AudioInputConfig {
                    format: AudioFormat::pcm(target_rate),
                    transcription: TranscriptionConfig {
                        model: "whisper-1".to_string(),
                        language: "ja".to_string(),
                    },
                    turn_detection: TurnDetection::default(),
                },
                output: AudioOutputConfig {
                    voice,
                    format: AudioFormat::pcm(target_rate),
                },
            },
        }
    }
}

/// Messages the bridge sends to AOAI.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "session.update")]
    SessionUpdate {
        event_id: String,
        session: SessionUpdatePayload,
    },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    #[serde(rename = "response.create")]
    ResponseCreate {
        event_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseCreateParams>,
    },
    #[serde(rename = "response.cancel")]
    ResponseCancel { event_id: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseCreateParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Messages AOAI sends to the bridge. Unrecognized `type` values decode
/// into [`ServerMessage::Other`] rather than failing to parse.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "session.created")]
    SessionCreated { #[serde(flatten)] raw: Value },
    #[serde(rename = "session.updated")]
    SessionUpdated { #[serde(flatten)] raw: Value },
    #[serde(rename = "conversation.created")]
    ConversationCreated { #[serde(flatten)] raw: Value },
    #[serde(rename = "response.created")]
    ResponseCreated { #[serde(flatten)] raw: Value },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted { #[serde(flatten)] raw: Value },
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped { #[serde(flatten)] raw: Value },
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted { #[serde(flatten)] raw: Value },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted { transcript: String },
    #[serde(rename = "conversation.item.input_audio_transcription.failed")]
    TranscriptionFailed { #[serde(flatten)] raw: Value },
    #[serde(rename = "response.output_audio.delta")]
    AudioDelta { delta: String },
    #[serde(rename = "response.output_audio.done")]
    AudioDone { #[serde(flatten)] raw: Value },
    // Older event names for the same two events; some API versions use
    // these instead of the "output_audio" spelling.
    #[serde(rename = "response.audio.delta")]
    AudioDeltaLegacy { delta: String },
    #[serde(rename = "response.audio.done")]
    AudioDoneLegacy { #[serde(flatten)] raw: Value },
    #[serde(rename = "response.output_audio_transcript.delta")]
    TranscriptDelta { delta: String },
    #[serde(rename = "response.output_audio_transcript.done")]
    TranscriptDone { transcript: String },
    #[serde(rename = "response.done")]
    ResponseDone { #[serde(flatten)] raw: Value },
    #[serde(rename = "error")]
    Error { error: ErrorInfo },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorInfo {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_update_serializes_expected_shape() {
        let payload = SessionUpdatePayload::new("hello".to_string(), "sage".to_string(), 24000);
        let msg = ClientMessage::SessionUpdate {
            event_id: "session_update_1".to_string(),
            session: payload,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "session.update");
        assert_eq!(json["session"]["audio"]["output"]["voice"], "sage");
        assert_eq!(
            json["session"]["audio"]["input"]["turn_detection"]["create_response"],
            false
        );
    }

    #[test]
    fn unknown_server_event_falls_back_to_other() {
        let raw = r#"{"type":"some.future.event","foo":"bar"}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, ServerMessage::Other));
    }

    #[test]
    fn transcription_completed_parses_transcript_text() {
        let raw = r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"こんにちは"}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ServerMessage::TranscriptionCompleted { transcript } => {
                assert_eq!(transcript, "こんにちは");
            }
            _ => panic!("expected TranscriptionCompleted"),
        }
    }
}
