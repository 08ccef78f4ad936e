//! Wire contract for the ACS media WebSocket (both directions).

use serde::{Deserialize, Serialize};

/// Inbound frame from the telephony platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum AcsIncoming {
    AudioMetadata { audioMetadata: AudioMetadata },
    AudioData { audioData: AudioData },
    DtmfData { dtmfData: DtmfData },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(non_snake_case)]
pub struct AudioMetadata {
    #[serde(default)]
    pub subscriptionId: Option<String>,
    pub encoding: String,
    pub sampleRate: u32,
    pub channels: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(non_snake_case)]
pub struct AudioData {
    pub data: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub silent: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(non_snake_case)]
pub struct DtmfData {
    #[serde(default)]
    pub data: Option<String>,
}

/// Outbound frame sent back to the telephony platform.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum AcsOutgoing {
    AudioData { audioData: AcsOutgoingAudioData },
    StopAudio {},
}

#[derive(Debug, Clone, Serialize)]
pub struct AcsOutgoingAudioData {
    pub data: String,
}

impl AcsOutgoing {
    pub fn audio(pcm: &[u8]) -> Self {
        use base64::Engine;
        Self::AudioData {
            audioData: AcsOutgoingAudioData {
                data: base64::engine::general_purpose::STANDARD.encode(pcm),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioContract {
    pub sample_rate: u32,
    pub channels: u8,
    pub encoding: String,
}

impl AudioContract {
    pub fn is_supported_for_egress(&self) -> bool {
        self.channels != 2 && self.encoding.eq_ignore_ascii_case("PCM")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_metadata_parses() {
        let raw = r#"{"kind":"AudioMetadata","audioMetadata":{"encoding":"PCM","sampleRate":16000,"channels":1}}"#;
        let parsed: AcsIncoming = serde_json::from_str(raw).unwrap();
        match parsed {
            AcsIncoming::AudioMetadata { audioMetadata } => {
                assert_eq!(audioMetadata.sampleRate, 16000);
            }
            _ => panic!("expected AudioMetadata"),
        }
    }

    #[test]
    fn unknown_kind_does_not_fail_to_parse() {
        let raw = r#"{"kind":"SomethingNew"}"#;
        let parsed: AcsIncoming = serde_json::from_str(raw).unwrap();
        assert!(matches!(parsed, AcsIncoming::Unknown));
    }
}
