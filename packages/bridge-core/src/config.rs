//! Environment-driven configuration for the bridge gateway and mediator.
//!
//! Every setting is read from the process environment with a documented
//! default, mirroring the environment-variable surface of the original
//! media bridge. There is no on-disk config file and nothing is persisted
//! across restarts.

use std::env;
use std::time::Duration;

use crate::error::{BridgeError, BridgeResult};

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_string(key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Quality policy for the PCM16 mono resampler (§ MEDIA_WS_RESAMPLER).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResamplerQuality {
    /// Prefer the high-quality path, falling back to linear interpolation.
    Auto,
    /// Require the high-quality path; produce silence if unavailable.
    Soxr,
    /// Always use plain linear interpolation.
    Linear,
}

impl ResamplerQuality {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "auto" => Self::Auto,
            "audioop" | "linear" => Self::Linear,
            // The original bridge's literal default env value is "soxr",
            // not "auto" - any unrecognized value also falls back here.
            _ => Self::Soxr,
        }
    }
}

/// `MEDIA_WS_SOXR_QUALITY` preset, forwarded to the high-quality resampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoxrQuality {
    Quick,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl SoxrQuality {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "QQ" => Self::Quick,
            "LQ" => Self::Low,
            "MQ" => Self::Medium,
            "VHQ" => Self::VeryHigh,
            _ => Self::High,
        }
    }
}

/// Resampling knobs shared by both mediator directions.
#[derive(Debug, Clone)]
pub struct ResampleConfig {
    pub quality: ResamplerQuality,
    pub soxr_quality: SoxrQuality,
    pub target_rate: u32,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            quality: ResamplerQuality::Soxr,
            soxr_quality: SoxrQuality::High,
            target_rate: 24_000,
        }
    }
}

/// Barge-in detection and cancellation knobs.
#[derive(Debug, Clone)]
pub struct BargeInConfig {
    pub phrases: Vec<String>,
    pub drop_ms: u64,
    pub on_speech_started: bool,
}

impl Default for BargeInConfig {
    fn default() -> Self {
        Self {
            phrases: vec!["ちょっと待って".to_string(), "ちょっとまって".to_string()],
            drop_ms: 1500,
            on_speech_started: true,
        }
    }
}

/// AOAI realtime connection and response-shaping knobs.
#[derive(Debug, Clone)]
pub struct AoaiConfig {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_key: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub voice: String,
    pub instructions: String,
    pub enabled: bool,
    pub auto_create_response: bool,
    pub response_fallback_delay: Duration,
    pub send_audio_to_acs: bool,
    pub acs_send_min_chunk_bytes: usize,
    pub acs_send_flush_on_done: bool,
}

impl AoaiConfig {
    fn from_env() -> Self {
        let endpoint = env_string("AZURE_OPENAI_ENDPOINT");
        let deployment = env_string("AZURE_OPENAI_DEPLOYMENT");
        let default_enabled = endpoint.is_some() && deployment.is_some();
        Self {
            endpoint,
            deployment,
            api_key: env_string("AZURE_OPENAI_API_KEY"),
            tenant_id: env_string("AZURE_TENANT_ID"),
            client_id: env_string("AZURE_CLIENT_ID"),
            client_secret: env_string("AZURE_CLIENT_SECRET"),
            voice: env_string("AOAI_VOICE").unwrap_or_else(|| "sage".to_string()),
            instructions: load_instructions(),
            enabled: env_bool("MEDIA_WS_ENABLE_AOAI", default_enabled),
            auto_create_response: env_bool("MEDIA_WS_AOAI_AUTO_CREATE_RESPONSE", true),
            response_fallback_delay: Duration::from_millis(env_u64(
                "MEDIA_WS_AOAI_RESPONSE_FALLBACK_DELAY_MS",
                600,
            )),
            send_audio_to_acs: env_bool("MEDIA_WS_SEND_AUDIO_TO_ACS", true),
            acs_send_min_chunk_bytes: env_usize("MEDIA_WS_ACS_SEND_MIN_CHUNK_BYTES", 3200),
            acs_send_flush_on_done: env_bool("MEDIA_WS_ACS_SEND_FLUSH_ON_DONE", true),
        }
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.enabled && (self.endpoint.is_none() || self.deployment.is_none()) {
            return Err(BridgeError::Configuration(
                "AOAI is enabled but AZURE_OPENAI_ENDPOINT/AZURE_OPENAI_DEPLOYMENT are not both set"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn load_instructions() -> String {
    if let Some(path) = env_string("AOAI_INSTRUCTIONS_FILE") {
        if let Ok(contents) = std::fs::read_to_string(&path) {
            return contents;
        }
        log::warn!("AOAI_INSTRUCTIONS_FILE={path} could not be read, falling back");
    }
    if let Some(inline) = env_string("AOAI_INSTRUCTIONS") {
        return inline;
    }
    DEFAULT_INSTRUCTIONS.to_string()
}

const DEFAULT_INSTRUCTIONS: &str = "あなたは株式会社西友のカスタマーサポート音声アシスタントです。\
常に丁寧で自然な日本語で簡潔に応答してください。";

/// Web-grounding agent knobs.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub enabled: bool,
    pub project_endpoint: Option<String>,
    pub agent_id: Option<String>,
    pub timeout: Duration,
    pub max_output_chars: usize,
    pub fallback_prefix: String,
}

impl AgentConfig {
    fn from_env() -> Self {
        Self {
            enabled: env_bool("MEDIA_WS_AGENT_ENABLE", false),
            project_endpoint: env_string("AZURE_AI_PROJECT_ENDPOINT"),
            agent_id: env_string("AZURE_AI_AGENT_ID"),
            timeout: Duration::from_millis(env_u64("MEDIA_WS_AGENT_TIMEOUT_MS", 2000)),
            max_output_chars: env_usize("MEDIA_WS_AGENT_MAX_OUTPUT_CHARS", 1200),
            fallback_prefix: env_string("MEDIA_WS_AGENT_FALLBACK_PREFIX")
                .unwrap_or_else(|| "今は検索できないので一般知識で答えます。".to_string()),
        }
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.enabled && (self.project_endpoint.is_none() || self.agent_id.is_none()) {
            return Err(BridgeError::Configuration(
                "the grounding agent is enabled but AZURE_AI_PROJECT_ENDPOINT/AZURE_AI_AGENT_ID are not both set"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Gateway networking and control-plane proxy knobs.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub control_plane_uds: String,
    pub media_ws_path: String,
}

impl GatewayConfig {
    fn from_env() -> Self {
        Self {
            host: env_string("GATEWAY_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_string("GATEWAY_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            control_plane_uds: env_string("FASTAPI_UDS").unwrap_or_else(|| {
                let cwd = env::current_dir().unwrap_or_default();
                cwd.join(".run/fastapi.sock").to_string_lossy().to_string()
            }),
            media_ws_path: env_string("GATEWAY_MEDIA_WS_PATH")
                .unwrap_or_else(|| "/ws/media".to_string()),
        }
    }
}

/// Top-level configuration for the bridge gateway process.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub aoai: AoaiConfig,
    pub agent: AgentConfig,
    pub gateway: GatewayConfig,
    pub resample: ResampleConfig,
    pub barge_in: BargeInConfig,
}

impl Default for AoaiConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Config {
    /// Builds configuration entirely from the process environment.
    pub fn from_env() -> BridgeResult<Self> {
        let resample = ResampleConfig {
            quality: env_string("MEDIA_WS_RESAMPLER")
                .map(|v| ResamplerQuality::parse(&v))
                .unwrap_or(ResamplerQuality::Soxr),
            soxr_quality: env_string("MEDIA_WS_SOXR_QUALITY")
                .map(|v| SoxrQuality::parse(&v))
                .unwrap_or(SoxrQuality::High),
            target_rate: env_u64("MEDIA_WS_AOAI_TARGET_RATE", 24_000) as u32,
        };
        let barge_in = BargeInConfig {
            phrases: env_string("MEDIA_WS_BARGE_IN_PHRASES")
                .map(|v| v.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
                .unwrap_or_else(|| BargeInConfig::default().phrases),
            drop_ms: env_u64("MEDIA_WS_BARGE_IN_DROP_MS", 1500),
            on_speech_started: env_bool("MEDIA_WS_BARGE_IN_ON_SPEECH_STARTED", true),
        };
        let config = Self {
            aoai: AoaiConfig::from_env(),
            agent: AgentConfig::from_env(),
            gateway: GatewayConfig::from_env(),
            resample,
            barge_in,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> BridgeResult<()> {
        self.aoai.validate()?;
        self.agent.validate()?;
        if self.resample.target_rate == 0 {
            return Err(BridgeError::Configuration(
                "MEDIA_WS_AOAI_TARGET_RATE must be nonzero".to_string(),
            ));
        }
        Ok(())
    }

    /// Exponential backoff base used by the AOAI connection supervisor.
    pub fn supervisor_backoff_base(&self) -> Duration {
        Duration::from_millis(500)
    }

    /// Exponential backoff multiplier used by the AOAI connection supervisor.
    pub fn supervisor_backoff_multiplier(&self) -> f64 {
        env_f64("MEDIA_WS_AOAI_BACKOFF_MULTIPLIER", 1.8)
    }

    /// Exponential backoff cap used by the AOAI connection supervisor.
    pub fn supervisor_backoff_cap(&self) -> Duration {
        Duration::from_millis(8000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resampler_quality_defaults_to_soxr_not_auto() {
        // The original bridge's literal env default for MEDIA_WS_RESAMPLER
        // is "soxr"; an unset or unrecognized value must resolve the same way.
        assert_eq!(ResamplerQuality::parse("nonsense"), ResamplerQuality::Soxr);
    }

    #[test]
    fn barge_in_default_phrases_are_not_empty() {
        let cfg = BargeInConfig::default();
        assert!(cfg.phrases.contains(&"ちょっと待って".to_string()));
    }

    #[test]
    fn aoai_config_requires_endpoint_and_deployment_when_enabled() {
        let cfg = AoaiConfig {
            endpoint: None,
            deployment: None,
            api_key: None,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            voice: "sage".into(),
            instructions: String::new(),
            enabled: true,
            auto_create_response: true,
            response_fallback_delay: Duration::from_millis(600),
            send_audio_to_acs: true,
            acs_send_min_chunk_bytes: 3200,
            acs_send_flush_on_done: true,
        };
        assert!(cfg.validate().is_err());
    }
}
