//! TOML configuration file loading
//!
//! Supports `~/.config/aegis/bridge.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct BridgeConfigFile {
    /// Server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Audio ingestion configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// STT adapter configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// TTS adapter configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// LLM configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Bind host
    pub host: Option<String>,

    /// Listen port
    pub port: Option<u16>,
}

/// Audio ingestion configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Channel count
    pub channels: Option<u16>,

    /// Silence amplitude threshold
    pub silence_threshold: Option<i32>,

    /// Silence duration that ends an utterance (ms)
    pub silence_duration_ms: Option<u64>,

    /// Max utterance duration (ms)
    pub max_utterance_ms: Option<u64>,

    /// Outbound frame size in bytes
    pub outbound_chunk_bytes: Option<usize>,

    /// Nominal inbound chunk duration (ms)
    pub chunk_size_ms: Option<u64>,
}

/// STT adapter configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// Provider ("whisper" or "deepgram")
    pub provider: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// Per-call timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// TTS adapter configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Provider ("openai" or "elevenlabs")
    pub provider: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// Voice identifier
    pub voice: Option<String>,

    /// Speed multiplier
    pub speed: Option<f32>,

    /// Per-call timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// LLM configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Fast-tier model identifier
    pub fast_model: Option<String>,

    /// Deep-tier model identifier
    pub deep_model: Option<String>,

    /// Max completion tokens on the fast tier
    pub fast_max_tokens: Option<u32>,

    /// Max completion tokens on the deep tier
    pub deep_max_tokens: Option<u32>,

    /// Max tool rounds per assistant turn
    pub max_tool_rounds: Option<u32>,

    /// Retries on a failed model call
    pub max_retries: Option<u32>,

    /// Requests per minute against the model API
    pub requests_per_minute: Option<u32>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `BridgeConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> BridgeConfigFile {
    let Some(path) = config_file_path() else {
        return BridgeConfigFile::default();
    };

    if !path.exists() {
        return BridgeConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                BridgeConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            BridgeConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/aegis/bridge.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("aegis").join("bridge.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let parsed: BridgeConfigFile = toml::from_str(
            r#"
            [audio]
            silence_duration_ms = 800

            [llm]
            max_tool_rounds = 3
            "#,
        )
        .unwrap();
        assert_eq!(parsed.audio.silence_duration_ms, Some(800));
        assert_eq!(parsed.llm.max_tool_rounds, Some(3));
        assert!(parsed.server.port.is_none());
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let parsed: BridgeConfigFile = toml::from_str("").unwrap();
        assert!(parsed.api_keys.anthropic.is_none());
        assert!(parsed.stt.provider.is_none());
    }
}
