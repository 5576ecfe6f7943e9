//! Configuration management for the Aegis bridge

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::Result;

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (database, cache)
    pub data_dir: PathBuf,

    /// WebSocket/HTTP server configuration
    pub server: ServerConfig,

    /// Audio ingestion and segmentation configuration
    pub audio: AudioConfig,

    /// Speech-to-text adapter configuration
    pub stt: SttConfig,

    /// Text-to-speech adapter configuration
    pub tts: TtsConfig,

    /// LLM routing and generation configuration
    pub llm: LlmConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

/// Audio ingestion and utterance segmentation configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate in Hz (16kHz for speech)
    pub sample_rate: u32,

    /// Channel count (mono expected from the client)
    pub channels: u16,

    /// Mean-absolute-amplitude threshold below which a frame counts as silence
    pub silence_threshold: i32,

    /// Consecutive silence that ends an utterance
    pub silence_duration_ms: u64,

    /// Hard cap on utterance length
    pub max_utterance_ms: u64,

    /// Outbound frame size in bytes (200ms at 16kHz 16-bit mono)
    pub outbound_chunk_bytes: usize,

    /// Nominal inbound chunk duration, advertised to the client on connect
    pub chunk_size_ms: u64,
}

/// STT provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    Whisper,
    Deepgram,
}

/// Speech-to-text adapter configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// Provider backend
    pub provider: SttProvider,

    /// Model identifier (e.g. "whisper-1", "nova-2")
    pub model: String,

    /// API key for the provider
    pub api_key: String,

    /// Per-call timeout
    pub timeout: Duration,
}

/// TTS provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    OpenAi,
    ElevenLabs,
}

/// Text-to-speech adapter configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Provider backend
    pub provider: TtsProvider,

    /// Model identifier (e.g. "tts-1", "eleven_monolingual_v1")
    pub model: String,

    /// Voice identifier
    pub voice: String,

    /// Speed multiplier (OpenAI only)
    pub speed: f32,

    /// API key for the provider
    pub api_key: String,

    /// Per-call timeout
    pub timeout: Duration,
}

/// LLM routing and generation configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Anthropic API key
    pub api_key: String,

    /// Fast-tier model (short queries, low latency)
    pub fast_model: String,

    /// Deep-tier model (analysis/planning queries)
    pub deep_model: String,

    /// Max completion tokens on the fast tier
    pub fast_max_tokens: u32,

    /// Max completion tokens on the deep tier
    pub deep_max_tokens: u32,

    /// Extended thinking budget for the deep tier
    pub thinking_budget_tokens: u32,

    /// Max tool rounds per assistant turn
    pub max_tool_rounds: u32,

    /// Retries on a failed model call before giving up on the turn
    pub max_retries: u32,

    /// Requests per minute allowed against the model API
    pub requests_per_minute: u32,

    /// Idle timeout between streamed chunks
    pub stream_idle_timeout: Duration,

    /// Per-call timeout for tool dispatch
    pub tool_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            silence_threshold: 500,
            silence_duration_ms: 600,
            max_utterance_ms: 10_000,
            outbound_chunk_bytes: 6_400,
            chunk_size_ms: 200,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            fast_model: "claude-haiku-4-5-20251001".to_string(),
            deep_model: "claude-opus-4-6".to_string(),
            fast_max_tokens: 300,
            deep_max_tokens: 1024,
            thinking_budget_tokens: 10_000,
            max_tool_rounds: 5,
            max_retries: 2,
            requests_per_minute: 30,
            stream_idle_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration: defaults, overlaid by the optional TOML file,
    /// overlaid by environment variables
    ///
    /// Missing API keys are not an error here; each adapter validates the
    /// key it needs at construction.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration cannot be assembled
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();

        let server = ServerConfig {
            host: std::env::var("AEGIS_HOST")
                .ok()
                .or(fc.server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: std::env::var("AEGIS_PORT")
                .or_else(|_| std::env::var("PORT"))
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(8000),
        };

        let audio_defaults = AudioConfig::default();
        let audio = AudioConfig {
            sample_rate: fc.audio.sample_rate.unwrap_or(audio_defaults.sample_rate),
            channels: fc.audio.channels.unwrap_or(audio_defaults.channels),
            silence_threshold: fc
                .audio
                .silence_threshold
                .unwrap_or(audio_defaults.silence_threshold),
            silence_duration_ms: fc
                .audio
                .silence_duration_ms
                .unwrap_or(audio_defaults.silence_duration_ms),
            max_utterance_ms: fc
                .audio
                .max_utterance_ms
                .unwrap_or(audio_defaults.max_utterance_ms),
            outbound_chunk_bytes: fc
                .audio
                .outbound_chunk_bytes
                .unwrap_or(audio_defaults.outbound_chunk_bytes),
            chunk_size_ms: fc.audio.chunk_size_ms.unwrap_or(audio_defaults.chunk_size_ms),
        };

        let openai_key = std::env::var("OPENAI_API_KEY").ok().or(fc.api_keys.openai);
        let deepgram_key = std::env::var("DEEPGRAM_API_KEY")
            .ok()
            .or(fc.api_keys.deepgram);
        let elevenlabs_key = std::env::var("ELEVENLABS_API_KEY")
            .ok()
            .or(fc.api_keys.elevenlabs);

        let stt_provider = match fc.stt.provider.as_deref() {
            Some("deepgram") => SttProvider::Deepgram,
            _ => SttProvider::Whisper,
        };
        let stt = SttConfig {
            provider: stt_provider,
            model: std::env::var("AEGIS_STT_MODEL")
                .ok()
                .or(fc.stt.model)
                .unwrap_or_else(|| match stt_provider {
                    SttProvider::Whisper => "whisper-1".to_string(),
                    SttProvider::Deepgram => "nova-2".to_string(),
                }),
            api_key: match stt_provider {
                SttProvider::Whisper => openai_key.clone().unwrap_or_default(),
                SttProvider::Deepgram => deepgram_key.unwrap_or_default(),
            },
            timeout: Duration::from_secs(fc.stt.timeout_secs.unwrap_or(15)),
        };

        let tts_provider = match fc.tts.provider.as_deref() {
            Some("elevenlabs") => TtsProvider::ElevenLabs,
            _ => TtsProvider::OpenAi,
        };
        let tts = TtsConfig {
            provider: tts_provider,
            model: std::env::var("AEGIS_TTS_MODEL")
                .ok()
                .or(fc.tts.model)
                .unwrap_or_else(|| match tts_provider {
                    TtsProvider::OpenAi => "tts-1".to_string(),
                    TtsProvider::ElevenLabs => "eleven_monolingual_v1".to_string(),
                }),
            voice: fc.tts.voice.unwrap_or_else(|| "alloy".to_string()),
            speed: fc.tts.speed.unwrap_or(1.0),
            api_key: match tts_provider {
                TtsProvider::OpenAi => openai_key.unwrap_or_default(),
                TtsProvider::ElevenLabs => elevenlabs_key.unwrap_or_default(),
            },
            timeout: Duration::from_secs(fc.tts.timeout_secs.unwrap_or(15)),
        };

        let llm_defaults = LlmConfig::default();
        let llm = LlmConfig {
            api_key: std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .or(fc.api_keys.anthropic)
                .unwrap_or_default(),
            fast_model: fc.llm.fast_model.unwrap_or(llm_defaults.fast_model),
            deep_model: fc.llm.deep_model.unwrap_or(llm_defaults.deep_model),
            fast_max_tokens: fc.llm.fast_max_tokens.unwrap_or(llm_defaults.fast_max_tokens),
            deep_max_tokens: fc.llm.deep_max_tokens.unwrap_or(llm_defaults.deep_max_tokens),
            thinking_budget_tokens: llm_defaults.thinking_budget_tokens,
            max_tool_rounds: fc.llm.max_tool_rounds.unwrap_or(llm_defaults.max_tool_rounds),
            max_retries: fc.llm.max_retries.unwrap_or(llm_defaults.max_retries),
            requests_per_minute: fc
                .llm
                .requests_per_minute
                .unwrap_or(llm_defaults.requests_per_minute),
            stream_idle_timeout: llm_defaults.stream_idle_timeout,
            tool_timeout: llm_defaults.tool_timeout,
        };

        // Data directory (~/.local/share/aegis on Linux)
        let data_dir = std::env::var("AEGIS_DATA_DIR").map_or_else(
            |_| {
                directories::BaseDirs::new()
                    .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("aegis"))
            },
            PathBuf::from,
        );
        std::fs::create_dir_all(&data_dir).ok();

        Ok(Self {
            data_dir,
            server,
            audio,
            stt,
            tts,
            llm,
        })
    }

    /// Path of the domain database inside the data directory
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("aegis.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_defaults_match_transport() {
        let audio = AudioConfig::default();
        // 200ms of 16kHz 16-bit mono
        assert_eq!(audio.outbound_chunk_bytes, 6400);
        assert_eq!(audio.sample_rate, 16_000);
        assert_eq!(audio.channels, 1);
    }

    #[test]
    fn llm_defaults_bound_the_loop() {
        let llm = LlmConfig::default();
        assert_eq!(llm.max_tool_rounds, 5);
        assert!(llm.fast_max_tokens < llm.deep_max_tokens);
    }
}
