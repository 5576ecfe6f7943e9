//! Text-to-speech adapter boundary
//!
//! The [`Synthesize`] trait is the boundary the pipeline sees: synthesis
//! either yields PCM bytes or `None`. Failures never cross it.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{TtsConfig, TtsProvider};
use crate::{Error, Result};

/// Speech synthesis boundary
///
/// `None` means the unit is skipped; the caller logs and moves on.
#[async_trait]
pub trait Synthesize: Send + Sync {
    /// Synthesize one text fragment to raw PCM
    async fn synthesize(&self, text: &str) -> Option<Vec<u8>>;
}

/// Synthesizes speech from text via a provider HTTP API
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
    timeout: Duration,
}

impl TextToSpeech {
    /// Create a TTS instance from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the provider API key is missing
    pub fn new(config: &TtsConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config(match config.provider {
                TtsProvider::OpenAi => "OpenAI API key required for TTS".to_string(),
                TtsProvider::ElevenLabs => "ElevenLabs API key required for TTS".to_string(),
            }));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            voice: config.voice.clone(),
            speed: config.speed,
            model: config.model.clone(),
            provider: config.provider,
            timeout: config.timeout,
        })
    }

    /// Synthesize text to raw PCM, surfacing provider errors
    ///
    /// # Errors
    ///
    /// Returns error if the provider call fails or times out
    async fn synthesize_inner(&self, text: &str) -> Result<Vec<u8>> {
        match self.provider {
            TtsProvider::OpenAi => self.synthesize_openai(text).await,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text).await,
        }
    }

    /// Synthesize using OpenAI TTS
    ///
    /// Requests raw PCM output (24kHz 16-bit mono); the client config must
    /// match the provider's PCM rate.
    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "pcm",
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    /// Synthesize using ElevenLabs TTS (16kHz PCM output)
    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}?output_format=pcm_16000",
            self.voice
        );

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl Synthesize for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Option<Vec<u8>> {
        if text.trim().is_empty() {
            return None;
        }

        let start = std::time::Instant::now();
        match self.synthesize_inner(text).await {
            Ok(audio) if audio.is_empty() => {
                tracing::warn!(text = %truncate(text), "TTS returned no audio");
                None
            }
            Ok(audio) => {
                tracing::debug!(
                    bytes = audio.len(),
                    ms = %start.elapsed().as_millis(),
                    text = %truncate(text),
                    "synthesis complete"
                );
                Some(audio)
            }
            Err(e) => {
                tracing::warn!(error = %e, text = %truncate(text), "synthesis failed");
                None
            }
        }
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(40).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: TtsProvider, api_key: &str) -> TtsConfig {
        TtsConfig {
            provider,
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            api_key: api_key.to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    #[test]
    fn missing_key_is_a_config_error() {
        assert!(TextToSpeech::new(&config(TtsProvider::OpenAi, "")).is_err());
        assert!(TextToSpeech::new(&config(TtsProvider::ElevenLabs, "")).is_err());
        assert!(TextToSpeech::new(&config(TtsProvider::OpenAi, "sk-test")).is_ok());
    }

    #[tokio::test]
    async fn empty_text_synthesizes_to_none() {
        let tts = TextToSpeech::new(&config(TtsProvider::OpenAi, "sk-test")).unwrap();
        assert!(tts.synthesize("   ").await.is_none());
    }
}
