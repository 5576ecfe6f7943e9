//! Speech-to-text adapter boundary
//!
//! The [`Transcribe`] trait is the boundary the pipeline sees: transcription
//! either yields text or `None` ("nothing understood"). Failures never
//! cross it.

use std::time::Duration;

use async_trait::async_trait;

use crate::audio::pcm_to_wav;
use crate::config::{SttConfig, SttProvider};
use crate::{Error, Result};

/// Transcription boundary
///
/// `None` means nothing was understood; the caller skips generation for
/// the utterance instead of aborting the session.
#[async_trait]
pub trait Transcribe: Send + Sync {
    /// Transcribe raw PCM to text
    async fn transcribe(&self, pcm: &[u8], sample_rate: u32, channels: u16) -> Option<String>;
}

/// Response from a Whisper-style transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from the Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Transcribes speech to text via a provider HTTP API
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    provider: SttProvider,
    timeout: Duration,
}

impl SpeechToText {
    /// Create an STT instance from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the provider API key is missing
    pub fn new(config: &SttConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config(match config.provider {
                SttProvider::Whisper => "OpenAI API key required for Whisper".to_string(),
                SttProvider::Deepgram => "Deepgram API key required".to_string(),
            }));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            provider: config.provider,
            timeout: config.timeout,
        })
    }

    /// Transcribe WAV bytes, surfacing provider errors
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails or times out
    async fn transcribe_wav(&self, wav: Vec<u8>) -> Result<String> {
        match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(wav).await,
            SttProvider::Deepgram => self.transcribe_deepgram(wav).await,
        }
    }

    /// Transcribe using a Whisper-style API
    async fn transcribe_whisper(&self, wav: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, wav: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Deepgram transcription");

        let url = format!(
            "https://api.deepgram.com/v1/listen?model={}&punctuate=true",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .timeout(self.timeout)
            .body(wav)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await?;
        let transcript = result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default();

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

#[async_trait]
impl Transcribe for SpeechToText {
    async fn transcribe(&self, pcm: &[u8], sample_rate: u32, channels: u16) -> Option<String> {
        let wav = match pcm_to_wav(pcm, sample_rate, channels) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "WAV encoding failed");
                return None;
            }
        };

        match self.transcribe_wav(wav).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(text.to_string())
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: SttProvider, api_key: &str) -> SttConfig {
        SttConfig {
            provider,
            model: "whisper-1".to_string(),
            api_key: api_key.to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    #[test]
    fn missing_key_is_a_config_error() {
        assert!(SpeechToText::new(&config(SttProvider::Whisper, "")).is_err());
        assert!(SpeechToText::new(&config(SttProvider::Deepgram, "")).is_err());
        assert!(SpeechToText::new(&config(SttProvider::Whisper, "sk-test")).is_ok());
    }

    #[test]
    fn deepgram_response_parses() {
        let json = r#"{"results":{"channels":[{"alternatives":[{"transcript":"log my sleep"}]}]}}"#;
        let parsed: DeepgramResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed.results.channels[0].alternatives[0].transcript,
            "log my sleep"
        );
    }
}
