//! Utterance segmentation
//!
//! Turns a stream of PCM frames into discrete utterance buffers. An
//! utterance ends on sustained silence, an explicit end-of-speech signal,
//! or the max-duration cap.

use chrono::{DateTime, Utc};

use crate::config::AudioConfig;

use super::is_silent;

/// One contiguous span of user speech
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Raw 16-bit PCM audio
    pub pcm: Vec<u8>,
    /// When the first frame arrived
    pub started_at: DateTime<Utc>,
    /// When the boundary fired
    pub ended_at: DateTime<Utc>,
    /// Transcript, absent until transcription completes
    pub text: Option<String>,
}

/// Segmenter tuning
#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
    /// Mean-absolute-amplitude silence threshold
    pub silence_threshold: i32,
    /// Consecutive silence that ends an utterance
    pub silence_duration_ms: u64,
    /// Hard cap on utterance length
    pub max_utterance_ms: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            silence_threshold: 500,
            silence_duration_ms: 600,
            max_utterance_ms: 10_000,
        }
    }
}

impl From<&AudioConfig> for SegmenterConfig {
    fn from(audio: &AudioConfig) -> Self {
        Self {
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            silence_threshold: audio.silence_threshold,
            silence_duration_ms: audio.silence_duration_ms,
            max_utterance_ms: audio.max_utterance_ms,
        }
    }
}

impl SegmenterConfig {
    /// PCM bytes per millisecond at this rate (16-bit samples)
    #[allow(clippy::cast_lossless)]
    const fn bytes_per_ms(&self) -> u64 {
        self.sample_rate as u64 * 2 * self.channels as u64 / 1000
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn silence_window_bytes(&self) -> usize {
        (self.silence_duration_ms * self.bytes_per_ms()) as usize
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn max_utterance_bytes(&self) -> usize {
        (self.max_utterance_ms * self.bytes_per_ms()) as usize
    }
}

/// Why an utterance boundary fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundaryReason {
    Silence,
    Explicit,
    MaxDuration,
}

/// Accumulates PCM frames until an utterance boundary fires
pub struct UtteranceSegmenter {
    config: SegmenterConfig,
    buffer: Vec<u8>,
    /// Trailing consecutive silent bytes
    silence_bytes: usize,
    /// Whether any frame so far crossed the threshold
    has_speech: bool,
    started_at: Option<DateTime<Utc>>,
}

impl UtteranceSegmenter {
    /// Create a new segmenter
    #[must_use]
    pub const fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            silence_bytes: 0,
            has_speech: false,
            started_at: None,
        }
    }

    /// Push one PCM frame; returns a completed utterance when a boundary fires
    ///
    /// Malformed frames (odd length or too short to hold a sample pair) are
    /// dropped with a log line. A completed utterance with no above-threshold
    /// frame is discarded and `None` is returned.
    pub fn push_frame(&mut self, frame: &[u8]) -> Option<Utterance> {
        if frame.len() < 4 || frame.len() % 2 != 0 {
            tracing::warn!(len = frame.len(), "dropping malformed audio frame");
            return None;
        }

        if self.buffer.is_empty() {
            self.started_at = Some(Utc::now());
        }
        self.buffer.extend_from_slice(frame);

        if is_silent(frame, self.config.silence_threshold) {
            self.silence_bytes += frame.len();
        } else {
            self.silence_bytes = 0;
            self.has_speech = true;
        }

        if self.has_speech && self.silence_bytes >= self.config.silence_window_bytes() {
            return self.finish(BoundaryReason::Silence);
        }

        if self.buffer.len() >= self.config.max_utterance_bytes() {
            return self.finish(BoundaryReason::MaxDuration);
        }

        None
    }

    /// Explicit end-of-speech control signal
    ///
    /// Completes the active utterance immediately, or returns `None` when
    /// nothing (or only silence) has accumulated.
    pub fn end_of_speech(&mut self) -> Option<Utterance> {
        if self.buffer.is_empty() {
            return None;
        }
        self.finish(BoundaryReason::Explicit)
    }

    /// Discard any accumulated audio
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.silence_bytes = 0;
        self.has_speech = false;
        self.started_at = None;
    }

    /// Whether any audio is buffered
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Duration of buffered audio in milliseconds
    #[must_use]
    pub fn accumulated_ms(&self) -> u64 {
        self.buffer.len() as u64 / self.config.bytes_per_ms()
    }

    fn finish(&mut self, reason: BoundaryReason) -> Option<Utterance> {
        if !self.has_speech {
            tracing::debug!(
                bytes = self.buffer.len(),
                "discarding all-silence utterance"
            );
            self.reset();
            return None;
        }

        // Keep at most the triggering silence window of trailing silence
        let excess = self
            .silence_bytes
            .saturating_sub(self.config.silence_window_bytes());
        let mut pcm = std::mem::take(&mut self.buffer);
        pcm.truncate(pcm.len() - excess);

        let started_at = self.started_at.take().unwrap_or_else(Utc::now);
        let utterance = Utterance {
            pcm,
            started_at,
            ended_at: Utc::now(),
            text: None,
        };

        tracing::info!(
            bytes = utterance.pcm.len(),
            ms = utterance.pcm.len() as u64 / self.config.bytes_per_ms(),
            ?reason,
            "utterance boundary"
        );

        self.reset();
        Some(utterance)
    }
}
