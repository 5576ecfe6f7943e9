//! Aegis Bridge - Voice-assistant bridge for a wearable client
//!
//! This library provides the real-time conversational pipeline:
//! - Utterance segmentation over streamed PCM
//! - Streaming LLM generation with tool use
//! - Incremental sentence-level speech synthesis with ordered delivery
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Client                           │
//! │        binary PCM frames  │  JSON control           │
//! └────────────────────┬────────────────────────────────┘
//!                      │ WebSocket
//! ┌────────────────────▼────────────────────────────────┐
//! │               Session Controller                     │
//! │  Segmenter → STT → Router/Generation → Sentence     │
//! │  Segmenter → TTS fan-out → ordering → Pacer         │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │          Adapters (boundaries)                       │
//! │   STT  │  Messages API  │  TTS  │  Tool registry    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod outbound;
pub mod prompt;
pub mod server;
pub mod session;
pub mod speech;
pub mod stt;
pub mod tools;
pub mod tts;

pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use llm::{AnthropicClient, ChatStream, ModelTier, TurnOutcome, select_tier};
pub use session::{Session, SessionController, SessionDeps, SessionState};
pub use speech::{SentenceSegmenter, SynthesisUnit};
pub use stt::{SpeechToText, Transcribe};
pub use tools::{ToolHandler, ToolRegistry};
pub use tts::{Synthesize, TextToSpeech};
