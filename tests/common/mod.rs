//! Shared test utilities: mock adapters and PCM generators
#![allow(dead_code, clippy::missing_panics_doc, clippy::missing_errors_doc)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use aegis_bridge::config::{
    AudioConfig, Config, LlmConfig, ServerConfig, SttConfig, SttProvider, TtsConfig, TtsProvider,
};
use aegis_bridge::db::{ExpenseRepo, HealthRepo};
use aegis_bridge::llm::{ChatRequest, StreamEvent};
use aegis_bridge::metrics::LatencyTracker;
use aegis_bridge::session::OutboundMessage;
use aegis_bridge::{
    ChatStream, Error, Result, SessionDeps, Synthesize, ToolRegistry, Transcribe, db,
};

/// Bridge config with default knobs and dummy adapter settings
pub fn test_config() -> Config {
    Config {
        data_dir: PathBuf::from("."),
        server: ServerConfig::default(),
        audio: AudioConfig::default(),
        stt: SttConfig {
            provider: SttProvider::Whisper,
            model: "whisper-1".to_string(),
            api_key: "test".to_string(),
            timeout: Duration::from_secs(5),
        },
        tts: TtsConfig {
            provider: TtsProvider::OpenAi,
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            api_key: "test".to_string(),
            timeout: Duration::from_secs(5),
        },
        llm: LlmConfig::default(),
    }
}

/// Session dependencies wired to the given mock adapters and an in-memory DB
pub fn test_deps(
    transcriber: std::sync::Arc<dyn Transcribe>,
    synthesizer: std::sync::Arc<dyn Synthesize>,
    chat: std::sync::Arc<dyn ChatStream>,
) -> SessionDeps {
    let pool = db::init_memory().expect("failed to init test db");
    let health = HealthRepo::new(pool.clone());
    let expenses = ExpenseRepo::new(pool);
    SessionDeps {
        transcriber,
        synthesizer,
        chat,
        tools: std::sync::Arc::new(ToolRegistry::with_builtin_tools(
            health.clone(),
            expenses,
            Duration::from_secs(5),
        )),
        health,
        metrics: std::sync::Arc::new(LatencyTracker::new()),
        config: std::sync::Arc::new(test_config()),
    }
}

/// Transcriber returning a fixed transcript (or nothing understood)
pub struct FixedTranscriber(pub Option<String>);

#[async_trait]
impl Transcribe for FixedTranscriber {
    async fn transcribe(&self, _pcm: &[u8], _sample_rate: u32, _channels: u16) -> Option<String> {
        self.0.clone()
    }
}

/// Synthesizer whose audio is the unit text's bytes
///
/// Per-text delays let tests force unit *i+1* to finish strictly before
/// unit *i*; texts in `fail` synthesize to `None`.
#[derive(Default)]
pub struct TextAudioSynthesizer {
    pub delays: HashMap<String, Duration>,
    pub fail: HashSet<String>,
}

#[async_trait]
impl Synthesize for TextAudioSynthesizer {
    async fn synthesize(&self, text: &str) -> Option<Vec<u8>> {
        if let Some(delay) = self.delays.get(text) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail.contains(text) {
            return None;
        }
        Some(text.as_bytes().to_vec())
    }
}

/// One scripted model call: `None` fails at call time, `Some` streams events
pub type ScriptedCall = Option<Vec<StreamEvent>>;

/// Chat transport that replays scripted calls
pub struct ScriptedChat {
    calls: Mutex<VecDeque<ScriptedCall>>,
    calls_made: AtomicUsize,
}

impl ScriptedChat {
    pub fn new(calls: Vec<ScriptedCall>) -> Self {
        Self {
            calls: Mutex::new(calls.into()),
            calls_made: AtomicUsize::new(0),
        }
    }

    /// A single call that streams the given text in sentence-sized deltas
    pub fn single_reply(chunks: &[&str]) -> Self {
        let mut events: Vec<StreamEvent> = chunks
            .iter()
            .map(|c| StreamEvent::TextDelta((*c).to_string()))
            .collect();
        events.push(StreamEvent::Done {
            stop_reason: Some("end_turn".to_string()),
        });
        Self::new(vec![Some(events)])
    }

    pub fn calls_made(&self) -> usize {
        self.calls_made.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatStream for ScriptedChat {
    async fn stream_chat(&self, _request: ChatRequest) -> Result<mpsc::Receiver<Result<StreamEvent>>> {
        self.calls_made.fetch_add(1, Ordering::SeqCst);
        let call = self
            .calls
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Llm("no scripted call left".to_string()))?;
        let Some(events) = call else {
            return Err(Error::Llm("scripted call failure".to_string()));
        };

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            for event in events {
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

/// One 10ms frame of 16kHz 16-bit mono PCM at the given amplitude
pub fn frame(value: i16) -> Vec<u8> {
    value
        .to_le_bytes()
        .iter()
        .copied()
        .cycle()
        .take(160 * 2)
        .collect()
}

/// Frames covering `ms` milliseconds at the given amplitude
pub fn frames(value: i16, ms: u64) -> Vec<Vec<u8>> {
    (0..ms / 10).map(|_| frame(value)).collect()
}

/// Collect outbound messages until a `done` control message or the deadline
pub async fn collect_until_done(
    out_rx: &mut mpsc::Receiver<OutboundMessage>,
    deadline: Duration,
) -> Vec<OutboundMessage> {
    let mut messages = Vec::new();
    let collect = async {
        while let Some(message) = out_rx.recv().await {
            let is_done = matches!(
                &message,
                OutboundMessage::Control(aegis_bridge::session::ControlMessage::Done)
            );
            messages.push(message);
            if is_done {
                break;
            }
        }
    };
    let _ = tokio::time::timeout(deadline, collect).await;
    messages
}

/// Concatenate pipeline audio, excluding the feedback chimes
pub fn pipeline_audio(messages: &[OutboundMessage]) -> Vec<u8> {
    let chimes = [
        aegis_bridge::audio::listening_chime(),
        aegis_bridge::audio::thinking_tone(),
        aegis_bridge::audio::success_chime(),
    ];
    let mut audio = Vec::new();
    for message in messages {
        if let OutboundMessage::Audio(pcm) = message {
            if chimes.iter().all(|c| c != pcm) {
                audio.extend_from_slice(pcm);
            }
        }
    }
    audio
}
