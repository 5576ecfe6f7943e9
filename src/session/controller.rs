//! Session controller
//!
//! Owns the per-connection state machine and wires the pipeline together:
//! segmenter → transcription → generation → synthesis scheduling → pacing.
//! The controller is the sole owner of session state; pipeline tasks report
//! back by pushing events into its inbox, tagged with the turn serial they
//! belong to, so anything from a cancelled turn is discarded on arrival.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audio::{self, SegmenterConfig, Utterance, UtteranceSegmenter};
use crate::config::Config;
use crate::db::HealthRepo;
use crate::llm::{
    ChatMessage, ChatRequest, ChatStream, GenerationConfig, ModelTier, TurnOutcome, run_turn,
    select_tier,
};
use crate::metrics::LatencyTracker;
use crate::outbound::{OutboundFrame, run_pacer};
use crate::prompt;
use crate::speech::run_scheduler;
use crate::stt::Transcribe;
use crate::tools::ToolRegistry;
use crate::tts::Synthesize;

use super::{
    ConnectedConfig, ControlMessage, EventSender, FinishedReply, OutboundMessage, PipelineEvent,
    Session, SessionEvent, SessionState, TurnRole,
};

/// Process-scoped resources injected into every session
///
/// Created once at startup; adapters are shared trait objects, never
/// hidden globals.
#[derive(Clone)]
pub struct SessionDeps {
    pub transcriber: Arc<dyn Transcribe>,
    pub synthesizer: Arc<dyn Synthesize>,
    pub chat: Arc<dyn ChatStream>,
    pub tools: Arc<ToolRegistry>,
    pub health: HealthRepo,
    pub metrics: Arc<LatencyTracker>,
    pub config: Arc<Config>,
}

/// The turn pipeline currently in flight
struct ActiveTurn {
    serial: u64,
    cancel: CancellationToken,
    started: Instant,
    first_audio_seen: bool,
}

/// Per-connection controller; owns the state machine
pub struct SessionController {
    session: Session,
    segmenter: UtteranceSegmenter,
    deps: SessionDeps,
    out_tx: mpsc::Sender<OutboundMessage>,
    event_tx: EventSender,
    serial: u64,
    active: Option<ActiveTurn>,
    queued: VecDeque<Utterance>,
}

impl SessionController {
    /// Create a controller for one connection
    #[must_use]
    pub fn new(
        deps: SessionDeps,
        out_tx: mpsc::Sender<OutboundMessage>,
        event_tx: EventSender,
    ) -> Self {
        let segmenter = UtteranceSegmenter::new(SegmenterConfig::from(&deps.config.audio));
        Self {
            session: Session::new(),
            segmenter,
            deps,
            out_tx,
            event_tx,
            serial: 0,
            active: None,
            queued: VecDeque::new(),
        }
    }

    /// Session identifier
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    /// Drive the session until the transport closes
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) {
        let connected = ControlMessage::Connected {
            message: "Aegis ready".to_string(),
            config: ConnectedConfig {
                sample_rate: self.deps.config.audio.sample_rate,
                chunk_size_ms: self.deps.config.audio.chunk_size_ms,
            },
        };
        if self
            .out_tx
            .send(OutboundMessage::Control(connected))
            .await
            .is_err()
        {
            return;
        }

        tracing::info!(session_id = %self.session.id, "session started");

        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Frame(pcm) => self.on_frame(&pcm).await,
                SessionEvent::EndOfSpeech => self.on_end_of_speech().await,
                SessionEvent::Reset => {
                    tracing::info!(session_id = %self.session.id, "client reset");
                    self.reset().await;
                }
                SessionEvent::Closed => break,
                SessionEvent::Pipeline { serial, event } => {
                    self.on_pipeline_event(serial, event).await;
                }
            }
        }

        // Connection loss cancels everything still in flight
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
        tracing::info!(session_id = %self.session.id, "session ended");
    }

    /// Binary audio frame from the client
    ///
    /// Frames arriving outside `Listening` accumulate as the prefix of the
    /// next utterance; speech never interrupts an in-progress reply.
    async fn on_frame(&mut self, pcm: &[u8]) {
        if self.session.state == SessionState::Idle {
            let fresh = self.segmenter.is_empty();
            self.set_state(SessionState::Listening).await;
            if fresh {
                let _ = self
                    .out_tx
                    .send(OutboundMessage::Audio(audio::listening_chime()))
                    .await;
            }
        }

        if let Some(utterance) = self.segmenter.push_frame(pcm) {
            self.enqueue_utterance(utterance).await;
        }
    }

    /// Explicit end-of-speech control message
    async fn on_end_of_speech(&mut self) {
        if let Some(utterance) = self.segmenter.end_of_speech() {
            self.enqueue_utterance(utterance).await;
        }
    }

    async fn enqueue_utterance(&mut self, utterance: Utterance) {
        if self.active.is_some() {
            tracing::debug!(
                session_id = %self.session.id,
                queued = self.queued.len() + 1,
                "utterance queued behind active turn"
            );
            self.queued.push_back(utterance);
        } else {
            self.start_turn(utterance).await;
        }
    }

    /// Launch the pipeline for one utterance
    async fn start_turn(&mut self, utterance: Utterance) {
        self.serial += 1;
        let cancel = CancellationToken::new();
        self.active = Some(ActiveTurn {
            serial: self.serial,
            cancel: cancel.clone(),
            started: Instant::now(),
            first_audio_seen: false,
        });

        self.set_state(SessionState::Transcribing).await;
        let _ = self
            .out_tx
            .send(OutboundMessage::Audio(audio::thinking_tone()))
            .await;

        let context = PipelineContext {
            deps: self.deps.clone(),
            serial: self.serial,
            events: self.event_tx.clone(),
            history: self.session.history_messages(),
            cancel,
        };
        tokio::spawn(run_pipeline(context, utterance));
    }

    /// Event from a pipeline task
    async fn on_pipeline_event(&mut self, serial: u64, event: PipelineEvent) {
        let Some(active) = self.active.as_ref() else {
            tracing::debug!(serial, "discarding pipeline event with no active turn");
            return;
        };
        if active.serial != serial {
            tracing::debug!(serial, current = active.serial, "discarding stale pipeline event");
            return;
        }

        match event {
            PipelineEvent::StateChanged(state) => self.set_state(state).await,
            PipelineEvent::Frame(OutboundFrame::Audio(pcm)) => {
                if !active.first_audio_seen {
                    let perceived = active.started.elapsed().as_secs_f64() * 1000.0;
                    self.deps.metrics.record("perceived", perceived);
                    tracing::info!(
                        session_id = %self.session.id,
                        perceived_ms = %format!("{perceived:.0}"),
                        "first audio out"
                    );
                    if let Some(active) = self.active.as_mut() {
                        active.first_audio_seen = true;
                    }
                    self.set_state(SessionState::Speaking).await;
                }
                let _ = self.out_tx.send(OutboundMessage::Audio(pcm)).await;
            }
            PipelineEvent::Frame(OutboundFrame::EndOfTurn) => {
                let _ = self
                    .out_tx
                    .send(OutboundMessage::Audio(audio::success_chime()))
                    .await;
                let _ = self
                    .out_tx
                    .send(OutboundMessage::Control(ControlMessage::Done))
                    .await;
            }
            PipelineEvent::TurnFinished { user_text, reply } => {
                self.finish_turn(user_text, reply).await;
            }
        }
    }

    /// Record the finished turn and pick up any queued utterance
    async fn finish_turn(&mut self, user_text: Option<String>, reply: Option<FinishedReply>) {
        if let Some(active) = self.active.take() {
            let total = active.started.elapsed().as_secs_f64() * 1000.0;
            self.deps.metrics.record("total", total);
        }

        if let Some(text) = user_text {
            self.session.push_turn(TurnRole::User, text);
            if let Some(reply) = reply {
                self.session.last_tool_rounds = reply.tool_rounds;
                if reply.outcome == TurnOutcome::Partial {
                    tracing::warn!(
                        session_id = %self.session.id,
                        rounds = reply.tool_rounds,
                        "assistant turn finalized partial"
                    );
                }
                if !reply.text.is_empty() {
                    self.session.push_turn(TurnRole::Assistant, reply.text);
                }
            }
        } else {
            tracing::info!(session_id = %self.session.id, "nothing understood, skipping turn");
        }

        self.set_state(SessionState::Idle).await;

        if let Some(next) = self.queued.pop_front() {
            self.start_turn(next).await;
        }
    }

    /// Cancel everything and return to `Idle`, discarding partial results
    async fn reset(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
        self.segmenter.reset();
        self.queued.clear();
        self.session.clear_turns();
        self.set_state(SessionState::Idle).await;
    }

    async fn set_state(&mut self, state: SessionState) {
        if self.session.state == state {
            return;
        }
        tracing::debug!(session_id = %self.session.id, ?state, "state transition");
        self.session.state = state;
        let _ = self
            .out_tx
            .send(OutboundMessage::Control(ControlMessage::Status { state }))
            .await;
    }
}

/// Everything a pipeline task needs, snapshotted at turn start
struct PipelineContext {
    deps: SessionDeps,
    serial: u64,
    events: EventSender,
    history: Vec<ChatMessage>,
    cancel: CancellationToken,
}

impl PipelineContext {
    async fn emit(&self, event: PipelineEvent) {
        let _ = self
            .events
            .send(SessionEvent::Pipeline {
                serial: self.serial,
                event,
            })
            .await;
    }
}

/// One full utterance → reply pipeline
///
/// Runs as its own task; every suspension point is cancellable. Completion
/// and audio flow back through the controller inbox, never through shared
/// state.
async fn run_pipeline(context: PipelineContext, utterance: Utterance) {
    let audio_config = &context.deps.config.audio;

    // Stage 1: transcription (boundary; None means nothing understood)
    let stt_start = Instant::now();
    let text = tokio::select! {
        () = context.cancel.cancelled() => return,
        text = context.deps.transcriber.transcribe(
            &utterance.pcm,
            audio_config.sample_rate,
            audio_config.channels,
        ) => text,
    };
    context
        .deps
        .metrics
        .record("stt", stt_start.elapsed().as_secs_f64() * 1000.0);

    let Some(text) = text else {
        context
            .emit(PipelineEvent::TurnFinished {
                user_text: None,
                reply: None,
            })
            .await;
        return;
    };

    context
        .emit(PipelineEvent::StateChanged(SessionState::Generating))
        .await;

    // Stage 2: route the query and build the request
    let llm = &context.deps.config.llm;
    let tier = select_tier(&text);
    let (model, max_tokens, thinking_budget) = match tier {
        ModelTier::Fast => (llm.fast_model.clone(), llm.fast_max_tokens, None),
        ModelTier::Deep => (
            llm.deep_model.clone(),
            llm.deep_max_tokens,
            Some(llm.thinking_budget_tokens),
        ),
    };
    tracing::info!(?tier, model = %model, query = %text, "turn started");

    let mut messages = context.history.clone();
    messages.push(ChatMessage::user(text.clone()));
    let request = ChatRequest {
        model,
        max_tokens,
        thinking_budget,
        system: prompt::build_system_prompt(&context.deps.health),
        messages,
        tools: context.deps.tools.definitions(),
    };

    // Stage 3: the task graph. Generation feeds the sentence segmenter,
    // synthesis fans out per unit, the ordering buffer recombines, the
    // pacer frames for transport
    let (delta_tx, delta_rx) = mpsc::channel(64);
    let (ordered_tx, ordered_rx) = mpsc::channel(16);
    let (frame_tx, mut frame_rx) = mpsc::channel(32);

    let scheduler = tokio::spawn(run_scheduler(
        Arc::clone(&context.deps.synthesizer),
        delta_rx,
        ordered_tx,
        context.cancel.clone(),
    ));
    let pacer = tokio::spawn(run_pacer(
        ordered_rx,
        frame_tx,
        audio_config.outbound_chunk_bytes,
        context.cancel.clone(),
    ));
    let forwarder = {
        let events = context.events.clone();
        let serial = context.serial;
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                let event = SessionEvent::Pipeline {
                    serial,
                    event: PipelineEvent::Frame(frame),
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
        })
    };

    let llm_start = Instant::now();
    let generation_config = GenerationConfig::from(llm);
    let result = run_turn(
        context.deps.chat.as_ref(),
        &context.deps.tools,
        &generation_config,
        request,
        &delta_tx,
        &context.cancel,
    )
    .await;
    // Close the delta stream so the scheduler flushes and drains
    drop(delta_tx);
    context
        .deps
        .metrics
        .record("llm", llm_start.elapsed().as_secs_f64() * 1000.0);

    let delivered = scheduler.await.unwrap_or(0);
    let _ = pacer.await;
    let _ = forwarder.await;

    match result {
        Ok(turn) => {
            tracing::info!(
                delivered_units = delivered,
                rounds = turn.rounds,
                outcome = ?turn.outcome,
                "turn pipeline complete"
            );
            context
                .emit(PipelineEvent::TurnFinished {
                    user_text: Some(text),
                    reply: Some(FinishedReply {
                        text: turn.text,
                        outcome: turn.outcome,
                        tool_rounds: turn.rounds,
                    }),
                })
                .await;
        }
        Err(e) => {
            // Cancelled mid-turn; the controller has already moved on
            tracing::debug!(error = %e, "turn pipeline aborted");
        }
    }
}
