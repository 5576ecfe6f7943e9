//! Tool-augmented generation loop
//!
//! Drives one assistant turn: stream the model, forward text deltas the
//! moment they arrive, execute requested tools between rounds, and repeat
//! until the model stops asking for tools or the round cap is hit.

use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::LlmConfig;
use crate::tools::ToolRegistry;
use crate::{Error, Result};

use super::{ChatMessage, ChatRequest, ChatStream, ContentBlock, Role, StreamEvent, ToolInvocation};

/// Spoken when the model cannot be reached after retries
pub const APOLOGY_TEXT: &str =
    "Sorry, I'm having trouble thinking right now. Please try again in a moment.";

/// How an assistant turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model finished on its own
    Complete,
    /// The tool-round cap cut the turn short
    Partial,
    /// The model could not be reached; the apology text was produced instead
    Failed,
}

/// Result of one assistant turn
#[derive(Debug)]
pub struct TurnResult {
    /// Full assistant text, already forwarded as deltas
    pub text: String,
    pub outcome: TurnOutcome,
    /// Rounds in which tools actually executed
    pub rounds: u32,
}

/// Loop tuning
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Max rounds in which the model may request tools
    pub max_tool_rounds: u32,
    /// Retries on a failed model call before falling back to the apology
    pub max_retries: u32,
    /// Backoff base; doubles per retry
    pub retry_base_delay: Duration,
}

impl From<&LlmConfig> for GenerationConfig {
    fn from(llm: &LlmConfig) -> Self {
        Self {
            max_tool_rounds: llm.max_tool_rounds,
            max_retries: llm.max_retries,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Run one assistant turn
///
/// Text deltas go out on `delta_tx` in arrival order. Tool invocations
/// within a round run concurrently; their results are appended as
/// tool-result blocks before the next round starts. After
/// `max_tool_rounds` rounds the loop stops regardless of pending requests
/// and the turn is marked [`TurnOutcome::Partial`].
///
/// # Errors
///
/// Returns error only on cancellation; every model/tool failure degrades
/// into apology text or a finalized turn instead.
#[allow(clippy::too_many_lines)]
pub async fn run_turn(
    chat: &dyn ChatStream,
    tools: &ToolRegistry,
    config: &GenerationConfig,
    mut request: ChatRequest,
    delta_tx: &mpsc::Sender<String>,
    cancel: &CancellationToken,
) -> Result<TurnResult> {
    let mut full_text = String::new();
    let mut rounds = 0;
    let mut outcome = TurnOutcome::Complete;

    for round in 1..=config.max_tool_rounds.max(1) {
        let Some(mut rx) = start_stream_with_retry(chat, &request, config, cancel).await? else {
            if full_text.is_empty() {
                send_delta(delta_tx, APOLOGY_TEXT.to_string()).await?;
                full_text.push_str(APOLOGY_TEXT);
            }
            outcome = TurnOutcome::Failed;
            break;
        };

        let mut round_text = String::new();
        let mut invocations: Vec<ToolInvocation> = Vec::new();
        let mut stream_errored = false;

        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => {
                    return Err(Error::Session("turn cancelled".to_string()));
                }
                event = rx.recv() => event,
            };

            match event {
                Some(Ok(StreamEvent::TextDelta(text))) => {
                    round_text.push_str(&text);
                    full_text.push_str(&text);
                    send_delta(delta_tx, text).await?;
                }
                Some(Ok(StreamEvent::ToolUse(invocation))) => {
                    invocations.push(invocation);
                }
                Some(Ok(StreamEvent::Done { stop_reason })) => {
                    tracing::debug!(?stop_reason, round, "stream round complete");
                    break;
                }
                Some(Err(e)) => {
                    // Mid-stream failure: finalize with whatever arrived
                    tracing::warn!(error = %e, round, "stream failed mid-turn");
                    stream_errored = true;
                    break;
                }
                None => break,
            }
        }

        if stream_errored {
            if full_text.is_empty() && invocations.is_empty() {
                send_delta(delta_tx, APOLOGY_TEXT.to_string()).await?;
                full_text.push_str(APOLOGY_TEXT);
                outcome = TurnOutcome::Failed;
            }
            // Finalize with whatever arrived; no further rounds
            break;
        }

        if invocations.is_empty() {
            break;
        }

        rounds = round;

        // Record the assistant round, then feed back one tool result per
        // invocation; tool results always land before the next round
        let mut content = Vec::new();
        if !round_text.is_empty() {
            content.push(ContentBlock::Text { text: round_text });
        }
        for invocation in &invocations {
            content.push(ContentBlock::ToolUse {
                id: invocation.id.clone(),
                name: invocation.name.clone(),
                input: invocation.input.clone(),
            });
        }
        request.messages.push(ChatMessage {
            role: Role::Assistant,
            content,
        });

        // Independent calls within a round run concurrently
        let dispatches = invocations.iter().map(|invocation| async {
            tracing::info!(tool = %invocation.name, "tool call");
            let result = tools.dispatch(&invocation.name, &invocation.input).await;
            (invocation.id.clone(), result)
        });
        let results = tokio::select! {
            () = cancel.cancelled() => {
                return Err(Error::Session("turn cancelled".to_string()));
            }
            results = join_all(dispatches) => results,
        };

        let result_blocks = results
            .into_iter()
            .map(|(tool_use_id, result)| ContentBlock::ToolResult {
                tool_use_id,
                content: result.to_string(),
            })
            .collect();
        request.messages.push(ChatMessage {
            role: Role::User,
            content: result_blocks,
        });

        if round == config.max_tool_rounds.max(1) {
            tracing::warn!(rounds = round, "tool-round cap reached, finalizing partial turn");
            outcome = TurnOutcome::Partial;
        }
    }

    Ok(TurnResult {
        text: full_text,
        outcome,
        rounds,
    })
}

/// Start a streaming call, retrying with exponential backoff
///
/// Returns `Ok(None)` once retries are exhausted.
async fn start_stream_with_retry(
    chat: &dyn ChatStream,
    request: &ChatRequest,
    config: &GenerationConfig,
    cancel: &CancellationToken,
) -> Result<Option<mpsc::Receiver<Result<StreamEvent>>>> {
    let mut delay = config.retry_base_delay;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(Error::Session("turn cancelled".to_string()));
                }
                () = tokio::time::sleep(delay) => {}
            }
            delay *= 2;
        }

        match chat.stream_chat(request.clone()).await {
            Ok(rx) => return Ok(Some(rx)),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "model call failed");
            }
        }
    }

    Ok(None)
}

async fn send_delta(delta_tx: &mpsc::Sender<String>, text: String) -> Result<()> {
    delta_tx
        .send(text)
        .await
        .map_err(|_| Error::Session("delta consumer gone".to_string()))
}
