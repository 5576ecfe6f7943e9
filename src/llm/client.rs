//! Streaming Messages API client
//!
//! Speaks the Anthropic Messages API in streaming mode over SSE. Tool-use
//! blocks are assembled from partial JSON deltas and surfaced as complete
//! invocations; text deltas are forwarded as they arrive.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::config::LlmConfig;
use crate::tools::ToolDefinition;
use crate::{Error, Result};

use super::{ChatMessage, ChatRequest, ChatStream, StreamEvent, ToolInvocation};

const API_VERSION: &str = "2023-06-01";

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Anthropic Messages API client
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    idle_timeout: Duration,
    limiter: DirectLimiter,
}

impl AnthropicClient {
    /// Create a client from LLM configuration
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config("Anthropic API key required".to_string()));
        }

        let per_minute = NonZeroU32::new(config.requests_per_minute.max(1))
            .unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: "https://api.anthropic.com".to_string(),
            idle_timeout: config.stream_idle_timeout,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    /// Override the API base URL (for tests and proxies)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ChatStream for AnthropicClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<mpsc::Receiver<Result<StreamEvent>>> {
        self.limiter.until_ready().await;

        let body = MessagesBody {
            model: &request.model,
            max_tokens: request.max_tokens,
            stream: true,
            system: &request.system,
            messages: &request.messages,
            tools: &request.tools,
            thinking: request.thinking_budget.map(|budget_tokens| Thinking {
                kind: "enabled",
                budget_tokens,
            }),
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "messages API error");
            return Err(Error::Llm(format!("messages API error {status}: {body}")));
        }

        let (tx, rx) = mpsc::channel(64);
        let idle_timeout = self.idle_timeout;
        tokio::spawn(async move {
            process_stream(response, tx, idle_timeout).await;
        });

        Ok(rx)
    }
}

/// Request body for the Messages API
#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "<[ToolDefinition]>::is_empty")]
    tools: &'a [ToolDefinition],
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<Thinking>,
}

#[derive(Serialize)]
struct Thinking {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

/// `content_block_start` payload
#[derive(Deserialize)]
struct SseBlockStart {
    index: usize,
    content_block: SseContentBlock,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SseContentBlock {
    Text {
        #[allow(dead_code)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    Thinking {},
    #[serde(other)]
    Other,
}

/// `content_block_delta` payload
#[derive(Deserialize)]
struct SseBlockDelta {
    index: usize,
    delta: SseDelta,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SseDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta {},
    #[serde(other)]
    Other,
}

/// `content_block_stop` payload
#[derive(Deserialize)]
struct SseBlockStop {
    index: usize,
}

/// `message_delta` payload
#[derive(Deserialize)]
struct SseMessageDelta {
    delta: SseMessageDeltaBody,
}

#[derive(Deserialize)]
struct SseMessageDeltaBody {
    stop_reason: Option<String>,
}

/// `error` payload
#[derive(Deserialize)]
struct SseError {
    error: SseErrorBody,
}

#[derive(Deserialize)]
struct SseErrorBody {
    message: String,
}

/// Tool-use block being assembled from partial JSON deltas
struct PendingToolUse {
    id: String,
    name: String,
    input_json: String,
}

/// Drain the SSE stream into structured events
async fn process_stream(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<StreamEvent>>,
    idle_timeout: Duration,
) {
    let mut stream = response.bytes_stream().eventsource();
    let mut pending: HashMap<usize, PendingToolUse> = HashMap::new();
    let mut stop_reason = None;

    loop {
        let sse = match timeout(idle_timeout, stream.next()).await {
            Ok(Some(Ok(sse))) => sse,
            Ok(None) => {
                let _ = tx
                    .send(Err(Error::Llm(
                        "stream closed before message completed".to_string(),
                    )))
                    .await;
                return;
            }
            Ok(Some(Err(e))) => {
                let _ = tx.send(Err(Error::Llm(format!("SSE error: {e}")))).await;
                return;
            }
            Err(_) => {
                let _ = tx
                    .send(Err(Error::Llm("idle timeout waiting for stream".to_string())))
                    .await;
                return;
            }
        };

        match sse.event.as_str() {
            "content_block_start" => {
                let Ok(start) = serde_json::from_str::<SseBlockStart>(&sse.data) else {
                    tracing::warn!(data = %sse.data, "unparseable content_block_start");
                    continue;
                };
                if let SseContentBlock::ToolUse { id, name } = start.content_block {
                    pending.insert(
                        start.index,
                        PendingToolUse {
                            id,
                            name,
                            input_json: String::new(),
                        },
                    );
                }
            }
            "content_block_delta" => {
                let Ok(delta) = serde_json::from_str::<SseBlockDelta>(&sse.data) else {
                    tracing::warn!(data = %sse.data, "unparseable content_block_delta");
                    continue;
                };
                match delta.delta {
                    SseDelta::TextDelta { text } => {
                        if tx.send(Ok(StreamEvent::TextDelta(text))).await.is_err() {
                            return;
                        }
                    }
                    SseDelta::InputJsonDelta { partial_json } => {
                        if let Some(tool) = pending.get_mut(&delta.index) {
                            tool.input_json.push_str(&partial_json);
                        }
                    }
                    SseDelta::ThinkingDelta {} | SseDelta::Other => {}
                }
            }
            "content_block_stop" => {
                let Ok(stop) = serde_json::from_str::<SseBlockStop>(&sse.data) else {
                    continue;
                };
                if let Some(tool) = pending.remove(&stop.index) {
                    let input = if tool.input_json.is_empty() {
                        serde_json::Value::Object(serde_json::Map::new())
                    } else {
                        serde_json::from_str(&tool.input_json).unwrap_or_else(|e| {
                            tracing::warn!(error = %e, "malformed tool input JSON");
                            serde_json::Value::Object(serde_json::Map::new())
                        })
                    };
                    let event = StreamEvent::ToolUse(ToolInvocation {
                        id: tool.id,
                        name: tool.name,
                        input,
                    });
                    if tx.send(Ok(event)).await.is_err() {
                        return;
                    }
                }
            }
            "message_delta" => {
                if let Ok(delta) = serde_json::from_str::<SseMessageDelta>(&sse.data) {
                    if delta.delta.stop_reason.is_some() {
                        stop_reason = delta.delta.stop_reason;
                    }
                }
            }
            "error" => {
                let message = serde_json::from_str::<SseError>(&sse.data)
                    .map_or_else(|_| sse.data.clone(), |e| e.error.message);
                let _ = tx.send(Err(Error::Llm(message))).await;
                return;
            }
            "message_stop" => {
                let _ = tx.send(Ok(StreamEvent::Done { stop_reason })).await;
                return;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_use_block_start_parses() {
        let data = r#"{"index":1,"content_block":{"type":"tool_use","id":"tu_1","name":"log_health","input":{}}}"#;
        let start: SseBlockStart = serde_json::from_str(data).unwrap();
        assert_eq!(start.index, 1);
        assert!(matches!(
            start.content_block,
            SseContentBlock::ToolUse { ref name, .. } if name == "log_health"
        ));
    }

    #[test]
    fn text_delta_parses() {
        let data = r#"{"index":0,"delta":{"type":"text_delta","text":"Hello"}}"#;
        let delta: SseBlockDelta = serde_json::from_str(data).unwrap();
        assert!(matches!(delta.delta, SseDelta::TextDelta { ref text } if text == "Hello"));
    }

    #[test]
    fn unknown_delta_kinds_are_tolerated() {
        let data = r#"{"index":0,"delta":{"type":"citations_delta","citation":{}}}"#;
        let delta: SseBlockDelta = serde_json::from_str(data).unwrap();
        assert!(matches!(delta.delta, SseDelta::Other));
    }

    #[test]
    fn request_body_omits_empty_sections() {
        let body = MessagesBody {
            model: "claude-haiku-4-5-20251001",
            max_tokens: 300,
            stream: true,
            system: "",
            messages: &[ChatMessage::user("hi")],
            tools: &[],
            thinking: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("\"system\""));
        assert!(!json.contains("\"tools\""));
        assert!(!json.contains("\"thinking\""));
    }

    #[test]
    fn request_body_includes_thinking_when_set() {
        let body = MessagesBody {
            model: "claude-opus-4-6",
            max_tokens: 1024,
            stream: true,
            system: "persona",
            messages: &[ChatMessage::user("analyze my sleep")],
            tools: &[],
            thinking: Some(Thinking {
                kind: "enabled",
                budget_tokens: 10_000,
            }),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"thinking\":{\"type\":\"enabled\",\"budget_tokens\":10000}"));
    }
}
