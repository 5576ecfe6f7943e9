//! LLM routing, transport, and the tool-augmented generation loop
//!
//! The generation loop is written against the [`ChatStream`] trait so tests
//! can drive it with a scripted model; the production transport is the
//! streaming Messages API client in [`client`].

pub mod client;
pub mod generation;
pub mod router;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::Result;
use crate::tools::ToolDefinition;

pub use client::AnthropicClient;
pub use generation::{GenerationConfig, TurnOutcome, TurnResult, run_turn};
pub use router::{ModelTier, select_tier};

/// Message role on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One content block inside a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text
    Text { text: String },
    /// A tool invocation requested by the model
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// The result fed back for a tool invocation
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

/// One message in the conversation sent to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    /// A plain-text user message
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// A plain-text assistant message
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }
}

/// A tool invocation assembled from the stream
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Events surfaced by a streaming chat call
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental assistant text
    TextDelta(String),
    /// A fully-assembled tool invocation request
    ToolUse(ToolInvocation),
    /// Stream finished
    Done { stop_reason: Option<String> },
}

/// One streaming chat request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub max_tokens: u32,
    /// Extended thinking budget; `None` disables thinking
    pub thinking_budget: Option<u32>,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// Streaming chat transport
///
/// Implementations deliver an ordered event stream; transport failures after
/// the stream has started are surfaced as an `Err` item on the channel.
#[async_trait]
pub trait ChatStream: Send + Sync {
    /// Start a streaming chat call
    ///
    /// # Errors
    ///
    /// Returns error if the call cannot be started (connect failure,
    /// rejected request, rate limit).
    async fn stream_chat(&self, request: ChatRequest) -> Result<mpsc::Receiver<Result<StreamEvent>>>;
}
