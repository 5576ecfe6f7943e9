//! Per-connection session state
//!
//! One [`Session`] per live connection, owned exclusively by its
//! controller task. Turn history carries strictly increasing sequence
//! indices; turn-scoped artifacts (utterances, tool invocations, synthesis
//! units) are discarded when the turn ends.

mod controller;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::llm::ChatMessage;
use crate::outbound::OutboundFrame;

pub use controller::{SessionController, SessionDeps};

/// Turns kept in history before pruning the oldest
const MAX_HISTORY_TURNS: usize = 40;

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Listening,
    Transcribing,
    Generating,
    Speaking,
}

/// Role of a turn in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
    ToolInvocation,
    ToolResult,
}

/// One logical step in the conversation
#[derive(Debug, Clone)]
pub struct Turn {
    /// Strictly increasing within a session
    pub seq: u64,
    pub role: TurnRole,
    pub content: String,
}

/// Per-connection conversation state
pub struct Session {
    pub id: String,
    pub state: SessionState,
    turns: Vec<Turn>,
    next_seq: u64,
    /// Tool rounds used by the most recent assistant turn
    pub last_tool_rounds: u32,
}

impl Session {
    /// Create a fresh session in `Idle`
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: SessionState::Idle,
            turns: Vec::new(),
            next_seq: 0,
            last_tool_rounds: 0,
        }
    }

    /// Append a turn, assigning the next sequence index
    pub fn push_turn(&mut self, role: TurnRole, content: impl Into<String>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.turns.push(Turn {
            seq,
            role,
            content: content.into(),
        });

        if self.turns.len() > MAX_HISTORY_TURNS {
            let excess = self.turns.len() - MAX_HISTORY_TURNS;
            self.turns.drain(..excess);
        }
        seq
    }

    /// Turn history as wire messages for the model
    ///
    /// Only user and assistant text turns survive into cross-turn history;
    /// tool turns are turn-scoped.
    #[must_use]
    pub fn history_messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .filter_map(|turn| match turn.role {
                TurnRole::User => Some(ChatMessage::user(turn.content.clone())),
                TurnRole::Assistant => Some(ChatMessage::assistant(turn.content.clone())),
                TurnRole::ToolInvocation | TurnRole::ToolResult => None,
            })
            .collect()
    }

    /// Discard all conversation history
    pub fn clear_turns(&mut self) {
        self.turns.clear();
    }

    /// Turns currently held in history
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Control messages sent to the client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Connection established
    Connected {
        message: String,
        config: ConnectedConfig,
    },
    /// State machine transition
    Status { state: SessionState },
    /// Assistant turn delivered completely
    Done,
}

/// Audio parameters advertised to the client on connect
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedConfig {
    pub sample_rate: u32,
    pub chunk_size_ms: u64,
}

/// Messages flowing out to the transport writer
#[derive(Debug)]
pub enum OutboundMessage {
    /// Binary PCM for playback
    Audio(Vec<u8>),
    /// JSON control message
    Control(ControlMessage),
}

/// Events consumed by the controller: from the transport reader and from
/// its own pipeline tasks
#[derive(Debug)]
pub enum SessionEvent {
    /// Binary audio frame from the client
    Frame(Vec<u8>),
    /// Explicit end-of-speech control message
    EndOfSpeech,
    /// Explicit reset control message
    Reset,
    /// Transport closed
    Closed,
    /// Event from a pipeline task, tagged with its turn serial
    Pipeline { serial: u64, event: PipelineEvent },
}

/// Completion events pushed into the controller's inbox by pipeline tasks
#[derive(Debug)]
pub enum PipelineEvent {
    /// Pipeline stage transition
    StateChanged(SessionState),
    /// One paced frame ready for the client
    Frame(OutboundFrame),
    /// The turn finished (reply absent when nothing was understood)
    TurnFinished {
        user_text: Option<String>,
        reply: Option<FinishedReply>,
    },
}

/// Summary of a finished assistant turn
#[derive(Debug)]
pub struct FinishedReply {
    pub text: String,
    pub outcome: crate::llm::TurnOutcome,
    pub tool_rounds: u32,
}

/// Sender half of a controller inbox
pub type EventSender = mpsc::Sender<SessionEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_indices_strictly_increase() {
        let mut session = Session::new();
        let a = session.push_turn(TurnRole::User, "one");
        let b = session.push_turn(TurnRole::Assistant, "two");
        let c = session.push_turn(TurnRole::User, "three");
        assert!(a < b && b < c);
    }

    #[test]
    fn history_keeps_only_text_turns() {
        let mut session = Session::new();
        session.push_turn(TurnRole::User, "log my sleep");
        session.push_turn(TurnRole::ToolInvocation, "log_health");
        session.push_turn(TurnRole::ToolResult, "{\"status\":\"logged\"}");
        session.push_turn(TurnRole::Assistant, "Done, 8 hours.");

        let messages = session.history_messages();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn history_prunes_but_sequences_keep_increasing() {
        let mut session = Session::new();
        for i in 0..100 {
            session.push_turn(TurnRole::User, format!("turn {i}"));
        }
        assert_eq!(session.turns().len(), MAX_HISTORY_TURNS);
        let seqs: Vec<u64> = session.turns().iter().map(|t| t.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*seqs.last().unwrap(), 99);
    }

    #[test]
    fn status_message_serializes_lowercase() {
        let msg = ControlMessage::Status {
            state: SessionState::Generating,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"status","state":"generating"}"#);
    }

    #[test]
    fn done_message_matches_protocol() {
        let json = serde_json::to_string(&ControlMessage::Done).unwrap();
        assert_eq!(json, r#"{"type":"done"}"#);
    }
}
