//! Event Manager (§4.7) — lifecycle events with a fixed ordering within a
//! step (§5). Grounded on the teacher's `AgentOutput` enum and its
//! `tokio::sync::mpsc::UnboundedSender` delivery pattern (`states/*.rs`),
//! generalized from a streaming-token feed to the spec's event taxonomy.

use crate::state::{ModelMessage, ParamMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::large_enum_variant)]
pub enum Event {
    RunStarted {
        agent_id: String,
    },
    RunCompleted {
        agent_id: String,
        final_output: Option<String>,
    },
    StepStarted {
        agent_id: String,
        turn_index: usize,
    },
    StepCompleted {
        agent_id: String,
        turn_index: usize,
        continue_: bool,
    },
    LlmCallStarted {
        agent_id: String,
        turn_index: usize,
    },
    LlmCallCompleted {
        agent_id: String,
        turn_index: usize,
        model_message: Option<ModelMessage>,
        error: Option<String>,
    },
    ToolCallStarted {
        agent_id: String,
        turn_index: usize,
        tool: String,
        params: ParamMap,
    },
    ToolCallCompleted {
        agent_id: String,
        turn_index: usize,
        tool: String,
        success: bool,
        output: Option<serde_json::Value>,
        error: Option<String>,
        #[serde(with = "crate::state::duration_millis")]
        elapsed: Duration,
    },
    StatusUpdate {
        agent_id: String,
        title: String,
        details: Option<String>,
        next_step_hint: Option<String>,
        progress_pct: Option<i64>,
    },
}

/// Background handler for emitted events. Implementations must not block the
/// orchestrator — callers typically forward events to an unbounded channel
/// or a logging sink and return immediately; see `ChannelEventManager` below
/// for the pattern the teacher uses for `AgentOutput`.
pub trait EventManager: Send + Sync {
    fn emit(&self, event: Event);
}

/// Discards every event. Default for callers with no observability needs.
pub struct NoopEventManager;

impl EventManager for NoopEventManager {
    fn emit(&self, _event: Event) {}
}

/// Forwards every event onto an unbounded channel — the teacher's
/// `AgentOutput` delivery idiom generalized to the full event taxonomy. A
/// slow or absent receiver never stalls the step: `send` on an unbounded
/// channel never blocks, and a closed receiver is silently ignored (matching
/// the teacher's `let _ = tx.send(...)` throughout `states/*.rs`).
pub struct ChannelEventManager {
    sender: tokio::sync::mpsc::UnboundedSender<Event>,
}

impl ChannelEventManager {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventManager for ChannelEventManager {
    fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

/// In-memory event log, useful in tests that assert on emitted event order
/// (§5 ordering guarantees) — grounded on the teacher's `Trace` log.
pub struct RecordingEventManager {
    events: std::sync::Mutex<Vec<Event>>,
}

impl RecordingEventManager {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl Default for RecordingEventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EventManager for RecordingEventManager {
    fn emit(&self, event: Event) {
        tracing::debug!(?event, "agent event");
        self.events.lock().unwrap().push(event);
    }
}

pub type SharedEventManager = Arc<dyn EventManager>;
