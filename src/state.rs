//! The durable data model (§3): `AgentState`, `AgentTurn`, `ModelMessage`,
//! `ActionInput`, `ToolExecutionResult`, and the reasoning chain/tree types.
//! Grounded on the teacher's `types.rs` (`ToolCall`, `HistoryEntry`,
//! `LlmResponse`) and `memory.rs` (`AgentMemory`), generalized from a fixed
//! ReAct cycle to the richer action set named in §3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::ReasoningType;

pub type ParamMap = HashMap<String, serde_json::Value>;

/// One durable agent. Owned by the caller, loaned to the orchestrator for
/// the duration of a step (§3 Ownership).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    pub goal: String,
    pub turns: Vec<AgentTurn>,
    pub reasoning_type: ReasoningType,
    pub current_reasoning_chain: Option<ReasoningChain>,
    pub current_reasoning_tree: Option<ReasoningTree>,
    pub reasoning_metadata: HashMap<String, serde_json::Value>,
}

impl AgentState {
    pub fn new(agent_id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            goal: goal.into(),
            turns: Vec::new(),
            reasoning_type: ReasoningType::None,
            current_reasoning_chain: None,
            current_reasoning_tree: None,
            reasoning_metadata: HashMap::new(),
        }
    }

    /// Convenience constructor for callers who don't already have a stable
    /// agent identifier of their own.
    pub fn new_with_generated_id(goal: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), goal)
    }

    /// Next turn index — `turns.len()`, preserving the invariant
    /// `turns[i].index == i`.
    pub fn next_index(&self) -> usize {
        self.turns.len()
    }

    pub fn push_turn(&mut self, mut turn: AgentTurn) {
        turn.index = self.next_index();
        self.turns.push(turn);
    }

    /// The most recent turn whose `tool_result` is populated, if any.
    pub fn last_tool_result(&self) -> Option<&ToolExecutionResult> {
        self.turns.iter().rev().find_map(|t| t.tool_result.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTurn {
    pub index: usize,
    pub turn_id: String,
    pub llm_message: Option<ModelMessage>,
    pub tool_call: Option<ToolCallRequest>,
    pub tool_result: Option<ToolExecutionResult>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub tool_results: Vec<ToolExecutionResult>,
    pub created_utc: DateTime<Utc>,
}

impl AgentTurn {
    /// A bare turn carrying only an LLM message (plan/retry/finish turns,
    /// and synthetic error/loop-breaker turns — all of which have no real
    /// tool call, so `turn_id` is derived from the index for stability).
    pub fn from_message(turn_id: impl Into<String>, message: ModelMessage) -> Self {
        Self {
            index: 0,
            turn_id: turn_id.into(),
            llm_message: Some(message),
            tool_call: None,
            tool_result: None,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            created_utc: Utc::now(),
        }
    }

    pub fn from_tool_call(
        llm_message: ModelMessage,
        tool_call: ToolCallRequest,
        tool_result: ToolExecutionResult,
    ) -> Self {
        let turn_id = tool_result.turn_id.clone();
        Self {
            index: 0,
            turn_id,
            llm_message: Some(llm_message),
            tool_call: Some(tool_call),
            tool_result: Some(tool_result),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            created_utc: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ToolCall,
    MultiToolCall,
    Plan,
    Finish,
    Retry,
}

impl Action {
    fn tag(self) -> &'static str {
        match self {
            Action::ToolCall => "tool_call",
            Action::MultiToolCall => "multi_tool_call",
            Action::Plan => "plan",
            Action::Finish => "finish",
            Action::Retry => "retry",
        }
    }
}

/// The parsed LLM reply (§3).
///
/// `Action`/`ActionInput` are a tagged pair in spirit but not in Rust's type
/// system: the wire format carries one `action` string and one untyped
/// `action_input` object, so deserialization is hand-written below rather
/// than derived — an untagged `ActionInput` enum cannot disambiguate `plan`
/// from `retry` (both are `{ "summary": ... }`) without the sibling tag.
#[derive(Debug, Clone)]
pub struct ModelMessage {
    pub thoughts: String,
    pub action: Action,
    pub action_raw: String,
    pub action_input: ActionInput,
    pub status_title: Option<String>,
    pub status_details: Option<String>,
    pub next_step_hint: Option<String>,
    pub progress_pct: Option<i64>,
}

impl ModelMessage {
    /// A synthetic `retry` message used for plan-hints, retry-hints, and
    /// loop-breaker advice (§4.1.a). Never produced by an LLM; produced by
    /// the orchestrator itself.
    pub fn synthetic_retry(summary: impl Into<String>) -> Self {
        Self {
            thoughts: String::new(),
            action: Action::Retry,
            action_raw: "retry".to_string(),
            action_input: ActionInput::Retry {
                summary: summary.into(),
            },
            status_title: None,
            status_details: None,
            next_step_hint: None,
            progress_pct: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubToolCall {
    pub tool: String,
    pub params: ParamMap,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Variant-by-action payload (§3). Represented as a tagged enum rather than
/// a class hierarchy per §9; the tag itself lives in the sibling `action`
/// field of `ModelMessage`; see the manual (de)serialization below.
#[derive(Debug, Clone)]
pub enum ActionInput {
    ToolCall { tool: String, params: ParamMap },
    MultiToolCall { tool_calls: Vec<SubToolCall> },
    Plan { summary: String },
    Finish { final_answer: String },
    Retry { summary: String },
}

impl ActionInput {
    fn to_json(&self) -> serde_json::Value {
        match self {
            ActionInput::ToolCall { tool, params } => {
                serde_json::json!({ "tool": tool, "params": params })
            }
            ActionInput::MultiToolCall { tool_calls } => {
                serde_json::json!({ "tool_calls": tool_calls })
            }
            ActionInput::Plan { summary } => serde_json::json!({ "summary": summary }),
            ActionInput::Finish { final_answer } => serde_json::json!({ "final": final_answer }),
            ActionInput::Retry { summary } => serde_json::json!({ "summary": summary }),
        }
    }
}

impl Serialize for ModelMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let action_tag = if self.action_raw.is_empty() {
            self.action.tag().to_string()
        } else {
            self.action_raw.clone()
        };
        let value = serde_json::json!({
            "thoughts": self.thoughts,
            "action": action_tag,
            "action_input": self.action_input.to_json(),
            "status_title": self.status_title,
            "status_details": self.status_details,
            "next_step_hint": self.next_step_hint,
            "progress_pct": self.progress_pct,
        });
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ModelMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error as _;

        #[derive(Deserialize)]
        struct Raw {
            thoughts: String,
            action: String,
            #[serde(default)]
            action_input: serde_json::Value,
            #[serde(default)]
            status_title: Option<String>,
            #[serde(default)]
            status_details: Option<String>,
            #[serde(default)]
            next_step_hint: Option<String>,
            #[serde(default)]
            progress_pct: Option<i64>,
        }

        let raw = Raw::deserialize(deserializer)?;
        let action_raw = raw.action.clone();
        let normalized = raw.action.trim().to_lowercase();
        let (action, action_input) = match normalized.as_str() {
            "tool_call" => {
                let tool = raw
                    .action_input
                    .get("tool")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| D::Error::custom("tool_call action_input missing 'tool'"))?
                    .to_string();
                let params: ParamMap = raw
                    .action_input
                    .get("params")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(D::Error::custom)?
                    .unwrap_or_default();
                (Action::ToolCall, ActionInput::ToolCall { tool, params })
            }
            "multi_tool_call" => {
                let tool_calls: Vec<SubToolCall> = raw
                    .action_input
                    .get("tool_calls")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(D::Error::custom)?
                    .unwrap_or_default();
                (
                    Action::MultiToolCall,
                    ActionInput::MultiToolCall { tool_calls },
                )
            }
            "plan" => {
                let summary = raw
                    .action_input
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                (Action::Plan, ActionInput::Plan { summary })
            }
            "finish" => {
                let final_answer = raw
                    .action_input
                    .get("final")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                (Action::Finish, ActionInput::Finish { final_answer })
            }
            "retry" => {
                let summary = raw
                    .action_input
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                (Action::Retry, ActionInput::Retry { summary })
            }
            other => return Err(D::Error::custom(format!("unknown action '{other}'"))),
        };

        Ok(ModelMessage {
            thoughts: raw.thoughts,
            action,
            action_raw,
            action_input,
            status_title: raw.status_title,
            status_details: raw.status_details,
            next_step_hint: raw.next_step_hint,
            progress_pct: raw.progress_pct,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool: String,
    pub params: ParamMap,
}

/// Mirrors `#[serde(with = "duration_millis")]` usage elsewhere in the crate
/// — `Duration` has no native serde impl, so execution times are stored as
/// milliseconds on the wire.
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub success: bool,
    pub tool: String,
    pub params: ParamMap,
    pub output: serde_json::Value,
    pub error: Option<String>,
    #[serde(with = "duration_millis")]
    pub execution_time: Duration,
    pub turn_id: String,
    pub created_utc: DateTime<Utc>,
}

// ── Reasoning (§3, §4.6) ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub reasoning: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningChain {
    pub steps: Vec<ReasoningStep>,
    pub conclusion: String,
}

impl ReasoningChain {
    pub fn mean_confidence(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.steps.iter().map(|s| s.confidence).sum::<f64>() / self.steps.len() as f64
    }
}

pub type NodeId = usize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub depth: usize,
    pub thought: String,
    pub score: f64,
    pub expanded: bool,
}

/// Arena-backed tree of thought nodes (§9: arena over pointer graph).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningTree {
    pub nodes: Vec<ThoughtNode>,
    pub best_path: Vec<NodeId>,
    pub conclusion: String,
}

impl ReasoningTree {
    pub fn root(&self) -> Option<&ThoughtNode> {
        self.nodes.first()
    }

    pub fn node(&self, id: NodeId) -> Option<&ThoughtNode> {
        self.nodes.get(id)
    }

    pub fn children(&self, id: NodeId) -> Vec<&ThoughtNode> {
        self.nodes
            .iter()
            .filter(|n| n.parent == Some(id))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningResult {
    pub success: bool,
    pub chain: Option<ReasoningChain>,
    pub tree: Option<ReasoningTree>,
    pub conclusion: String,
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(with = "duration_millis")]
    pub execution_time: Duration,
    pub error: Option<String>,
}

impl ReasoningResult {
    pub fn failure(error: impl Into<String>, execution_time: Duration) -> Self {
        Self {
            success: false,
            chain: None,
            tree: None,
            conclusion: String::new(),
            metadata: HashMap::new(),
            execution_time,
            error: Some(error.into()),
        }
    }
}

/// The orchestrator's per-step return value (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StepResult {
    pub continue_: bool,
    pub executed_tool: bool,
    pub tool_result: Option<ToolExecutionResult>,
    pub llm_message: Option<ModelMessage>,
    pub final_output: Option<String>,
    pub error: Option<String>,
}
