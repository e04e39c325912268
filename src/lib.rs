//! A turn orchestrator for stateful, tool-using LLM agents: one step at a
//! time, durable `AgentState`, pluggable tools/LLM backends/state store, and
//! optional Chain-of-Thought / Tree-of-Thoughts / Hybrid reasoning between
//! steps.

pub mod canonical;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod loop_detector;
pub mod message_builder;
pub mod metrics;
pub mod orchestrator;
pub mod reasoning;
pub mod state;
pub mod status;
pub mod store;
pub mod tool_executor;
pub mod tools;

pub use canonical::{canonical_hash, canonical_json};
pub use config::{AgentConfig, ExplorationStrategy, ReasoningType};
pub use error::AgentError;
pub use events::{
    ChannelEventManager, Event, EventManager, NoopEventManager, RecordingEventManager,
    SharedEventManager,
};
pub use llm::{
    FunctionCallResult, FunctionCallingLlmClient, FunctionSpec, LlmClient, LlmTextResponse,
};
pub use message_builder::{MessageBuilder, PromptMessage};
pub use metrics::{
    InMemoryMetricsCollector, MetricsCollector, NoopMetricsCollector, SharedMetricsCollector,
    TokenUsage,
};
pub use orchestrator::{LlmBackend, Orchestrator};
pub use state::{
    Action, ActionInput, AgentState, AgentTurn, ModelMessage, NodeId, ParamMap, ReasoningChain,
    ReasoningResult, ReasoningStep, ReasoningTree, StepResult, SubToolCall, ThoughtNode,
    ToolCallRequest, ToolExecutionResult,
};
pub use store::{InMemoryStateStore, StateStore};
pub use tools::{FnTool, Tool, ToolRegistry};
