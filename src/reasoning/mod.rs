//! Reasoning Engines (§4.6) — Chain-of-Thought, Tree-of-Thoughts, and Hybrid
//! engines behind one `ReasoningEngine` trait, plus the `ReasoningManager`
//! that dispatches between them. Grounded on the teacher's `states/*.rs`
//! state-handler pattern (one async trait method driving an LLM call and
//! returning a typed result) generalized from the fixed ReAct cycle to
//! free-form multi-step reasoning.

pub mod chain;
pub mod hybrid;
pub mod manager;
pub mod tree;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::state::ReasoningResult;

/// One reasoning strategy. `reason` never returns `Err`: a failed LLM call
/// or unparseable reply is folded into `ReasoningResult::failure` (§4.6,
/// mirroring the Tool Executor's failure-as-data convention in §4.4).
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn reason(&self, goal: &str, llm: &dyn LlmClient) -> ReasoningResult;
}
