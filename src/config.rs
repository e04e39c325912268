//! Configuration surface (§6). A plain struct with a `Default` impl — no
//! fluent builder ships in the core; see `SPEC_FULL.md` §1/§10 for why.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasoningType {
    None,
    ChainOfThought,
    TreeOfThoughts,
    Hybrid,
}

impl Default for ReasoningType {
    fn default() -> Self {
        ReasoningType::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplorationStrategy {
    BestFirst,
    BreadthFirst,
    DepthFirst,
    BeamSearch,
    MonteCarlo,
}

impl Default for ExplorationStrategy {
    fn default() -> Self {
        ExplorationStrategy::BestFirst
    }
}

/// All caller-tunable knobs named in §6, plus the ambient additions recorded
/// in `SPEC_FULL.md` §6/§9 (`beam_width`, `loop_detector_window`,
/// `dedupe_default_ttl`, `reasoning_retrigger_interval`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub use_function_calling: bool,
    pub reasoning_type: ReasoningType,
    pub max_turns: usize,

    #[serde(with = "humantime_serde_secs")]
    pub llm_timeout: Duration,
    #[serde(with = "humantime_serde_secs")]
    pub tool_timeout: Duration,

    pub max_recent_turns: usize,
    pub enable_history_summarization: bool,
    pub max_tool_output_size: i64,

    pub emit_public_status: bool,

    pub max_tree_depth: usize,
    pub max_tree_nodes: usize,
    pub tree_exploration_strategy: ExplorationStrategy,
    pub beam_width: usize,

    pub loop_detector_window: usize,
    #[serde(with = "humantime_serde_secs")]
    pub dedupe_default_ttl: Duration,

    pub reasoning_retrigger_interval: usize,

    /// Cap on reasoning-insight text appended to `goal` (§9 decision).
    pub max_reasoning_insight_len: usize,
}

mod humantime_serde_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            use_function_calling: false,
            reasoning_type: ReasoningType::None,
            max_turns: 10,
            llm_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
            max_recent_turns: 5,
            enable_history_summarization: true,
            max_tool_output_size: 1000,
            emit_public_status: true,
            max_tree_depth: 3,
            max_tree_nodes: 20,
            tree_exploration_strategy: ExplorationStrategy::BestFirst,
            beam_width: 3,
            loop_detector_window: 10,
            dedupe_default_ttl: Duration::from_secs(5 * 60),
            reasoning_retrigger_interval: 3,
            max_reasoning_insight_len: 2000,
        }
    }
}
