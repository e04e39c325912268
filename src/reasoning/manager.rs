//! `ReasoningManager` (§4.6) — holds one engine per `ReasoningType` and
//! decides, per step, whether reasoning should run at all. Grounded on the
//! teacher's `transitions::build_transition_table` dispatch-by-key pattern,
//! adapted from `(State, Event) -> State` to `ReasoningType -> &dyn
//! ReasoningEngine`.

use std::sync::Arc;

use crate::config::{AgentConfig, ReasoningType};
use crate::llm::LlmClient;
use crate::state::{AgentState, ReasoningChain, ReasoningResult, ReasoningTree};

use super::chain::ChainOfThoughtEngine;
use super::hybrid::HybridEngine;
use super::tree::TreeOfThoughtsEngine;
use super::ReasoningEngine;

pub struct ReasoningManager {
    chain: Arc<ChainOfThoughtEngine>,
    tree: Arc<TreeOfThoughtsEngine>,
    hybrid: Arc<HybridEngine>,
    retrigger_interval: usize,
}

impl ReasoningManager {
    pub fn from_config(config: &AgentConfig) -> Self {
        let chain = Arc::new(ChainOfThoughtEngine::new(config.max_tree_depth.max(3)));
        let tree = Arc::new(TreeOfThoughtsEngine::new(
            config.max_tree_depth,
            config.max_tree_nodes,
            config.tree_exploration_strategy,
            config.beam_width,
        ));
        let hybrid = Arc::new(HybridEngine::new(
            ChainOfThoughtEngine::new(config.max_tree_depth.max(3)),
            TreeOfThoughtsEngine::new(
                config.max_tree_depth,
                config.max_tree_nodes,
                config.tree_exploration_strategy,
                config.beam_width,
            ),
        ));
        Self {
            chain,
            tree,
            hybrid,
            retrigger_interval: config.reasoning_retrigger_interval.max(1),
        }
    }

    pub fn is_supported(&self, reasoning_type: ReasoningType) -> bool {
        !matches!(reasoning_type, ReasoningType::None)
    }

    pub fn supported_types(&self) -> Vec<ReasoningType> {
        vec![
            ReasoningType::ChainOfThought,
            ReasoningType::TreeOfThoughts,
            ReasoningType::Hybrid,
        ]
    }

    /// True when reasoning is configured AND (`turn_index == 0` OR the
    /// previous turn's tool call failed AND this is a retrigger-interval
    /// turn) (§4.6 "When to reason"). Side-effect-free.
    pub fn should_perform_reasoning(
        &self,
        turn_index: usize,
        reasoning_type: ReasoningType,
        last_turn_tool_failed: bool,
    ) -> bool {
        if !self.is_supported(reasoning_type) {
            return false;
        }
        if turn_index == 0 {
            return true;
        }
        last_turn_tool_failed && turn_index % self.retrigger_interval == 0
    }

    pub async fn reason(
        &self,
        reasoning_type: ReasoningType,
        goal: &str,
        llm: &dyn LlmClient,
    ) -> ReasoningResult {
        match reasoning_type {
            ReasoningType::None => ReasoningResult::failure(
                "reasoning requested for ReasoningType::None",
                std::time::Duration::ZERO,
            ),
            ReasoningType::ChainOfThought => self.chain.reason(goal, llm).await,
            ReasoningType::TreeOfThoughts => self.tree.reason(goal, llm).await,
            ReasoningType::Hybrid => self.hybrid.reason(goal, llm).await,
        }
    }

    pub fn get_current_chain(&self, state: &AgentState) -> Option<ReasoningChain> {
        state.current_reasoning_chain.clone()
    }

    pub fn get_current_tree(&self, state: &AgentState) -> Option<ReasoningTree> {
        state.current_reasoning_tree.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlmClient;

    #[test]
    fn none_is_unsupported() {
        let manager = ReasoningManager::from_config(&AgentConfig::default());
        assert!(!manager.is_supported(ReasoningType::None));
        assert!(manager.is_supported(ReasoningType::ChainOfThought));
    }

    #[test]
    fn first_turn_always_reasons() {
        let manager = ReasoningManager::from_config(&AgentConfig::default());
        assert!(manager.should_perform_reasoning(0, ReasoningType::ChainOfThought, false));
    }

    #[test]
    fn retrigger_interval_gates_reasoning_only_after_a_failure() {
        let mut config = AgentConfig::default();
        config.reasoning_retrigger_interval = 3;
        let manager = ReasoningManager::from_config(&config);

        // Turn 3 is a retrigger-interval turn, but the last tool call
        // succeeded, so reasoning does not fire.
        assert!(!manager.should_perform_reasoning(3, ReasoningType::ChainOfThought, false));
        // Same turn, but the last tool call failed: fires.
        assert!(manager.should_perform_reasoning(3, ReasoningType::ChainOfThought, true));
        // A failure on a non-retrigger turn still doesn't fire.
        assert!(!manager.should_perform_reasoning(4, ReasoningType::ChainOfThought, true));
    }

    #[test]
    fn unsupported_type_never_reasons() {
        let manager = ReasoningManager::from_config(&AgentConfig::default());
        assert!(!manager.should_perform_reasoning(0, ReasoningType::None, true));
    }

    #[tokio::test]
    async fn none_reasoning_type_fails_fast() {
        let manager = ReasoningManager::from_config(&AgentConfig::default());
        let mock = MockLlmClient::new();
        let result = manager.reason(ReasoningType::None, "goal", &mock).await;
        assert!(!result.success);
    }
}
