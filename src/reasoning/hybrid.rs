//! Hybrid engine (§4.6) — runs Chain-of-Thought then Tree-of-Thoughts, the
//! latter with its exploration prompt enriched by the chain's conclusion and
//! top insights, and combines them: `combined_confidence = 0.6 * chain_mean +
//! 0.4 * tree_best_leaf_score`, conclusion as `"Analysis: <chain>\n\n
//! Exploration: <tree>"` when both produced one. Both engines always run —
//! a failure in one falls back to the other's result alone; only when both
//! fail does the hybrid pass fail.

use async_trait::async_trait;
use std::time::Instant;

use crate::llm::LlmClient;
use crate::state::ReasoningResult;

use super::chain::ChainOfThoughtEngine;
use super::tree::TreeOfThoughtsEngine;
use super::ReasoningEngine;

const TOP_INSIGHTS: usize = 3;

pub struct HybridEngine {
    chain: ChainOfThoughtEngine,
    tree: TreeOfThoughtsEngine,
}

impl HybridEngine {
    pub fn new(chain: ChainOfThoughtEngine, tree: TreeOfThoughtsEngine) -> Self {
        Self { chain, tree }
    }
}

#[async_trait]
impl ReasoningEngine for HybridEngine {
    async fn reason(&self, goal: &str, llm: &dyn LlmClient) -> ReasoningResult {
        let start = Instant::now();

        let chain_result = self.chain.reason(goal, llm).await;
        let context = chain_context(&chain_result);
        let tree_result = self
            .tree
            .reason_with_context(goal, &context, llm)
            .await;

        if !chain_result.success && !tree_result.success {
            return ReasoningResult::failure("All reasoning approaches failed", start.elapsed());
        }
        if !chain_result.success {
            return ReasoningResult {
                execution_time: start.elapsed(),
                ..tree_result
            };
        }
        if !tree_result.success {
            return ReasoningResult {
                execution_time: start.elapsed(),
                ..chain_result
            };
        }

        let chain_confidence = chain_result
            .chain
            .as_ref()
            .map(|c| c.mean_confidence())
            .unwrap_or(0.0);
        let tree_confidence = tree_result
            .tree
            .as_ref()
            .and_then(|t| t.best_path.last().and_then(|id| t.node(*id)))
            .map(|n| n.score)
            .unwrap_or(0.0);
        let combined_confidence = 0.6 * chain_confidence + 0.4 * tree_confidence;

        let conclusion = combine_conclusions(&chain_result.conclusion, &tree_result.conclusion);

        let mut metadata = chain_result.metadata.clone();
        metadata.insert(
            "combined_confidence".to_string(),
            serde_json::json!(combined_confidence),
        );

        ReasoningResult {
            success: true,
            chain: chain_result.chain,
            tree: tree_result.tree,
            conclusion,
            metadata,
            execution_time: start.elapsed(),
            error: None,
        }
    }
}

/// Builds the context handed to the tree engine: the chain's conclusion plus
/// its highest-confidence steps, so exploration starts from what analysis
/// already found instead of from the bare goal.
fn chain_context(chain_result: &ReasoningResult) -> String {
    let mut lines = Vec::new();
    if !chain_result.conclusion.is_empty() {
        lines.push(format!("Conclusion: {}", chain_result.conclusion));
    }
    if let Some(chain) = &chain_result.chain {
        let mut steps = chain.steps.clone();
        steps.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
        for step in steps.into_iter().take(TOP_INSIGHTS) {
            lines.push(format!("- {} (confidence {:.2})", step.reasoning, step.confidence));
        }
    }
    lines.join("\n")
}

fn combine_conclusions(chain: &str, tree: &str) -> String {
    match (chain.is_empty(), tree.is_empty()) {
        (false, false) => format!("Analysis: {chain}\n\nExploration: {tree}"),
        (false, true) => chain.to_string(),
        (true, false) => tree.to_string(),
        (true, true) => "No specific conclusions reached".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExplorationStrategy;
    use crate::llm::mock::MockLlmClient;

    #[tokio::test]
    async fn combines_chain_and_tree_results() {
        let mock = MockLlmClient::new();
        mock.push_text(
            r#"{"steps":[{"reasoning":"first","confidence":0.8}],"conclusion":"chain done"}"#,
        );
        mock.push_text(
            r#"{"children":[{"thought":"final","score":0.9}],"is_terminal":true,"conclusion":"tree done"}"#,
        );

        let hybrid = HybridEngine::new(
            ChainOfThoughtEngine::new(3),
            TreeOfThoughtsEngine::new(2, 10, ExplorationStrategy::BestFirst, 2),
        );
        let result = hybrid.reason("solve it", &mock).await;
        assert!(result.success);
        assert_eq!(result.conclusion, "Analysis: chain done\n\nExploration: tree done");
        let combined = result.metadata.get("combined_confidence").unwrap();
        assert!(combined.as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn chain_failure_falls_back_to_tree() {
        let mock = MockLlmClient::new();
        mock.push_error("down");
        mock.push_text(
            r#"{"children":[{"thought":"final","score":0.9}],"is_terminal":true,"conclusion":"tree done"}"#,
        );
        let hybrid = HybridEngine::new(
            ChainOfThoughtEngine::new(3),
            TreeOfThoughtsEngine::new(2, 10, ExplorationStrategy::BestFirst, 2),
        );
        let result = hybrid.reason("solve it", &mock).await;
        assert!(result.success);
        assert_eq!(result.conclusion, "tree done");
    }

    #[tokio::test]
    async fn tree_failure_falls_back_to_chain() {
        let mock = MockLlmClient::new();
        mock.push_text(
            r#"{"steps":[{"reasoning":"first","confidence":0.8}],"conclusion":"chain done"}"#,
        );
        mock.push_error("down");
        let hybrid = HybridEngine::new(
            ChainOfThoughtEngine::new(3),
            TreeOfThoughtsEngine::new(2, 10, ExplorationStrategy::BestFirst, 2),
        );
        let result = hybrid.reason("solve it", &mock).await;
        assert!(result.success);
        assert_eq!(result.conclusion, "chain done");
    }

    #[tokio::test]
    async fn both_failing_reports_all_approaches_failed() {
        let mock = MockLlmClient::new();
        mock.push_error("down");
        mock.push_error("also down");
        let hybrid = HybridEngine::new(
            ChainOfThoughtEngine::new(3),
            TreeOfThoughtsEngine::new(2, 10, ExplorationStrategy::BestFirst, 2),
        );
        let result = hybrid.reason("solve it", &mock).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("All reasoning approaches failed"));
    }

    #[tokio::test]
    async fn tree_prompt_is_enriched_with_chain_context() {
        let mock = MockLlmClient::new();
        mock.push_text(
            r#"{"steps":[{"reasoning":"key insight","confidence":0.9}],"conclusion":"chain done"}"#,
        );
        mock.push_text(
            r#"{"children":[{"thought":"final","score":0.9}],"is_terminal":true,"conclusion":"tree done"}"#,
        );
        let hybrid = HybridEngine::new(
            ChainOfThoughtEngine::new(3),
            TreeOfThoughtsEngine::new(2, 10, ExplorationStrategy::BestFirst, 2),
        );
        hybrid.reason("solve it", &mock).await;
        let calls = mock.calls();
        let tree_call = &calls[1];
        assert!(tree_call.iter().any(|m| m.content.contains("key insight")));
        assert!(tree_call.iter().any(|m| m.content.contains("chain done")));
    }
}
