//! Tree-of-Thoughts engine (§4.6) — expands an arena-backed tree of thought
//! nodes, one expansion per LLM call, until `max_nodes`/`max_depth` is
//! reached or the model signals a terminal thought. Five exploration
//! strategies select which frontier node to expand next (§6, §9: arena over
//! pointer graph).

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use std::time::Instant;

use crate::config::ExplorationStrategy;
use crate::llm::LlmClient;
use crate::llm::communicator::parse_json_value;
use crate::message_builder::PromptMessage;
use crate::state::{NodeId, ReasoningResult, ReasoningTree, ThoughtNode};

use super::ReasoningEngine;

pub struct TreeOfThoughtsEngine {
    pub max_depth: usize,
    pub max_nodes: usize,
    pub strategy: ExplorationStrategy,
    pub beam_width: usize,
}

impl TreeOfThoughtsEngine {
    pub fn new(
        max_depth: usize,
        max_nodes: usize,
        strategy: ExplorationStrategy,
        beam_width: usize,
    ) -> Self {
        Self {
            max_depth,
            max_nodes,
            strategy,
            beam_width,
        }
    }
}

#[derive(Deserialize)]
struct ExpansionChild {
    thought: String,
    score: f64,
}

#[derive(Deserialize)]
struct ExpansionResponse {
    #[serde(default)]
    children: Vec<ExpansionChild>,
    #[serde(default)]
    is_terminal: bool,
    #[serde(default)]
    conclusion: String,
}

#[async_trait]
impl ReasoningEngine for TreeOfThoughtsEngine {
    async fn reason(&self, goal: &str, llm: &dyn LlmClient) -> ReasoningResult {
        self.reason_from(goal, None, llm).await
    }
}

impl TreeOfThoughtsEngine {
    /// Explores the tree with `context` (if any) folded into every expansion
    /// prompt — used by the Hybrid engine to enrich exploration with the
    /// Chain-of-Thought pass's conclusion and top insights (§4.6 "Hybrid
    /// engine").
    pub async fn reason_with_context(
        &self,
        goal: &str,
        context: &str,
        llm: &dyn LlmClient,
    ) -> ReasoningResult {
        self.reason_from(goal, Some(context), llm).await
    }

    async fn reason_from(
        &self,
        goal: &str,
        context: Option<&str>,
        llm: &dyn LlmClient,
    ) -> ReasoningResult {
        let start = Instant::now();

        let mut nodes = vec![ThoughtNode {
            id: 0,
            parent: None,
            depth: 0,
            thought: goal.to_string(),
            score: 1.0,
            expanded: false,
        }];
        let mut frontier: Vec<NodeId> = vec![0];
        let mut conclusion = String::new();
        let mut terminal_leaf: Option<NodeId> = None;
        let context_block = context
            .filter(|c| !c.is_empty())
            .map(|c| format!("\nPrior analysis:\n{c}\n"))
            .unwrap_or_default();

        while nodes.len() < self.max_nodes {
            let Some(next) = self.select_next(&nodes, &frontier) else {
                break;
            };
            frontier.retain(|id| *id != next);

            if nodes[next].depth >= self.max_depth {
                continue;
            }

            let prompt = format!(
                "Goal: {goal}{context_block}\nCurrent thought (depth {}): {}\n\
                 Propose up to 3 next thoughts, each scored 0.0-1.0 by how promising it is. \
                 If one of them fully resolves the goal, set \"is_terminal\": true and fill in \
                 \"conclusion\". Respond with a single JSON object: {{\"children\": \
                 [{{\"thought\": \"...\", \"score\": 0.0}}], \"is_terminal\": false, \
                 \"conclusion\": \"\"}}.",
                nodes[next].depth, nodes[next].thought
            );
            let messages = [PromptMessage {
                role: "user",
                content: prompt,
            }];

            let response = match llm.complete(&messages).await {
                Ok(response) => response,
                Err(error) => return ReasoningResult::failure(error, start.elapsed()),
            };

            let expansion: ExpansionResponse = match parse_json_value(&response.text) {
                Ok(value) => value,
                Err(error) => return ReasoningResult::failure(error, start.elapsed()),
            };

            nodes[next].expanded = true;
            let parent_depth = nodes[next].depth;

            for child in expansion.children {
                let id = nodes.len();
                nodes.push(ThoughtNode {
                    id,
                    parent: Some(next),
                    depth: parent_depth + 1,
                    thought: child.thought,
                    score: child.score,
                    expanded: false,
                });
                if parent_depth + 1 < self.max_depth {
                    frontier.push(id);
                }
                if nodes.len() >= self.max_nodes {
                    break;
                }
            }

            if expansion.is_terminal {
                conclusion = expansion.conclusion;
                terminal_leaf = nodes.last().map(|n| n.id);
                break;
            }
        }

        let best_leaf = terminal_leaf.or_else(|| best_scoring_leaf(&nodes));
        let best_path = best_leaf
            .map(|leaf| path_to_root(&nodes, leaf))
            .unwrap_or_default();

        if conclusion.is_empty() {
            conclusion = best_leaf
                .and_then(|id| nodes.get(id))
                .map(|n| n.thought.clone())
                .unwrap_or_default();
        }

        let tree = ReasoningTree {
            nodes,
            best_path,
            conclusion: conclusion.clone(),
        };

        ReasoningResult {
            success: true,
            chain: None,
            tree: Some(tree),
            conclusion,
            metadata: Default::default(),
            execution_time: start.elapsed(),
            error: None,
        }
    }
}

impl TreeOfThoughtsEngine {
    fn select_next(&self, nodes: &[ThoughtNode], frontier: &[NodeId]) -> Option<NodeId> {
        if frontier.is_empty() {
            return None;
        }
        match self.strategy {
            ExplorationStrategy::BestFirst => frontier
                .iter()
                .copied()
                .max_by(|a, b| nodes[*a].score.partial_cmp(&nodes[*b].score).unwrap()),
            ExplorationStrategy::BreadthFirst => {
                frontier.iter().copied().min_by_key(|id| nodes[*id].depth)
            }
            ExplorationStrategy::DepthFirst => frontier.last().copied(),
            ExplorationStrategy::BeamSearch => {
                let shallowest_depth = frontier.iter().map(|id| nodes[*id].depth).min()?;
                frontier
                    .iter()
                    .copied()
                    .filter(|id| nodes[*id].depth == shallowest_depth)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .take(self.beam_width.max(1))
                    .max_by(|a, b| nodes[*a].score.partial_cmp(&nodes[*b].score).unwrap())
            }
            ExplorationStrategy::MonteCarlo => {
                let total: f64 = frontier.iter().map(|id| nodes[*id].score.max(0.0001)).sum();
                let mut roll = rand::thread_rng().gen_range(0.0..total);
                for &id in frontier {
                    let weight = nodes[id].score.max(0.0001);
                    if roll < weight {
                        return Some(id);
                    }
                    roll -= weight;
                }
                frontier.last().copied()
            }
        }
    }
}

fn best_scoring_leaf(nodes: &[ThoughtNode]) -> Option<NodeId> {
    let has_children: std::collections::HashSet<NodeId> =
        nodes.iter().filter_map(|n| n.parent).collect();
    nodes
        .iter()
        .filter(|n| !has_children.contains(&n.id))
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap())
        .map(|n| n.id)
}

fn path_to_root(nodes: &[ThoughtNode], leaf: NodeId) -> Vec<NodeId> {
    let mut path = vec![leaf];
    let mut current = leaf;
    while let Some(parent) = nodes[current].parent {
        path.push(parent);
        current = parent;
    }
    path.reverse();
    path
}
