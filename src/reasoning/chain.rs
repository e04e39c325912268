//! Chain-of-Thought engine (§4.6) — asks the model for a linear sequence of
//! reasoning steps, each with a confidence, plus a conclusion.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Instant;

use crate::llm::LlmClient;
use crate::message_builder::PromptMessage;
use crate::state::{ReasoningChain, ReasoningResult, ReasoningStep};

use super::ReasoningEngine;

pub struct ChainOfThoughtEngine {
    pub max_steps: usize,
}

impl ChainOfThoughtEngine {
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }
}

#[derive(Deserialize)]
struct ChainResponse {
    steps: Vec<ReasoningStep>,
    conclusion: String,
}

#[async_trait]
impl ReasoningEngine for ChainOfThoughtEngine {
    async fn reason(&self, goal: &str, llm: &dyn LlmClient) -> ReasoningResult {
        let start = Instant::now();

        let prompt = format!(
            "Think step by step about the following goal, in at most {} steps. \
             Respond with a single JSON object: {{\"steps\": [{{\"reasoning\": \"...\", \
             \"confidence\": 0.0}}], \"conclusion\": \"...\"}}.\n\nGoal: {goal}",
            self.max_steps
        );
        let messages = [PromptMessage {
            role: "user",
            content: prompt,
        }];

        let response = match llm.complete(&messages).await {
            Ok(response) => response,
            Err(error) => return ReasoningResult::failure(error, start.elapsed()),
        };

        let parsed: ChainResponse = match crate::llm::communicator::parse_json_value(&response.text) {
            Ok(value) => value,
            Err(error) => return ReasoningResult::failure(error, start.elapsed()),
        };

        let chain = ReasoningChain {
            steps: parsed.steps.into_iter().take(self.max_steps).collect(),
            conclusion: parsed.conclusion.clone(),
        };

        ReasoningResult {
            success: true,
            chain: Some(chain),
            tree: None,
            conclusion: parsed.conclusion,
            metadata: Default::default(),
            execution_time: start.elapsed(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlmClient;

    #[tokio::test]
    async fn parses_steps_and_conclusion() {
        let mock = MockLlmClient::new();
        mock.push_text(
            r#"{"steps":[{"reasoning":"first","confidence":0.8},{"reasoning":"second","confidence":0.9}],"conclusion":"done"}"#,
        );
        let engine = ChainOfThoughtEngine::new(5);
        let result = engine.reason("solve it", &mock).await;
        assert!(result.success);
        assert_eq!(result.chain.unwrap().steps.len(), 2);
        assert_eq!(result.conclusion, "done");
    }

    #[tokio::test]
    async fn llm_error_becomes_failure_result() {
        let mock = MockLlmClient::new();
        mock.push_error("backend unreachable");
        let engine = ChainOfThoughtEngine::new(5);
        let result = engine.reason("solve it", &mock).await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn unparseable_reply_becomes_failure_result() {
        let mock = MockLlmClient::new();
        mock.push_text("not json at all");
        let engine = ChainOfThoughtEngine::new(5);
        let result = engine.reason("solve it", &mock).await;
        assert!(!result.success);
    }
}
