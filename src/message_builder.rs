//! Message Builder (§4.2) — synthesizes the prompt sent to the LLM: a system
//! message carrying the tool catalog and status-emission instructions, a
//! rendered history of prior turns (summarized or truncated per config), and
//! the goal message. Grounded on the teacher's `memory::build_messages`
//! (grouping parallel tool results into OpenAI-style assistant/tool message
//! pairs), generalized to the richer turn/action model in `state.rs`.

use crate::config::AgentConfig;
use crate::state::{ActionInput, AgentState, AgentTurn};
use crate::tools::ToolRegistry;

/// A single rendered prompt message. Kept provider-agnostic (`role` + `content`
/// strings) since concrete LLM backends are out of scope (§1) — a caller's
/// `LlmClient` impl maps these onto whatever wire shape its backend expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: String,
}

impl PromptMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

pub struct MessageBuilder<'a> {
    config: &'a AgentConfig,
}

impl<'a> MessageBuilder<'a> {
    pub fn new(config: &'a AgentConfig) -> Self {
        Self { config }
    }

    /// Builds the full prompt for a step. Always produces at least two
    /// messages (system + goal), even with an empty history and an empty
    /// tool catalog (§4.2 invariant).
    pub fn build(&self, state: &AgentState, tools: &ToolRegistry) -> Vec<PromptMessage> {
        let mut messages = Vec::with_capacity(2 + state.turns.len());
        messages.push(PromptMessage::system(self.system_message(tools)));
        messages.extend(self.history_messages(state));
        messages.push(PromptMessage::user(state.goal.clone()));
        messages
    }

    fn system_message(&self, tools: &ToolRegistry) -> String {
        let mut out = String::from(
            "You are an autonomous agent. Respond with a single JSON object \
             describing your next action.\n\n",
        );

        out.push_str("Available tools:\n");
        let catalog = tools.catalog();
        if catalog.is_empty() {
            out.push_str("(none)\n");
        } else {
            for (name, description, schema) in &catalog {
                out.push_str(&format!("- {name}"));
                if let Some(description) = description {
                    out.push_str(&format!(": {description}"));
                }
                out.push('\n');
                if let Some(schema) = schema {
                    out.push_str(&format!(
                        "  parameters: {}\n",
                        serde_json::to_string(schema).unwrap_or_default()
                    ));
                }
            }
        }

        out.push_str(
            "\nActions: tool_call, multi_tool_call, plan, finish, retry.\n\
             Optionally include status_title / status_details / next_step_hint / \
             progress_pct to report progress to the caller.\n",
        );

        out
    }

    /// Renders prior turns into alternating assistant/user messages. When
    /// `enable_history_summarization` is set and the turn count exceeds
    /// `max_recent_turns`, older turns collapse into one summary message and
    /// only the most recent `max_recent_turns` render verbatim (§4.2).
    fn history_messages(&self, state: &AgentState) -> Vec<PromptMessage> {
        let turns = &state.turns;
        if turns.is_empty() {
            return Vec::new();
        }

        let mut messages = Vec::new();

        if self.config.enable_history_summarization && turns.len() > self.config.max_recent_turns
        {
            let split = turns.len() - self.config.max_recent_turns;
            let summarized = &turns[..split];
            let recent = &turns[split..];
            messages.push(PromptMessage::user(self.summarize_turns(summarized)));
            for turn in recent {
                messages.extend(self.render_turn(turn));
            }
        } else {
            for turn in turns {
                messages.extend(self.render_turn(turn));
            }
        }

        messages
    }

    fn summarize_turns(&self, turns: &[AgentTurn]) -> String {
        let mut lines = vec![format!(
            "Summary of {} earlier turn(s):",
            turns.len()
        )];
        for turn in turns {
            let tool_summary = turn
                .tool_result
                .as_ref()
                .map(|r| {
                    format!(
                        "{} -> {}",
                        r.tool,
                        if r.success { "ok" } else { "failed" }
                    )
                })
                .unwrap_or_else(|| "no tool call".to_string());
            lines.push(format!("  turn {}: {tool_summary}", turn.index));
        }
        lines.join("\n")
    }

    fn render_turn(&self, turn: &AgentTurn) -> Vec<PromptMessage> {
        let mut messages = Vec::new();

        if let Some(message) = &turn.llm_message {
            messages.push(PromptMessage::assistant(describe_action(message)));
        }

        if let Some(result) = &turn.tool_result {
            messages.push(PromptMessage::user(self.render_tool_result(
                &result.tool,
                result.success,
                &result.output,
                result.error.as_deref(),
            )));
        }

        for result in &turn.tool_results {
            messages.push(PromptMessage::user(self.render_tool_result(
                &result.tool,
                result.success,
                &result.output,
                result.error.as_deref(),
            )));
        }

        messages
    }

    fn render_tool_result(
        &self,
        tool: &str,
        success: bool,
        output: &serde_json::Value,
        error: Option<&str>,
    ) -> String {
        let rendered = if success {
            let serialized = serde_json::to_string(output).unwrap_or_default();
            self.truncate_tool_output(&serialized)
        } else {
            error.unwrap_or("unknown error").to_string()
        };

        format!(
            "tool '{tool}' {}: {rendered}",
            if success { "succeeded" } else { "failed" }
        )
    }

    /// Replaces serialized tool output with `{truncated, original_size,
    /// preview}` once it exceeds `max_tool_output_size` (§4.2).
    /// `max_tool_output_size <= 0` disables truncation entirely (§8
    /// boundary behavior) — never truncate to an empty string.
    fn truncate_tool_output(&self, serialized: &str) -> String {
        let limit = self.config.max_tool_output_size;
        if limit <= 0 || serialized.len() as i64 <= limit {
            return serialized.to_string();
        }

        let mut boundary = 200.min(serialized.len());
        while boundary > 0 && !serialized.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let preview = &serialized[..boundary];

        serde_json::json!({
            "truncated": true,
            "original_size": serialized.len(),
            "preview": preview,
        })
        .to_string()
    }
}

fn describe_action(message: &crate::state::ModelMessage) -> String {
    match &message.action_input {
        ActionInput::ToolCall { tool, params } => {
            format!(
                "action: tool_call({tool}, {})",
                serde_json::to_string(params).unwrap_or_default()
            )
        }
        ActionInput::MultiToolCall { tool_calls } => {
            format!("action: multi_tool_call({} tools)", tool_calls.len())
        }
        ActionInput::Plan { summary } => format!("action: plan({summary})"),
        ActionInput::Finish { final_answer } => format!("action: finish({final_answer})"),
        ActionInput::Retry { summary } => format!("action: retry({summary})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Action, ActionInput, ModelMessage, ToolExecutionResult};
    use chrono::Utc;
    use std::time::Duration;

    fn result(tool: &str, success: bool) -> ToolExecutionResult {
        ToolExecutionResult {
            success,
            tool: tool.to_string(),
            params: Default::default(),
            output: serde_json::json!({"ok": true}),
            error: if success { None } else { Some("boom".to_string()) },
            execution_time: Duration::from_millis(5),
            turn_id: "t1".to_string(),
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn always_at_least_two_messages() {
        let config = AgentConfig::default();
        let builder = MessageBuilder::new(&config);
        let state = AgentState::new("a1", "do the thing");
        let tools = ToolRegistry::new();
        let messages = builder.build(&state, &tools);
        assert!(messages.len() >= 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages.last().unwrap().role, "user");
    }

    #[test]
    fn history_summarizes_past_max_recent_turns() {
        let mut config = AgentConfig::default();
        config.max_recent_turns = 1;
        config.enable_history_summarization = true;
        let builder = MessageBuilder::new(&config);

        let mut state = AgentState::new("a1", "goal");
        for i in 0..3 {
            let message = ModelMessage {
                thoughts: String::new(),
                action: Action::ToolCall,
                action_raw: "tool_call".to_string(),
                action_input: ActionInput::ToolCall {
                    tool: "search".to_string(),
                    params: Default::default(),
                },
                status_title: None,
                status_details: None,
                next_step_hint: None,
                progress_pct: None,
            };
            let turn_result = result("search", true);
            let mut turn = AgentTurn::from_tool_call(
                message,
                crate::state::ToolCallRequest {
                    tool: "search".to_string(),
                    params: Default::default(),
                },
                turn_result,
            );
            turn.turn_id = format!("turn-{i}");
            state.push_turn(turn);
        }

        let tools = ToolRegistry::new();
        let messages = builder.build(&state, &tools);
        let has_summary = messages
            .iter()
            .any(|m| m.content.starts_with("Summary of"));
        assert!(has_summary);
    }

    #[test]
    fn tool_output_truncated_past_limit() {
        let mut config = AgentConfig::default();
        config.max_tool_output_size = 5;
        let builder = MessageBuilder::new(&config);
        let rendered = builder.render_tool_result(
            "search",
            true,
            &serde_json::json!("a very long output string"),
            None,
        );
        assert!(rendered.contains("\"truncated\":true"));
        assert!(rendered.contains("\"original_size\""));
    }

    #[test]
    fn zero_or_negative_limit_never_truncates() {
        let mut config = AgentConfig::default();
        config.max_tool_output_size = 0;
        let builder = MessageBuilder::new(&config);
        let long_value = "x".repeat(5000);
        let rendered =
            builder.render_tool_result("search", true, &serde_json::json!(long_value), None);
        assert!(!rendered.contains("\"truncated\""));
        assert!(rendered.contains(&long_value));
    }
}
