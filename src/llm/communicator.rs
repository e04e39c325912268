//! The LLM Communicator (§4.3) — drives one LLM round: builds the call,
//! races it against the configured timeout, parses the reply into a
//! `ModelMessage`, and records usage with the Metrics Collector. Grounded on
//! the teacher's `llm::retry::RetryingLlmCaller` for the timeout/error-kind
//! sniffing shape and `memory::build_messages` for message assembly,
//! generalized to the dual text/function-calling contract.

use std::time::{Duration, Instant};

use crate::error::AgentError;
use crate::events::{Event, SharedEventManager};
use crate::message_builder::PromptMessage;
use crate::metrics::SharedMetricsCollector;
use crate::state::{Action, ActionInput, ModelMessage};

use super::{FunctionCallResult, FunctionCallingLlmClient, FunctionSpec, LlmClient};

pub struct LlmCommunicator {
    events: SharedEventManager,
    metrics: SharedMetricsCollector,
    llm_timeout: Duration,
}

impl LlmCommunicator {
    pub fn new(
        events: SharedEventManager,
        metrics: SharedMetricsCollector,
        llm_timeout: Duration,
    ) -> Self {
        Self {
            events,
            metrics,
            llm_timeout,
        }
    }

    /// Text-mode call: send `messages`, parse the reply as a `ModelMessage`
    /// JSON object (§4.3). Emits `LlmCallStarted`/`LlmCallCompleted` in that
    /// fixed order (§5) regardless of outcome.
    pub async fn call_and_parse<C: LlmClient + ?Sized>(
        &self,
        client: &C,
        agent_id: &str,
        turn_index: usize,
        messages: &[PromptMessage],
    ) -> Result<ModelMessage, AgentError> {
        self.events.emit(Event::LlmCallStarted {
            agent_id: agent_id.to_string(),
            turn_index,
        });

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.llm_timeout, client.complete(messages)).await;
        let elapsed = start.elapsed();

        let result = match outcome {
            Err(_elapsed) => Err(AgentError::Timeout(format!(
                "llm call exceeded {:?}",
                self.llm_timeout
            ))),
            Ok(Err(message)) => Err(AgentError::Execution(message)),
            Ok(Ok(response)) => {
                self.metrics.record_llm_call(
                    &response.model,
                    "generic",
                    response.usage,
                    elapsed.as_millis() as u64,
                );
                parse_json_response(&response.text).map_err(AgentError::JsonParse)
            }
        };

        self.events.emit(Event::LlmCallCompleted {
            agent_id: agent_id.to_string(),
            turn_index,
            model_message: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(|e| e.to_string()),
        });

        result
    }

    /// Function-calling-mode call: send `messages` plus the tool catalog as
    /// `functions`. A plain-text reply (the model declined to call a
    /// function) falls back to `parse_json_response` (§4.3, §9); a function
    /// call is normalized into a `tool_call` `ModelMessage` via
    /// `normalize_function_call_to_react`.
    pub async fn call_with_functions(
        &self,
        client: &dyn FunctionCallingLlmClient,
        agent_id: &str,
        turn_index: usize,
        messages: &[PromptMessage],
        functions: &[FunctionSpec],
    ) -> Result<ModelMessage, AgentError> {
        self.events.emit(Event::LlmCallStarted {
            agent_id: agent_id.to_string(),
            turn_index,
        });

        let start = Instant::now();
        let outcome = tokio::time::timeout(
            self.llm_timeout,
            client.complete_with_functions(messages, functions),
        )
        .await;
        let elapsed = start.elapsed();

        let result = match outcome {
            Err(_elapsed) => Err(AgentError::Timeout(format!(
                "llm call exceeded {:?}",
                self.llm_timeout
            ))),
            Ok(Err(message)) => Err(AgentError::Execution(message)),
            Ok(Ok((call_result, usage, model))) => {
                self.metrics
                    .record_llm_call(&model, "generic", usage, elapsed.as_millis() as u64);
                match call_result {
                    FunctionCallResult::FunctionCall { name, arguments } => {
                        Ok(normalize_function_call_to_react(name, arguments))
                    }
                    FunctionCallResult::Text(text) => {
                        parse_json_response(&text).map_err(AgentError::JsonParse)
                    }
                    FunctionCallResult::Unsupported => Err(AgentError::Unsupported(
                        "function calling is not supported by this backend".to_string(),
                    )),
                }
            }
        };

        self.events.emit(Event::LlmCallCompleted {
            agent_id: agent_id.to_string(),
            turn_index,
            model_message: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(|e| e.to_string()),
        });

        result
    }
}

/// Converts a structured function call into the equivalent `tool_call`
/// `ModelMessage`, so the orchestrator dispatches it through the same path
/// as a text-mode reply (§4.3, §9 — "normalize to ReAct shape").
fn normalize_function_call_to_react(name: String, arguments: serde_json::Value) -> ModelMessage {
    let params = match arguments {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        other => {
            let mut params = crate::state::ParamMap::new();
            params.insert("value".to_string(), other);
            params
        }
    };

    ModelMessage {
        thoughts: String::new(),
        action: Action::ToolCall,
        action_raw: "tool_call".to_string(),
        action_input: ActionInput::ToolCall { tool: name, params },
        status_title: None,
        status_details: None,
        next_step_hint: None,
        progress_pct: None,
    }
}

/// Extracts the first balanced `{...}` block from `text` and parses it as a
/// `ModelMessage` (§4.3). Models frequently wrap JSON in prose or markdown
/// fences; this scans for brace balance rather than requiring the whole
/// reply to be valid JSON.
pub fn parse_json_response(text: &str) -> Result<ModelMessage, String> {
    parse_json_value(text)
}

/// Generic version of [`parse_json_response`], used by the reasoning
/// engines to pull their own JSON-shaped replies (step lists, thought trees)
/// out of a raw completion (§4.6).
pub fn parse_json_value<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, String> {
    let candidate = extract_balanced_object(text)
        .ok_or_else(|| "no JSON object found in LLM response".to_string())?;
    serde_json::from_str(&candidate).map_err(|e| format!("invalid JSON object: {e}"))
}

fn extract_balanced_object(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        let c = b as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
