//! The Orchestrator (§4.1) — the per-step state machine driving one turn of
//! an agent: builds the prompt, calls the LLM, parses and dispatches its
//! reply, executes tools with dedupe and loop-breaking, and persists the
//! resulting state. Grounded on the teacher's `AgentEngine::run` loop
//! (`engine.rs`) for the overall step/run shape, generalized from the fixed
//! ReAct transition table to the richer action set in `state.rs`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::canonical::canonical_hash;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::events::{Event, SharedEventManager};
use crate::llm::communicator::LlmCommunicator;
use crate::llm::{FunctionCallingLlmClient, FunctionSpec, LlmClient};
use crate::loop_detector::LoopDetector;
use crate::message_builder::MessageBuilder;
use crate::metrics::SharedMetricsCollector;
use crate::reasoning::manager::ReasoningManager;
use crate::state::{
    ActionInput, AgentState, AgentTurn, ModelMessage, StepResult, ToolCallRequest,
    ToolExecutionResult,
};
use crate::status::StatusManager;
use crate::store::StateStore;
use crate::tool_executor::ToolExecutor;
use crate::tools::ToolRegistry;

/// The LLM backend an orchestrator drives. A backend that implements
/// `FunctionCallingLlmClient` is used in function-calling mode only when
/// `AgentConfig::use_function_calling` is set; otherwise it is driven
/// through its (supertrait) text-completion path (§4.3, §6).
pub enum LlmBackend {
    Text(Arc<dyn LlmClient>),
    FunctionCalling(Arc<dyn FunctionCallingLlmClient>),
}

struct CachedResult {
    result: ToolExecutionResult,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedResult {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

pub struct Orchestrator {
    tools: Arc<ToolRegistry>,
    tool_executor: ToolExecutor,
    llm: LlmBackend,
    communicator: LlmCommunicator,
    reasoning: ReasoningManager,
    loop_detector: LoopDetector,
    status: StatusManager,
    events: SharedEventManager,
    metrics: SharedMetricsCollector,
    store: Arc<dyn StateStore>,
    config: AgentConfig,
    dedupe_cache: Mutex<HashMap<String, CachedResult>>,
}

impl Orchestrator {
    pub fn new(
        tools: Arc<ToolRegistry>,
        llm: LlmBackend,
        events: SharedEventManager,
        metrics: SharedMetricsCollector,
        store: Arc<dyn StateStore>,
        config: AgentConfig,
    ) -> Self {
        let tool_executor = ToolExecutor::new(
            tools.clone(),
            events.clone(),
            metrics.clone(),
            config.tool_timeout,
        );
        let communicator =
            LlmCommunicator::new(events.clone(), metrics.clone(), config.llm_timeout);
        let reasoning = ReasoningManager::from_config(&config);
        let loop_detector = LoopDetector::new(config.loop_detector_window);
        let status = StatusManager::new(events.clone(), config.emit_public_status);

        Self {
            tools,
            tool_executor,
            llm,
            communicator,
            reasoning,
            loop_detector,
            status,
            events,
            metrics,
            store,
            config,
            dedupe_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Executes a single step and returns its outcome. Persists the updated
    /// state to the configured `StateStore` before returning, so a crash
    /// between steps never loses a completed turn (§3 Ownership, §5).
    pub async fn step(
        &self,
        state: &mut AgentState,
        cancellation: &CancellationToken,
    ) -> Result<StepResult, AgentError> {
        if cancellation.is_cancelled() {
            return Err(AgentError::Cancelled(
                "cancelled before step start".to_string(),
            ));
        }

        let turn_index = state.next_index();
        self.events.emit(Event::StepStarted {
            agent_id: state.agent_id.clone(),
            turn_index,
        });
        self.metrics.record_step();

        let last_turn_failed = state
            .turns
            .last()
            .and_then(|t| t.tool_result.as_ref())
            .map(|r| !r.success)
            .unwrap_or(false);
        if self.reasoning.should_perform_reasoning(
            turn_index,
            state.reasoning_type,
            last_turn_failed,
        ) {
            self.apply_reasoning_insight(state).await;
        }

        let builder = MessageBuilder::new(&self.config);
        let messages = builder.build(state, &self.tools);

        let llm_outcome = self
            .call_llm(&state.agent_id, turn_index, &messages)
            .await;

        let message = match llm_outcome {
            Ok(message) => message,
            Err(error) if error.is_fatal_to_step() => return Err(error),
            Err(error) => {
                let error_text = failed_llm_call_text(&error);
                let synthetic = ModelMessage::synthetic_retry(error_text.clone());
                let failure = ToolExecutionResult {
                    success: false,
                    tool: String::new(),
                    params: crate::state::ParamMap::new(),
                    output: serde_json::Value::Null,
                    error: Some(error_text.clone()),
                    execution_time: Duration::ZERO,
                    turn_id: format!("error-{turn_index}"),
                    created_utc: chrono::Utc::now(),
                };
                let mut turn = AgentTurn::from_message(
                    format!("error-{turn_index}"),
                    synthetic.clone(),
                );
                turn.tool_result = Some(failure.clone());
                state.push_turn(turn);
                self.status.emit_status(
                    &state.agent_id,
                    "Invalid model output".to_string(),
                    Some(error_text.clone()),
                    None,
                    None,
                );
                self.store.save(state).await;
                let step = StepResult {
                    continue_: true,
                    executed_tool: false,
                    tool_result: Some(failure),
                    llm_message: Some(synthetic),
                    final_output: None,
                    error: Some(error_text),
                };
                self.finish_step(state, turn_index, &step).await;
                return Ok(step);
            }
        };

        if let Some(title) = &message.status_title {
            self.status.emit_status(
                &state.agent_id,
                title.clone(),
                message.status_details.clone(),
                message.next_step_hint.clone(),
                message.progress_pct,
            );
        }

        let step = match &message.action_input {
            ActionInput::Plan { .. } | ActionInput::Retry { .. } => {
                state.push_turn(AgentTurn::from_message(
                    format!("turn-{turn_index}"),
                    message.clone(),
                ));
                StepResult {
                    continue_: true,
                    executed_tool: false,
                    tool_result: None,
                    llm_message: Some(message),
                    final_output: None,
                    error: None,
                }
            }
            ActionInput::Finish { final_answer } => {
                let final_answer = final_answer.clone();
                state.push_turn(AgentTurn::from_message(
                    format!("turn-{turn_index}"),
                    message.clone(),
                ));
                StepResult {
                    continue_: false,
                    executed_tool: false,
                    tool_result: None,
                    llm_message: Some(message),
                    final_output: Some(final_answer),
                    error: None,
                }
            }
            ActionInput::ToolCall { tool, params } => {
                let tool = tool.clone();
                let params = params.clone();
                self.dispatch_tool_call(state, turn_index, message, tool, params, cancellation)
                    .await
            }
            ActionInput::MultiToolCall { tool_calls } => {
                let tool_calls = tool_calls.clone();
                self.dispatch_multi_tool_call(state, turn_index, message, tool_calls, cancellation)
                    .await
            }
        };

        self.store.save(state).await;
        self.finish_step(state, turn_index, &step).await;
        Ok(step)
    }

    /// Drives steps until the agent finishes, a fatal error occurs, or
    /// `max_turns` is exhausted (§4.1 convenience driver).
    pub async fn run_to_completion(
        &self,
        state: &mut AgentState,
        cancellation: &CancellationToken,
    ) -> Result<StepResult, AgentError> {
        self.events.emit(Event::RunStarted {
            agent_id: state.agent_id.clone(),
        });
        self.metrics.record_agent_run();

        let mut last = StepResult::default();
        while state.turns.len() < self.config.max_turns {
            last = self.step(state, cancellation).await?;
            if !last.continue_ {
                break;
            }
        }

        self.events.emit(Event::RunCompleted {
            agent_id: state.agent_id.clone(),
            final_output: last.final_output.clone(),
        });
        Ok(last)
    }

    async fn call_llm(
        &self,
        agent_id: &str,
        turn_index: usize,
        messages: &[crate::message_builder::PromptMessage],
    ) -> Result<ModelMessage, AgentError> {
        match &self.llm {
            LlmBackend::Text(client) => {
                self.communicator
                    .call_and_parse(client.as_ref(), agent_id, turn_index, messages)
                    .await
            }
            LlmBackend::FunctionCalling(client) if self.config.use_function_calling => {
                let functions: Vec<FunctionSpec> = self
                    .tools
                    .catalog()
                    .into_iter()
                    .map(|(name, description, parameters)| FunctionSpec {
                        name,
                        description,
                        parameters,
                    })
                    .collect();
                match self
                    .communicator
                    .call_with_functions(client.as_ref(), agent_id, turn_index, messages, &functions)
                    .await
                {
                    Err(AgentError::Unsupported(_)) => {
                        // Backend declined function-calling mode for this
                        // request; retry once in plain text mode (§9,
                        // scenario 6).
                        self.communicator
                            .call_and_parse(client.as_ref(), agent_id, turn_index, messages)
                            .await
                    }
                    other => other,
                }
            }
            LlmBackend::FunctionCalling(client) => {
                self.communicator
                    .call_and_parse(client.as_ref(), agent_id, turn_index, messages)
                    .await
            }
        }
    }

    /// Single-tool dispatch (§4.1.a): checks the loop detector, then the
    /// dedupe cache, before actually invoking the tool.
    async fn dispatch_tool_call(
        &self,
        state: &mut AgentState,
        turn_index: usize,
        message: ModelMessage,
        tool: String,
        params: crate::state::ParamMap,
        cancellation: &CancellationToken,
    ) -> StepResult {
        let tool_call = ToolCallRequest {
            tool: tool.clone(),
            params: params.clone(),
        };
        let (result, was_repeating) = self
            .run_tool_pipeline(state, turn_index, &tool, params, cancellation)
            .await;

        state.push_turn(AgentTurn::from_tool_call(
            message.clone(),
            tool_call,
            result.clone(),
        ));
        self.push_loop_break_hint(state, turn_index, &tool, was_repeating);

        StepResult {
            continue_: true,
            executed_tool: true,
            tool_result: Some(result),
            llm_message: Some(message),
            final_output: None,
            error: None,
        }
    }

    /// Runs the §4.1.a pipeline for one `(tool, params)` pair: loop-detector
    /// precheck, dedupe-cache lookup/insert, then (on a miss) the actual
    /// invocation. Shared by `dispatch_tool_call` and `dispatch_multi_tool_call`
    /// so every sub-call of a `multi_tool_call` gets identical treatment to a
    /// standalone `tool_call` (§4.1 step 5).
    async fn run_tool_pipeline(
        &self,
        state: &AgentState,
        turn_index: usize,
        tool: &str,
        params: crate::state::ParamMap,
        cancellation: &CancellationToken,
    ) -> (ToolExecutionResult, bool) {
        let turn_id = canonical_hash(tool, &params);
        // Checked before this call's own turn is pushed, so a flagged call
        // still executes once more (§8 scenario 4) — the loop detector only
        // adds a hint turn alongside it, it never withholds execution.
        let was_repeating = self.loop_detector.detect_repeated_failures(state, &turn_id);

        let allow_dedupe = self
            .tools
            .get(tool)
            .map(|t| t.allow_dedupe())
            .unwrap_or(true);

        if allow_dedupe {
            if let Some(cached) = self.dedupe_cache.lock().unwrap().get(&turn_id) {
                if !cached.is_expired() {
                    return (cached.result.clone(), was_repeating);
                }
            }
        }

        let result = self
            .tool_executor
            .execute(&state.agent_id, turn_index, tool, params, cancellation)
            .await;

        if allow_dedupe && result.success {
            let ttl = self
                .tools
                .get(tool)
                .and_then(|t| t.custom_ttl())
                .unwrap_or(self.config.dedupe_default_ttl);
            self.dedupe_cache.lock().unwrap().insert(
                turn_id,
                CachedResult {
                    result: result.clone(),
                    cached_at: Instant::now(),
                    ttl,
                },
            );
        }

        (result, was_repeating)
    }

    /// Appends a synthetic retry turn advising a different approach when the
    /// call just dispatched was already repeating (§4.5, §8 scenario 4: the
    /// call still executes, the hint is additive rather than a substitute).
    fn push_loop_break_hint(
        &self,
        state: &mut AgentState,
        turn_index: usize,
        tool: &str,
        was_repeating: bool,
    ) {
        if !was_repeating {
            return;
        }
        let hint = ModelMessage::synthetic_retry(format!(
            "repeating the same failing call to '{tool}'; try a different approach"
        ));
        state.push_turn(AgentTurn::from_message(
            format!("loop-break-{turn_index}"),
            hint,
        ));
    }

    /// Multi-tool dispatch (§4.1 step 5, `multi_tool_call`): sub-calls run
    /// strictly in listed order, each through the same §4.1.a pipeline as a
    /// standalone `tool_call` (loop-detector precheck, dedupe, retry-hint).
    /// Stops at the first terminating failure (§7: any non-cancel error kind
    /// is recorded as `success=false`), but every call attempted up to and
    /// including that one is appended to history.
    async fn dispatch_multi_tool_call(
        &self,
        state: &mut AgentState,
        turn_index: usize,
        message: ModelMessage,
        tool_calls: Vec<crate::state::SubToolCall>,
        cancellation: &CancellationToken,
    ) -> StepResult {
        let mut requests = Vec::with_capacity(tool_calls.len());
        let mut results: Vec<ToolExecutionResult> = Vec::with_capacity(tool_calls.len());
        let mut aborted_on: Option<String> = None;

        for call in tool_calls {
            let request = ToolCallRequest {
                tool: call.tool.clone(),
                params: call.params.clone(),
            };
            let (result, was_repeating) = self
                .run_tool_pipeline(state, turn_index, &call.tool, call.params, cancellation)
                .await;
            self.push_loop_break_hint(state, turn_index, &call.tool, was_repeating);

            let terminating_failure = !result.success;
            requests.push(request);
            results.push(result);

            if terminating_failure {
                aborted_on = Some(call.tool);
                break;
            }
        }

        let last_result = results.last().cloned();
        let turn_id = results
            .first()
            .map(|r| r.turn_id.clone())
            .unwrap_or_else(|| format!("multi-{turn_index}"));

        let mut turn = AgentTurn::from_message(turn_id, message.clone());
        turn.tool_calls = requests;
        turn.tool_results = results;
        state.push_turn(turn);

        StepResult {
            continue_: true,
            executed_tool: true,
            tool_result: last_result,
            llm_message: Some(message),
            final_output: None,
            error: aborted_on
                .map(|tool| format!("multi_tool_call aborted: '{tool}' failed")),
        }
    }

    /// Rewrites `state.goal` with a truncated reasoning conclusion (§9
    /// decision: capped at `max_reasoning_insight_len` chars with a
    /// `"… [truncated]"` suffix).
    async fn apply_reasoning_insight(&self, state: &mut AgentState) {
        let Some(client) = self.reasoning_llm_client() else {
            return;
        };
        let reasoning_type = state.reasoning_type;

        let start = Instant::now();
        let result = self
            .reasoning
            .reason(reasoning_type, &state.goal, client.as_ref())
            .await;
        self.metrics.record_reasoning_execution_time(
            &state.goal,
            reasoning_type_label(reasoning_type),
            start.elapsed().as_millis() as u64,
        );

        if !result.success {
            return;
        }

        // §4.6 "State merge": record which engine produced this result.
        state.reasoning_type = reasoning_type;

        if let Some(chain) = &result.chain {
            self.metrics.record_reasoning_confidence(
                &state.goal,
                reasoning_type_label(reasoning_type),
                chain.mean_confidence(),
            );
            state.current_reasoning_chain = Some(chain.clone());
        }
        state.current_reasoning_tree = result.tree.clone();

        let mut insight = result.conclusion;
        if insight.len() > self.config.max_reasoning_insight_len {
            insight.truncate(self.config.max_reasoning_insight_len);
            insight.push_str("\u{2026} [truncated]");
        }
        if !insight.is_empty() {
            state.goal = format!("{}\n\nReasoning insight: {insight}", state.goal);
        }
    }

    fn reasoning_llm_client(&self) -> Option<Arc<dyn LlmClient>> {
        match &self.llm {
            LlmBackend::Text(client) => Some(client.clone()),
            LlmBackend::FunctionCalling(client) => Some(client.clone().as_llm_client()),
        }
    }

    async fn finish_step(&self, state: &AgentState, turn_index: usize, step: &StepResult) {
        self.events.emit(Event::StepCompleted {
            agent_id: state.agent_id.clone(),
            turn_index,
            continue_: step.continue_,
        });
    }
}

/// Distinct failed-turn text per `AgentError` kind (§4.3): a timeout reads
/// differently from a provider exception or an actually-malformed reply, and
/// the model should see which one it hit.
fn failed_llm_call_text(error: &AgentError) -> String {
    match error {
        AgentError::Timeout(msg) => format!("LLM deadline exceeded: {msg}"),
        AgentError::Execution(msg) => format!("LLM call failed: {msg}"),
        AgentError::JsonParse(msg) => format!("Invalid LLM JSON: {msg}"),
        other => format!("LLM call failed: {other}"),
    }
}

fn reasoning_type_label(reasoning_type: crate::config::ReasoningType) -> &'static str {
    use crate::config::ReasoningType;
    match reasoning_type {
        ReasoningType::None => "none",
        ReasoningType::ChainOfThought => "chain_of_thought",
        ReasoningType::TreeOfThoughts => "tree_of_thoughts",
        ReasoningType::Hybrid => "hybrid",
    }
}
