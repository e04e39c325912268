//! End-to-end scenarios over `Orchestrator::step`, one agent/store/mock per
//! test (teacher style: `tests/integration_tests.rs` alongside inline
//! `#[cfg(test)]` unit tests).

use std::sync::Arc;
use std::time::Duration;

use turnloop::llm::mock::{MockFunctionCallingLlmClient, MockLlmClient};
use turnloop::llm::FunctionCallResult;
use turnloop::{
    canonical_hash, AgentConfig, AgentState, FnTool, InMemoryMetricsCollector,
    InMemoryStateStore, LlmBackend, NoopEventManager, Orchestrator, ParamMap, ToolRegistry,
};
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn add_tool() -> Arc<dyn turnloop::Tool> {
    Arc::new(
        FnTool::new("add", |params: ParamMap| async move {
            let a = params.get("a").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let b = params.get("b").and_then(|v| v.as_f64()).unwrap_or(0.0);
            Ok(serde_json::json!(a + b))
        })
        .description("adds two numbers"),
    )
}

fn orchestrator_with(tools: ToolRegistry, llm: Arc<MockLlmClient>) -> Orchestrator {
    Orchestrator::new(
        Arc::new(tools),
        LlmBackend::Text(llm),
        Arc::new(NoopEventManager),
        InMemoryMetricsCollector::new(),
        Arc::new(InMemoryStateStore::new()),
        AgentConfig::default(),
    )
}

fn add_params(a: i64, b: i64) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert("a".to_string(), serde_json::json!(a));
    params.insert("b".to_string(), serde_json::json!(b));
    params
}

#[tokio::test]
async fn simple_finish() {
    init_tracing();
    let llm = Arc::new(MockLlmClient::new());
    llm.push_text(r#"{"thoughts":"easy","action":"finish","action_input":{"final":"4"}}"#);
    let orchestrator = orchestrator_with(ToolRegistry::new(), llm);

    let mut state = AgentState::new("a1", "What is 2+2?");
    let token = CancellationToken::new();
    let step = orchestrator.step(&mut state, &token).await.unwrap();

    assert!(!step.continue_);
    assert!(!step.executed_tool);
    assert_eq!(step.final_output.as_deref(), Some("4"));
    assert_eq!(state.turns.len(), 1);
}

#[tokio::test]
async fn tool_call_success() {
    init_tracing();
    let mut tools = ToolRegistry::new();
    tools.register(add_tool());
    let llm = Arc::new(MockLlmClient::new());
    llm.push_text(
        r#"{"thoughts":"call add","action":"tool_call","action_input":{"tool":"add","params":{"a":5,"b":3}}}"#,
    );
    let orchestrator = orchestrator_with(tools, llm);

    let mut state = AgentState::new("a1", "add 5 and 3");
    let token = CancellationToken::new();
    let step = orchestrator.step(&mut state, &token).await.unwrap();

    assert!(step.continue_);
    assert!(step.executed_tool);
    let result = step.tool_result.expect("tool result");
    assert!(result.success);
    assert_eq!(result.output, serde_json::json!(8.0));
    assert_eq!(result.turn_id, canonical_hash("add", &add_params(5, 3)));
    assert_eq!(state.turns[0].turn_id, result.turn_id);
}

#[tokio::test]
async fn dedupe_hit_does_not_reinvoke() {
    init_tracing();
    let mut tools = ToolRegistry::new();
    tools.register(add_tool());
    let llm = Arc::new(MockLlmClient::new());
    llm.push_text(
        r#"{"thoughts":"call add","action":"tool_call","action_input":{"tool":"add","params":{"a":5,"b":3}}}"#,
    );
    llm.push_text(
        r#"{"thoughts":"call add again","action":"tool_call","action_input":{"tool":"add","params":{"a":5,"b":3}}}"#,
    );
    let orchestrator = orchestrator_with(tools, llm);

    let mut state = AgentState::new("a1", "add 5 and 3 twice");
    let token = CancellationToken::new();
    let first = orchestrator.step(&mut state, &token).await.unwrap();
    let second = orchestrator.step(&mut state, &token).await.unwrap();

    assert!(first.tool_result.unwrap().success);
    let reused = second.tool_result.unwrap();
    assert!(reused.success);
    assert_eq!(reused.output, serde_json::json!(8.0));
    assert_eq!(state.turns.len(), 2);
}

#[tokio::test]
async fn loop_break_after_repeated_failures() {
    init_tracing();
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(
        FnTool::new("add", |_: ParamMap| async move { Err("boom".to_string()) }).no_dedupe(),
    ));
    let llm = Arc::new(MockLlmClient::new());
    for _ in 0..4 {
        llm.push_text(
            r#"{"thoughts":"call add","action":"tool_call","action_input":{"tool":"add","params":{"a":5,"b":3}}}"#,
        );
    }
    let orchestrator = orchestrator_with(tools, llm);

    let mut state = AgentState::new("a1", "add 5 and 3 repeatedly");
    let token = CancellationToken::new();
    for _ in 0..3 {
        let step = orchestrator.step(&mut state, &token).await.unwrap();
        assert!(!step.tool_result.unwrap().success);
    }

    let fourth = orchestrator.step(&mut state, &token).await.unwrap();
    assert!(fourth.continue_);

    let has_loop_break_turn = state.turns.iter().any(|t| {
        t.llm_message
            .as_ref()
            .map(|m| match &m.action_input {
                turnloop::ActionInput::Retry { summary } => {
                    summary.contains("repeating the same failing call")
                }
                _ => false,
            })
            .unwrap_or(false)
    });
    assert!(has_loop_break_turn, "expected a synthetic loop-break retry turn");
}

#[tokio::test]
async fn invalid_json_is_recorded_not_propagated() {
    init_tracing();
    let llm = Arc::new(MockLlmClient::new());
    llm.push_text("not json");
    let orchestrator = orchestrator_with(ToolRegistry::new(), llm);

    let mut state = AgentState::new("a1", "goal");
    let token = CancellationToken::new();
    let step = orchestrator.step(&mut state, &token).await.unwrap();

    assert!(step.continue_);
    assert!(!step.executed_tool);
    let error = step.error.expect("error present");
    assert!(error.contains("Invalid LLM JSON"));
    let turn = &state.turns[0];
    let result = turn.tool_result.as_ref().expect("synthetic failure result");
    assert!(!result.success);
    assert!(result.error.as_ref().unwrap().contains("Invalid LLM JSON"));
}

#[tokio::test]
async fn function_calling_falls_back_to_text_mode_once() {
    init_tracing();
    let mock = MockFunctionCallingLlmClient::new();
    mock.push_function_result(FunctionCallResult::Unsupported);
    mock.push_text(r#"{"thoughts":"fallback","action":"finish","action_input":{"final":"ok"}}"#);

    let mut config = AgentConfig::default();
    config.use_function_calling = true;

    let orchestrator = Orchestrator::new(
        Arc::new(ToolRegistry::new()),
        LlmBackend::FunctionCalling(mock.clone()),
        Arc::new(NoopEventManager),
        InMemoryMetricsCollector::new(),
        Arc::new(InMemoryStateStore::new()),
        config,
    );

    let mut state = AgentState::new("a1", "goal");
    let token = CancellationToken::new();
    let step = orchestrator.step(&mut state, &token).await.unwrap();

    assert!(!step.continue_);
    assert_eq!(step.final_output.as_deref(), Some("ok"));
    assert_eq!(mock.text_call_count(), 1);
}

#[tokio::test]
async fn cancellation_during_tool_call_is_recorded_not_propagated() {
    init_tracing();
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(FnTool::new("slow", |_: ParamMap| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(serde_json::Value::Null)
    })));
    let llm = Arc::new(MockLlmClient::new());
    llm.push_text(
        r#"{"thoughts":"call slow","action":"tool_call","action_input":{"tool":"slow","params":{}}}"#,
    );
    let orchestrator = orchestrator_with(tools, llm);

    let state = AgentState::new("a1", "goal");
    let token = CancellationToken::new();

    // Cancel mid-flight, after `step` has entered the tool invocation but
    // before the tool's own sleep resolves — exercising the "cancelled
    // during a tool call" half of the §9 decision, not the "cancelled
    // before step start" half.
    let step_token = token.clone();
    let stepped = tokio::spawn(async move {
        let mut state = state;
        orchestrator.step(&mut state, &step_token).await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();
    let step = stepped.await.unwrap().unwrap();

    assert!(step.continue_);
    let result = step.tool_result.expect("tool result");
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("cancelled by user"));
}
