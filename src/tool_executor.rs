//! Tool Executor (§4.4) — looks up a tool, validates its parameters, invokes
//! it under a timeout (racing caller cancellation), classifies the outcome,
//! and produces a `ToolExecutionResult`. Grounded on the teacher's
//! `ToolRegistry::execute` for the lookup/invoke shape, generalized with
//! async invocation, a timeout race (teacher has none), and the two-shaped
//! validation failure named in §4.4.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::canonical::canonical_hash;
use crate::events::{Event, SharedEventManager};
use crate::metrics::SharedMetricsCollector;
use crate::state::{ParamMap, ToolExecutionResult};
use crate::tools::{validate_params, ToolRegistry, ValidationFailure};

pub struct ToolExecutor {
    tools: Arc<ToolRegistry>,
    events: SharedEventManager,
    metrics: SharedMetricsCollector,
    tool_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(
        tools: Arc<ToolRegistry>,
        events: SharedEventManager,
        metrics: SharedMetricsCollector,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            tools,
            events,
            metrics,
            tool_timeout,
        }
    }

    /// Executes one tool call. Never returns an error — unknown tool, failed
    /// validation, timeout, cancellation, and tool-reported error are all
    /// folded into a `ToolExecutionResult { success: false, .. }` (§4.4,
    /// §9's cancellation decision: a tool invocation cancelled mid-flight is
    /// recorded as a failed turn, not propagated out of `Orchestrator::step`
    /// — only cancellation observed between suspension points propagates).
    pub async fn execute(
        &self,
        agent_id: &str,
        turn_index: usize,
        tool: &str,
        params: ParamMap,
        cancellation: &CancellationToken,
    ) -> ToolExecutionResult {
        let turn_id = canonical_hash(tool, &params);
        let start = Instant::now();

        self.events.emit(Event::ToolCallStarted {
            agent_id: agent_id.to_string(),
            turn_index,
            tool: tool.to_string(),
            params: params.clone(),
        });

        if cancellation.is_cancelled() {
            let result = self.failure_result(
                tool,
                params,
                "cancelled by user".to_string(),
                turn_id,
                start.elapsed(),
            );
            self.finish(agent_id, turn_index, &result);
            return result;
        }

        let Some(handle) = self.tools.get(tool) else {
            let result = self.failure_result(
                tool,
                params,
                format!("no such tool: '{tool}'"),
                turn_id,
                start.elapsed(),
            );
            self.finish(agent_id, turn_index, &result);
            return result;
        };

        if let Some(schema) = handle.parameter_schema() {
            let failure = validate_params(&schema, &params);
            if !failure.is_empty() {
                let result = self.validation_failure_result(
                    tool,
                    params,
                    &failure,
                    turn_id,
                    start.elapsed(),
                );
                self.finish(agent_id, turn_index, &result);
                return result;
            }
        }

        let invocation = handle.invoke(&params);
        let timed = tokio::time::timeout(self.tool_timeout, invocation);

        let outcome = tokio::select! {
            biased;
            _ = cancellation.cancelled() => None,
            res = timed => Some(res),
        };

        let result = match outcome {
            None => self.failure_result(
                tool,
                params,
                "cancelled by user".to_string(),
                turn_id,
                start.elapsed(),
            ),
            Some(Err(_elapsed)) => self.failure_result(
                tool,
                params,
                format!("tool '{tool}' timed out after {:?}", self.tool_timeout),
                turn_id,
                start.elapsed(),
            ),
            Some(Ok(Err(message))) => {
                self.failure_result(tool, params, message, turn_id, start.elapsed())
            }
            Some(Ok(Ok(output))) => ToolExecutionResult {
                success: true,
                tool: tool.to_string(),
                params,
                output,
                error: None,
                execution_time: start.elapsed(),
                turn_id,
                created_utc: Utc::now(),
            },
        };

        self.finish(agent_id, turn_index, &result);
        result
    }

    fn failure_result(
        &self,
        tool: &str,
        params: ParamMap,
        error: String,
        turn_id: String,
        execution_time: Duration,
    ) -> ToolExecutionResult {
        ToolExecutionResult {
            success: false,
            tool: tool.to_string(),
            params,
            output: serde_json::Value::Null,
            error: Some(error),
            execution_time,
            turn_id,
            created_utc: Utc::now(),
        }
    }

    /// Validation failures carry `missing_required`/`field_errors` in
    /// `output`, not just folded into the error string, so the model can
    /// inspect the structured lists (§4.4 step 2).
    fn validation_failure_result(
        &self,
        tool: &str,
        params: ParamMap,
        failure: &ValidationFailure,
        turn_id: String,
        execution_time: Duration,
    ) -> ToolExecutionResult {
        ToolExecutionResult {
            success: false,
            tool: tool.to_string(),
            params,
            output: failure.to_output(),
            error: Some(format!("validation failed: {}", failure.to_output())),
            execution_time,
            turn_id,
            created_utc: Utc::now(),
        }
    }

    fn finish(&self, agent_id: &str, turn_index: usize, result: &ToolExecutionResult) {
        self.events.emit(Event::ToolCallCompleted {
            agent_id: agent_id.to_string(),
            turn_index,
            tool: result.tool.clone(),
            success: result.success,
            output: if result.success {
                Some(result.output.clone())
            } else {
                None
            },
            error: result.error.clone(),
            elapsed: result.execution_time,
        });

        let error_kind = if result.success {
            None
        } else {
            Some("tool_failure")
        };
        self.metrics.record_tool_call(
            result.success,
            error_kind,
            result.execution_time.as_millis() as u64,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventManager;
    use crate::metrics::NoopMetricsCollector;
    use crate::tools::FnTool;

    fn executor(tools: ToolRegistry) -> (ToolExecutor, Arc<RecordingEventManager>) {
        let events = Arc::new(RecordingEventManager::new());
        let metrics: SharedMetricsCollector = Arc::new(NoopMetricsCollector);
        let executor = ToolExecutor::new(
            Arc::new(tools),
            events.clone(),
            metrics,
            Duration::from_millis(100),
        );
        (executor, events)
    }

    #[tokio::test]
    async fn unknown_tool_yields_failure_result() {
        let (executor, _events) = executor(ToolRegistry::new());
        let token = CancellationToken::new();
        let result = executor
            .execute("a1", 0, "missing", ParamMap::new(), &token)
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("no such tool"));
    }

    #[tokio::test]
    async fn successful_invocation_reports_output() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new("echo", |params: ParamMap| async move {
            Ok(serde_json::to_value(params).unwrap())
        })));
        let (executor, events) = executor(registry);
        let token = CancellationToken::new();
        let mut params = ParamMap::new();
        params.insert("x".to_string(), serde_json::json!(1));
        let result = executor.execute("a1", 0, "echo", params, &token).await;
        assert!(result.success);
        assert_eq!(events.events().len(), 2);
    }

    #[tokio::test]
    async fn timeout_is_reported_as_failure() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new("slow", |_: ParamMap| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(serde_json::Value::Null)
        })));
        let events = Arc::new(RecordingEventManager::new());
        let metrics: SharedMetricsCollector = Arc::new(NoopMetricsCollector);
        let executor = ToolExecutor::new(
            Arc::new(registry),
            events,
            metrics,
            Duration::from_millis(1),
        );
        let token = CancellationToken::new();
        let result = executor.execute("a1", 0, "slow", ParamMap::new(), &token).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn cancellation_is_recorded_not_propagated() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new("slow", |_: ParamMap| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(serde_json::Value::Null)
        })));
        let (executor, _events) = executor(registry);
        let token = CancellationToken::new();
        token.cancel();
        let result = executor.execute("a1", 0, "slow", ParamMap::new(), &token).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("cancelled by user"));
    }
}
