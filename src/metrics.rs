//! Metrics Collector (§4.7) — counters, resource accounting, and timers.
//! The one process-wide mutable singleton named in §5; injected as
//! `Arc<dyn MetricsCollector>` rather than a global/`lazy_static`, per §9.
//!
//! Grounded on the teacher's `budget.rs` (`TokenUsage`, accumulation) for
//! the resource-accounting half, generalized with atomic counters for the
//! rest — the teacher itself had no process-wide metrics singleton, only
//! per-session token totals, so the counter/timer half is adapted from the
//! same "plain owned data behind a lock" idiom as `MockLlmCaller`'s call log.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Token usage for a single LLM call or an accumulated total (teacher:
/// `budget::TokenUsage`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

pub trait MetricsCollector: Send + Sync {
    fn record_agent_run(&self);
    fn record_step(&self);
    fn record_llm_call(&self, model: &str, provider: &str, usage: Option<TokenUsage>, elapsed_ms: u64);
    fn record_tool_call(&self, success: bool, error_kind: Option<&str>, elapsed_ms: u64);
    fn record_reasoning_execution_time(&self, goal: &str, reasoning_type: &str, elapsed_ms: u64);
    fn record_reasoning_confidence(&self, goal: &str, reasoning_type: &str, mean_confidence: f64);
    fn record_api_call(&self, agent_id: &str, category: &str, sub: &str);
}

/// Discards every recording. Useful for callers with no metrics backend.
pub struct NoopMetricsCollector;

impl MetricsCollector for NoopMetricsCollector {
    fn record_agent_run(&self) {}
    fn record_step(&self) {}
    fn record_llm_call(&self, _: &str, _: &str, _: Option<TokenUsage>, _: u64) {}
    fn record_tool_call(&self, _: bool, _: Option<&str>, _: u64) {}
    fn record_reasoning_execution_time(&self, _: &str, _: &str, _: u64) {}
    fn record_reasoning_confidence(&self, _: &str, _: &str, _: f64) {}
    fn record_api_call(&self, _: &str, _: &str, _: &str) {}
}

/// Snapshot of a single timer's accumulated stats.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimerStats {
    pub count: u64,
    pub total_ms: u64,
}

/// Reference in-process implementation. Counters are lock-free atomics;
/// per-model token totals and timer stats live behind a `Mutex` — the same
/// tradeoff the teacher makes for `MockLlmCaller`'s call log, since these
/// maps are written far less often than the hot-path counters.
#[derive(Default)]
pub struct InMemoryMetricsCollector {
    total_agent_runs: AtomicU64,
    total_steps: AtomicU64,
    total_llm_calls: AtomicU64,
    total_tool_calls: AtomicU64,
    total_tool_failures: AtomicU64,

    tokens_by_model: Mutex<HashMap<String, TokenUsage>>,
    llm_call_timer: Mutex<TimerStats>,
    tool_call_timer: Mutex<TimerStats>,
    reasoning_timer: Mutex<TimerStats>,
    api_calls: Mutex<HashMap<(String, String, String), u64>>,
}

impl InMemoryMetricsCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn total_agent_runs(&self) -> u64 {
        self.total_agent_runs.load(Ordering::Relaxed)
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps.load(Ordering::Relaxed)
    }

    pub fn total_llm_calls(&self) -> u64 {
        self.total_llm_calls.load(Ordering::Relaxed)
    }

    pub fn total_tool_calls(&self) -> u64 {
        self.total_tool_calls.load(Ordering::Relaxed)
    }

    pub fn total_tool_failures(&self) -> u64 {
        self.total_tool_failures.load(Ordering::Relaxed)
    }

    pub fn tokens_for_model(&self, model: &str) -> TokenUsage {
        self.tokens_by_model
            .lock()
            .unwrap()
            .get(model)
            .copied()
            .unwrap_or_default()
    }

    pub fn llm_call_timer(&self) -> TimerStats {
        *self.llm_call_timer.lock().unwrap()
    }

    pub fn tool_call_timer(&self) -> TimerStats {
        *self.tool_call_timer.lock().unwrap()
    }
}

impl MetricsCollector for InMemoryMetricsCollector {
    fn record_agent_run(&self) {
        self.total_agent_runs.fetch_add(1, Ordering::Relaxed);
    }

    fn record_step(&self) {
        self.total_steps.fetch_add(1, Ordering::Relaxed);
    }

    fn record_llm_call(
        &self,
        model: &str,
        provider: &str,
        usage: Option<TokenUsage>,
        elapsed_ms: u64,
    ) {
        self.total_llm_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(usage) = usage {
            let mut map = self.tokens_by_model.lock().unwrap();
            let entry = map.entry(model.to_string()).or_default();
            entry.input_tokens += usage.input_tokens;
            entry.output_tokens += usage.output_tokens;
        }
        let mut timer = self.llm_call_timer.lock().unwrap();
        timer.count += 1;
        timer.total_ms += elapsed_ms;
        tracing::debug!(model, provider, elapsed_ms, "llm call recorded");
    }

    fn record_tool_call(&self, success: bool, error_kind: Option<&str>, elapsed_ms: u64) {
        self.total_tool_calls.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.total_tool_failures.fetch_add(1, Ordering::Relaxed);
        }
        let mut timer = self.tool_call_timer.lock().unwrap();
        timer.count += 1;
        timer.total_ms += elapsed_ms;
        tracing::debug!(success, ?error_kind, elapsed_ms, "tool call recorded");
    }

    fn record_reasoning_execution_time(&self, goal: &str, reasoning_type: &str, elapsed_ms: u64) {
        let mut timer = self.reasoning_timer.lock().unwrap();
        timer.count += 1;
        timer.total_ms += elapsed_ms;
        tracing::debug!(goal, reasoning_type, elapsed_ms, "reasoning time recorded");
    }

    fn record_reasoning_confidence(&self, goal: &str, reasoning_type: &str, mean_confidence: f64) {
        tracing::debug!(goal, reasoning_type, mean_confidence, "reasoning confidence recorded");
    }

    fn record_api_call(&self, agent_id: &str, category: &str, sub: &str) {
        let key = (agent_id.to_string(), category.to_string(), sub.to_string());
        *self.api_calls.lock().unwrap().entry(key).or_insert(0) += 1;
    }
}

pub type SharedMetricsCollector = Arc<dyn MetricsCollector>;
