//! LLM Communicator traits and types (§4.3, §6). Grounded on the teacher's
//! `llm::LlmCaller`/`AsyncLlmCaller` dual contract, generalized from
//! sync-bridged single-mode calls to the spec's dual text/function-calling
//! modes plus streaming usage accounting.

pub mod communicator;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::metrics::TokenUsage;

/// A plain-text completion request/response contract. Every `LlmClient`
/// implementation is concrete-backend-specific (OpenAI, Anthropic, a local
/// model) and out of scope for this crate (§1) — callers supply their own.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[crate::message_builder::PromptMessage]) -> Result<LlmTextResponse, String>;
}

#[derive(Debug, Clone)]
pub struct LlmTextResponse {
    pub text: String,
    pub usage: Option<TokenUsage>,
    pub model: String,
}

/// A function/tool the LLM may choose to call, mirrored from the tool
/// catalog (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Option<serde_json::Value>,
}

/// The outcome of a function-calling-mode request: either the model chose to
/// call a function, or it replied in plain text (§4.3 fallback).
#[derive(Debug, Clone)]
pub enum FunctionCallResult {
    FunctionCall {
        name: String,
        arguments: serde_json::Value,
    },
    Text(String),
    /// This backend cannot honor function-calling mode for this request
    /// (e.g. the underlying model doesn't support it). The Communicator
    /// falls back to a single text-mode retry (§4.3, §9, scenario 6).
    Unsupported,
}

/// Optional structured function-calling mode. A backend that doesn't support
/// it simply doesn't implement this trait; the Communicator falls back to
/// text-mode JSON parsing (§4.3, §9).
#[async_trait]
pub trait FunctionCallingLlmClient: LlmClient {
    async fn complete_with_functions(
        &self,
        messages: &[crate::message_builder::PromptMessage],
        functions: &[FunctionSpec],
    ) -> Result<(FunctionCallResult, Option<TokenUsage>, String), String>;

    /// Recovers the `LlmClient` half of this backend for callers (such as
    /// the reasoning engines) that only need text completion. Implemented
    /// per concrete type rather than derived, since going from
    /// `Arc<dyn FunctionCallingLlmClient>` to `Arc<dyn LlmClient>` is a
    /// trait-object-to-trait-object cast the compiler won't perform for us
    /// automatically from inside a default method.
    fn as_llm_client(self: Arc<Self>) -> Arc<dyn LlmClient>;
}
