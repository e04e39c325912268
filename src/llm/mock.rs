//! `MockLlmClient` — a test double grounded on the teacher's `MockLlmCaller`
//! (`Mutex`-guarded queue of canned responses plus a call log).

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::{FunctionCallResult, FunctionCallingLlmClient, FunctionSpec, LlmClient, LlmTextResponse};
use crate::message_builder::PromptMessage;
use crate::metrics::TokenUsage;

pub struct MockLlmClient {
    responses: Mutex<Vec<Result<LlmTextResponse, String>>>,
    call_log: Mutex<Vec<Vec<PromptMessage>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Queues one reply. Replies are served in FIFO order; calling past the
    /// end of the queue is a test bug and panics loudly rather than looping
    /// the last response silently.
    pub fn push_text(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push(Ok(LlmTextResponse {
            text: text.into(),
            usage: Some(TokenUsage::new(10, 10)),
            model: "mock-model".to_string(),
        }));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        self.responses.lock().unwrap().push(Err(message.into()));
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<Vec<PromptMessage>> {
        self.call_log.lock().unwrap().clone()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<LlmTextResponse, String> {
        self.call_log.lock().unwrap().push(messages.to_vec());
        let mut queue = self.responses.lock().unwrap();
        if queue.is_empty() {
            panic!("MockLlmClient: no queued response for call {}", self.call_log.lock().unwrap().len());
        }
        queue.remove(0)
    }
}

/// A function-calling-mode test double layered on top of a plain
/// `MockLlmClient` for its text-mode fallback path. Queues canned
/// `FunctionCallResult`s independently of the text queue, so a test can
/// script "returns unsupported, then falls back to text mode" (scenario 6).
pub struct MockFunctionCallingLlmClient {
    inner: MockLlmClient,
    function_responses: Mutex<Vec<Result<FunctionCallResult, String>>>,
}

impl MockFunctionCallingLlmClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MockLlmClient::new(),
            function_responses: Mutex::new(Vec::new()),
        })
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.inner.push_text(text);
    }

    pub fn push_function_result(&self, result: FunctionCallResult) {
        self.function_responses.lock().unwrap().push(Ok(result));
    }

    pub fn push_function_error(&self, message: impl Into<String>) {
        self.function_responses
            .lock()
            .unwrap()
            .push(Err(message.into()));
    }

    pub fn text_call_count(&self) -> usize {
        self.inner.call_count()
    }
}

#[async_trait]
impl LlmClient for MockFunctionCallingLlmClient {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<LlmTextResponse, String> {
        self.inner.complete(messages).await
    }
}

#[async_trait]
impl FunctionCallingLlmClient for MockFunctionCallingLlmClient {
    async fn complete_with_functions(
        &self,
        _messages: &[PromptMessage],
        _functions: &[FunctionSpec],
    ) -> Result<(FunctionCallResult, Option<TokenUsage>, String), String> {
        let mut queue = self.function_responses.lock().unwrap();
        if queue.is_empty() {
            panic!("MockFunctionCallingLlmClient: no queued function response");
        }
        let result = queue.remove(0)?;
        Ok((result, Some(TokenUsage::new(10, 10)), "mock-model".to_string()))
    }

    fn as_llm_client(self: Arc<Self>) -> Arc<dyn LlmClient> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_queued_responses_in_order() {
        let mock = MockLlmClient::new();
        mock.push_text("first");
        mock.push_text("second");
        let r1 = mock.complete(&[]).await.unwrap();
        let r2 = mock.complete(&[]).await.unwrap();
        assert_eq!(r1.text, "first");
        assert_eq!(r2.text, "second");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn function_calling_mock_falls_back_to_text_queue() {
        let mock = MockFunctionCallingLlmClient::new();
        mock.push_function_result(FunctionCallResult::Unsupported);
        mock.push_text("fallback reply");
        let (result, _, _) = mock.complete_with_functions(&[], &[]).await.unwrap();
        assert!(matches!(result, FunctionCallResult::Unsupported));
        let text = mock.complete(&[]).await.unwrap();
        assert_eq!(text.text, "fallback reply");
        assert_eq!(mock.text_call_count(), 1);
    }
}
