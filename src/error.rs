//! Error taxonomy (§7). One variant per error kind named in the spec; every
//! variant except [`AgentError::Cancelled`] is recorded as a failed turn by
//! the orchestrator rather than propagated — see `orchestrator.rs`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("parameter validation failed: {0}")]
    Validation(String),

    #[error("tool execution error: {0}")]
    Execution(String),

    #[error("deadline exceeded: {0}")]
    Timeout(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("unsupported capability: {0}")]
    Unsupported(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl AgentError {
    /// The taxonomy tag used in metrics (`api_call` categorical) and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::InvalidInput(_) => "invalid_input",
            AgentError::JsonParse(_) => "json_parse",
            AgentError::Validation(_) => "validation",
            AgentError::Execution(_) => "execution",
            AgentError::Timeout(_) => "timeout",
            AgentError::Cancelled(_) => "cancelled",
            AgentError::Unsupported(_) => "unsupported",
            AgentError::InvalidOperation(_) => "invalid_operation",
            AgentError::InternalError(_) => "internal_error",
        }
    }

    /// True for the one error kind that propagates out of a step (§7) rather
    /// than being recorded as a failed turn.
    pub fn is_fatal_to_step(&self) -> bool {
        matches!(self, AgentError::Cancelled(_))
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(e: anyhow::Error) -> Self {
        AgentError::InternalError(e.to_string())
    }
}
