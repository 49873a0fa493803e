//! Error types for the AI crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `LlmError`: Completion backend operations
//! - `ToolError`: Tool execution
//! - `AiError`: Conversation Loop failures, also used as context wrapper
//!   around the two above

use std::fmt;

/// Errors from completion backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Request could not be sent or the backend answered with an error status.
    RequestFailed { reason: String },
    /// Response parsing failed.
    ResponseParseFailed { reason: String },
    /// Rate limit exceeded.
    RateLimited { retry_after_secs: Option<u64> },
    /// Invalid configuration.
    InvalidConfig { reason: String },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestFailed { reason } => {
                write!(f, "LLM request failed: {reason}")
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse LLM response: {reason}")
            }
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid LLM configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for LlmError {}

/// Errors raised by tool implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Tool execution failed.
    ExecutionFailed { name: String, reason: String },
    /// Arguments were well-formed JSON but unusable by the tool.
    InvalidInput { name: String, reason: String },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { name, reason } => {
                write!(f, "tool '{name}' execution failed: {reason}")
            }
            Self::InvalidInput { name, reason } => {
                write!(f, "invalid input for tool '{name}': {reason}")
            }
        }
    }
}

impl std::error::Error for ToolError {}

/// Conversation Loop errors.
///
/// Every variant is fatal to the loop invocation that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    /// The backend answered without a message.
    EmptyBackendResponse,
    /// The model requested a tool that is not registered.
    UnknownTool { name: String },
    /// Backend call context (use as context wrapper).
    BackendFailed { turn: u32 },
    /// Tool call context (use as context wrapper).
    ToolFailed { name: String, call_id: String },
    /// The instruction provider failed.
    InstructionsFailed { reason: String },
    /// The model kept requesting tools past the configured turn limit.
    TurnLimitExceeded { max_turns: u32 },
    /// A backend, tool or instruction call missed its deadline.
    TimedOut { operation: String, after_ms: u64 },
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyBackendResponse => write!(f, "backend returned no message"),
            Self::UnknownTool { name } => write!(f, "unknown tool function: {name}"),
            Self::BackendFailed { turn } => write!(f, "backend call failed on turn {turn}"),
            Self::ToolFailed { name, call_id } => {
                write!(f, "tool '{name}' failed for call {call_id}")
            }
            Self::InstructionsFailed { reason } => {
                write!(f, "failed to resolve additional instructions: {reason}")
            }
            Self::TurnLimitExceeded { max_turns } => {
                write!(f, "model still requesting tools after {max_turns} turns")
            }
            Self::TimedOut {
                operation,
                after_ms,
            } => write!(f, "{operation} timed out after {after_ms}ms"),
        }
    }
}

impl std::error::Error for AiError {}
