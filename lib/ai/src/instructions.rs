//! Dynamic instruction providers.
//!
//! Besides the static system prompt, the loop asks a provider for
//! additional instructions before every turn. Empty text means nothing is
//! injected for that turn.

use crate::error::AiError;
use aibot_core::{Message, Role};
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde_json::Value as JsonValue;
use std::future::Future;

/// Trait for additional-instruction providers.
#[async_trait]
pub trait InstructionProvider: Send + Sync {
    /// Returns instructions for the next turn, or an empty string.
    async fn provide(&self, args: &JsonValue) -> Result<String, Report<AiError>>;
}

/// Never injects anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInstructions;

#[async_trait]
impl InstructionProvider for NoInstructions {
    async fn provide(&self, _args: &JsonValue) -> Result<String, Report<AiError>> {
        Ok(String::new())
    }
}

/// Injects the same text on every turn.
#[derive(Debug, Clone, Default)]
pub struct StaticInstructions(pub String);

#[async_trait]
impl InstructionProvider for StaticInstructions {
    async fn provide(&self, _args: &JsonValue) -> Result<String, Report<AiError>> {
        Ok(self.0.clone())
    }
}

/// Instructions computed by an async closure over the instruction arguments.
pub struct FnInstructions<F>(F);

impl<F, Fut> FnInstructions<F>
where
    F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, Report<AiError>>> + Send + 'static,
{
    /// Wraps `provider`.
    #[must_use]
    pub fn new(provider: F) -> Self {
        Self(provider)
    }
}

#[async_trait]
impl<F, Fut> InstructionProvider for FnInstructions<F>
where
    F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, Report<AiError>>> + Send + 'static,
{
    async fn provide(&self, args: &JsonValue) -> Result<String, Report<AiError>> {
        (self.0)(args.clone()).await
    }
}

/// Returns where a dynamic instruction message goes in `transcript`.
///
/// If the transcript ends in a run of tool results, the position is the
/// start of that run, so the instructions sit between the assistant's tool
/// request and its results. Otherwise it is the position of the final
/// message, just before the latest turn.
#[must_use]
pub fn insertion_index(transcript: &[Message]) -> usize {
    let trailing_tools = transcript
        .iter()
        .rev()
        .take_while(|message| message.role == Role::Tool)
        .count();

    if trailing_tools > 0 {
        transcript.len() - trailing_tools
    } else {
        transcript.len().saturating_sub(1)
    }
}
