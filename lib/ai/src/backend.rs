//! Completion backend abstraction.
//!
//! A backend is a stateless request/response function: it receives the full
//! transcript and the tool catalog and answers with at most one message.

use crate::error::LlmError;
use crate::tool::ToolDefinition;
use aibot_core::Message;
use async_trait::async_trait;
use rootcause::prelude::Report;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// A backend answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// The produced message, if any. `None` means the backend answered
    /// without producing anything, which the loop treats as fatal.
    pub message: Option<Message>,
}

impl Completion {
    /// Creates a completion carrying `message`.
    #[must_use]
    pub fn message(message: Message) -> Self {
        Self {
            message: Some(message),
        }
    }

    /// Creates a completion with no message.
    #[must_use]
    pub fn empty() -> Self {
        Self { message: None }
    }
}

/// Trait for completion backends.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Runs one completion over `transcript`, advertising `tools`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails. A call that succeeds but
    /// produces no message is reported through [`Completion::message`].
    async fn complete(
        &self,
        transcript: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Completion, Report<LlmError>>;
}

#[async_trait]
impl<B: CompletionBackend + ?Sized> CompletionBackend for Arc<B> {
    async fn complete(
        &self,
        transcript: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Completion, Report<LlmError>> {
        (**self).complete(transcript, tools).await
    }
}

/// A backend that replays canned completions in order (for testing).
///
/// Every transcript it receives is recorded. Once the script runs out,
/// calls fail with [`LlmError::RequestFailed`].
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Completion>>,
    transcripts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    /// Creates a backend replaying `replies`.
    #[must_use]
    pub fn new(replies: impl IntoIterator<Item = Completion>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    /// Creates a backend replaying one message per call.
    #[must_use]
    pub fn replying(messages: impl IntoIterator<Item = Message>) -> Self {
        Self::new(messages.into_iter().map(Completion::message))
    }

    /// Appends a completion to the end of the script.
    pub fn push(&self, completion: Completion) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(completion);
    }

    /// Returns every transcript received so far.
    #[must_use]
    pub fn transcripts(&self) -> Vec<Vec<Message>> {
        self.transcripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of calls received so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.transcripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(
        &self,
        transcript: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<Completion, Report<LlmError>> {
        self.transcripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transcript.to_vec());

        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.ok_or_else(|| {
            LlmError::RequestFailed {
                reason: "script exhausted".to_string(),
            }
            .into()
        })
    }
}
