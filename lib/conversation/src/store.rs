//! Message storage.
//!
//! The store is a durable per-user append log with a "queued" marker on
//! rows that have not been handed to the Conversation Loop yet. Two layers:
//!
//! - [`RawMessageStore`]: what a persistence backend implements, one text
//!   row per message
//! - [`MessageStore`]: what the Queue Controller consumes, structured
//!   messages
//!
//! [`SerializingStore`] adapts the first into the second.

use crate::error::StoreError;
use aibot_core::{Message, UserId};
use async_trait::async_trait;
use rootcause::prelude::Report;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Structured message store keyed by user.
///
/// Each operation is atomic with respect to one user's state.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Appends `messages` to the user's log, flagged as queued or not.
    /// Returns the stored messages.
    async fn append(
        &self,
        user_id: &UserId,
        queued: bool,
        messages: Vec<Message>,
    ) -> Result<Vec<Message>, Report<StoreError>>;

    /// Clears the queued flag on every queued message, returning them.
    async fn dequeue(&self, user_id: &UserId) -> Result<Vec<Message>, Report<StoreError>>;

    /// Reads the user's full history in order.
    async fn read_all(&self, user_id: &UserId) -> Result<Vec<Message>, Report<StoreError>>;

    /// Returns the currently queued messages without changing them.
    async fn peek_queued(&self, user_id: &UserId) -> Result<Vec<Message>, Report<StoreError>>;
}

#[async_trait]
impl<S: MessageStore + ?Sized> MessageStore for Arc<S> {
    async fn append(
        &self,
        user_id: &UserId,
        queued: bool,
        messages: Vec<Message>,
    ) -> Result<Vec<Message>, Report<StoreError>> {
        (**self).append(user_id, queued, messages).await
    }

    async fn dequeue(&self, user_id: &UserId) -> Result<Vec<Message>, Report<StoreError>> {
        (**self).dequeue(user_id).await
    }

    async fn read_all(&self, user_id: &UserId) -> Result<Vec<Message>, Report<StoreError>> {
        (**self).read_all(user_id).await
    }

    async fn peek_queued(&self, user_id: &UserId) -> Result<Vec<Message>, Report<StoreError>> {
        (**self).peek_queued(user_id).await
    }
}

/// Text-level message store; one opaque row per message.
#[async_trait]
pub trait RawMessageStore: Send + Sync {
    /// Appends rows, flagged as queued or not. Returns the stored rows.
    async fn append(
        &self,
        user_id: &UserId,
        queued: bool,
        rows: Vec<String>,
    ) -> Result<Vec<String>, Report<StoreError>>;

    /// Clears the queued flag on every queued row, returning them.
    async fn dequeue(&self, user_id: &UserId) -> Result<Vec<String>, Report<StoreError>>;

    /// Reads every row in order.
    async fn read_all(&self, user_id: &UserId) -> Result<Vec<String>, Report<StoreError>>;

    /// Returns the queued rows.
    async fn peek_queued(&self, user_id: &UserId) -> Result<Vec<String>, Report<StoreError>>;
}

/// Adapts a [`RawMessageStore`] into a [`MessageStore`] by JSON-encoding
/// each message.
#[derive(Debug, Clone, Default)]
pub struct SerializingStore<R> {
    raw: R,
}

impl<R: RawMessageStore> SerializingStore<R> {
    /// Wraps `raw`.
    #[must_use]
    pub fn new(raw: R) -> Self {
        Self { raw }
    }

    /// Returns the wrapped raw store.
    #[must_use]
    pub fn raw(&self) -> &R {
        &self.raw
    }
}

fn encode(messages: &[Message]) -> Result<Vec<String>, Report<StoreError>> {
    messages
        .iter()
        .map(|message| {
            serde_json::to_string(message).map_err(|e| {
                Report::from(StoreError::SerializeFailed {
                    reason: e.to_string(),
                })
            })
        })
        .collect()
}

fn decode(rows: Vec<String>) -> Result<Vec<Message>, Report<StoreError>> {
    rows.iter()
        .map(|row| {
            serde_json::from_str(row).map_err(|e| {
                Report::from(StoreError::CorruptMessage {
                    reason: e.to_string(),
                })
            })
        })
        .collect()
}

#[async_trait]
impl<R: RawMessageStore> MessageStore for SerializingStore<R> {
    async fn append(
        &self,
        user_id: &UserId,
        queued: bool,
        messages: Vec<Message>,
    ) -> Result<Vec<Message>, Report<StoreError>> {
        let rows = encode(&messages)?;
        decode(self.raw.append(user_id, queued, rows).await?)
    }

    async fn dequeue(&self, user_id: &UserId) -> Result<Vec<Message>, Report<StoreError>> {
        decode(self.raw.dequeue(user_id).await?)
    }

    async fn read_all(&self, user_id: &UserId) -> Result<Vec<Message>, Report<StoreError>> {
        decode(self.raw.read_all(user_id).await?)
    }

    async fn peek_queued(&self, user_id: &UserId) -> Result<Vec<Message>, Report<StoreError>> {
        decode(self.raw.peek_queued(user_id).await?)
    }
}

#[derive(Debug, Clone)]
struct Row {
    text: String,
    queued: bool,
}

/// Process-local [`RawMessageStore`].
///
/// Nothing survives a restart; intended for tests and the terminal front
/// end.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    logs: Mutex<HashMap<UserId, Vec<Row>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_log<T>(&self, user_id: &UserId, f: impl FnOnce(&mut Vec<Row>) -> T) -> T {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        f(logs.entry(user_id.clone()).or_default())
    }
}

#[async_trait]
impl RawMessageStore for InMemoryStore {
    async fn append(
        &self,
        user_id: &UserId,
        queued: bool,
        rows: Vec<String>,
    ) -> Result<Vec<String>, Report<StoreError>> {
        self.with_log(user_id, |log| {
            log.extend(rows.iter().map(|text| Row {
                text: text.clone(),
                queued,
            }));
        });
        Ok(rows)
    }

    async fn dequeue(&self, user_id: &UserId) -> Result<Vec<String>, Report<StoreError>> {
        Ok(self.with_log(user_id, |log| {
            log.iter_mut()
                .filter(|row| row.queued)
                .map(|row| {
                    row.queued = false;
                    row.text.clone()
                })
                .collect()
        }))
    }

    async fn read_all(&self, user_id: &UserId) -> Result<Vec<String>, Report<StoreError>> {
        Ok(self.with_log(user_id, |log| {
            log.iter().map(|row| row.text.clone()).collect()
        }))
    }

    async fn peek_queued(&self, user_id: &UserId) -> Result<Vec<String>, Report<StoreError>> {
        Ok(self.with_log(user_id, |log| {
            log.iter()
                .filter(|row| row.queued)
                .map(|row| row.text.clone())
                .collect()
        }))
    }
}
