//! The Queue Controller.
//!
//! [`ChatService::process`] persists the incoming message as queued, then
//! either returns immediately (a drain for that user is already running and
//! will pick the message up) or becomes the user's drain loop until the
//! queue is empty.

use crate::busy::BusySet;
use crate::error::ChatError;
use crate::store::MessageStore;
use aibot_ai::{AiClient, TurnArgs};
use aibot_core::{Message, UserId};
use rootcause::prelude::{Report, ResultExt};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Receives the text of every non-empty assistant reply, in order.
pub type ReplyFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-call options for [`ChatService::process`].
#[derive(Clone, Default)]
pub struct ProcessOptions {
    /// Reply callback.
    pub reply: Option<ReplyFn>,
    /// Arguments forwarded to the Conversation Loop.
    pub args: TurnArgs,
}

impl ProcessOptions {
    /// Creates options with no reply callback and empty argument objects.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reply callback.
    #[must_use]
    pub fn with_reply(mut self, reply: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.reply = Some(Arc::new(reply));
        self
    }

    /// Sets the auxiliary argument object handed to every tool call.
    #[must_use]
    pub fn with_tool_args(mut self, tool_args: JsonValue) -> Self {
        self.args.tool_args = tool_args;
        self
    }

    /// Sets the argument object handed to the instruction provider.
    #[must_use]
    pub fn with_instruction_args(mut self, instruction_args: JsonValue) -> Self {
        self.args.instruction_args = instruction_args;
        self
    }
}

impl fmt::Debug for ProcessOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessOptions")
            .field("reply", &self.reply.as_ref().map(|_| "<fn>"))
            .field("args", &self.args)
            .finish()
    }
}

/// Single-flight-per-user chat processing over a store and an AI client.
pub struct ChatService<S: MessageStore, A: AiClient> {
    store: S,
    ai: A,
    busy: BusySet,
}

impl<S: MessageStore, A: AiClient> ChatService<S, A> {
    /// Creates a service with no user busy.
    #[must_use]
    pub fn new(store: S, ai: A) -> Self {
        Self {
            store,
            ai,
            busy: BusySet::new(),
        }
    }

    /// Returns the message store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether a drain loop is currently running for `user_id`.
    #[must_use]
    pub fn is_busy(&self, user_id: &UserId) -> bool {
        self.busy.is_busy(user_id)
    }

    /// Accepts one user message.
    ///
    /// The message is always persisted as queued first. If a drain loop is
    /// already running for the user this returns an empty list; otherwise it
    /// drains the user's queue and returns every message produced, each
    /// serialized as JSON.
    ///
    /// After releasing the busy mark the queue is checked once more, so a
    /// message that arrived while the drain was finishing is never left
    /// waiting for the user's next call.
    ///
    /// # Errors
    ///
    /// Store, Conversation Loop and serialization failures are returned as
    /// [`ChatError`] reports. The user's busy mark is released on every exit
    /// path, including cancellation of the returned future.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn process(
        &self,
        user_id: &UserId,
        content: impl Into<String>,
        options: &ProcessOptions,
    ) -> Result<Vec<String>, Report<ChatError>> {
        let message = Message::user(content);
        self.store
            .append(user_id, true, vec![message])
            .await
            .context(ChatError::Store {
                user_id: user_id.clone(),
            })?;

        let mut produced = Vec::new();
        let mut resumed = false;
        loop {
            let Some(guard) = self.busy.try_acquire(user_id) else {
                debug!(resumed, "drain already running, message left queued");
                break;
            };
            let drained = self.drain(user_id, &options.args).await;
            drop(guard);
            produced.extend(drained?);

            // A caller that saw the mark before it dropped relies on this
            // check to get its message processed.
            let queued = self
                .store
                .peek_queued(user_id)
                .await
                .context(ChatError::Store {
                    user_id: user_id.clone(),
                })?;
            if queued.is_empty() {
                break;
            }
            debug!(queued = queued.len(), "messages queued during release, resuming");
            resumed = true;
        }

        if let Some(reply) = &options.reply {
            for text in produced.iter().filter_map(Message::reply_text) {
                reply(text);
            }
        }

        produced
            .iter()
            .map(|message| {
                serde_json::to_string(message).map_err(|e| {
                    Report::from(ChatError::Serialization {
                        user_id: user_id.clone(),
                        reason: e.to_string(),
                    })
                })
            })
            .collect()
    }

    async fn drain(
        &self,
        user_id: &UserId,
        args: &TurnArgs,
    ) -> Result<Vec<Message>, Report<ChatError>> {
        let store_failed = || ChatError::Store {
            user_id: user_id.clone(),
        };

        info!("drain started");
        let mut output = Vec::new();
        let mut iteration: u32 = 0;

        while !self
            .store
            .peek_queued(user_id)
            .await
            .context(store_failed())?
            .is_empty()
        {
            iteration += 1;
            let queued = self.store.dequeue(user_id).await.context(store_failed())?;
            let history = self.store.read_all(user_id).await.context(store_failed())?;
            debug!(
                iteration,
                queued = queued.len(),
                history = history.len(),
                "processing queued messages"
            );

            let produced = self.ai.run(&history, args).await.context(ChatError::Conversation {
                user_id: user_id.clone(),
            })?;
            let stored = self
                .store
                .append(user_id, false, produced)
                .await
                .context(store_failed())?;
            output.extend(stored);
        }

        info!(iterations = iteration, produced = output.len(), "drain finished");
        Ok(output)
    }
}
