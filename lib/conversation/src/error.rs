//! Error types for the conversation crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`: Errors from message store operations
//! - `ChatError`: Queue Controller failures, used as context wrapper around
//!   store and Conversation Loop reports

use aibot_core::UserId;
use std::fmt;

/// Errors from message store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached.
    Unavailable { reason: String },
    /// Appending or updating messages failed.
    WriteFailed { reason: String },
    /// Reading messages failed.
    ReadFailed { reason: String },
    /// A stored row does not decode to a message.
    CorruptMessage { reason: String },
    /// A message could not be encoded for storage.
    SerializeFailed { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "message store unavailable: {reason}"),
            Self::WriteFailed { reason } => write!(f, "message store write failed: {reason}"),
            Self::ReadFailed { reason } => write!(f, "message store read failed: {reason}"),
            Self::CorruptMessage { reason } => write!(f, "corrupt stored message: {reason}"),
            Self::SerializeFailed { reason } => {
                write!(f, "failed to encode message for storage: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Queue Controller errors.
///
/// Use these to add context when wrapping lower-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Store operation context (use as context wrapper).
    Store { user_id: UserId },
    /// Conversation Loop context (use as context wrapper).
    Conversation { user_id: UserId },
    /// A produced message could not be serialized for the caller.
    Serialization { user_id: UserId, reason: String },
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store { user_id } => write!(f, "message store failed for user {user_id}"),
            Self::Conversation { user_id } => {
                write!(f, "conversation failed for user {user_id}")
            }
            Self::Serialization { user_id, reason } => {
                write!(f, "failed to serialize reply for user {user_id}: {reason}")
            }
        }
    }
}

impl std::error::Error for ChatError {}
