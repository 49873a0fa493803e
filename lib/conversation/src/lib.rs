//! User-facing half of aibot.
//!
//! This crate provides:
//!
//! - **Message Store**: per-user append log with a queue marker, plus a JSON
//!   adapter and an in-memory implementation
//! - **Busy Set**: per-user single-flight marks released by guard
//! - **Queue Controller**: [`ChatService`], which persists input and drains
//!   each user's queue through the Conversation Loop

pub mod busy;
pub mod error;
pub mod service;
pub mod store;

pub use busy::{BusyGuard, BusySet};
pub use error::{ChatError, StoreError};
pub use service::{ChatService, ProcessOptions, ReplyFn};
pub use store::{InMemoryStore, MessageStore, RawMessageStore, SerializingStore};
