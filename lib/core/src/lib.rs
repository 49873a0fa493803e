//! Core types shared across aibot.
//!
//! This crate provides the wire message model, identifier types and the
//! rootcause-based `Result` alias used by every other crate.

pub mod error;
pub mod id;
pub mod message;

pub use error::Result;
pub use id::{ExchangeId, ParseIdError, UserId};
pub use message::{CustomCall, FunctionCall, Message, Role, ToolCallRequest};
