//! Model-facing half of aibot.
//!
//! This crate provides:
//!
//! - **Completion Backend**: the trait over chat-completion providers, plus
//!   an OpenAI-compatible HTTP implementation
//! - **Tool Registry**: named tool capabilities and their catalog
//! - **Instruction Providers**: per-turn additional instructions
//! - **Conversation Loop**: recursive turn-taking between the model and tools

pub mod backend;
pub mod error;
pub mod instructions;
pub mod openai;
pub mod runner;
pub mod tool;

pub use backend::{Completion, CompletionBackend, ScriptedBackend};
pub use error::{AiError, LlmError, ToolError};
pub use instructions::{FnInstructions, InstructionProvider, NoInstructions, StaticInstructions};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use runner::{AiClient, ConversationLoop, LoopConfig, TurnArgs};
pub use tool::{FnTool, Tool, ToolDefinition, ToolRegistry};
