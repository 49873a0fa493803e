//! The tool-calling Conversation Loop.
//!
//! One invocation takes the stored history, prepends the static system
//! prompt and then alternates between the backend and the tool registry:
//!
//! 1. Ask the instruction provider for additional instructions and, if any,
//!    splice them into the transcript
//! 2. Call the backend with the transcript and the tool catalog
//! 3. Resolve every function call the answer requests, appending results
//! 4. Stop once an answer requests no tools, otherwise go back to 1
//!
//! The transcript lives only for the invocation. Only the assistant and tool
//! messages it produced are returned.

use crate::backend::CompletionBackend;
use crate::error::AiError;
use crate::instructions::{InstructionProvider, NoInstructions, insertion_index};
use crate::tool::ToolRegistry;
use aibot_core::{ExchangeId, Message, ToolCallRequest};
use async_trait::async_trait;
use rootcause::prelude::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Configuration for the Conversation Loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Static system prompt placed at the head of every transcript.
    #[serde(default)]
    pub instructions: String,

    /// Maximum number of backend calls per invocation. `None` is unbounded.
    #[serde(default = "default_max_turns")]
    pub max_turns: Option<u32>,

    /// Deadline for each backend, tool and instruction call, in seconds.
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,
}

fn default_max_turns() -> Option<u32> {
    Some(25)
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            instructions: String::new(),
            max_turns: default_max_turns(),
            call_timeout_secs: None,
        }
    }
}

impl LoopConfig {
    /// Creates a configuration with the given system prompt.
    #[must_use]
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            ..Self::default()
        }
    }

    /// Sets the turn limit.
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: Option<u32>) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Sets the per-call deadline.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }
}

/// Caller-supplied arguments for one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnArgs {
    /// Passed to every tool call as its auxiliary argument.
    pub tool_args: JsonValue,
    /// Passed to the instruction provider before every turn.
    pub instruction_args: JsonValue,
}

impl Default for TurnArgs {
    fn default() -> Self {
        Self {
            tool_args: JsonValue::Object(serde_json::Map::new()),
            instruction_args: JsonValue::Object(serde_json::Map::new()),
        }
    }
}

/// Anything that can turn a history into newly produced messages.
#[async_trait]
pub trait AiClient: Send + Sync {
    /// Runs one exchange over `history`.
    ///
    /// Returns only the messages produced during this exchange, in order.
    ///
    /// # Errors
    ///
    /// Any backend, tool or instruction failure aborts the whole exchange.
    async fn run(
        &self,
        history: &[Message],
        args: &TurnArgs,
    ) -> Result<Vec<Message>, Report<AiError>>;
}

#[async_trait]
impl<A: AiClient + ?Sized> AiClient for Arc<A> {
    async fn run(
        &self,
        history: &[Message],
        args: &TurnArgs,
    ) -> Result<Vec<Message>, Report<AiError>> {
        (**self).run(history, args).await
    }
}

/// The Conversation Loop over a completion backend.
pub struct ConversationLoop<B: CompletionBackend> {
    backend: B,
    tools: ToolRegistry,
    instructions: Arc<dyn InstructionProvider>,
    config: LoopConfig,
}

impl<B: CompletionBackend> ConversationLoop<B> {
    /// Creates a loop with no tools and no additional instructions.
    #[must_use]
    pub fn new(backend: B, config: LoopConfig) -> Self {
        Self {
            backend,
            tools: ToolRegistry::new(),
            instructions: Arc::new(NoInstructions),
            config,
        }
    }

    /// Sets the tool registry.
    #[must_use]
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Sets the additional-instruction provider.
    #[must_use]
    pub fn with_instructions(mut self, provider: impl InstructionProvider + 'static) -> Self {
        self.instructions = Arc::new(provider);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Returns the tool registry.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    async fn bounded<T>(
        &self,
        operation: impl Into<String>,
        call: impl Future<Output = Result<T, Report<AiError>>>,
    ) -> Result<T, Report<AiError>> {
        let Some(limit) = self.config.call_timeout() else {
            return call.await;
        };
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(AiError::TimedOut {
                operation: operation.into(),
                after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            }
            .into()),
        }
    }
}

#[async_trait]
impl<B: CompletionBackend> AiClient for ConversationLoop<B> {
    #[instrument(skip_all, fields(exchange_id = %ExchangeId::new(), history = history.len()))]
    async fn run(
        &self,
        history: &[Message],
        args: &TurnArgs,
    ) -> Result<Vec<Message>, Report<AiError>> {
        let catalog = self.tools.catalog();
        let mut transcript = Vec::with_capacity(history.len() + 1);
        transcript.push(Message::system(self.config.instructions.clone()));
        transcript.extend_from_slice(history);

        let mut output = Vec::new();
        let mut turn: u32 = 0;

        loop {
            turn += 1;
            if let Some(max_turns) = self.config.max_turns {
                if turn > max_turns {
                    warn!(max_turns, "turn limit reached with tool calls outstanding");
                    return Err(AiError::TurnLimitExceeded { max_turns }.into());
                }
            }

            let extra = self
                .bounded(
                    "instruction provider",
                    self.instructions.provide(&args.instruction_args),
                )
                .await?;
            if !extra.is_empty() {
                let index = insertion_index(&transcript);
                transcript.insert(index, Message::system(extra));
            }

            let completion = self
                .bounded("backend call", async {
                    self.backend
                        .complete(&transcript, &catalog)
                        .await
                        .context(AiError::BackendFailed { turn })
                })
                .await?;
            let reply = completion.message.ok_or(AiError::EmptyBackendResponse)?;
            let requests = reply.tool_calls.clone();
            debug!(turn, tool_calls = requests.len(), "backend replied");

            output.push(reply.clone());
            transcript.push(reply);

            if requests.is_empty() {
                return Ok(output);
            }

            for request in &requests {
                match request {
                    ToolCallRequest::Function { id, function } => {
                        let content = self
                            .bounded(
                                format!("tool '{}'", function.name),
                                self.tools.invoke(id, function, &args.tool_args),
                            )
                            .await?;
                        let result = Message::tool(id.clone(), content);
                        output.push(result.clone());
                        transcript.push(result);
                    }
                    ToolCallRequest::Custom { id, custom } => {
                        warn!(call_id = %id, tool = %custom.name, "skipping non-function tool call");
                    }
                    ToolCallRequest::Other { id, kind, .. } => {
                        warn!(call_id = %id, kind = %kind, "skipping non-function tool call");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Completion, ScriptedBackend};
    use crate::error::ToolError;
    use crate::instructions::{FnInstructions, StaticInstructions};
    use crate::tool::{FnTool, ToolDefinition};
    use aibot_core::{CustomCall, Role};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn lookup_tool() -> impl crate::tool::Tool + 'static {
        FnTool::new(
            ToolDefinition::new("lookup", "Looks things up"),
            |args: JsonValue, aux: JsonValue| {
                std::future::ready(Ok::<_, Report<ToolError>>(format!(
                    "{}@{}",
                    args["q"].as_str().unwrap_or("-"),
                    aux["region"].as_str().unwrap_or("-")
                )))
            },
        )
    }

    fn asks_for(calls: &[(&str, &str, &str)]) -> Message {
        calls.iter().fold(Message::assistant("let me check"), |msg, (id, name, args)| {
            msg.with_tool_call(ToolCallRequest::function(*id, *name, *args))
        })
    }

    #[tokio::test]
    async fn plain_reply_ends_after_one_turn() {
        let backend = Arc::new(ScriptedBackend::replying([Message::assistant("hi")]));
        let runner = ConversationLoop::new(backend.clone(), LoopConfig::new("be nice"));

        let history = vec![Message::user("hello")];
        let output = runner.run(&history, &TurnArgs::default()).await.expect("runs");

        assert_eq!(output, vec![Message::assistant("hi")]);
        let seen = backend.transcripts();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], vec![Message::system("be nice"), Message::user("hello")]);
        assert_eq!(history, vec![Message::user("hello")]);
    }

    #[tokio::test]
    async fn tool_calls_are_resolved_then_loop_continues() {
        let backend = Arc::new(ScriptedBackend::replying([
            asks_for(&[("c1", "lookup", r#"{"q":"tides"}"#), ("c2", "lookup", "not json")]),
            Message::assistant("done"),
        ]));
        let runner = ConversationLoop::new(backend.clone(), LoopConfig::default())
            .with_tools(ToolRegistry::new().with_tool(lookup_tool()));
        let args = TurnArgs {
            tool_args: json!({ "region": "eu" }),
            ..TurnArgs::default()
        };

        let output = runner.run(&[Message::user("q")], &args).await.expect("runs");

        let roles: Vec<_> = output.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::Assistant, Role::Tool, Role::Tool, Role::Assistant]
        );
        assert_eq!(output[1], Message::tool("c1", "tides@eu"));
        assert_eq!(output[2], Message::tool("c2", "-@eu"));
        assert_eq!(output[3].text(), "done");

        let second_turn = &backend.transcripts()[1];
        assert_eq!(second_turn.len(), 5);
        assert_eq!(second_turn[4].tool_call_id.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn terminates_on_first_turn_without_tool_calls() {
        let backend = Arc::new(ScriptedBackend::replying([
            asks_for(&[("c1", "lookup", "{}")]),
            asks_for(&[("c2", "lookup", "{}")]),
            Message::assistant("finally"),
            Message::assistant("never requested"),
        ]));
        let runner = ConversationLoop::new(backend.clone(), LoopConfig::default())
            .with_tools(ToolRegistry::new().with_tool(lookup_tool()));

        let output = runner.run(&[Message::user("q")], &TurnArgs::default()).await.expect("runs");

        assert_eq!(backend.calls(), 3);
        assert_eq!(output.len(), 5);
    }

    #[tokio::test]
    async fn empty_backend_response_fails() {
        let backend = ScriptedBackend::new([Completion::empty()]);
        let runner = ConversationLoop::new(backend, LoopConfig::default());

        let err = runner
            .run(&[Message::user("q")], &TurnArgs::default())
            .await
            .expect_err("no message");
        assert_eq!(err.current_context(), &AiError::EmptyBackendResponse);
    }

    #[tokio::test]
    async fn backend_failure_is_wrapped_with_turn() {
        let backend = ScriptedBackend::new([]);
        let runner = ConversationLoop::new(backend, LoopConfig::default());

        let err = runner
            .run(&[Message::user("q")], &TurnArgs::default())
            .await
            .expect_err("script exhausted");
        assert_eq!(err.current_context(), &AiError::BackendFailed { turn: 1 });
    }

    #[tokio::test]
    async fn unknown_tool_aborts_the_exchange() {
        let backend = Arc::new(ScriptedBackend::replying([
            asks_for(&[("c1", "lookup", "{}"), ("c2", "teleport", "{}")]),
            Message::assistant("unreachable"),
        ]));
        let runner = ConversationLoop::new(backend.clone(), LoopConfig::default())
            .with_tools(ToolRegistry::new().with_tool(lookup_tool()));

        let err = runner
            .run(&[Message::user("q")], &TurnArgs::default())
            .await
            .expect_err("unknown tool");

        assert_eq!(
            err.current_context(),
            &AiError::UnknownTool {
                name: "teleport".to_string()
            }
        );
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn custom_calls_are_skipped_but_still_continue_the_loop() {
        let custom = Message::assistant("").with_tool_call(ToolCallRequest::Custom {
            id: "k1".to_string(),
            custom: CustomCall {
                name: "grammar".to_string(),
                input: "x".to_string(),
            },
        });
        let backend = Arc::new(ScriptedBackend::replying([custom, Message::assistant("ok")]));
        let runner = ConversationLoop::new(backend.clone(), LoopConfig::default());

        let output = runner.run(&[Message::user("q")], &TurnArgs::default()).await.expect("runs");

        assert_eq!(output.len(), 2);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn unknown_call_kinds_are_skipped_and_later_functions_resolved() {
        let mixed = Message::assistant("").with_tool_call(ToolCallRequest::Other {
            id: "mcp_1".to_string(),
            kind: "mcp_call".to_string(),
            payload: json!({ "id": "mcp_1", "type": "mcp_call" }),
        });
        let mixed = mixed.with_tool_call(ToolCallRequest::function(
            "c1",
            "lookup",
            r#"{"q":"tides"}"#,
        ));
        let backend = Arc::new(ScriptedBackend::replying([mixed, Message::assistant("ok")]));
        let runner = ConversationLoop::new(backend.clone(), LoopConfig::default())
            .with_tools(ToolRegistry::new().with_tool(lookup_tool()));

        let output = runner.run(&[Message::user("q")], &TurnArgs::default()).await.expect("runs");

        assert_eq!(output.len(), 3);
        assert_eq!(output[1], Message::tool("c1", "tides@-"));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn dynamic_instructions_are_resolved_every_turn() {
        let backend = Arc::new(ScriptedBackend::replying([
            asks_for(&[("c1", "lookup", "{}"), ("c2", "lookup", "{}")]),
            Message::assistant("done"),
        ]));
        let turns = Arc::new(AtomicU32::new(0));
        let counter = turns.clone();
        let provider = FnInstructions::new(move |args: JsonValue| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, Report<AiError>>(format!("turn {n} for {}", args["who"])) }
        });
        let runner = ConversationLoop::new(backend.clone(), LoopConfig::new("static"))
            .with_tools(ToolRegistry::new().with_tool(lookup_tool()))
            .with_instructions(provider);
        let args = TurnArgs {
            instruction_args: json!({ "who": "ada" }),
            ..TurnArgs::default()
        };

        let output = runner.run(&[Message::user("q")], &args).await.expect("runs");

        assert_eq!(turns.load(Ordering::SeqCst), 2);
        assert!(output.iter().all(|m| m.role != Role::System));

        let seen = backend.transcripts();
        assert_eq!(seen[0][1], Message::system("turn 1 for \"ada\""));
        assert_eq!(seen[0][2], Message::user("q"));

        let roles: Vec<_> = seen[1].iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::System,
                Role::User,
                Role::Assistant,
                Role::System,
                Role::Tool,
                Role::Tool
            ]
        );
        assert_eq!(seen[1][4], Message::system("turn 2 for \"ada\""));
    }

    #[tokio::test]
    async fn empty_dynamic_instructions_inject_nothing() {
        let backend = Arc::new(ScriptedBackend::replying([Message::assistant("hi")]));
        let runner = ConversationLoop::new(backend.clone(), LoopConfig::new("static"))
            .with_instructions(StaticInstructions(String::new()));

        runner.run(&[Message::user("q")], &TurnArgs::default()).await.expect("runs");

        assert_eq!(backend.transcripts()[0].len(), 2);
    }

    #[tokio::test]
    async fn failing_instruction_provider_aborts_before_backend_call() {
        let backend = Arc::new(ScriptedBackend::replying([Message::assistant("hi")]));
        let provider = FnInstructions::new(|_args: JsonValue| async {
            Err::<String, _>(Report::from(AiError::InstructionsFailed {
                reason: "profile lookup failed".to_string(),
            }))
        });
        let runner = ConversationLoop::new(backend.clone(), LoopConfig::default())
            .with_instructions(provider);

        let err = runner
            .run(&[Message::user("q")], &TurnArgs::default())
            .await
            .expect_err("provider failed");

        assert!(matches!(
            err.current_context(),
            AiError::InstructionsFailed { .. }
        ));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn turn_limit_stops_runaway_tool_chains() {
        let backend = Arc::new(ScriptedBackend::replying(
            (0..10).map(|i| asks_for(&[(format!("c{i}").as_str(), "lookup", "{}")])),
        ));
        let runner = ConversationLoop::new(
            backend.clone(),
            LoopConfig::default().with_max_turns(Some(2)),
        )
        .with_tools(ToolRegistry::new().with_tool(lookup_tool()));

        let err = runner
            .run(&[Message::user("q")], &TurnArgs::default())
            .await
            .expect_err("limit");

        assert_eq!(err.current_context(), &AiError::TurnLimitExceeded { max_turns: 2 });
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out() {
        let slow = FnTool::new(
            ToolDefinition::new("slow", "Never finishes in time"),
            |_args: JsonValue, _aux: JsonValue| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, Report<ToolError>>(String::new())
            },
        );
        let backend = ScriptedBackend::replying([asks_for(&[("c1", "slow", "{}")])]);
        let runner = ConversationLoop::new(
            backend,
            LoopConfig::default().with_call_timeout(Duration::from_secs(5)),
        )
        .with_tools(ToolRegistry::new().with_tool(slow));

        let err = runner
            .run(&[Message::user("q")], &TurnArgs::default())
            .await
            .expect_err("timeout");

        assert_eq!(
            err.current_context(),
            &AiError::TimedOut {
                operation: "tool 'slow'".to_string(),
                after_ms: 5000
            }
        );
    }

    #[test]
    fn loop_config_defaults() {
        let config: LoopConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config, LoopConfig::default());
        assert_eq!(config.max_turns, Some(25));
        assert!(config.call_timeout_secs.is_none());
    }
}
