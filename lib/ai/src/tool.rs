//! Tool registry.
//!
//! Tools are named capabilities the model may invoke during a turn. The
//! registry both advertises them to the backend (the tool catalog) and
//! dispatches requested calls by name.

use crate::error::{AiError, ToolError};
use aibot_core::FunctionCall;
use async_trait::async_trait;
use rootcause::prelude::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Definition of a tool advertised to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON schema for the arguments object.
    pub parameters: JsonValue,
}

impl ToolDefinition {
    /// Creates a new tool definition taking no arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }

    /// Sets the argument schema.
    #[must_use]
    pub fn with_parameters(mut self, schema: JsonValue) -> Self {
        self.parameters = schema;
        self
    }
}

/// Trait for tool execution.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool.
    ///
    /// `args` is the parsed argument object from the model, `aux` the
    /// caller-supplied auxiliary arguments for this exchange.
    async fn call(&self, args: JsonValue, aux: &JsonValue) -> Result<String, Report<ToolError>>;
}

/// A tool backed by an async closure.
pub struct FnTool<F> {
    definition: ToolDefinition,
    handler: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(JsonValue, JsonValue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, Report<ToolError>>> + Send + 'static,
{
    /// Wraps `handler` under `definition`.
    #[must_use]
    pub fn new(definition: ToolDefinition, handler: F) -> Self {
        Self {
            definition,
            handler,
        }
    }
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(JsonValue, JsonValue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, Report<ToolError>>> + Send + 'static,
{
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn call(&self, args: JsonValue, aux: &JsonValue) -> Result<String, Report<ToolError>> {
        (self.handler)(args, aux.clone()).await
    }
}

/// Registry of available tools, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_shared(Arc::new(tool));
    }

    /// Registers an already shared tool.
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "replaced previously registered tool");
        }
    }

    /// Registers a tool and returns the registry.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Gets a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Returns the tool catalog advertised to the backend, ordered by name.
    #[must_use]
    pub fn catalog(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolves one function call.
    ///
    /// # Errors
    ///
    /// Fails with [`AiError::UnknownTool`] when no tool has the requested
    /// name, and with [`AiError::ToolFailed`] wrapping the tool's own error.
    pub async fn invoke(
        &self,
        call_id: &str,
        function: &FunctionCall,
        aux: &JsonValue,
    ) -> Result<String, Report<AiError>> {
        let tool = self
            .tools
            .get(&function.name)
            .ok_or_else(|| AiError::UnknownTool {
                name: function.name.clone(),
            })?;

        let args = parse_arguments(&function.name, &function.arguments);
        debug!(tool = %function.name, call_id, "invoking tool");

        tool.call(args, aux).await.context(AiError::ToolFailed {
            name: function.name.clone(),
            call_id: call_id.to_string(),
        })
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Parses a model-produced argument payload.
///
/// An empty or malformed payload becomes an empty object.
#[must_use]
pub fn parse_arguments(tool: &str, raw: &str) -> JsonValue {
    if raw.trim().is_empty() {
        return JsonValue::Object(serde_json::Map::new());
    }
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(tool, error = %e, "malformed tool arguments, using empty object");
            JsonValue::Object(serde_json::Map::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool(name: &'static str) -> impl Tool + 'static {
        FnTool::new(
            ToolDefinition::new(name, "Echoes its input"),
            |args: JsonValue, aux: JsonValue| async move {
                Ok::<_, Report<ToolError>>(json!({ "args": args, "aux": aux }).to_string())
            },
        )
    }

    fn failing_tool() -> impl Tool + 'static {
        FnTool::new(
            ToolDefinition::new("broken", "Always fails"),
            |_args: JsonValue, _aux: JsonValue| async move {
                Err::<String, _>(Report::from(ToolError::ExecutionFailed {
                    name: "broken".to_string(),
                    reason: "boom".to_string(),
                }))
            },
        )
    }

    #[test]
    fn catalog_is_sorted_by_name() {
        let registry = ToolRegistry::new()
            .with_tool(echo_tool("zeta"))
            .with_tool(echo_tool("alpha"));

        let names: Vec<_> = registry.catalog().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn definition_builder_sets_schema() {
        let def = ToolDefinition::new("lookup", "Look something up").with_parameters(json!({
            "type": "object",
            "properties": { "q": { "type": "string" } }
        }));
        assert_eq!(def.parameters["properties"]["q"]["type"], "string");
    }

    #[test]
    fn malformed_arguments_become_empty_object() {
        assert_eq!(parse_arguments("t", "{not json"), json!({}));
        assert_eq!(parse_arguments("t", ""), json!({}));
        assert_eq!(parse_arguments("t", "{\"q\":1}"), json!({ "q": 1 }));
    }

    #[tokio::test]
    async fn invoke_passes_parsed_and_aux_arguments() {
        let registry = ToolRegistry::new().with_tool(echo_tool("echo"));
        let call = FunctionCall {
            name: "echo".to_string(),
            arguments: "{\"q\":\"weather\"}".to_string(),
        };

        let out = registry
            .invoke("call_1", &call, &json!({ "chat": 7 }))
            .await
            .expect("tool runs");
        let out: JsonValue = serde_json::from_str(&out).expect("json output");

        assert_eq!(out["args"]["q"], "weather");
        assert_eq!(out["aux"]["chat"], 7);
    }

    #[tokio::test]
    async fn invoke_unknown_tool_fails() {
        let registry = ToolRegistry::new();
        let call = FunctionCall {
            name: "teleport".to_string(),
            arguments: String::new(),
        };

        let err = registry
            .invoke("call_1", &call, &json!({}))
            .await
            .expect_err("unknown tool");
        assert_eq!(
            err.current_context(),
            &AiError::UnknownTool {
                name: "teleport".to_string()
            }
        );
    }

    #[tokio::test]
    async fn tool_failure_is_wrapped_with_call_context() {
        let registry = ToolRegistry::new().with_tool(failing_tool());
        let call = FunctionCall {
            name: "broken".to_string(),
            arguments: "{}".to_string(),
        };

        let err = registry
            .invoke("call_9", &call, &json!({}))
            .await
            .expect_err("tool fails");
        assert_eq!(
            err.current_context(),
            &AiError::ToolFailed {
                name: "broken".to_string(),
                call_id: "call_9".to_string()
            }
        );
    }
}
