//! Message types exchanged with the completion backend and the store.
//!
//! The serde shape follows the chat-completions wire format, so a message
//! produced by the backend can be persisted and replayed without any
//! translation:
//!
//! ```json
//! { "role": "assistant", "content": null,
//!   "tool_calls": [{ "type": "function", "id": "call_1",
//!                    "function": { "name": "lookup", "arguments": "{}" } }] }
//! { "role": "tool", "tool_call_id": "call_1", "content": "42" }
//! ```
//!
//! Only the fields above are modelled. Anything else the backend attaches to
//! a message (`refusal`, `name`, `annotations`, ...) is dropped on decode, so
//! it is neither persisted nor sent back on later turns. Content must be a
//! plain string; the array-of-parts form is not accepted.
//!
//! Tool calls of a kind this crate does not know are kept verbatim as
//! [`ToolCallRequest::Other`] rather than failing the whole message.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model.
    System,
    /// User/human message.
    User,
    /// Model output.
    Assistant,
    /// Result of a tool call.
    Tool,
}

/// A message in a conversation.
///
/// Messages are immutable once created; a conversation only ever appends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message role.
    pub role: Role,
    /// Text content. Assistant messages that only request tools have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// The request this message answers (tool messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_content(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_content(Role::System, content)
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_content(Role::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_content(Role::Assistant, content)
    }

    /// Creates a tool result message answering `tool_call_id`.
    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_content(Role::Tool, content)
        }
    }

    /// Adds a tool call request.
    #[must_use]
    pub fn with_tool_call(mut self, tool_call: ToolCallRequest) -> Self {
        self.tool_calls.push(tool_call);
        self
    }

    /// Returns true if this message requests any tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Returns the text content, or `""` when there is none.
    #[must_use]
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    /// Returns the text if this is an assistant message with something to say.
    #[must_use]
    pub fn reply_text(&self) -> Option<&str> {
        match (self.role, self.content.as_deref()) {
            (Role::Assistant, Some(text)) if !text.is_empty() => Some(text),
            _ => None,
        }
    }
}

/// A tool call requested by the model.
///
/// Encoded as the chat-completions tool call object, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JsonValue", into = "JsonValue")]
pub enum ToolCallRequest {
    /// A call to a registered function tool.
    Function {
        /// Unique identifier for this call.
        id: String,
        /// The function to call.
        function: FunctionCall,
    },
    /// A free-form custom tool call. Never resolved locally.
    Custom {
        /// Unique identifier for this call.
        id: String,
        /// The custom tool payload.
        custom: CustomCall,
    },
    /// A call of any other `type`. Never resolved locally.
    Other {
        /// Unique identifier for this call, empty if the payload has none.
        id: String,
        /// The `type` tag as received.
        kind: String,
        /// The whole call object, re-emitted unchanged on encode.
        payload: JsonValue,
    },
}

/// Wire form of the call kinds with a typed payload.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownCall {
    Function { id: String, function: FunctionCall },
    Custom { id: String, custom: CustomCall },
}

impl TryFrom<JsonValue> for ToolCallRequest {
    type Error = serde_json::Error;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        let kind = match value.get("type") {
            Some(JsonValue::String(kind)) => kind.clone(),
            // Some compatible servers leave the tag off plain function calls.
            None if value.get("function").is_some() => "function".to_string(),
            _ => String::new(),
        };
        match kind.as_str() {
            "function" | "custom" => {
                let mut tagged = value;
                if let JsonValue::Object(fields) = &mut tagged {
                    fields.insert("type".to_string(), JsonValue::String(kind));
                }
                Ok(match serde_json::from_value(tagged)? {
                    KnownCall::Function { id, function } => Self::Function { id, function },
                    KnownCall::Custom { id, custom } => Self::Custom { id, custom },
                })
            }
            _ => Ok(Self::Other {
                id: value
                    .get("id")
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default()
                    .to_string(),
                kind,
                payload: value,
            }),
        }
    }
}

impl From<ToolCallRequest> for JsonValue {
    fn from(call: ToolCallRequest) -> Self {
        let known = match call {
            ToolCallRequest::Function { id, function } => KnownCall::Function { id, function },
            ToolCallRequest::Custom { id, custom } => KnownCall::Custom { id, custom },
            ToolCallRequest::Other { payload, .. } => return payload,
        };
        serde_json::to_value(known).unwrap_or(JsonValue::Null)
    }
}

impl ToolCallRequest {
    /// Creates a function call request.
    #[must_use]
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::Function {
            id: id.into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Returns the call identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Function { id, .. } | Self::Custom { id, .. } | Self::Other { id, .. } => id,
        }
    }
}

/// Target and payload of a function call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    #[serde(default)]
    pub arguments: String,
}

/// Payload of a custom tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCall {
    /// Name of the custom tool.
    pub name: String,
    /// Raw input text.
    #[serde(default)]
    pub input: String,
}
