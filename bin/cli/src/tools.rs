//! Tools offered by the terminal front end.

use aibot_ai::{FnTool, Tool, ToolDefinition, ToolError};
use chrono::{DateTime, FixedOffset, Utc};
use rootcause::prelude::Report;
use serde_json::{Value as JsonValue, json};
use std::fmt::Write;

/// Reports the current time, optionally shifted and formatted.
///
/// Arguments: `format` (strftime, default RFC 3339). Auxiliary arguments:
/// `utc_offset_minutes` for the caller's local offset.
pub fn current_time() -> impl Tool + 'static {
    let definition = ToolDefinition::new("current_time", "Returns the current date and time.")
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "description": "strftime format string; RFC 3339 when omitted"
                }
            }
        }));
    FnTool::new(definition, |args: JsonValue, aux: JsonValue| async move {
        render_time(Utc::now(), &args, &aux)
    })
}

fn render_time(
    now: DateTime<Utc>,
    args: &JsonValue,
    aux: &JsonValue,
) -> Result<String, Report<ToolError>> {
    let invalid = |reason: String| ToolError::InvalidInput {
        name: "current_time".to_string(),
        reason,
    };

    let offset_minutes = aux["utc_offset_minutes"].as_i64().unwrap_or(0);
    let offset = offset_minutes
        .checked_mul(60)
        .and_then(|secs| i32::try_from(secs).ok())
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| invalid(format!("utc offset out of range: {offset_minutes}")))?;
    let local = now.with_timezone(&offset);

    let Some(format) = args["format"].as_str() else {
        return Ok(local.to_rfc3339());
    };
    let mut rendered = String::new();
    write!(rendered, "{}", local.format(format))
        .map_err(|_| invalid(format!("bad format string: {format}")))?;
    Ok(rendered)
}
