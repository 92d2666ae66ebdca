use serde_json::Value;

use crate::models::Message;

pub const SNIPPET_MAX_CHARS: usize = 48;
pub const ELLIPSIS: &str = "…";

/// First line of `text` (after trimming), cut to `max_chars` characters with
/// an ellipsis marker when longer.
#[must_use]
pub fn first_line_excerpt(text: &str, max_chars: usize) -> Option<String> {
    let stripped = text.trim();
    if stripped.is_empty() || max_chars == 0 {
        return None;
    }

    let line = stripped.split('\n').next().unwrap_or(stripped).trim_end();
    if line.chars().count() <= max_chars {
        return Some(line.to_string());
    }

    let prefix = line.chars().take(max_chars).collect::<String>();
    Some(format!("{}{ELLIPSIS}", prefix.trim()))
}

/// Snippet from the first user or assistant message carrying non-empty
/// string content. Messages are expected in display order.
#[must_use]
pub fn conversational_snippet(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .filter(|message| message.role.is_conversational())
        .find_map(|message| match &message.content {
            Value::String(text) => first_line_excerpt(text, SNIPPET_MAX_CHARS),
            _ => None,
        })
}

/// Whether a side-channel value (reasoning, search) carries anything to show.
#[must_use]
pub fn has_side_channel(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Number(number)) => number.as_f64().is_some_and(|value| value != 0.0),
        Some(_) => true,
    }
}
