pub mod archive;
pub mod layout;

use serde_json::Value;

use crate::hierarchy::TopicGroup;
use crate::hierarchy::labels::derive_label;
use crate::models::{Assistant, Message, Session};
use crate::utils::content::has_side_channel;

pub use layout::{
    INDEX_PATH, MarkdownExport, MarkdownFile, ensure_unique_name, render_tree, safe_filename,
};

pub const NO_CONTENT_MARKER: &str = "_No content provided._";
const UNKNOWN_TIME: &str = "unknown time";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub include_metadata: bool,
    pub include_system_prompt: bool,
}

impl RenderOptions {
    /// Standalone documents: metadata sections and system prompt included.
    pub const FULL: Self = Self {
        include_metadata: true,
        include_system_prompt: true,
    };

    /// Record bodies whose metadata already lives in record properties.
    pub const BODY_ONLY: Self = Self {
        include_metadata: false,
        include_system_prompt: false,
    };
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::FULL
    }
}

/// Renders one topic group as a standalone Markdown document.
#[must_use]
pub fn render_topic(
    assistant: Option<&Assistant>,
    session: Option<&Session>,
    topic_group: &TopicGroup,
    assistant_label: &str,
    options: RenderOptions,
) -> String {
    let mut lines = vec![format!("# {}", topic_group.topic_label), String::new()];

    if options.include_metadata {
        lines.extend(metadata_section(
            "Session",
            &[
                ("Session Title", session.and_then(|s| s.title.as_deref())),
                ("Session Slug", session.and_then(|s| s.slug.as_deref())),
                ("Session ID", session.map(|s| s.id.as_str())),
                ("Session Created", session.and_then(|s| s.created_at.as_deref())),
                ("Session Updated", session.and_then(|s| s.updated_at.as_deref())),
            ],
        ));

        let topic = topic_group.topic.as_ref();
        lines.extend(metadata_section(
            "Topic",
            &[
                (
                    "Topic ID",
                    Some(topic.map_or(topic_group.topic_id.as_str(), |t| t.id.as_str())),
                ),
                ("Topic Created", topic.and_then(|t| t.created_at.as_deref())),
                ("Topic Updated", topic.and_then(|t| t.updated_at.as_deref())),
            ],
        ));

        if let Some(assistant) = assistant {
            let title = derive_label(
                [assistant.title.as_deref(), assistant.slug.as_deref()],
                assistant_label,
            );
            lines.extend(metadata_section(
                "Assistant",
                &[
                    ("Assistant Title", Some(title.as_str())),
                    ("Assistant ID", Some(assistant.id.as_str())),
                    ("Model", assistant.model.as_deref()),
                    ("Provider", assistant.provider.as_deref()),
                ],
            ));
        }
    }

    if options.include_system_prompt
        && let Some(prompt) = assistant
            .and_then(|a| a.system_role.as_deref())
            .filter(|prompt| !prompt.trim().is_empty())
    {
        lines.push("## System Prompt".to_string());
        lines.push(String::new());
        lines.extend(fenced(prompt, ""));
    }

    lines.extend(message_lines(&topic_group.messages));
    finish_document(&lines)
}

/// Joins document lines, trimming trailing whitespace and ending with a
/// single newline.
pub(crate) fn finish_document(lines: &[String]) -> String {
    format!("{}\n", lines.join("\n").trim_end())
}

fn metadata_section(title: &str, fields: &[(&str, Option<&str>)]) -> Vec<String> {
    let present = fields
        .iter()
        .filter_map(|&(key, value)| {
            value
                .filter(|value| !value.trim().is_empty())
                .map(|value| format!("- **{key}**: {value}"))
        })
        .collect::<Vec<_>>();
    if present.is_empty() {
        return Vec::new();
    }

    let mut lines = vec![format!("## {title}"), String::new()];
    lines.extend(present);
    lines.push(String::new());
    lines
}

fn message_lines(messages: &[Message]) -> Vec<String> {
    let mut lines = vec!["## Messages".to_string(), String::new()];
    for message in messages {
        let timestamp = message
            .created_at
            .as_deref()
            .or(message.updated_at.as_deref())
            .unwrap_or(UNKNOWN_TIME);
        lines.push(format!("### {timestamp} - {}", message.role.display_name()));
        lines.push(String::new());
        lines.extend(content_lines(&message.content));

        if has_side_channel(message.reasoning.as_ref()) {
            lines.push("**Reasoning**".to_string());
            lines.push(String::new());
            lines.extend(content_lines(message.reasoning.as_ref().unwrap_or(&Value::Null)));
        }
        if has_side_channel(message.search.as_ref()) {
            lines.push("**Search Context**".to_string());
            lines.push(String::new());
            lines.extend(content_lines(message.search.as_ref().unwrap_or(&Value::Null)));
        }
    }
    lines
}

/// Content policy shared by message bodies and side channels.
#[must_use]
pub fn content_lines(raw: &Value) -> Vec<String> {
    match raw {
        Value::Null => vec![NO_CONTENT_MARKER.to_string(), String::new()],
        Value::String(text) if text.is_empty() => {
            vec![NO_CONTENT_MARKER.to_string(), String::new()]
        }
        Value::Object(_) | Value::Array(_) => json_block(raw),
        Value::String(text) => {
            let trimmed = text.trim();
            if (trimmed.starts_with('{') || trimmed.starts_with('['))
                && let Ok(parsed) = serde_json::from_str::<Value>(text)
            {
                return json_block(&parsed);
            }
            if text.contains('\n') {
                return fenced(text, "");
            }
            vec![text.clone(), String::new()]
        }
        Value::Bool(_) | Value::Number(_) => vec![raw.to_string(), String::new()],
    }
}

fn json_block(value: &Value) -> Vec<String> {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    fenced(&pretty, "json")
}

fn fenced(body: &str, language: &str) -> Vec<String> {
    vec![
        format!("```{language}"),
        body.to_string(),
        "```".to_string(),
        String::new(),
    ]
}
