use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::{RenderOptions, finish_document, render_topic};
use crate::hierarchy::ParsedBackup;

pub const INDEX_PATH: &str = "index.md";
pub const MAX_FILENAME_CHARS: usize = 80;
const UNTITLED: &str = "untitled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkdownFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkdownExport {
    pub index_path: String,
    pub files: Vec<MarkdownFile>,
}

impl MarkdownExport {
    /// Number of topic documents, excluding the index.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.files
            .iter()
            .filter(|file| file.path != self.index_path)
            .count()
    }
}

/// Lays the whole tree out as `<assistant>/<session>/<topic>.md` documents
/// plus a root index.
#[must_use]
pub fn render_tree(parsed: &ParsedBackup) -> MarkdownExport {
    let mut files = Vec::new();
    let mut index_lines = vec!["# Conversation Index".to_string(), String::new()];
    if let Some(source) = parsed.source_file_name.as_deref() {
        index_lines.push(format!("- **Source file**: `{source}`"));
        index_lines.push(String::new());
    }

    let mut used_assistant_dirs = HashSet::new();
    for group in &parsed.groups {
        let assistant_dir = ensure_unique_name(
            &safe_filename(&group.assistant_label, &group.assistant_id),
            &mut used_assistant_dirs,
        );
        let mut used_session_dirs = HashSet::new();

        for session_group in &group.sessions {
            let session_dir = ensure_unique_name(
                &safe_filename(&session_group.session_label, &session_group.session_id),
                &mut used_session_dirs,
            );
            let mut used_topic_names = HashSet::new();

            for topic_group in &session_group.topics {
                let topic_name = ensure_unique_name(
                    &safe_filename(&topic_group.topic_label, &topic_group.topic_id),
                    &mut used_topic_names,
                );
                let path = format!("{assistant_dir}/{session_dir}/{topic_name}.md");
                files.push(MarkdownFile {
                    path: path.clone(),
                    content: render_topic(
                        group.assistant.as_ref(),
                        session_group.session.as_ref(),
                        topic_group,
                        &group.assistant_label,
                        RenderOptions::FULL,
                    ),
                });
                index_lines.push(format!(
                    "- [{} / {} / {}]({path}) - {} messages",
                    group.assistant_label,
                    session_group.session_label,
                    topic_group.topic_label,
                    topic_group.messages.len()
                ));
            }
        }
    }

    files.push(MarkdownFile {
        path: INDEX_PATH.to_string(),
        content: finish_document(&index_lines),
    });

    MarkdownExport {
        index_path: INDEX_PATH.to_string(),
        files,
    }
}

/// Filesystem-safe version of a label.
///
/// Reserved characters and whitespace runs collapse to single spaces, the
/// result is cut to 80 characters and the remaining spaces become `_`. When
/// nothing survives, the fallback goes through the same pipeline.
#[must_use]
pub fn safe_filename(input: &str, fallback: &str) -> String {
    sanitize_segment(input)
        .or_else(|| sanitize_segment(fallback))
        .unwrap_or_else(|| UNTITLED.to_string())
}

/// Returns `name` if unused in this sibling scope, otherwise the first free
/// `name_1`, `name_2`, …; the returned name is recorded as used.
pub fn ensure_unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let mut counter = 1_usize;
    loop {
        let candidate = format!("{name}_{counter}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

fn sanitize_segment(raw: &str) -> Option<String> {
    let replaced = reserved_chars_regex().replace_all(raw.trim(), " ");
    let collapsed = whitespace_regex().replace_all(&replaced, " ");
    let collapsed = collapsed.trim();
    if collapsed.is_empty() {
        return None;
    }

    let truncated = if collapsed.chars().count() > MAX_FILENAME_CHARS {
        collapsed
            .chars()
            .take(MAX_FILENAME_CHARS)
            .collect::<String>()
            .trim()
            .to_string()
    } else {
        collapsed.to_string()
    };

    let segment = whitespace_regex().replace_all(&truncated, "_").into_owned();
    // `.` and `..` would address the parent or the current directory.
    if segment.chars().all(|ch| ch == '.') {
        return None;
    }
    Some(segment)
}

fn reserved_chars_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"[<>:"/\\|?*]+"#).expect("reserved filename regex should compile")
    })
}

fn whitespace_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex should compile"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{MAX_FILENAME_CHARS, ensure_unique_name, safe_filename};

    #[test]
    fn replaces_reserved_characters_and_whitespace() {
        assert_eq!(
            safe_filename("  What is a/b? <draft>  notes ", "id"),
            "What_is_a_b_draft_notes"
        );
    }

    #[test]
    fn sanitizing_is_idempotent() {
        for raw in [
            "Plan: Q3 / Q4 \"roadmap\"",
            "  tabs\tand\nnewlines ",
            &"long title ".repeat(20),
            "已经 安全 的 名字",
            " .. ",
            "...draft",
        ] {
            let once = safe_filename(raw, "fallback");
            assert_eq!(safe_filename(&once, "fallback"), once, "input: {raw:?}");
        }
    }

    #[test]
    fn truncates_to_eighty_characters() {
        let name = safe_filename(&"x".repeat(200), "id");
        assert_eq!(name.chars().count(), MAX_FILENAME_CHARS);
    }

    #[test]
    fn empty_labels_fall_back_to_sanitized_id() {
        assert_eq!(
            safe_filename(" ??? ", "__unassigned__:s1"),
            "__unassigned___s1"
        );
        assert_eq!(safe_filename("", ""), "untitled");
    }

    #[test]
    fn dot_only_labels_never_become_path_segments() {
        assert_eq!(safe_filename("..", "a1"), "a1");
        assert_eq!(safe_filename(" . ", "a1"), "a1");
        assert_eq!(safe_filename("...", ".."), "untitled");
        assert_eq!(safe_filename("..notes", "a1"), "..notes");
    }

    #[test]
    fn dot_only_assistant_title_stays_inside_the_export_root() {
        let parsed = crate::hierarchy::parse_backup(
            r#"{"data":{
                "assistants":[{"id":"a1","title":".."}],
                "sessions":[{"id":"s1"}],
                "topics":[{"id":"t1","sessionId":"s1","title":"Hi"}],
                "messages":[{"id":"m1","topicId":"t1","role":"user","content":"Hi"}],
                "agentsToSessions":[{"agentId":"a1","sessionId":"s1"}]}}"#,
            None,
        )
        .expect("backup should parse");
        let export = super::render_tree(&parsed);

        let paths = export
            .files
            .iter()
            .map(|file| file.path.as_str())
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["a1/Hi/Hi.md", super::INDEX_PATH]);
    }

    #[test]
    fn collisions_get_increasing_suffixes() {
        let mut used = HashSet::new();
        let names = (0..4)
            .map(|_| ensure_unique_name("Chat", &mut used))
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Chat", "Chat_1", "Chat_2", "Chat_3"]);
    }

    #[test]
    fn suffix_skips_names_already_taken() {
        let mut used = HashSet::new();
        ensure_unique_name("Chat_1", &mut used);
        ensure_unique_name("Chat", &mut used);
        assert_eq!(ensure_unique_name("Chat", &mut used), "Chat_2");
    }
}
