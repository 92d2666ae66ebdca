//! Display labels for assistants, sessions and topics.
//!
//! Every label is an ordered fallback chain: the first candidate that is
//! non-empty after trimming wins, otherwise the entity id is used. Empty and
//! whitespace-only titles never surface.

use crate::hierarchy::TopicGroup;
use crate::models::{Assistant, Session, Topic};
use crate::utils::content::conversational_snippet;
use crate::utils::time::date_prefix;

pub const UNASSIGNED_ASSISTANT_LABEL: &str = "unassigned assistant";
pub const SESSION_LABEL_FALLBACK: &str = "session";
const TOPIC_LABEL_PREFIX: &str = "Topic_";
const TOPIC_ID_SUFFIX_CHARS: usize = 6;

#[must_use]
pub fn derive_label<'a, I>(candidates: I, fallback_id: &str) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(fallback_id)
        .to_string()
}

#[must_use]
pub fn assistant_label(
    assistant: Option<&Assistant>,
    session: Option<&Session>,
    assistant_id: &str,
) -> String {
    derive_label(
        [
            assistant.and_then(|a| a.title.as_deref()),
            assistant.and_then(|a| a.slug.as_deref()),
            assistant.and_then(|a| a.description.as_deref()),
            session.and_then(|s| s.title.as_deref()),
            session.and_then(|s| s.slug.as_deref()),
        ],
        assistant_id,
    )
}

#[must_use]
pub fn unassigned_assistant_label(session: Option<&Session>) -> String {
    derive_label(
        [
            session.and_then(|s| s.title.as_deref()),
            session.and_then(|s| s.slug.as_deref()),
        ],
        UNASSIGNED_ASSISTANT_LABEL,
    )
}

/// Session label from its ordered topic groups.
///
/// `topics` must already be in ascending timestamp order; the first titled
/// topic wins over any message snippet.
#[must_use]
pub fn session_label(session: Option<&Session>, session_id: &str, topics: &[TopicGroup]) -> String {
    let topic_title = topics
        .iter()
        .filter_map(|group| group.topic.as_ref())
        .filter_map(|topic| topic.title.as_deref())
        .find(|title| !title.trim().is_empty());
    let snippet = topics
        .iter()
        .find_map(|group| conversational_snippet(&group.messages));
    let renamed_id = session_id
        .strip_prefix("ssn_")
        .map(|rest| format!("session_{rest}"));

    let chosen = derive_label(
        [
            topic_title,
            snippet.as_deref(),
            session.and_then(|s| s.title.as_deref()),
            session.and_then(|s| s.slug.as_deref()),
            session.and_then(|s| s.description.as_deref()),
            renamed_id.as_deref(),
            Some(session_id),
        ],
        SESSION_LABEL_FALLBACK,
    );

    match session
        .and_then(|s| s.created_at.as_deref())
        .and_then(date_prefix)
    {
        Some(prefix) if !chosen.starts_with(&prefix) => format!("{prefix} {chosen}"),
        _ => chosen,
    }
}

#[must_use]
pub fn topic_label(topic: Option<&Topic>, topic_id: &str) -> String {
    let fallback = format!("{TOPIC_LABEL_PREFIX}{}", id_suffix(topic_id));
    derive_label([topic.and_then(|t| t.title.as_deref())], &fallback)
}

fn id_suffix(id: &str) -> String {
    let count = id.chars().count();
    id.chars()
        .skip(count.saturating_sub(TOPIC_ID_SUFFIX_CHARS))
        .collect()
}
