//! Reconstructs the assistant → session → topic → message tree from the
//! flat, foreign-keyed record arrays of a backup export.

pub mod labels;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use anyhow::Result;
use serde::Serialize;

use crate::models::{
    Assistant, BackupPayload, Keyed, Message, Session, Topic, parse_backup_payload,
};

pub const UNASSIGNED_ASSISTANT_PREFIX: &str = "__unassigned__:";
pub const ORPHAN_TOPICS_SESSION_ID: &str = "__orphan_topics__";

/// Records indexed by id, iterated in first-seen order.
///
/// A later record with an already-seen id replaces the earlier one but keeps
/// its position.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordIndex<T> {
    order: Vec<String>,
    records: HashMap<String, T>,
}

impl<T: Keyed> RecordIndex<T> {
    #[must_use]
    pub fn from_records(records: Vec<T>) -> Self {
        let mut order = Vec::with_capacity(records.len());
        let mut indexed = HashMap::with_capacity(records.len());
        for record in records {
            let key = record.key().to_string();
            if !indexed.contains_key(&key) {
                order.push(key.clone());
            }
            indexed.insert(key, record);
        }
        Self {
            order,
            records: indexed,
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&T> {
        self.records.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicGroup {
    pub topic_id: String,
    pub topic_label: String,
    pub topic: Option<Topic>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionGroup {
    pub session_id: String,
    pub session_label: String,
    pub session: Option<Session>,
    pub topics: Vec<TopicGroup>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistantGroup {
    pub assistant_id: String,
    pub assistant_label: String,
    pub assistant: Option<Assistant>,
    pub sessions: Vec<SessionGroup>,
}

impl AssistantGroup {
    #[must_use]
    pub fn is_unassigned(&self) -> bool {
        self.assistant_id.starts_with(UNASSIGNED_ASSISTANT_PREFIX)
    }

    pub fn topics(&self) -> impl Iterator<Item = (&SessionGroup, &TopicGroup)> {
        self.sessions
            .iter()
            .flat_map(|session| session.topics.iter().map(move |topic| (session, topic)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyStats {
    pub agent_count: usize,
    pub session_count: usize,
    pub topic_count: usize,
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hierarchy {
    pub groups: Vec<AssistantGroup>,
    pub stats: HierarchyStats,
}

/// A parsed backup: the immutable record indexes plus the derived tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBackup {
    pub source_file_name: Option<String>,
    pub assistants: RecordIndex<Assistant>,
    pub sessions: RecordIndex<Session>,
    pub topics: RecordIndex<Topic>,
    pub groups: Vec<AssistantGroup>,
    pub stats: HierarchyStats,
}

/// Parses backup text and builds its hierarchy in one step.
pub fn parse_backup(raw: &str, source_file_name: Option<&str>) -> Result<ParsedBackup> {
    let payload = parse_backup_payload(raw)?;
    Ok(build_parsed_backup(payload, source_file_name))
}

#[must_use]
pub fn build_parsed_backup(payload: BackupPayload, source_file_name: Option<&str>) -> ParsedBackup {
    let message_count = payload.messages.len();
    let assistants = RecordIndex::from_records(payload.assistants);
    let sessions = RecordIndex::from_records(payload.sessions);
    let topics = RecordIndex::from_records(payload.topics);
    let groups = assemble_groups(
        &assistants,
        &sessions,
        &topics,
        payload.messages,
        &payload.links,
    );
    let stats = HierarchyStats {
        agent_count: groups.len(),
        session_count: sessions.len(),
        topic_count: topics.len(),
        message_count,
    };

    ParsedBackup {
        source_file_name: source_file_name.map(str::to_string),
        assistants,
        sessions,
        topics,
        groups,
        stats,
    }
}

#[must_use]
pub fn build_hierarchy(payload: BackupPayload) -> Hierarchy {
    let parsed = build_parsed_backup(payload, None);
    Hierarchy {
        groups: parsed.groups,
        stats: parsed.stats,
    }
}

struct AssistantBucket {
    assistant_id: String,
    assistant_label: String,
    sessions: Vec<SessionGroup>,
}

#[derive(Default)]
struct BucketSet {
    buckets: Vec<AssistantBucket>,
    positions: HashMap<String, usize>,
}

impl BucketSet {
    fn attach(&mut self, assistant_id: &str, assistant_label: String, session: SessionGroup) {
        let position = *self
            .positions
            .entry(assistant_id.to_string())
            .or_insert_with(|| {
                self.buckets.push(AssistantBucket {
                    assistant_id: assistant_id.to_string(),
                    assistant_label: String::new(),
                    sessions: Vec::new(),
                });
                self.buckets.len() - 1
            });
        let bucket = &mut self.buckets[position];
        bucket.assistant_label = assistant_label;
        bucket.sessions.push(session);
    }
}

/// Topic groups awaiting attachment, in first-seen topic order.
struct PendingTopics {
    groups: Vec<Option<TopicGroup>>,
}

impl PendingTopics {
    /// Removes and returns every pending group belonging to `session_id`,
    /// ordered by the topic's own timestamp key.
    fn take_for_session(&mut self, session_id: &str) -> Vec<TopicGroup> {
        let mut taken = Vec::new();
        for slot in &mut self.groups {
            let belongs = slot.as_ref().is_some_and(|group| {
                group
                    .topic
                    .as_ref()
                    .and_then(|topic| topic.session_id.as_deref())
                    == Some(session_id)
            });
            if belongs && let Some(group) = slot.take() {
                taken.push(group);
            }
        }
        taken.sort_by(|left, right| compare_keys(topic_sort_key(left), topic_sort_key(right)));
        taken
    }

    fn has_any_for_session(&self, session_id: &str) -> bool {
        self.groups.iter().flatten().any(|group| {
            group
                .topic
                .as_ref()
                .and_then(|topic| topic.session_id.as_deref())
                == Some(session_id)
        })
    }

    fn remaining(&mut self) -> Vec<TopicGroup> {
        self.groups.iter_mut().filter_map(Option::take).collect()
    }
}

fn assemble_groups(
    assistants: &RecordIndex<Assistant>,
    sessions: &RecordIndex<Session>,
    topics: &RecordIndex<Topic>,
    messages: Vec<Message>,
    links: &[crate::models::AssistantSessionLink],
) -> Vec<AssistantGroup> {
    let mut pending = PendingTopics {
        groups: build_topic_groups(messages, topics)
            .into_iter()
            .map(Some)
            .collect(),
    };
    let mut buckets = BucketSet::default();
    let mut attached_sessions = HashSet::new();

    for link in links {
        let (Some(assistant_id), Some(session_id)) = (
            non_empty(link.agent_id.as_deref()),
            non_empty(link.session_id.as_deref()),
        ) else {
            continue;
        };
        if !attached_sessions.insert(session_id.to_string()) {
            continue;
        }

        let session = sessions.get(session_id);
        let session_group = build_session_group(session_id, session, &mut pending);
        let label = labels::assistant_label(assistants.get(assistant_id), session, assistant_id);
        buckets.attach(assistant_id, label, session_group);
    }

    for session in sessions.iter() {
        if attached_sessions.contains(&session.id) || !pending.has_any_for_session(&session.id) {
            continue;
        }
        attached_sessions.insert(session.id.clone());
        let session_group = build_session_group(&session.id, Some(session), &mut pending);
        let assistant_id = format!("{UNASSIGNED_ASSISTANT_PREFIX}{}", session.id);
        let label = labels::unassigned_assistant_label(Some(session));
        buckets.attach(&assistant_id, label, session_group);
    }

    attach_orphan_topics(&mut pending, &mut buckets, &attached_sessions);

    buckets
        .buckets
        .into_iter()
        .map(|bucket| {
            let mut sessions = bucket.sessions;
            sessions.sort_by(|left, right| {
                compare_keys(session_sort_key(left), session_sort_key(right))
            });
            AssistantGroup {
                assistant: assistants.get(&bucket.assistant_id).cloned(),
                assistant_id: bucket.assistant_id,
                assistant_label: bucket.assistant_label,
                sessions,
            }
        })
        .collect()
}

/// Topics whose session record is missing (or which name no session at all)
/// still own messages; they are grouped under synthetic sessions so that no
/// topic with messages is dropped.
fn attach_orphan_topics(
    pending: &mut PendingTopics,
    buckets: &mut BucketSet,
    attached_sessions: &HashSet<String>,
) {
    let mut orphan_order: Vec<String> = Vec::new();
    let mut orphans: HashMap<String, Vec<TopicGroup>> = HashMap::new();
    for group in pending.remaining() {
        let session_id = group
            .topic
            .as_ref()
            .and_then(|topic| non_empty(topic.session_id.as_deref()))
            .filter(|session_id| !attached_sessions.contains(*session_id))
            .unwrap_or(ORPHAN_TOPICS_SESSION_ID)
            .to_string();
        orphans
            .entry(session_id.clone())
            .or_insert_with(|| {
                orphan_order.push(session_id);
                Vec::new()
            })
            .push(group);
    }

    for session_id in orphan_order {
        let Some(mut topic_groups) = orphans.remove(&session_id) else {
            continue;
        };
        topic_groups.sort_by(|left, right| compare_keys(topic_sort_key(left), topic_sort_key(right)));
        let session_group = SessionGroup {
            session_label: labels::session_label(None, &session_id, &topic_groups),
            session_id: session_id.clone(),
            session: None,
            topics: topic_groups,
        };
        let assistant_id = format!("{UNASSIGNED_ASSISTANT_PREFIX}{session_id}");
        buckets.attach(
            &assistant_id,
            labels::unassigned_assistant_label(None),
            session_group,
        );
    }
}

fn build_session_group(
    session_id: &str,
    session: Option<&Session>,
    pending: &mut PendingTopics,
) -> SessionGroup {
    let topics = pending.take_for_session(session_id);
    SessionGroup {
        session_id: session_id.to_string(),
        session_label: labels::session_label(session, session_id, &topics),
        session: session.cloned(),
        topics,
    }
}

fn build_topic_groups(messages: Vec<Message>, topics: &RecordIndex<Topic>) -> Vec<TopicGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<Message>> = HashMap::new();
    for message in messages {
        let Some(topic_id) = non_empty(message.topic_id.as_deref()).map(str::to_string) else {
            continue;
        };
        buckets
            .entry(topic_id.clone())
            .or_insert_with(|| {
                order.push(topic_id);
                Vec::new()
            })
            .push(message);
    }

    order
        .into_iter()
        .filter_map(|topic_id| {
            let mut messages = buckets.remove(&topic_id)?;
            messages.sort_by(|left, right| compare_keys(message_sort_key(left), message_sort_key(right)));
            let topic = topics.get(&topic_id).cloned();
            Some(TopicGroup {
                topic_label: labels::topic_label(topic.as_ref(), &topic_id),
                topic_id,
                topic,
                messages,
            })
        })
        .collect()
}

/// `createdAt ?? updatedAt ?? id`, compared as raw strings.
#[must_use]
pub fn message_sort_key(message: &Message) -> &str {
    message
        .created_at
        .as_deref()
        .or(message.updated_at.as_deref())
        .unwrap_or(&message.id)
}

fn topic_sort_key(group: &TopicGroup) -> &str {
    group
        .topic
        .as_ref()
        .and_then(|topic| topic.created_at.as_deref().or(topic.updated_at.as_deref()))
        .unwrap_or(&group.topic_id)
}

fn session_sort_key(group: &SessionGroup) -> &str {
    group
        .session
        .as_ref()
        .and_then(|session| {
            session
                .created_at
                .as_deref()
                .or(session.updated_at.as_deref())
        })
        .unwrap_or(&group.session_id)
}

fn compare_keys(left: &str, right: &str) -> Ordering {
    left.cmp(right)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{RecordIndex, build_hierarchy};
    use crate::models::{Session, parse_backup_payload};

    #[test]
    fn record_index_keeps_first_position_but_last_value() {
        let index = RecordIndex::from_records(vec![
            Session {
                id: "s1".to_string(),
                title: Some("old".to_string()),
                ..Session::default()
            },
            Session {
                id: "s2".to_string(),
                ..Session::default()
            },
            Session {
                id: "s1".to_string(),
                title: Some("new".to_string()),
                ..Session::default()
            },
        ]);

        let ids = index.iter().map(|s| s.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert_eq!(
            index.get("s1").and_then(|s| s.title.as_deref()),
            Some("new")
        );
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn session_linked_twice_is_attached_once() {
        let payload = parse_backup_payload(
            r#"{"data":{
                "assistants":[{"id":"a1","title":"One"},{"id":"a2","title":"Two"}],
                "sessions":[{"id":"s1"}],
                "topics":[{"id":"t1","sessionId":"s1","title":"T"}],
                "messages":[{"id":"m1","topicId":"t1","role":"user","content":"hi"}],
                "agentsToSessions":[
                    {"agentId":"a1","sessionId":"s1"},
                    {"agentId":"a2","sessionId":"s1"}]}}"#,
        )
        .expect("payload should parse");

        let hierarchy = build_hierarchy(payload);
        assert_eq!(hierarchy.groups.len(), 1);
        assert_eq!(hierarchy.groups[0].assistant_label, "One");
    }
}
