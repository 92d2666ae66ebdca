use std::collections::HashSet;

use chatvault::hierarchy::{
    HierarchyStats, ORPHAN_TOPICS_SESSION_ID, build_hierarchy, message_sort_key, parse_backup,
};
use chatvault::models::{BackupParseError, parse_backup_payload};

const BASIC: &str = include_str!("../../../fixtures/lobechat/backup_basic.json");
const MIXED: &str = include_str!("../../../fixtures/lobechat/backup_mixed.json");

#[test]
fn single_assistant_scenario_builds_one_branch() {
    let parsed = parse_backup(BASIC, Some("backup_basic.json")).expect("basic backup should parse");

    assert_eq!(
        parsed.stats,
        HierarchyStats {
            agent_count: 1,
            session_count: 1,
            topic_count: 1,
            message_count: 1,
        }
    );
    assert_eq!(parsed.groups.len(), 1);

    let group = &parsed.groups[0];
    assert_eq!(group.assistant_id, "a1");
    assert_eq!(group.assistant_label, "Helper");
    assert!(!group.is_unassigned());
    assert_eq!(group.sessions.len(), 1);

    let session = &group.sessions[0];
    assert_eq!(session.session_id, "s1");
    assert_eq!(session.session_label, "Hello");
    assert_eq!(session.topics.len(), 1);
    assert_eq!(session.topics[0].topic_label, "Hello");
    assert_eq!(session.topics[0].messages.len(), 1);
    assert_eq!(parsed.source_file_name.as_deref(), Some("backup_basic.json"));
}

#[test]
fn mixed_backup_keeps_every_topic_with_messages_exactly_once() {
    let parsed = parse_backup(MIXED, None).expect("mixed backup should parse");

    let labels = parsed
        .groups
        .iter()
        .map(|group| group.assistant_label.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        labels,
        vec!["Helper", "coder-bot", "Loose ends", "unassigned assistant"]
    );

    let mut seen = HashSet::new();
    for group in &parsed.groups {
        for (_, topic) in group.topics() {
            assert!(
                seen.insert(topic.topic_id.clone()),
                "topic {} appears twice",
                topic.topic_id
            );
        }
    }
    let expected = ["t1", "t2", "tpc_abcdef123456", "t4", "t5"]
        .into_iter()
        .map(str::to_string)
        .collect::<HashSet<_>>();
    assert_eq!(seen, expected);

    assert_eq!(
        parsed.stats,
        HierarchyStats {
            agent_count: 4,
            session_count: 4,
            topic_count: 5,
            message_count: 8,
        }
    );
}

#[test]
fn unlinked_session_lands_under_synthetic_assistant() {
    let parsed = parse_backup(MIXED, None).expect("mixed backup should parse");

    let loose = parsed
        .groups
        .iter()
        .find(|group| group.assistant_id == "__unassigned__:s3")
        .expect("unlinked session should get a fallback assistant");
    assert!(loose.is_unassigned());
    assert!(loose.assistant.is_none());
    assert_eq!(loose.sessions[0].session_label, "2024-05-03 Stray");

    let orphan = parsed
        .groups
        .iter()
        .find(|group| group.assistant_id == "__unassigned__:s_missing")
        .expect("topic with unknown session should still be grouped");
    assert_eq!(orphan.sessions[0].session_id, "s_missing");
    assert_eq!(orphan.sessions[0].session_label, "Orphan");
    assert!(orphan.sessions[0].session.is_none());
}

#[test]
fn sessions_topics_and_messages_are_ordered_by_raw_timestamps() {
    let parsed = parse_backup(MIXED, None).expect("mixed backup should parse");
    let helper = &parsed.groups[0];
    let chat = &helper.sessions[0];

    assert_eq!(chat.session_label, "2024-05-01 Hello");
    let topic_ids = chat
        .topics
        .iter()
        .map(|topic| topic.topic_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(topic_ids, vec!["t1", "t2"]);

    let message_ids = chat.topics[0]
        .messages
        .iter()
        .map(|message| message.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(message_ids, vec!["m1", "m2"]);
    assert!(
        chat.topics[0]
            .messages
            .windows(2)
            .all(|pair| message_sort_key(&pair[0]) <= message_sort_key(&pair[1]))
    );
}

#[test]
fn labels_fall_back_to_slug_snippet_and_id_suffix() {
    let parsed = parse_backup(MIXED, None).expect("mixed backup should parse");
    let coder = &parsed.groups[1];

    assert_eq!(coder.assistant_label, "coder-bot");
    assert_eq!(coder.sessions[0].session_label, "2024-05-02 Write a function");
    assert_eq!(coder.sessions[0].topics[0].topic_label, "Topic_123456");
}

#[test]
fn topics_without_any_session_share_the_orphan_bucket() {
    let payload = parse_backup_payload(
        r#"{"data":{
            "topics":[{"id":"t1","title":"Solo"},{"id":"t2","sessionId":""}],
            "messages":[
                {"id":"m1","topicId":"t1","role":"user","content":"a"},
                {"id":"m2","topicId":"t2","role":"user","content":"b"},
                {"id":"m3","topicId":"t3","role":"user","content":"c"}]}}"#,
    )
    .expect("payload should parse");

    let hierarchy = build_hierarchy(payload);
    assert_eq!(hierarchy.groups.len(), 1);
    let session = &hierarchy.groups[0].sessions[0];
    assert_eq!(session.session_id, ORPHAN_TOPICS_SESSION_ID);
    assert_eq!(session.topics.len(), 3);
    assert_eq!(hierarchy.stats.topic_count, 2);
    assert_eq!(hierarchy.stats.message_count, 3);
}

#[test]
fn duplicate_ids_keep_the_last_record() {
    let parsed = parse_backup(
        r#"{"data":{
            "assistants":[{"id":"a1","title":"Old"},{"id":"a1","title":"New"}],
            "sessions":[{"id":"s1"},{"id":"s1","title":"Second"}],
            "topics":[{"id":"t1","sessionId":"s1"}],
            "messages":[{"id":"m1","topicId":"t1","role":"user","content":"hi"}],
            "agentsToSessions":[{"assistantId":"a1","sessionId":"s1"}]}}"#,
        None,
    )
    .expect("backup should parse");

    assert_eq!(parsed.groups[0].assistant_label, "New");
    assert_eq!(parsed.stats.session_count, 1);
    assert_eq!(parsed.assistants.len(), 1);
}

#[test]
fn empty_payload_yields_empty_tree() {
    let parsed = parse_backup(r#"{"data":{}}"#, None).expect("empty data should parse");
    assert!(parsed.groups.is_empty());
    assert_eq!(parsed.stats, HierarchyStats::default());
}

#[test]
fn malformed_documents_fail_with_parse_errors() {
    for (raw, needle) in [
        ("not json", "not valid JSON"),
        ("[1, 2]", "found array"),
        (r#"{"version": 7}"#, "missing `data` payload"),
        (r#"{"data": []}"#, "`data` must be an object"),
        (r#"{"data": {"sessions": [{"title": "no id"}]}}"#, "malformed `data` payload"),
    ] {
        let error = parse_backup(raw, None).expect_err("document should be rejected");
        let parse_error = error
            .downcast_ref::<BackupParseError>()
            .unwrap_or_else(|| panic!("expected BackupParseError for {raw}"));
        assert!(
            parse_error.to_string().contains(needle),
            "unexpected error for {raw}: {parse_error}"
        );
    }
}
