//! Linked-record mode: assistants and topics as rows of two databases joined
//! by a relation property.
//!
//! Each record is reconciled against what is already stored: no match is
//! created, a match whose stored "updated" date equals the computed one is
//! reused, and anything else is archived and recreated wholesale.
//!
//! Labels are not unique. Records created or reused earlier in the same run
//! are claimed and never matched again, and a stale-looking match that is the
//! fresh record of a later same-labelled sibling is left for that sibling.

use std::collections::BTreeSet;

use anyhow::Result;
use serde_json::{Map, Value, json};

use super::blocks::{code_block, markdown_to_blocks, plain_rich_text};
use super::client::NotionClient;
use super::schema::{ResolvedSchema, normalize_id, resolve_schema, same_database_id};
use super::{SyncLog, SyncReport};
use crate::hierarchy::{AssistantGroup, ParsedBackup, SessionGroup, TopicGroup};
use crate::render::{RenderOptions, render_topic};
use crate::utils::time::{TimestampRange, same_instant};

/// What to do with one derived record given the matching remote records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Create,
    Reuse(String),
    Replace(Vec<String>),
}

/// Decides create / reuse / replace for a set of remote matches.
///
/// `is_fresh` reports whether a stored record already reflects the current
/// derived state; the first fresh match is reused. Otherwise every match not
/// `is_reserved` for someone else is replaced.
pub fn reconcile<F, R>(matches: &[Value], is_fresh: F, is_reserved: R) -> Reconciliation
where
    F: Fn(&Value) -> bool,
    R: Fn(&Value) -> bool,
{
    if let Some(id) = matches.iter().filter(|page| is_fresh(page)).find_map(page_id) {
        return Reconciliation::Reuse(id);
    }
    let stale = matches
        .iter()
        .filter(|page| !is_reserved(page))
        .filter_map(page_id)
        .collect::<Vec<_>>();
    if stale.is_empty() {
        Reconciliation::Create
    } else {
        Reconciliation::Replace(stale)
    }
}

/// Record ids created or reused during one run.
#[derive(Debug, Clone, Default)]
pub struct ClaimedRecords {
    ids: BTreeSet<String>,
}

impl ClaimedRecords {
    pub fn claim(&mut self, id: &str) {
        self.ids.insert(normalize_id(id));
    }

    #[must_use]
    pub fn is_claimed(&self, id: &str) -> bool {
        self.ids.contains(&normalize_id(id))
    }

    /// Drops matches that already belong to another record of this run.
    #[must_use]
    pub fn unclaimed(&self, matches: Vec<Value>) -> Vec<Value> {
        matches
            .into_iter()
            .filter(|page| page_id(page).is_none_or(|id| !self.is_claimed(&id)))
            .collect()
    }
}

/// Created/updated values written to the date properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDates {
    pub created: Option<String>,
    pub updated: Option<String>,
}

impl From<TimestampRange> for RecordDates {
    fn from(range: TimestampRange) -> Self {
        Self {
            created: range.earliest_utc(),
            updated: range.latest_utc(),
        }
    }
}

#[must_use]
pub fn assistant_dates(group: &AssistantGroup) -> RecordDates {
    let mut range = TimestampRange::default();
    for session_group in &group.sessions {
        if let Some(session) = session_group.session.as_ref() {
            range.observe(session.created_at.as_deref());
            range.observe(session.updated_at.as_deref());
        }
        for topic_group in &session_group.topics {
            range.merge(topic_range(topic_group));
        }
    }
    range.into()
}

/// Topic dates, falling back to the session's when the topic and its
/// messages carry none.
#[must_use]
pub fn topic_dates(session_group: &SessionGroup, topic_group: &TopicGroup) -> RecordDates {
    let mut range = topic_range(topic_group);
    if range.is_empty()
        && let Some(session) = session_group.session.as_ref()
    {
        range.observe(session.created_at.as_deref());
        range.observe(session.updated_at.as_deref());
    }
    range.into()
}

fn topic_range(topic_group: &TopicGroup) -> TimestampRange {
    let mut range = TimestampRange::default();
    if let Some(topic) = topic_group.topic.as_ref() {
        range.observe(topic.created_at.as_deref());
        range.observe(topic.updated_at.as_deref());
    }
    for message in &topic_group.messages {
        range.observe(message.created_at.as_deref());
        range.observe(message.updated_at.as_deref());
    }
    range
}

pub fn sync_records(
    parsed: &ParsedBackup,
    assistant_database_id: &str,
    topic_database_id: &str,
    client: &mut NotionClient<'_>,
    log: &mut SyncLog<'_>,
    report: &mut SyncReport,
) -> Result<()> {
    log.info("reading Notion database schema");
    let assistant_database = client.retrieve_database(assistant_database_id)?;
    let topic_database = client.retrieve_database(topic_database_id)?;
    let schema = resolve_schema(
        assistant_database_id,
        &assistant_database,
        topic_database_id,
        &topic_database,
    )?;
    if schema.assistant.updated_property.is_none() {
        log.warn("assistant database has no updated date property; existing assistant records will be replaced");
    }
    if schema.topic.updated_property.is_none() {
        log.warn("topic database has no updated date property; existing topic records will be replaced");
    }

    let mut run = RecordSync {
        schema,
        client,
        log,
        report,
        claimed: ClaimedRecords::default(),
    };
    let assistant_updates = parsed
        .groups
        .iter()
        .map(|group| (group.assistant_label.as_str(), assistant_dates(group).updated))
        .collect::<Vec<_>>();

    for (index, group) in parsed.groups.iter().enumerate() {
        let reserved = later_updates(&assistant_updates[index + 1..], &group.assistant_label);
        let (assistant_record_id, previous_ids) = run.assistant(group, &reserved)?;

        let topics = group.topics().collect::<Vec<_>>();
        let topic_updates = topics
            .iter()
            .map(|&(session_group, topic_group)| {
                (
                    topic_group.topic_label.as_str(),
                    topic_dates(session_group, topic_group).updated,
                )
            })
            .collect::<Vec<_>>();
        for (position, &(session_group, topic_group)) in topics.iter().enumerate() {
            let reserved = later_updates(&topic_updates[position + 1..], &topic_group.topic_label);
            run.topic(
                group,
                session_group,
                topic_group,
                &assistant_record_id,
                &previous_ids,
                &reserved,
            )?;
        }
    }
    Ok(())
}

/// Updated dates of the upcoming records that share `label`.
fn later_updates(upcoming: &[(&str, Option<String>)], label: &str) -> Vec<Option<String>> {
    upcoming
        .iter()
        .filter(|(other, _)| *other == label)
        .map(|(_, updated)| updated.clone())
        .collect()
}

/// `stored` equals one of `updates`; never true without an updated property.
fn matches_any_update(page: &Value, property: Option<&str>, updates: &[Option<String>]) -> bool {
    property.is_some_and(|property| {
        updates
            .iter()
            .any(|updated| same_instant(stored_date(page, property), updated.as_deref()))
    })
}

struct RecordSync<'a, 'n, 'l> {
    schema: ResolvedSchema,
    client: &'a mut NotionClient<'n>,
    log: &'a mut SyncLog<'l>,
    report: &'a mut SyncReport,
    claimed: ClaimedRecords,
}

impl RecordSync<'_, '_, '_> {
    /// Returns the current assistant record id and the ids it replaced.
    fn assistant(
        &mut self,
        group: &AssistantGroup,
        reserved: &[Option<String>],
    ) -> Result<(String, Vec<String>)> {
        let database = &self.schema.assistant;
        let label = group.assistant_label.as_str();
        let dates = assistant_dates(group);
        self.log.info(format!("writing assistant record: {label}"));

        let matches = self.client.query_database(
            &database.id,
            &json!({ "property": database.title_property, "title": { "equals": label } }),
        )?;
        let matches = self.claimed.unclaimed(matches);
        let updated_property = database.updated_property.as_deref();
        let decision = reconcile(
            &matches,
            |page| matches_any_update(page, updated_property, std::slice::from_ref(&dates.updated)),
            |page| matches_any_update(page, updated_property, reserved),
        );

        let previous_ids = match decision {
            Reconciliation::Reuse(id) => {
                self.log.info(format!("assistant record unchanged: {label}"));
                self.report.assistants.skipped += 1;
                self.claimed.claim(&id);
                return Ok((id, Vec::new()));
            }
            Reconciliation::Create => Vec::new(),
            Reconciliation::Replace(ids) => {
                self.log.warn(format!(
                    "replacing {} stale assistant record(s): {label}",
                    ids.len()
                ));
                for id in &ids {
                    self.client.archive_page(id)?;
                }
                ids
            }
        };

        let system_prompt = group
            .assistant
            .as_ref()
            .and_then(|assistant| assistant.system_role.as_deref())
            .filter(|prompt| !prompt.trim().is_empty());
        let mut properties = Map::new();
        properties.insert(
            database.title_property.clone(),
            json!({ "title": plain_rich_text(label) }),
        );
        let mut body = Vec::new();
        match (database.prompt_property.as_ref(), system_prompt) {
            (Some(property), Some(prompt)) => {
                properties.insert(property.clone(), json!({ "rich_text": plain_rich_text(prompt) }));
            }
            (None, Some(prompt)) => body.push(code_block("", prompt)),
            _ => {}
        }
        insert_dates(
            &mut properties,
            database.created_property.as_deref(),
            updated_property,
            &dates,
        );

        let id = self.client.create_page(
            json!({
                "parent": { "database_id": database.id },
                "properties": properties,
            }),
            body,
        )?;
        self.claimed.claim(&id);
        if previous_ids.is_empty() {
            self.report.assistants.created += 1;
            self.log.success(format!("created assistant record: {label}"));
        } else {
            self.report.assistants.replaced += 1;
            self.log.success(format!("replaced assistant record: {label}"));
        }
        Ok((id, previous_ids))
    }

    fn topic(
        &mut self,
        group: &AssistantGroup,
        session_group: &SessionGroup,
        topic_group: &TopicGroup,
        assistant_record_id: &str,
        previous_assistant_ids: &[String],
        reserved: &[Option<String>],
    ) -> Result<()> {
        let database = &self.schema.topic;
        let label = topic_group.topic_label.as_str();
        let dates = topic_dates(session_group, topic_group);

        let matches = self.client.query_database(
            &database.id,
            &topic_filter(
                &database.title_property,
                &database.relation_property,
                label,
                assistant_record_id,
                previous_assistant_ids,
            ),
        )?;
        let matches = self.claimed.unclaimed(matches);
        let updated_property = database.updated_property.as_deref();
        let related = |page: &Value| {
            relation_contains(page, &database.relation_property, assistant_record_id)
        };
        let decision = reconcile(
            &matches,
            |page| {
                matches_any_update(page, updated_property, std::slice::from_ref(&dates.updated))
                    && related(page)
            },
            |page| matches_any_update(page, updated_property, reserved) && related(page),
        );

        let replaced = match decision {
            Reconciliation::Reuse(id) => {
                self.log.info(format!("  -> topic record unchanged: {label}"));
                self.report.topics.skipped += 1;
                self.claimed.claim(&id);
                return Ok(());
            }
            Reconciliation::Create => false,
            Reconciliation::Replace(ids) => {
                for id in &ids {
                    self.client.archive_page(id)?;
                }
                true
            }
        };

        let mut properties = Map::new();
        properties.insert(
            database.title_property.clone(),
            json!({ "title": plain_rich_text(label) }),
        );
        properties.insert(
            database.relation_property.clone(),
            json!({ "relation": [{ "id": assistant_record_id }] }),
        );
        if let Some(property) = database.session_property.as_ref() {
            properties.insert(
                property.clone(),
                json!({ "rich_text": plain_rich_text(&session_group.session_label) }),
            );
        }
        insert_dates(
            &mut properties,
            database.created_property.as_deref(),
            updated_property,
            &dates,
        );

        let markdown = render_topic(
            group.assistant.as_ref(),
            session_group.session.as_ref(),
            topic_group,
            &group.assistant_label,
            RenderOptions::BODY_ONLY,
        );
        let id = self.client.create_page(
            json!({
                "parent": { "database_id": database.id },
                "properties": properties,
            }),
            markdown_to_blocks(&markdown),
        )?;
        self.claimed.claim(&id);

        if replaced {
            self.report.topics.replaced += 1;
            self.log.success(format!("  -> replaced topic record: {label}"));
        } else {
            self.report.topics.created += 1;
            self.log.success(format!("  -> created topic record: {label}"));
        }
        Ok(())
    }
}

/// Title equals `label` and the relation points at the current assistant
/// record or at one it just replaced.
#[must_use]
pub fn topic_filter(
    title_property: &str,
    relation_property: &str,
    label: &str,
    assistant_record_id: &str,
    previous_assistant_ids: &[String],
) -> Value {
    let relation = |id: &str| json!({ "property": relation_property, "relation": { "contains": id } });
    let relation_filter = if previous_assistant_ids.is_empty() {
        relation(assistant_record_id)
    } else {
        let alternatives = std::iter::once(assistant_record_id)
            .chain(previous_assistant_ids.iter().map(String::as_str))
            .map(relation)
            .collect::<Vec<_>>();
        json!({ "or": alternatives })
    };
    json!({
        "and": [
            { "property": title_property, "title": { "equals": label } },
            relation_filter,
        ]
    })
}

fn insert_dates(
    properties: &mut Map<String, Value>,
    created_property: Option<&str>,
    updated_property: Option<&str>,
    dates: &RecordDates,
) {
    if let (Some(property), Some(created)) = (created_property, dates.created.as_deref()) {
        properties.insert(property.to_string(), json!({ "date": { "start": created } }));
    }
    if let (Some(property), Some(updated)) = (updated_property, dates.updated.as_deref()) {
        properties.insert(property.to_string(), json!({ "date": { "start": updated } }));
    }
}

fn page_id(page: &Value) -> Option<String> {
    page.get("id").and_then(Value::as_str).map(str::to_string)
}

fn stored_date<'a>(page: &'a Value, property: &str) -> Option<&'a str> {
    page.get("properties")?
        .get(property)?
        .get("date")?
        .get("start")?
        .as_str()
}

fn relation_contains(page: &Value, property: &str, record_id: &str) -> bool {
    page.get("properties")
        .and_then(|properties| properties.get(property))
        .and_then(|relation| relation.get("relation"))
        .and_then(Value::as_array)
        .is_some_and(|links| {
            links.iter().any(|link| {
                link.get("id")
                    .and_then(Value::as_str)
                    .is_some_and(|id| same_database_id(id, record_id))
            })
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        ClaimedRecords, Reconciliation, later_updates, reconcile, relation_contains, stored_date,
        topic_filter,
    };

    #[test]
    fn reconcile_covers_create_reuse_and_replace() {
        assert_eq!(reconcile(&[], |_| true, |_| false), Reconciliation::Create);

        let matches = vec![json!({ "id": "old" }), json!({ "id": "fresh" })];
        assert_eq!(
            reconcile(&matches, |page| page["id"] == "fresh", |_| false),
            Reconciliation::Reuse("fresh".to_string())
        );
        assert_eq!(
            reconcile(&matches, |_| false, |_| false),
            Reconciliation::Replace(vec!["old".to_string(), "fresh".to_string()])
        );
    }

    #[test]
    fn reserved_matches_are_never_replaced() {
        let matches = vec![json!({ "id": "old" }), json!({ "id": "sibling" })];
        assert_eq!(
            reconcile(&matches, |_| false, |page| page["id"] == "sibling"),
            Reconciliation::Replace(vec!["old".to_string()])
        );
        assert_eq!(
            reconcile(&matches[1..], |_| false, |page| page["id"] == "sibling"),
            Reconciliation::Create
        );
    }

    #[test]
    fn claimed_records_are_dropped_from_matches() {
        let mut claimed = ClaimedRecords::default();
        claimed.claim("ABCD-EF01");
        assert!(claimed.is_claimed("abcdef01"));

        let matches = vec![
            json!({ "id": "abcdef01" }),
            json!({ "id": "other" }),
            json!({ "object": "page" }),
        ];
        assert_eq!(
            claimed.unclaimed(matches),
            vec![json!({ "id": "other" }), json!({ "object": "page" })]
        );
    }

    #[test]
    fn later_updates_only_collect_same_labelled_records() {
        let upcoming = [
            ("New chat", Some("2024-05-02T00:00:00.000Z".to_string())),
            ("Other", Some("2024-05-03T00:00:00.000Z".to_string())),
            ("New chat", None),
        ];
        assert_eq!(
            later_updates(&upcoming, "New chat"),
            vec![Some("2024-05-02T00:00:00.000Z".to_string()), None]
        );
        assert!(later_updates(&upcoming[..0], "New chat").is_empty());
    }

    #[test]
    fn reads_stored_dates_and_relations() {
        let page = json!({
            "id": "p1",
            "properties": {
                "Updated": { "type": "date", "date": { "start": "2024-05-01T08:00:00.000+00:00" } },
                "Assistant": { "type": "relation", "relation": [{ "id": "abcd-ef01" }] }
            }
        });
        assert_eq!(
            stored_date(&page, "Updated"),
            Some("2024-05-01T08:00:00.000+00:00")
        );
        assert_eq!(stored_date(&page, "Missing"), None);
        assert!(relation_contains(&page, "Assistant", "ABCDEF01"));
        assert!(!relation_contains(&page, "Assistant", "other"));
    }

    #[test]
    fn topic_filter_includes_previous_assistant_records() {
        let plain = topic_filter("Name", "Assistant", "Hello", "new", &[]);
        assert_eq!(plain["and"][1]["relation"]["contains"], "new");

        let widened = topic_filter("Name", "Assistant", "Hello", "new", &["old".to_string()]);
        assert_eq!(widened["and"][0]["title"]["equals"], "Hello");
        assert_eq!(widened["and"][1]["or"][0]["relation"]["contains"], "new");
        assert_eq!(widened["and"][1]["or"][1]["relation"]["contains"], "old");
    }
}
