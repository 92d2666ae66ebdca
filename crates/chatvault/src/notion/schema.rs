//! Resolution of the two Notion database schemas into the handful of
//! property names the sync engine writes to.

use serde_json::{Map, Value};

const SESSION_CANDIDATES: &[&str] = &["session", "session label", "session title", "会话"];
const PROMPT_CANDIDATES: &[&str] = &["prompt", "system prompt", "system role", "提示词"];
const CREATED_CANDIDATES: &[&str] = &["created", "created at", "created time", "创建时间"];
const UPDATED_CANDIDATES: &[&str] = &[
    "updated",
    "updated at",
    "last updated",
    "last edited",
    "更新时间",
];
const CREATED_HINTS: &[&str] = &["created", "创建"];
const UPDATED_HINTS: &[&str] = &["updated", "更新"];

/// A required property could not be found in a database schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaResolutionError {
    pub property_kind: &'static str,
    pub database: String,
}

impl std::fmt::Display for SchemaResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} does not expose a {} property",
            self.database, self.property_kind
        )
    }
}

impl std::error::Error for SchemaResolutionError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantDatabase {
    pub id: String,
    pub title_property: String,
    pub prompt_property: Option<String>,
    pub created_property: Option<String>,
    pub updated_property: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDatabase {
    pub id: String,
    pub title_property: String,
    pub relation_property: String,
    pub session_property: Option<String>,
    pub created_property: Option<String>,
    pub updated_property: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSchema {
    pub assistant: AssistantDatabase,
    pub topic: TopicDatabase,
}

/// Resolves both schemas from their retrieve-database responses.
///
/// `*_database_id` are the configured ids, used when a response omits its
/// own `id`.
pub fn resolve_schema(
    assistant_database_id: &str,
    assistant_database: &Value,
    topic_database_id: &str,
    topic_database: &Value,
) -> Result<ResolvedSchema, SchemaResolutionError> {
    let assistant_id = database_id(assistant_database, assistant_database_id);
    let topic_id = database_id(topic_database, topic_database_id);
    let assistant_properties = properties(assistant_database);
    let topic_properties = properties(topic_database);
    let assistant_name = || describe("assistant database", assistant_database, &assistant_id);
    let topic_name = || describe("topic database", topic_database, &topic_id);

    let assistant = AssistantDatabase {
        title_property: first_of_type(assistant_properties, "title").ok_or_else(|| {
            SchemaResolutionError {
                property_kind: "title",
                database: assistant_name(),
            }
        })?,
        prompt_property: named_of_type(assistant_properties, "rich_text", PROMPT_CANDIDATES),
        created_property: date_property(assistant_properties, CREATED_CANDIDATES, CREATED_HINTS),
        updated_property: date_property(assistant_properties, UPDATED_CANDIDATES, UPDATED_HINTS),
        id: assistant_id.clone(),
    };

    let topic = TopicDatabase {
        title_property: first_of_type(topic_properties, "title").ok_or_else(|| {
            SchemaResolutionError {
                property_kind: "title",
                database: topic_name(),
            }
        })?,
        relation_property: relation_to(topic_properties, &assistant_id).ok_or_else(|| {
            SchemaResolutionError {
                property_kind: "relation (to the assistant database)",
                database: topic_name(),
            }
        })?,
        session_property: named_of_type(topic_properties, "rich_text", SESSION_CANDIDATES),
        created_property: date_property(topic_properties, CREATED_CANDIDATES, CREATED_HINTS),
        updated_property: date_property(topic_properties, UPDATED_CANDIDATES, UPDATED_HINTS),
        id: topic_id,
    };

    Ok(ResolvedSchema { assistant, topic })
}

/// Database ids compare equal regardless of dashes and case.
#[must_use]
pub fn same_database_id(left: &str, right: &str) -> bool {
    normalize_id(left) == normalize_id(right)
}

pub(crate) fn normalize_id(id: &str) -> String {
    id.chars()
        .filter(|ch| *ch != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn database_id(database: &Value, configured: &str) -> String {
    database
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .unwrap_or(configured)
        .to_string()
}

fn describe(kind: &str, database: &Value, id: &str) -> String {
    let title = database
        .get("title")
        .and_then(Value::as_array)
        .and_then(|runs| runs.first())
        .and_then(|run| run.get("plain_text"))
        .and_then(Value::as_str)
        .filter(|title| !title.trim().is_empty());
    match title {
        Some(title) => format!("{kind} `{title}` ({id})"),
        None => format!("{kind} {id}"),
    }
}

fn properties(database: &Value) -> Option<&Map<String, Value>> {
    database.get("properties").and_then(Value::as_object)
}

fn property_type(property: &Value) -> Option<&str> {
    property.get("type").and_then(Value::as_str)
}

fn first_of_type(properties: Option<&Map<String, Value>>, kind: &str) -> Option<String> {
    properties?
        .iter()
        .find(|(_, property)| property_type(property) == Some(kind))
        .map(|(name, _)| name.clone())
}

fn named_of_type(
    properties: Option<&Map<String, Value>>,
    kind: &str,
    candidates: &[&str],
) -> Option<String> {
    let properties = properties?;
    candidates.iter().find_map(|candidate| {
        let wanted = normalize_name(candidate);
        properties
            .iter()
            .find(|(name, property)| {
                property_type(property) == Some(kind) && normalize_name(name) == wanted
            })
            .map(|(name, _)| name.clone())
    })
}

fn date_property(
    properties: Option<&Map<String, Value>>,
    candidates: &[&str],
    hints: &[&str],
) -> Option<String> {
    named_of_type(properties, "date", candidates).or_else(|| {
        properties?
            .iter()
            .find(|(name, property)| {
                let name = normalize_name(name);
                property_type(property) == Some("date") && hints.iter().any(|hint| name.contains(hint))
            })
            .map(|(name, _)| name.clone())
    })
}

fn relation_to(properties: Option<&Map<String, Value>>, target_id: &str) -> Option<String> {
    properties?
        .iter()
        .find(|(_, property)| {
            property_type(property) == Some("relation")
                && property
                    .get("relation")
                    .and_then(|relation| relation.get("database_id"))
                    .and_then(Value::as_str)
                    .is_some_and(|id| same_database_id(id, target_id))
        })
        .map(|(name, _)| name.clone())
}
