use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Records that are indexed by their opaque id.
pub trait Keyed {
    fn key(&self) -> &str;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assistant {
    #[serde(deserialize_with = "required_id")]
    pub id: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub slug: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub system_role: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub model: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(deserialize_with = "required_id")]
    pub id: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub slug: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub created_at: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub updated_at: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub accessed_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    #[serde(deserialize_with = "required_id")]
    pub id: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub session_id: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub created_at: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(deserialize_with = "required_id")]
    pub id: String,

    #[serde(default)]
    pub role: MessageRole,

    #[serde(default)]
    pub content: Value,

    #[serde(default)]
    pub reasoning: Option<Value>,

    #[serde(default)]
    pub search: Option<Value>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub created_at: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub updated_at: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub session_id: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub topic_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantSessionLink {
    #[serde(default, alias = "assistantId", deserialize_with = "lenient_text")]
    pub agent_id: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupPayload {
    #[serde(default, alias = "agents", deserialize_with = "nullable_list")]
    pub assistants: Vec<Assistant>,

    #[serde(default, deserialize_with = "nullable_list")]
    pub sessions: Vec<Session>,

    #[serde(default, deserialize_with = "nullable_list")]
    pub topics: Vec<Topic>,

    #[serde(default, deserialize_with = "nullable_list")]
    pub messages: Vec<Message>,

    #[serde(
        default,
        rename = "agentsToSessions",
        deserialize_with = "nullable_list"
    )]
    pub links: Vec<AssistantSessionLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
    System,
    #[default]
    Unknown,
    Other(String),
}

impl MessageRole {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::System => "system",
            Self::Unknown => "unknown",
            Self::Other(raw) => raw.as_str(),
        }
    }

    /// Role name with its first character upper-cased, as used in headings.
    #[must_use]
    pub fn display_name(&self) -> String {
        let raw = self.as_str();
        let mut chars = raw.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    #[must_use]
    pub fn is_conversational(&self) -> bool {
        matches!(self, Self::User | Self::Assistant)
    }
}

impl From<String> for MessageRole {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "tool" => Self::Tool,
            "system" => Self::System,
            _ => Self::Other(raw),
        }
    }
}

impl Serialize for MessageRole {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(lenient_text(deserializer)?
            .map(Self::from)
            .unwrap_or_default())
    }
}

impl Keyed for Assistant {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Session {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Topic {
    fn key(&self) -> &str {
        &self.id
    }
}

/// The input document could not be turned into a backup payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupParseError {
    pub reason: String,
}

impl std::fmt::Display for BackupParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid backup document: {}", self.reason)
    }
}

impl std::error::Error for BackupParseError {}

/// Parses a backup export and extracts its `data` payload.
///
/// Fails without producing any partial payload when the text is not JSON,
/// the root is not an object, or the `data` container is absent.
pub fn parse_backup_payload(raw: &str) -> Result<BackupPayload, BackupParseError> {
    let document: Value = serde_json::from_str(raw).map_err(|error| BackupParseError {
        reason: format!("not valid JSON ({error})"),
    })?;

    let mut root = match document {
        Value::Object(root) => root,
        other => {
            return Err(BackupParseError {
                reason: format!(
                    "expected a JSON object at the root, found {}",
                    json_kind(&other)
                ),
            });
        }
    };

    let payload = match root.remove("data") {
        Some(Value::Object(payload)) => Value::Object(payload),
        Some(other) => {
            return Err(BackupParseError {
                reason: format!("`data` must be an object, found {}", json_kind(&other)),
            });
        }
        None => {
            return Err(BackupParseError {
                reason: "missing `data` payload".to_string(),
            });
        }
    };

    serde_json::from_value(payload).map_err(|error| BackupParseError {
        reason: format!("malformed `data` payload ({error})"),
    })
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        _ => None,
    })
}

fn required_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "record id must be a string or number, found {}",
            json_kind(&other)
        ))),
    }
}

fn nullable_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
