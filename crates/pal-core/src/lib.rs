use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub mod sentiment;

/// The full persisted state: the task list plus the append-only
/// conversation log. The in-memory copy is authoritative between loads;
/// the file on disk is a serialization snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub conversation: Vec<ConversationEntry>,
}

/// A task with an optional reminder timestamp. Fields the schema does
/// not know about are carried through `extra` verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<String>,
    #[serde(default)]
    pub reminded: bool,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

/// Client-supplied shape of a task-create request. The server assigns
/// the id and resets the lifecycle flags; everything unrecognized lands
/// in `extra` and is stored as-is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub reminder: Option<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

/// One chat exchange: what the user said, what the bot answered, and
/// the sentiment read at the time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub timestamp: String,
    pub user: String,
    pub bot: String,
    pub sentiment: Sentiment,
    pub polarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("invalid timestamp: {0}")]
pub struct TimestampError(pub String);

/// Parse a reminder or log timestamp. Accepts RFC 3339 and the naive
/// `YYYY-MM-DDTHH:MM[:SS[.f]]` form; naive values are taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, TimestampError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed.and_utc());
        }
    }
    Err(TimestampError(value.to_string()))
}
