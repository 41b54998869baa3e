//! Event record model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomainError;

/// Slug of the collection that holds event records.
pub const EVENTS_COLLECTION: &str = "payload-events";

/// Slug of the host's job queue collection, always tracked.
pub const JOBS_COLLECTION: &str = "payload-jobs";

/// Store-assigned, monotonically increasing event record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EventId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(EventId)
            .map_err(|e| DomainError::Validation(format!("invalid event id {s:?}: {e}")))
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Ids arrive as numbers from this server, as strings from stores
        // with textual keys.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(EventId(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Kind of document mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// A document was created.
    Create,
    /// A document was updated.
    Update,
    /// A document was deleted.
    Delete,
}

impl Operation {
    /// Returns the wire name of the operation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, dot-separated event name such as `posts.create`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventName(String);

impl EventName {
    /// Parses an event name of the form `<scope>.<action>`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if either segment is empty or the
    /// name contains whitespace or commas (commas separate stream filters).
    pub fn parse(name: &str) -> Result<Self, DomainError> {
        if name.chars().any(|c| c.is_whitespace() || c == ',') {
            return Err(DomainError::Validation(format!(
                "event name {name:?} must not contain whitespace or commas"
            )));
        }
        match name.rsplit_once('.') {
            Some((scope, action)) if !scope.is_empty() && !action.is_empty() => {
                Ok(Self(name.to_owned()))
            }
            _ => Err(DomainError::Validation(format!(
                "event name {name:?} must have the form <scope>.<action>"
            ))),
        }
    }

    /// Builds the name of a CRUD event for `collection`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the collection slug is empty or
    /// contains whitespace or commas.
    pub fn for_change(collection: &str, operation: Operation) -> Result<Self, DomainError> {
        Self::parse(&format!("{collection}.{operation}"))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EventName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EventName> for String {
    fn from(name: EventName) -> Self {
        name.0
    }
}

/// Payload of a CRUD event written by the change hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePayload {
    /// Slug of the collection the document belongs to.
    pub collection: String,
    /// What happened to the document.
    pub operation: Operation,
    /// The document's id rendered as a string.
    pub document_id: String,
    /// Full document snapshot at the time of the change.
    pub document: serde_json::Value,
}

impl ChangePayload {
    /// Builds the payload for `document`, extracting its `id` field.
    #[must_use]
    pub fn new(collection: &str, operation: Operation, document: serde_json::Value) -> Self {
        let document_id = match document.get("id") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => serde_json::Value::Null.to_string(),
        };
        Self {
            collection: collection.to_owned(),
            operation,
            document_id,
            document,
        }
    }
}

/// An event record as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Store-assigned identifier.
    pub id: EventId,
    /// Event name, `<collection>.<operation>` for CRUD events.
    pub name: EventName,
    /// Arbitrary structured payload.
    pub payload: serde_json::Value,
    /// Assigned by the store at persistence time.
    pub created_at: DateTime<Utc>,
    /// Assigned by the store at persistence time.
    pub updated_at: DateTime<Utc>,
}

/// Data for a record that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEventRecord {
    /// Event name.
    pub name: EventName,
    /// Event payload.
    pub payload: serde_json::Value,
}

/// The shape of a record pushed over the change stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Record identifier, also the stream cursor.
    pub id: EventId,
    /// Event name.
    pub name: EventName,
    /// Event payload.
    pub payload: serde_json::Value,
    /// Record creation time.
    pub created_at: DateTime<Utc>,
}

impl From<&EventRecord> for ChangeEvent {
    fn from(record: &EventRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            payload: record.payload.clone(),
            created_at: record.created_at,
        }
    }
}
