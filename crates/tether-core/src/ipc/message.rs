//! The framed message exchanged over the wire

use crate::error::{TetherError, TetherResult};
use crate::events::TypedEvent;
use chrono::{SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

const TYPE_FIELD: &str = "type";
const ID_FIELD: &str = "id";
const CALL_ID_FIELD: &str = "callId";
const TIMESTAMP_FIELD: &str = "timestamp";

/// Kind given to correlated replies that omit `type`
pub const RESPONSE_KIND: &str = "response";

/// ISO-8601 UTC timestamp with millisecond precision
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One protocol message.
///
/// `type` is the discriminator, `id` is present only on correlated
/// request/response pairs, `timestamp` is advisory. Everything else
/// (`data`, `params`, `result`, `error`, ...) is an opaque body the core
/// never interprets beyond routing.
#[derive(Debug, Clone, PartialEq)]
pub struct FramedMessage {
    kind: String,
    id: Option<String>,
    timestamp: Option<String>,
    body: Map<String, Value>,
}

impl FramedMessage {
    /// A message with no body
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            timestamp: None,
            body: Map::new(),
        }
    }

    /// A timestamped one-way command: `{type, timestamp, data}`
    pub fn command(kind: impl Into<String>, data: Value) -> Self {
        Self::new(kind)
            .with_timestamp(timestamp_now())
            .with_field("data", data)
    }

    /// A timestamped correlated request: `{type, id, timestamp, data}`
    pub fn request(kind: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        Self::command(kind, data).with_id(id)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Add a body field. Reserved envelope keys are ignored.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if !matches!(key.as_str(), TYPE_FIELD | ID_FIELD | TIMESTAMP_FIELD) {
            self.body.insert(key, value);
        }
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// A body field by name
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// The `data` field
    pub fn data(&self) -> Option<&Value> {
        self.body.get("data")
    }

    /// The first of `data`, `params` or `result` that is present
    pub fn payload(&self) -> Option<&Value> {
        ["data", "params", "result"]
            .iter()
            .find_map(|key| self.body.get(*key))
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Serialize into a JSON value
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.body.len() + 3);
        map.insert(TYPE_FIELD.to_string(), Value::String(self.kind.clone()));
        if let Some(id) = &self.id {
            map.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        }
        if let Some(ts) = &self.timestamp {
            map.insert(TIMESTAMP_FIELD.to_string(), Value::String(ts.clone()));
        }
        for (k, v) in &self.body {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}

impl Serialize for FramedMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(TYPE_FIELD, &self.kind)?;
        if let Some(id) = &self.id {
            map.serialize_entry(ID_FIELD, id)?;
        }
        if let Some(ts) = &self.timestamp {
            map.serialize_entry(TIMESTAMP_FIELD, ts)?;
        }
        for (k, v) in &self.body {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl TryFrom<Value> for FramedMessage {
    type Error = TetherError;

    fn try_from(value: Value) -> TetherResult<Self> {
        let Value::Object(mut body) = value else {
            return Err(TetherError::protocol("message is not a JSON object"));
        };

        let id = match body.remove(ID_FIELD) {
            Some(value) => id_from_value(&value),
            None => body.get(CALL_ID_FIELD).and_then(id_from_value),
        };

        // Bare `{callId, success, result}` replies carry their id as the discriminator
        let kind = match body.remove(TYPE_FIELD) {
            Some(Value::String(kind)) if !kind.is_empty() => kind,
            Some(_) => return Err(TetherError::protocol("'type' must be a non-empty string")),
            None if id.is_some() => RESPONSE_KIND.to_string(),
            None => return Err(TetherError::protocol("message has no 'type' field")),
        };

        let timestamp = match body.remove(TIMESTAMP_FIELD) {
            Some(Value::String(ts)) => Some(ts),
            _ => None,
        };

        Ok(Self {
            kind,
            id,
            timestamp,
            body,
        })
    }
}

impl std::str::FromStr for FramedMessage {
    type Err = TetherError;

    fn from_str(s: &str) -> TetherResult<Self> {
        let value: Value = serde_json::from_str(s)?;
        Self::try_from(value)
    }
}

impl TypedEvent for FramedMessage {
    type Kind = String;

    fn kind(&self) -> String {
        self.kind.clone()
    }
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
