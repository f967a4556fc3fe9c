//! Event module defining captured analytics events and the delivery envelope.
//!
//! An [`EventRecord`] is immutable once built. Its serialized size is computed
//! eagerly so the store can account for it in O(1) when rotating.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while building an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// Metadata could not be serialized, or is not a key/value mapping.
    #[error("invalid event metadata: {0}")]
    InvalidMetadata(String),

    /// An event kind name did not match any known kind.
    #[error("unknown event kind '{0}'")]
    UnknownKind(String),
}

/// Device events that can be captured automatically, without caller involvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceEventKind {
    /// Foreground/background session duration.
    Lifecycle,
}

impl DeviceEventKind {
    /// Get all device event kinds.
    pub fn all() -> &'static [DeviceEventKind] {
        &[DeviceEventKind::Lifecycle]
    }

    /// Get the wire name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceEventKind::Lifecycle => "lifecycle",
        }
    }

    /// Parse a comma separated list of kind names (blank entries ignored).
    pub fn parse_list(value: &str) -> Result<HashSet<DeviceEventKind>, EventError> {
        value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for DeviceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceEventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceEventKind::all()
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| EventError::UnknownKind(s.to_string()))
    }
}

/// Tag describing where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EventKind {
    /// Captured automatically from a device signal.
    Device(DeviceEventKind),

    /// Logged explicitly by application code.
    Custom,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Device(kind) => f.write_str(kind.name()),
            EventKind::Custom => f.write_str("custom"),
        }
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("custom") {
            return Ok(EventKind::Custom);
        }
        s.parse().map(EventKind::Device)
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> String {
        kind.to_string()
    }
}

impl TryFrom<String> for EventKind {
    type Error = EventError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A single captured analytics event.
///
/// Timestamps are kept at millisecond precision, which is also the wire
/// precision, so a record reloaded from persistence compares equal to the
/// original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordBody")]
pub struct EventRecord {
    id: Uuid,

    kind: EventKind,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,

    metadata: Map<String, Value>,

    #[serde(skip_serializing)]
    size_bytes: usize,
}

/// Serialized shape of a record; size is derived, never trusted from input.
#[derive(Deserialize)]
struct RecordBody {
    id: Uuid,
    kind: EventKind,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl TryFrom<RecordBody> for EventRecord {
    type Error = EventError;

    fn try_from(body: RecordBody) -> Result<Self, Self::Error> {
        EventRecord::from_parts(body.id, body.kind, body.timestamp, body.metadata)
    }
}

impl EventRecord {
    /// Create a new event captured now.
    ///
    /// # Errors
    ///
    /// Returns `EventError::InvalidMetadata` if `metadata` fails to serialize
    /// or does not serialize to a key/value mapping.
    pub fn new<M>(kind: EventKind, metadata: &M) -> Result<Self, EventError>
    where
        M: Serialize + ?Sized,
    {
        Self::with_timestamp(kind, metadata, Utc::now())
    }

    /// Create a new custom event captured now.
    pub fn custom<M>(metadata: &M) -> Result<Self, EventError>
    where
        M: Serialize + ?Sized,
    {
        Self::new(EventKind::Custom, metadata)
    }

    /// Create a new event with an explicit capture instant.
    pub fn with_timestamp<M>(
        kind: EventKind,
        metadata: &M,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, EventError>
    where
        M: Serialize + ?Sized,
    {
        let metadata = match serde_json::to_value(metadata) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(EventError::InvalidMetadata(format!(
                    "expected a key/value mapping, got {}",
                    value_type(&other)
                )))
            }
            Err(e) => return Err(EventError::InvalidMetadata(e.to_string())),
        };

        let timestamp =
            DateTime::from_timestamp_millis(timestamp.timestamp_millis()).unwrap_or(timestamp);

        Self::from_parts(Uuid::new_v4(), kind, timestamp, metadata)
    }

    fn from_parts(
        id: Uuid,
        kind: EventKind,
        timestamp: DateTime<Utc>,
        metadata: Map<String, Value>,
    ) -> Result<Self, EventError> {
        let mut record = Self {
            id,
            kind,
            timestamp,
            metadata,
            size_bytes: 0,
        };
        record.size_bytes = serde_json::to_vec(&record)
            .map_err(|e| EventError::InvalidMetadata(e.to_string()))?
            .len();
        Ok(record)
    }

    /// Client-generated event ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Event kind.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Capture instant.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Event metadata.
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Serialized size used for rotation accounting.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Identity of the application reporting events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    /// Application name
    pub name: String,

    /// Application version
    pub version: String,
}

impl AppIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// A batch of events sent to the collector in one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatch {
    /// Events in capture order
    pub events: Vec<EventRecord>,

    /// Client-generated batch ID for idempotency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,

    /// Application that captured the events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<AppIdentity>,

    /// Current user identity, if one is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl EventBatch {
    /// Create a new batch from events.
    pub fn new(events: Vec<EventRecord>) -> Self {
        Self {
            events,
            batch_id: Some(Uuid::new_v4()),
            app: None,
            user_id: None,
        }
    }

    /// Attach the reporting application.
    pub fn with_app(mut self, app: AppIdentity) -> Self {
        self.app = Some(app);
        self
    }

    /// Attach the current user identity.
    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Get the number of events in the batch.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn test_event_kind_serialization() {
        let json = serde_json::to_string(&EventKind::Custom).unwrap();
        assert_eq!(json, "\"custom\"");

        let json = serde_json::to_string(&EventKind::Device(DeviceEventKind::Lifecycle)).unwrap();
        assert_eq!(json, "\"lifecycle\"");
    }

    #[test]
    fn test_event_kind_deserialization() {
        let kind: EventKind = serde_json::from_str("\"lifecycle\"").unwrap();
        assert_eq!(kind, EventKind::Device(DeviceEventKind::Lifecycle));

        let result: Result<EventKind, _> = serde_json::from_str("\"crash\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_device_kind_parse_list() {
        let kinds = DeviceEventKind::parse_list(" Lifecycle , ").unwrap();
        assert!(kinds.contains(&DeviceEventKind::Lifecycle));

        assert!(DeviceEventKind::parse_list("").unwrap().is_empty());

        let err = DeviceEventKind::parse_list("lifecycle,battery").unwrap_err();
        assert_eq!(err, EventError::UnknownKind("battery".to_string()));
    }

    #[test]
    fn test_record_creation() {
        let record = EventRecord::custom(&json!({"screen": "home", "count": 3})).unwrap();

        assert_eq!(record.kind(), EventKind::Custom);
        assert_eq!(record.metadata()["screen"], "home");
        assert_eq!(record.metadata()["count"], 3);
        assert!(record.size_bytes() > 0);
    }

    #[test]
    fn test_record_size_matches_serialization() {
        let mut metadata = HashMap::new();
        metadata.insert("button", "checkout");
        let record = EventRecord::custom(&metadata).unwrap();

        let serialized = serde_json::to_vec(&record).unwrap();
        assert_eq!(record.size_bytes(), serialized.len());
        assert!(!String::from_utf8(serialized).unwrap().contains("size_bytes"));
    }

    #[test]
    fn test_record_size_grows_with_metadata() {
        let small = EventRecord::custom(&json!({"pad": ""})).unwrap();
        let large = EventRecord::custom(&json!({"pad": "x".repeat(100)})).unwrap();
        assert_eq!(large.size_bytes(), small.size_bytes() + 100);
    }

    #[test]
    fn test_record_rejects_non_mapping_metadata() {
        let err = EventRecord::custom(&json!(["a", "b"])).unwrap_err();
        assert!(matches!(err, EventError::InvalidMetadata(ref m) if m.contains("an array")));

        let err = EventRecord::custom("just a string").unwrap_err();
        assert!(matches!(err, EventError::InvalidMetadata(_)));
    }

    #[test]
    fn test_record_rejects_unserializable_metadata() {
        // JSON object keys must be strings.
        let mut metadata = BTreeMap::new();
        metadata.insert((1, 2), "value");

        let err = EventRecord::custom(&metadata).unwrap_err();
        assert!(matches!(err, EventError::InvalidMetadata(_)));
    }

    #[test]
    fn test_record_round_trip_preserves_identity_and_size() {
        let record = EventRecord::custom(&json!({"screen": "settings"})).unwrap();
        let json = serde_json::to_string(&record).unwrap();
        let restored: EventRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, record);
        assert_eq!(restored.size_bytes(), record.size_bytes());
    }

    #[test]
    fn test_record_ignores_size_from_input() {
        let record = EventRecord::custom(&json!({"k": "v"})).unwrap();
        let mut value = serde_json::to_value(&record).unwrap();
        value["size_bytes"] = json!(1);

        let restored: EventRecord = serde_json::from_value(value).unwrap();
        assert_eq!(restored.size_bytes(), record.size_bytes());
    }

    #[test]
    fn test_batch_creation() {
        let events = vec![
            EventRecord::custom(&json!({"n": 1})).unwrap(),
            EventRecord::custom(&json!({"n": 2})).unwrap(),
        ];
        let batch = EventBatch::new(events)
            .with_app(AppIdentity::new("demo", "1.0.0"))
            .with_user(Some("alice".to_string()));

        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        assert!(batch.batch_id.is_some());
        assert_eq!(batch.user_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_batch_serialization_skips_missing_fields() {
        let batch = EventBatch::new(Vec::new());
        let json = serde_json::to_string(&batch).unwrap();

        assert!(json.contains("\"events\":[]"));
        assert!(json.contains("batch_id"));
        assert!(!json.contains("user_id"));
        assert!(!json.contains("app"));
    }
}
