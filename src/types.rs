//! Core event types for the a3s-bus system
//!
//! All types use camelCase JSON serialization so stored events can be
//! exported and re-imported without loss.

use crate::error::{EventError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

/// Metadata key stamped by `TimingMiddleware` with the RFC 3339 receipt time
pub const RECEIVED_AT: &str = "received_at";

/// Metadata key stamped by `TimingMiddleware` with the event age at receipt
pub const EVENT_AGE_MS: &str = "event_age_ms";

/// Keys owned by built-in middleware; producers cannot set them
pub const RESERVED_METADATA_KEYS: &[&str] = &[RECEIVED_AT, EVENT_AGE_MS];

/// Dispatch priority
///
/// Used both as an event attribute and as the ordering key among
/// subscriptions that match the same event. Orders `Low < Normal < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only key/value bag attached to an event
///
/// Entries can be added but never replaced or removed. Keys listed in
/// [`RESERVED_METADATA_KEYS`] are written by built-in middleware only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventMetadata(BTreeMap<String, serde_json::Value>);

impl EventMetadata {
    /// Add an entry, failing if the key is already present
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Result<()> {
        let key = key.into();
        if self.0.contains_key(&key) {
            return Err(EventError::Metadata(format!(
                "Metadata key '{}' is already set",
                key
            )));
        }
        self.0.insert(key, value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    /// Whether `key` belongs to built-in middleware
    pub fn is_reserved(key: &str) -> bool {
        RESERVED_METADATA_KEYS.contains(&key)
    }

    /// Reject reserved entries whose values middleware could not have written
    fn check_reserved(&self) -> Result<()> {
        if let Some(value) = self.get(RECEIVED_AT) {
            if !value.is_string() {
                return Err(EventError::Construction(format!(
                    "Metadata key '{}' must be an RFC 3339 string",
                    RECEIVED_AT
                )));
            }
        }
        if let Some(value) = self.get(EVENT_AGE_MS) {
            if value.as_i64().is_none() {
                return Err(EventError::Construction(format!(
                    "Metadata key '{}' must be an integer",
                    EVENT_AGE_MS
                )));
            }
        }
        Ok(())
    }
}

/// A single occurrence in the system
///
/// Events are routed by `event_type`, a namespaced string such as
/// `order:created`. Lineage fields link events into causal chains:
/// every event in a chain shares `correlation_id`, and `causation_id`
/// names the direct parent (absent for chain roots).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique event identifier (evt-<uuid>)
    pub event_id: String,

    /// Routing key, e.g. "order:created"
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event payload — arbitrary JSON data
    #[serde(default)]
    pub data: serde_json::Value,

    /// Producer of this event
    pub source: String,

    #[serde(default)]
    pub priority: Priority,

    /// Shared by all events of one logical chain
    pub correlation_id: String,

    /// Direct parent event, `None` for chain roots
    #[serde(default)]
    pub causation_id: Option<String>,

    /// Creation time
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metadata: EventMetadata,
}

impl Event {
    /// Create a root event with auto-generated id and timestamp
    pub fn new(
        event_type: impl Into<String>,
        data: serde_json::Value,
        source: impl Into<String>,
    ) -> Self {
        let event_id = new_event_id();
        Self {
            correlation_id: event_id.clone(),
            event_id,
            event_type: event_type.into(),
            data,
            source: source.into(),
            priority: Priority::Normal,
            causation_id: None,
            timestamp: Utc::now(),
            metadata: EventMetadata::default(),
        }
    }

    /// Start building an event whose required fields are checked at `build()`
    pub fn builder() -> EventBuilder {
        EventBuilder::default()
    }

    /// Set the event priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Add a producer metadata entry
    ///
    /// Reserved keys and duplicate keys are rejected.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<Self> {
        let key = key.into();
        if EventMetadata::is_reserved(&key) {
            return Err(EventError::Construction(format!(
                "Metadata key '{}' is reserved for middleware",
                key
            )));
        }
        self.metadata.append(key, value)?;
        Ok(self)
    }

    /// Create an event caused by this one
    ///
    /// The child joins this event's chain (same `correlation_id`) and
    /// records this event as its direct cause.
    pub fn spawn_child(
        &self,
        event_type: impl Into<String>,
        data: serde_json::Value,
        source: impl Into<String>,
    ) -> Event {
        let mut child = Event::new(event_type, data, source);
        child.correlation_id = self.correlation_id.clone();
        child.causation_id = Some(self.event_id.clone());
        child
    }

    /// Whether this event starts a chain
    pub fn is_root(&self) -> bool {
        self.causation_id.is_none()
    }

    /// Elapsed time since creation, zero if the clock went backwards
    pub fn age(&self) -> Duration {
        (Utc::now() - self.timestamp).to_std().unwrap_or_default()
    }

    /// Structural form of this event as a JSON object
    pub fn to_dict(&self) -> serde_json::Value {
        let metadata: serde_json::Map<String, serde_json::Value> = self
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        serde_json::json!({
            "eventId": self.event_id,
            "type": self.event_type,
            "data": self.data,
            "source": self.source,
            "priority": self.priority.as_str(),
            "correlationId": self.correlation_id,
            "causationId": self.causation_id,
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            "metadata": metadata,
        })
    }

    /// Rebuild an event from its structural form
    pub fn from_dict(value: &serde_json::Value) -> Result<Self> {
        let event = Event::deserialize(value)
            .map_err(|e| EventError::Construction(format!("Invalid event dict: {}", e)))?;
        event.metadata.check_reserved()?;
        Ok(event)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let event: Event = serde_json::from_str(json)?;
        event.metadata.check_reserved()?;
        Ok(event)
    }
}

/// Builder for events whose identity fields come from runtime input
///
/// `build()` fails with `EventError::Construction` when the type or
/// source was never supplied. An empty type is accepted here and left
/// to validation middleware.
#[derive(Debug, Default)]
pub struct EventBuilder {
    event_type: Option<String>,
    source: Option<String>,
    data: serde_json::Value,
    priority: Priority,
    correlation_id: Option<String>,
    causation_id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    metadata: Vec<(String, serde_json::Value)>,
}

impl EventBuilder {
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Join an existing chain without naming a parent
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Mark the event as caused by `parent`
    pub fn caused_by(mut self, parent: &Event) -> Self {
        self.correlation_id = Some(parent.correlation_id.clone());
        self.causation_id = Some(parent.event_id.clone());
        self
    }

    /// Override the creation time (replay and import)
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<Event> {
        let event_type = self
            .event_type
            .ok_or_else(|| EventError::Construction("Event type is required".to_string()))?;
        let source = self
            .source
            .ok_or_else(|| EventError::Construction("Event source is required".to_string()))?;

        let mut event = Event::new(event_type, self.data, source).with_priority(self.priority);
        if let Some(correlation_id) = self.correlation_id {
            event.correlation_id = correlation_id;
        }
        event.causation_id = self.causation_id;
        if let Some(timestamp) = self.timestamp {
            event.timestamp = timestamp;
        }
        for (key, value) in self.metadata {
            event = event.with_metadata(key, value)?;
        }
        Ok(event)
    }
}

/// Bus counters for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStats {
    /// Events that passed middleware and were dispatched
    pub emitted: u64,

    /// Handler invocations, failed ones included
    pub dispatched: u64,

    /// Handler invocations that returned an error or panicked
    pub errors: u64,

    /// Emits refused by middleware
    pub rejected: u64,

    /// Subscriptions currently registered
    pub active_subscriptions: usize,

    /// Events currently retained by the store
    pub stored_events: usize,
}

/// Retained event counts grouped by type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCounts {
    /// Counts per event type
    pub types: HashMap<String, u64>,

    /// Total event count
    pub total: u64,
}

fn new_event_id() -> String {
    format!("evt-{}", uuid::Uuid::new_v4())
}
