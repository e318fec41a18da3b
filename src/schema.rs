//! Event schema registry — validate event payloads before dispatch
//!
//! Producers and consumers own payload schemas, not the bus. A registry
//! lets them declare the required top-level fields per event type, and
//! `SchemaMiddleware` enforces those declarations in the pipeline.

use crate::error::{EventError, Result};
use crate::middleware::Middleware;
use crate::types::Event;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Schema definition for one event type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
    /// Exact event type (e.g., "order:created")
    pub event_type: String,

    /// Required top-level fields in the payload
    pub required_fields: Vec<String>,

    /// Optional description of this schema
    pub description: String,
}

impl EventSchema {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            required_fields: Vec::new(),
            description: String::new(),
        }
    }

    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required_fields.push(field.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Trait for event schema registries
pub trait SchemaRegistry: Send + Sync {
    /// Register (or replace) the schema for an event type
    fn register(&self, schema: EventSchema) -> Result<()>;

    /// Get the schema for an event type
    fn get(&self, event_type: &str) -> Result<Option<EventSchema>>;

    /// List all registered event types, sorted
    fn list_types(&self) -> Result<Vec<String>>;

    /// Validate an event's payload against its registered schema
    ///
    /// Returns Ok(()) if valid or if no schema is registered for the type.
    fn validate(&self, event: &Event) -> Result<()>;
}

/// In-memory schema registry
///
/// Stores schemas in a `HashMap` protected by `RwLock`.
#[derive(Default)]
pub struct MemorySchemaRegistry {
    /// event_type → schema
    schemas: RwLock<HashMap<String, EventSchema>>,
}

impl MemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemorySchemaRegistry {
    // Writers only insert whole schemas, so a poisoned lock still guards a
    // consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, EventSchema>> {
        self.schemas.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, EventSchema>> {
        self.schemas.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SchemaRegistry for MemorySchemaRegistry {
    fn register(&self, schema: EventSchema) -> Result<()> {
        if schema.event_type.is_empty() {
            return Err(EventError::Configuration(
                "Event type cannot be empty".to_string(),
            ));
        }

        let mut schemas = self.write();
        schemas.insert(schema.event_type.clone(), schema);
        Ok(())
    }

    fn get(&self, event_type: &str) -> Result<Option<EventSchema>> {
        let schemas = self.read();
        Ok(schemas.get(event_type).cloned())
    }

    fn list_types(&self) -> Result<Vec<String>> {
        let schemas = self.read();
        let mut types: Vec<String> = schemas.keys().cloned().collect();
        types.sort();
        Ok(types)
    }

    fn validate(&self, event: &Event) -> Result<()> {
        let schemas = self.read();
        let schema = match schemas.get(&event.event_type) {
            Some(s) => s,
            None => return Ok(()),
        };

        match event.data {
            serde_json::Value::Object(ref map) => {
                for field in &schema.required_fields {
                    if !map.contains_key(field) {
                        return Err(EventError::validation(
                            &event.event_type,
                            format!("missing required field '{}'", field),
                        ));
                    }
                }
            }
            _ if !schema.required_fields.is_empty() => {
                return Err(EventError::validation(
                    &event.event_type,
                    "payload must be a JSON object when schema has required fields",
                ));
            }
            _ => {}
        }

        Ok(())
    }
}

/// Pipeline stage that rejects events failing their registered schema
pub struct SchemaMiddleware {
    registry: Arc<dyn SchemaRegistry>,
}

impl SchemaMiddleware {
    pub fn new(registry: Arc<dyn SchemaRegistry>) -> Self {
        Self { registry }
    }
}

impl Middleware for SchemaMiddleware {
    fn name(&self) -> &str {
        "schema"
    }

    fn process(&self, event: Event) -> Result<Event> {
        self.registry.validate(&event)?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> MemorySchemaRegistry {
        let registry = MemorySchemaRegistry::new();
        registry
            .register(
                EventSchema::new("order:created")
                    .require("order_id")
                    .require("total")
                    .describe("New order placed"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_register_and_get() {
        let registry = test_registry();
        let schema = registry.get("order:created").unwrap().unwrap();
        assert_eq!(schema.required_fields, vec!["order_id", "total"]);
        assert_eq!(schema.description, "New order placed");
        assert!(registry.get("order:paid").unwrap().is_none());
    }

    #[test]
    fn test_register_empty_type_fails() {
        let registry = MemorySchemaRegistry::new();
        let err = registry.register(EventSchema::new("")).unwrap_err();
        assert!(matches!(err, EventError::Configuration(_)));
    }

    #[test]
    fn test_list_types() {
        let registry = test_registry();
        registry.register(EventSchema::new("audit:login")).unwrap();
        assert_eq!(
            registry.list_types().unwrap(),
            vec!["audit:login", "order:created"]
        );
    }

    #[test]
    fn test_validate_no_schema_registered_passes() {
        let registry = test_registry();
        let event = Event::new("order:paid", serde_json::json!("anything"), "billing");
        assert!(registry.validate(&event).is_ok());
    }

    #[test]
    fn test_validate_valid_event() {
        let registry = test_registry();
        let event = Event::new(
            "order:created",
            serde_json::json!({"order_id": "o-1", "total": 10, "extra": true}),
            "checkout",
        );
        assert!(registry.validate(&event).is_ok());
    }

    #[test]
    fn test_validate_missing_required_field() {
        let registry = test_registry();
        let event = Event::new("order:created", serde_json::json!({"order_id": "o-1"}), "checkout");
        match registry.validate(&event).unwrap_err() {
            EventError::Validation { event_type, reason } => {
                assert_eq!(event_type, "order:created");
                assert!(reason.contains("total"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_non_object_payload() {
        let registry = test_registry();
        let event = Event::new("order:created", serde_json::json!([1, 2]), "checkout");
        assert!(registry.validate(&event).is_err());
    }

    #[test]
    fn test_validate_after_poisoned_lock() {
        let registry = Arc::new(test_registry());
        let poisoner = registry.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.schemas.write().unwrap();
            panic!("writer crashed");
        })
        .join();
        assert!(registry.schemas.is_poisoned());

        let mw = SchemaMiddleware::new(registry.clone());
        let err = mw
            .process(Event::new("order:created", serde_json::json!({}), "checkout"))
            .unwrap_err();
        assert!(matches!(err, EventError::Validation { .. }));
        registry.register(EventSchema::new("audit:login")).unwrap();
        assert_eq!(registry.list_types().unwrap().len(), 2);
    }

    #[test]
    fn test_schema_middleware() {
        let mw = SchemaMiddleware::new(Arc::new(test_registry()));
        let bad = Event::new("order:created", serde_json::json!({}), "checkout");
        assert!(mw.process(bad).is_err());

        let good = Event::new(
            "order:created",
            serde_json::json!({"order_id": "o-1", "total": 1}),
            "checkout",
        );
        assert!(mw.process(good).is_ok());
    }
}
