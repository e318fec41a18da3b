//! # a3s-bus
//!
//! In-process publish/subscribe event bus for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-bus` lets independent components emit typed, causally linked events
//! and have interested listeners react, with bounded historical replay.
//! Audit logging, safety monitoring, and agent coordination build on it by
//! subscribing, emitting, and reading back stored events.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_bus::{Event, EventBus, HandlerResult, Priority, ValidationMiddleware};
//!
//! # fn main() -> a3s_bus::Result<()> {
//! let bus = EventBus::new(true, 1_000);
//! bus.add_middleware(ValidationMiddleware::new());
//!
//! bus.on("order:*")
//!     .priority(Priority::High)
//!     .subscribe(|event: &Event| -> HandlerResult {
//!         println!("order event: {}", event.event_type);
//!         Ok(())
//!     })?;
//!
//! let order = Event::new("order:created", serde_json::json!({"id": 7}), "checkout");
//! bus.emit(order.clone())?;
//! bus.emit(order.spawn_child("order:paid", serde_json::json!({}), "billing"))?;
//!
//! let store = bus.get_event_store().expect("storage enabled");
//! assert_eq!(store.get_by_correlation(&order.correlation_id).len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Event** — immutable envelope with payload, provenance, and lineage ids
//! - **Middleware** — ordered transform/validate steps run before dispatch
//! - **Registry** — pattern → handler subscriptions with priority, filter, once
//! - **EventBus** — priority dispatch with per-handler fault isolation
//! - **EventStore** — bounded history indexed by type, correlation, and time
//!
//! Dispatch is synchronous on the emitting thread. There is no timeout for a
//! slow handler; wrap long work in your own executor inside the handler.

pub mod bus;
pub mod dlq;
pub mod error;
pub mod global;
pub mod middleware;
pub mod pattern;
pub mod schema;
pub mod store;
pub mod stream;
pub mod subscription;
pub mod types;

// Re-export core types
pub use bus::{EventBus, EventBusConfig, EventStoreHandle, SubscriptionBuilder};
pub use dlq::{DeadLetter, DeadLetterQueue};
pub use error::{BoxError, EventError, Result};
pub use global::{emit, get_event_bus, on, reset_event_bus, set_event_bus, subscribe, unsubscribe};
pub use middleware::{LoggingMiddleware, Middleware, Pipeline, TimingMiddleware, ValidationMiddleware};
pub use pattern::Pattern;
pub use schema::{EventSchema, MemorySchemaRegistry, SchemaMiddleware, SchemaRegistry};
pub use store::EventStore;
pub use stream::EventStream;
pub use subscription::{
    EventFilter, EventHandler, HandlerResult, SubscribeOptions, Subscription, SubscriptionId,
};
pub use types::{
    BusStats, Event, EventBuilder, EventCounts, EventMetadata, Priority, EVENT_AGE_MS,
    RECEIVED_AT, RESERVED_METADATA_KEYS,
};
