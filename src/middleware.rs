//! Middleware pipeline — transform or reject events before dispatch
//!
//! Middleware run in registration order. Each one receives the event by
//! value and returns it (possibly with extra metadata) or rejects it with
//! `EventError::Validation`, which stops the pipeline and the dispatch.

use crate::error::{EventError, Result};
use crate::types::{Event, EVENT_AGE_MS, RECEIVED_AT};
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use tracing::Level;

/// A step applied to every event before subscriber matching
pub trait Middleware: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Transform, pass through, or reject an event
    ///
    /// Implementations may append metadata but must not change the
    /// event's type, payload, or lineage fields.
    fn process(&self, event: Event) -> Result<Event>;

    /// Observe a handler failure during dispatch
    ///
    /// Default implementation does nothing.
    fn on_handler_error(&self, _event: &Event, _error: &EventError) {}
}

/// Ordered chain of middleware
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; stages run in the order they were added
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.stages.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run the event through every stage, stopping at the first rejection
    pub fn run(&self, mut event: Event) -> Result<Event> {
        for stage in &self.stages {
            event = stage.process(event).map_err(|e| {
                tracing::debug!(middleware = stage.name(), error = %e, "Middleware rejected event");
                e
            })?;
        }
        Ok(event)
    }

    /// Forward a handler failure to every stage
    pub fn notify_handler_error(&self, event: &Event, error: &EventError) {
        for stage in &self.stages {
            stage.on_handler_error(event, error);
        }
    }
}

/// Writes one tracing record per event and one per handler failure
pub struct LoggingMiddleware {
    level: Level,
}

impl LoggingMiddleware {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    fn process(&self, event: Event) -> Result<Event> {
        macro_rules! record {
            ($macro:ident) => {
                tracing::$macro!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    source = %event.source,
                    priority = %event.priority,
                    correlation_id = %event.correlation_id,
                    "Event received"
                )
            };
        }

        match self.level {
            Level::ERROR => record!(error),
            Level::WARN => record!(warn),
            Level::INFO => record!(info),
            Level::DEBUG => record!(debug),
            _ => record!(trace),
        }
        Ok(event)
    }

    fn on_handler_error(&self, event: &Event, error: &EventError) {
        tracing::warn!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            error = %error,
            "Event handler failed"
        );
    }
}

/// Stamps receipt time and event age into metadata
///
/// Adds `received_at` (RFC 3339) and `event_age_ms`. An event that already
/// carries either stamp, e.g. one replayed from the store, keeps what it has.
#[derive(Debug, Default)]
pub struct TimingMiddleware;

impl Middleware for TimingMiddleware {
    fn name(&self) -> &str {
        "timing"
    }

    fn process(&self, mut event: Event) -> Result<Event> {
        if event.metadata.contains_key(RECEIVED_AT) || event.metadata.contains_key(EVENT_AGE_MS) {
            return Ok(event);
        }

        let now = Utc::now();
        let age_ms = (now - event.timestamp).num_milliseconds().max(0);
        event
            .metadata
            .append(RECEIVED_AT, now.to_rfc3339_opts(SecondsFormat::Micros, true))?;
        event.metadata.append(EVENT_AGE_MS, age_ms)?;
        Ok(event)
    }
}

/// Rejects events without a routable type
#[derive(Debug, Default)]
pub struct ValidationMiddleware {
    require_namespace: bool,
}

impl ValidationMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also reject types without a `namespace:` prefix
    pub fn require_namespace(mut self) -> Self {
        self.require_namespace = true;
        self
    }
}

impl Middleware for ValidationMiddleware {
    fn name(&self) -> &str {
        "validation"
    }

    fn process(&self, event: Event) -> Result<Event> {
        if event.event_type.is_empty() {
            return Err(EventError::validation(
                &event.event_type,
                "event type must not be empty",
            ));
        }
        if self.require_namespace && !event.event_type.contains(crate::pattern::NAMESPACE_SEPARATOR)
        {
            return Err(EventError::validation(
                &event.event_type,
                "event type must be namespaced (e.g. 'order:created')",
            ));
        }
        Ok(event)
    }
}
