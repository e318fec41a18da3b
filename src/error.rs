//! Error types for a3s-bus

use thiserror::Error;

/// Errors that can occur in the event bus
///
/// Only `Construction`, `Validation`, and `Configuration` are ever returned
/// to callers of the bus. `Handler` describes a subscriber failure that the
/// dispatcher absorbed; it shows up in logs, statistics, and dead letters.
#[derive(Debug, Error)]
pub enum EventError {
    /// An event was built without its required identity fields
    #[error("Construction error: {0}")]
    Construction(String),

    /// A middleware rejected the event before dispatch
    #[error("Validation failed for event type '{event_type}': {reason}")]
    Validation {
        event_type: String,
        reason: String,
    },

    /// A subscriber's handler failed during dispatch
    #[error("Handler for subscription '{subscription}' failed: {reason}")]
    Handler {
        subscription: String,
        reason: String,
    },

    /// Malformed subscription pattern or bus configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Metadata key already present on the event
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventError {
    /// Shorthand for a validation rejection
    pub fn validation(event_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            event_type: event_type.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for event bus operations
pub type Result<T> = std::result::Result<T, EventError>;

/// Boxed error returned by subscriber handlers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display() {
        let err = EventError::validation("", "event type must not be empty");
        assert_eq!(
            err.to_string(),
            "Validation failed for event type '': event type must not be empty"
        );
    }

    #[test]
    fn test_handler_display() {
        let err = EventError::Handler {
            subscription: "sub-3".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Handler for subscription 'sub-3' failed: boom");
    }

    #[test]
    fn test_serialization_from() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: EventError = json_err.into();
        assert!(matches!(err, EventError::Serialization(_)));
    }
}
