//! Subscription pattern matching
//!
//! Patterns are either an exact event type (`order:created`), a namespace
//! wildcard (`order:*`), or the catch-all `*`. A wildcard may only appear
//! once, as the final character, directly after the `:` separator. Matching
//! is a single string compare, so its cost is bounded by the pattern length.

use crate::error::{EventError, Result};
use std::fmt;

/// Namespace separator in event types
pub const NAMESPACE_SEPARATOR: char = ':';

const WILDCARD: char = '*';

/// A parsed subscription pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Matches one event type exactly
    Exact(String),

    /// Matches every type starting with the prefix (which ends in `:`)
    Namespace(String),

    /// Matches every event
    All,
}

impl Pattern {
    /// Parse and validate a pattern string
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(EventError::Configuration(
                "Subscription pattern cannot be empty".to_string(),
            ));
        }

        if pattern == "*" {
            return Ok(Pattern::All);
        }

        match pattern.find(WILDCARD) {
            None => Ok(Pattern::Exact(pattern.to_string())),
            Some(pos) if pos == pattern.len() - 1 => {
                let prefix = &pattern[..pos];
                if !prefix.ends_with(NAMESPACE_SEPARATOR) || prefix.len() < 2 {
                    return Err(EventError::Configuration(format!(
                        "Wildcard in pattern '{}' must follow a namespace and ':'",
                        pattern
                    )));
                }
                Ok(Pattern::Namespace(prefix.to_string()))
            }
            Some(_) => Err(EventError::Configuration(format!(
                "Wildcard in pattern '{}' is only allowed as the final character",
                pattern
            ))),
        }
    }

    /// Whether an event of `event_type` is routed to this pattern
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Pattern::Exact(exact) => exact == event_type,
            Pattern::Namespace(prefix) => event_type.starts_with(prefix.as_str()),
            Pattern::All => true,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Pattern::Exact(_))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Exact(exact) => f.write_str(exact),
            Pattern::Namespace(prefix) => write!(f, "{}{}", prefix, WILDCARD),
            Pattern::All => write!(f, "{}", WILDCARD),
        }
    }
}

impl std::str::FromStr for Pattern {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self> {
        Pattern::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let p = Pattern::parse("order:created").unwrap();
        assert!(p.matches("order:created"));
        assert!(!p.matches("order:created:v2"));
        assert!(!p.matches("order:cancelled"));
        assert!(!p.is_wildcard());
    }

    #[test]
    fn test_namespace_wildcard() {
        let p = Pattern::parse("ns:*").unwrap();
        assert!(p.matches("ns:foo"));
        assert!(p.matches("ns:foo:bar"));
        assert!(!p.matches("other:foo"));
        assert!(!p.matches("nsx:foo"));
        assert!(!p.matches("ns"));
        assert!(p.is_wildcard());
    }

    #[test]
    fn test_catch_all() {
        let p = Pattern::parse("*").unwrap();
        assert!(p.matches("anything:at_all"));
        assert!(p.matches(""));
    }

    #[test]
    fn test_display_roundtrip() {
        for raw in ["order:created", "order:*", "*"] {
            assert_eq!(Pattern::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_rejects_malformed() {
        for raw in ["", "order*", ":*", "order:*:x", "**", "*:order", "a:b*"] {
            let err = Pattern::parse(raw).unwrap_err();
            assert!(
                matches!(err, EventError::Configuration(_)),
                "expected configuration error for {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_from_str() {
        let p: Pattern = "audit:*".parse().unwrap();
        assert_eq!(p, Pattern::Namespace("audit:".to_string()));
    }
}
