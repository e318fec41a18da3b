//! Dead letters — a bounded record of failed handler invocations
//!
//! The bus never retries a failed handler. It records the failure here so
//! a caller-side resilience layer can inspect and re-deliver if it wants to.

use crate::pattern::Pattern;
use crate::subscription::SubscriptionId;
use crate::types::Event;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// A failed delivery with context about why it failed
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// The event as the handler saw it (after middleware)
    pub event: Event,

    /// Subscription whose handler failed
    pub subscription_id: SubscriptionId,

    /// Pattern the subscription was registered with
    pub pattern: Pattern,

    /// Error or panic message
    pub reason: String,

    /// When the failure was recorded
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(
        event: Event,
        subscription_id: SubscriptionId,
        pattern: Pattern,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            event,
            subscription_id,
            pattern,
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }
}

/// FIFO of dead letters with a fixed capacity
///
/// A capacity of zero disables recording.
#[derive(Debug)]
pub struct DeadLetterQueue {
    letters: VecDeque<DeadLetter>,
    max_letters: usize,
}

impl DeadLetterQueue {
    pub fn new(max_letters: usize) -> Self {
        Self {
            letters: VecDeque::new(),
            max_letters,
        }
    }

    pub fn push(&mut self, letter: DeadLetter) {
        if self.max_letters == 0 {
            return;
        }

        tracing::debug!(
            event_id = %letter.event.event_id,
            subscription = %letter.subscription_id,
            reason = %letter.reason,
            "Event dead-lettered"
        );

        self.letters.push_back(letter);
        while self.letters.len() > self.max_letters {
            self.letters.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.letters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }

    /// Up to `limit` letters, most recent first
    pub fn list(&self, limit: usize) -> Vec<DeadLetter> {
        self.letters.iter().rev().take(limit).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.letters.clear();
    }
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new(1_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{HandlerResult, Registry, SubscribeOptions};
    use std::sync::Arc;

    fn letter(reason: &str) -> DeadLetter {
        let mut registry = Registry::new();
        let id = registry.insert(
            Pattern::All,
            Arc::new(|_: &Event| -> HandlerResult { Ok(()) }),
            SubscribeOptions::default(),
        );
        DeadLetter::new(
            Event::new("order:created", serde_json::json!({}), "test"),
            id,
            Pattern::All,
            reason,
        )
    }

    #[test]
    fn test_push_and_list_most_recent_first() {
        let mut dlq = DeadLetterQueue::default();
        for i in 0..5 {
            dlq.push(letter(&format!("reason {}", i)));
        }

        let list = dlq.list(3);
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].reason, "reason 4");
        assert_eq!(list[2].reason, "reason 2");
    }

    #[test]
    fn test_max_capacity() {
        let mut dlq = DeadLetterQueue::new(3);
        for i in 0..5 {
            dlq.push(letter(&format!("reason {}", i)));
        }

        assert_eq!(dlq.len(), 3);
        let list = dlq.list(10);
        assert_eq!(list[0].reason, "reason 4");
        assert_eq!(list[2].reason, "reason 2");
    }

    #[test]
    fn test_zero_capacity_disables() {
        let mut dlq = DeadLetterQueue::new(0);
        dlq.push(letter("ignored"));
        assert!(dlq.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut dlq = DeadLetterQueue::default();
        dlq.push(letter("x"));
        dlq.clear();
        assert_eq!(dlq.len(), 0);
    }
}
