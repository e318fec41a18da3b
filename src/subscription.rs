//! Subscription registry
//!
//! Holds standing registrations in registration order. The registry itself
//! is not synchronized; the bus keeps it behind the same lock as the store.

use crate::error::{BoxError, EventError, Result};
use crate::pattern::Pattern;
use crate::types::{Event, Priority};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identifier returned by `subscribe`, unique for the lifetime of a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of a handler invocation
pub type HandlerResult = std::result::Result<(), BoxError>;

/// Callback invoked with each matching event
///
/// Implemented for every `Fn(&Event) -> HandlerResult + Send + Sync`.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event) -> HandlerResult;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> HandlerResult + Send + Sync,
{
    fn handle(&self, event: &Event) -> HandlerResult {
        self(event)
    }
}

/// Predicate deciding whether a matched event reaches the handler
pub trait EventFilter: Send + Sync {
    fn accept(&self, event: &Event) -> bool;
}

impl<F> EventFilter for F
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    fn accept(&self, event: &Event) -> bool {
        self(event)
    }
}

/// Options for creating subscriptions
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// Dispatch order among subscriptions matching the same event
    pub priority: Priority,

    /// Skip events the predicate rejects
    pub filter: Option<Arc<dyn EventFilter>>,

    /// Remove the subscription after its first delivery
    pub once: bool,
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("priority", &self.priority)
            .field("filter", &self.filter.is_some())
            .field("once", &self.once)
            .finish()
    }
}

/// A standing registration
pub struct Subscription {
    id: SubscriptionId,
    pattern: Pattern,
    handler: Arc<dyn EventHandler>,
    priority: Priority,
    filter: Option<Arc<dyn EventFilter>>,
    once: bool,
    active: AtomicBool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn is_once(&self) -> bool {
        self.once
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Active and routed to `event_type`
    pub fn matches(&self, event_type: &str) -> bool {
        self.is_active() && self.pattern.matches(event_type)
    }

    /// Evaluate the optional filter
    pub fn accepts(&self, event: &Event) -> bool {
        self.filter.as_ref().map_or(true, |f| f.accept(event))
    }

    fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    /// Run the handler, turning errors and panics into `EventError::Handler`
    pub fn invoke(&self, event: &Event) -> Result<()> {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.handler.handle(event)));
        let reason = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };
        Err(EventError::Handler {
            subscription: self.id.to_string(),
            reason,
        })
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pattern", &self.pattern.to_string())
            .field("priority", &self.priority)
            .field("filter", &self.filter.is_some())
            .field("once", &self.once)
            .field("active", &self.is_active())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}

/// Pattern → handler registrations in registration order
#[derive(Default)]
pub struct Registry {
    entries: Vec<Arc<Subscription>>,
    next_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; the pattern must already be parsed
    pub fn insert(
        &mut self,
        pattern: Pattern,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push(Arc::new(Subscription {
            id,
            pattern,
            handler,
            priority: options.priority,
            filter: options.filter,
            once: options.once,
            active: AtomicBool::new(true),
        }));
        id
    }

    /// Deactivate and drop a subscription; returns false if it was unknown
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        match self.entries.iter().position(|s| s.id == id) {
            Some(pos) => {
                let sub = self.entries.remove(pos);
                sub.deactivate();
                true
            }
            None => false,
        }
    }

    /// Active subscriptions routed to `event_type`, in registration order
    pub fn matching(&self, event_type: &str) -> Vec<Arc<Subscription>> {
        self.entries
            .iter()
            .filter(|s| s.matches(event_type))
            .cloned()
            .collect()
    }

    /// Take exclusive ownership of a `once` subscription's single delivery
    ///
    /// Returns false if another dispatch already claimed it or it was removed.
    pub fn claim_once(&mut self, sub: &Subscription) -> bool {
        if !sub.deactivate() {
            return false;
        }
        self.entries.retain(|s| s.id != sub.id);
        true
    }

    pub fn get(&self, id: SubscriptionId) -> Option<&Arc<Subscription>> {
        self.entries.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deactivate and drop every subscription
    pub fn clear(&mut self) {
        for sub in self.entries.drain(..) {
            sub.deactivate();
        }
    }
}
