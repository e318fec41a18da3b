//! Process-wide default bus
//!
//! The default bus is created on first access with `EventBusConfig::default()`
//! and reused afterwards. It is never reset implicitly: tests that need a
//! clean bus call [`reset_event_bus`], and applications that need a custom
//! configuration call [`set_event_bus`] during startup.

use crate::bus::{EventBus, SubscriptionBuilder};
use crate::error::Result;
use crate::subscription::{EventHandler, SubscriptionId};
use crate::types::Event;
use std::sync::{OnceLock, PoisonError, RwLock};

static DEFAULT_BUS: OnceLock<RwLock<EventBus>> = OnceLock::new();

fn slot() -> &'static RwLock<EventBus> {
    DEFAULT_BUS.get_or_init(|| RwLock::new(EventBus::default()))
}

/// Handle to the default bus, creating it on first call
pub fn get_event_bus() -> EventBus {
    slot()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Replace the default bus and return the previous one
pub fn set_event_bus(bus: EventBus) -> EventBus {
    let mut current = slot().write().unwrap_or_else(PoisonError::into_inner);
    tracing::debug!("Default event bus replaced");
    std::mem::replace(&mut *current, bus)
}

/// Install a fresh default bus and return it
///
/// Handles obtained earlier keep pointing at the old bus.
pub fn reset_event_bus() -> EventBus {
    let bus = EventBus::default();
    set_event_bus(bus.clone());
    bus
}

/// Emit on the default bus
pub fn emit(event: Event) -> Result<()> {
    get_event_bus().emit(event)
}

/// Subscribe on the default bus
pub fn subscribe(pattern: &str, handler: impl EventHandler + 'static) -> Result<SubscriptionId> {
    get_event_bus().subscribe(pattern, handler)
}

/// Unsubscribe on the default bus
pub fn unsubscribe(id: SubscriptionId) -> bool {
    get_event_bus().unsubscribe(id)
}

/// Builder-style subscription on the default bus
pub fn on(pattern: impl Into<String>) -> SubscriptionBuilder {
    get_event_bus().on(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Other unit tests never touch the default bus, so it is safe to share here.
    #[test]
    fn test_default_bus_is_reused() {
        let a = get_event_bus();
        let b = get_event_bus();
        assert!(a.ptr_eq(&b));
    }
}
