//! Default bus tests
//!
//! Kept in their own binary, and in one test function, because they
//! replace process-wide state.

use a3s_bus::{EventBus, EventBusConfig, HandlerResult, Priority};
use a3s_bus::{emit, get_event_bus, on, reset_event_bus, set_event_bus, subscribe, unsubscribe};
use a3s_bus::Event;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_default_bus_lifecycle() {
    // ─── Lazily created and reused ───────────────────────────────
    let first = get_event_bus();
    assert!(first.ptr_eq(&get_event_bus()));

    // ─── Free functions delegate to the default bus ──────────────
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let id = subscribe("global:*", move |_: &Event| -> HandlerResult {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();
    on("global:ping")
        .priority(Priority::High)
        .once()
        .subscribe(|_: &Event| -> HandlerResult { Ok(()) })
        .unwrap();

    emit(Event::new("global:ping", serde_json::json!({}), "test")).unwrap();
    emit(Event::new("global:ping", serde_json::json!({}), "test")).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);

    let stats = get_event_bus().get_stats();
    assert_eq!(stats.emitted, 2);
    assert_eq!(stats.dispatched, 3);
    assert!(unsubscribe(id));
    assert!(!unsubscribe(id));

    // ─── Explicit reset gives isolation ──────────────────────────
    let fresh = reset_event_bus();
    assert!(!fresh.ptr_eq(&first));
    assert!(fresh.ptr_eq(&get_event_bus()));
    assert_eq!(get_event_bus().get_stats().emitted, 0);
    // Old handles still work against the old bus
    assert_eq!(first.get_stats().emitted, 2);

    // ─── Custom default bus ──────────────────────────────────────
    let custom = EventBus::with_config(EventBusConfig {
        store_events: false,
        ..Default::default()
    });
    let previous = set_event_bus(custom.clone());
    assert!(previous.ptr_eq(&fresh));
    emit(Event::new("global:ping", serde_json::json!({}), "test")).unwrap();
    assert!(get_event_bus().get_event_store().is_none());
    assert_eq!(custom.get_stats().emitted, 1);
}
