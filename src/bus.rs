//! In-process event bus
//!
//! `EventBus` composes the middleware pipeline, the subscription registry,
//! the dispatcher, and the optional event store. Registry, store, dead
//! letters, and counters share one mutex so an index can never reference an
//! evicted event. Handlers, filters, and middleware always run with the lock
//! released, which lets a handler emit or subscribe on the same bus.

use crate::dlq::{DeadLetter, DeadLetterQueue};
use crate::error::{EventError, Result};
use crate::middleware::{Middleware, Pipeline};
use crate::pattern::Pattern;
use crate::store::EventStore;
use crate::stream::EventStream;
use crate::subscription::{
    EventFilter, EventHandler, Registry, SubscribeOptions, Subscription, SubscriptionId,
};
use crate::types::{BusStats, Event, EventCounts, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Event bus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventBusConfig {
    /// Keep dispatched events in a bounded store
    pub store_events: bool,

    /// Store capacity; the oldest event is evicted beyond this
    pub max_events: usize,

    /// Failed deliveries kept for inspection (0 disables)
    pub dead_letter_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            store_events: true,
            max_events: 10_000,
            dead_letter_capacity: 1_000,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    emitted: u64,
    dispatched: u64,
    errors: u64,
    rejected: u64,
}

struct BusState {
    registry: Registry,
    pipeline: Pipeline,
    store: Option<EventStore>,
    dead_letters: DeadLetterQueue,
    counters: Counters,
}

pub(crate) struct Shared {
    config: EventBusConfig,
    state: Mutex<BusState>,
}

impl Shared {
    // No user code runs while the lock is held, so a poisoned lock still
    // guards consistent state.
    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process publish/subscribe bus
///
/// Cloning is cheap and yields a handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl EventBus {
    /// Create a bus, optionally retaining up to `max_events` dispatched events
    pub fn new(store_events: bool, max_events: usize) -> Self {
        Self::with_config(EventBusConfig {
            store_events,
            max_events,
            ..EventBusConfig::default()
        })
    }

    /// Create a bus from a full configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        let state = BusState {
            registry: Registry::new(),
            pipeline: Pipeline::new(),
            store: config
                .store_events
                .then(|| EventStore::new(config.max_events)),
            dead_letters: DeadLetterQueue::new(config.dead_letter_capacity),
            counters: Counters::default(),
        };
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.shared.config
    }

    /// Whether two handles refer to the same bus
    pub fn ptr_eq(&self, other: &EventBus) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    pub(crate) fn upgrade(shared: &Weak<Shared>) -> Option<EventBus> {
        shared.upgrade().map(|shared| EventBus { shared })
    }


    /// Subscribe a handler with normal priority
    pub fn subscribe(
        &self,
        pattern: &str,
        handler: impl EventHandler + 'static,
    ) -> Result<SubscriptionId> {
        self.subscribe_with(pattern, handler, SubscribeOptions::default())
    }

    /// Subscribe a handler with explicit options
    ///
    /// Fails with `EventError::Configuration` if the pattern is malformed.
    pub fn subscribe_with(
        &self,
        pattern: &str,
        handler: impl EventHandler + 'static,
        options: SubscribeOptions,
    ) -> Result<SubscriptionId> {
        let parsed = Pattern::parse(pattern)?;
        let priority = options.priority;
        let once = options.once;

        let id = self
            .shared
            .lock()
            .registry
            .insert(parsed, Arc::new(handler), options);

        tracing::debug!(
            subscription = %id,
            pattern = %pattern,
            priority = %priority,
            once,
            "Subscription added"
        );
        Ok(id)
    }

    /// Start a subscription with builder-style options
    ///
    /// ```rust
    /// use a3s_bus::{Event, EventBus, HandlerResult, Priority};
    ///
    /// # fn main() -> a3s_bus::Result<()> {
    /// let bus = EventBus::default();
    /// bus.on("order:*")
    ///     .priority(Priority::High)
    ///     .once()
    ///     .subscribe(|event: &Event| -> HandlerResult {
    ///         println!("first order event: {}", event.event_type);
    ///         Ok(())
    ///     })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn on(&self, pattern: impl Into<String>) -> SubscriptionBuilder {
        SubscriptionBuilder {
            bus: self.clone(),
            pattern: pattern.into(),
            options: SubscribeOptions::default(),
        }
    }

    /// Stream copies of events matching `pattern`
    pub fn stream(&self, pattern: impl Into<String>) -> Result<EventStream> {
        self.on(pattern).stream()
    }

    /// Remove a subscription; unknown ids are ignored
    ///
    /// Returns whether a subscription was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.shared.lock().registry.remove(id);
        if removed {
            tracing::debug!(subscription = %id, "Subscription removed");
        }
        removed
    }

    /// Remove every subscription
    pub fn clear_subscriptions(&self) {
        self.shared.lock().registry.clear();
        tracing::debug!("All subscriptions removed");
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.lock().registry.len()
    }

    /// Whether any active subscription routes `event_type`
    pub fn has_subscribers(&self, event_type: &str) -> bool {
        !self.shared.lock().registry.matching(event_type).is_empty()
    }


    /// Append a middleware; middleware run in the order they were added
    pub fn add_middleware(&self, middleware: impl Middleware + 'static) {
        self.add_middleware_arc(Arc::new(middleware));
    }

    pub fn add_middleware_arc(&self, middleware: Arc<dyn Middleware>) {
        let name = middleware.name().to_string();
        self.shared.lock().pipeline.push(middleware);
        tracing::debug!(middleware = %name, "Middleware added");
    }


    /// Run an event through middleware and deliver it to matching handlers
    ///
    /// Handlers run on the calling thread in descending subscription
    /// priority, registration order among equals. A failing or panicking
    /// handler is counted and recorded but never stops the others and never
    /// fails the emit. The only error returned is a middleware rejection.
    pub fn emit(&self, event: Event) -> Result<()> {
        let pipeline = self.shared.lock().pipeline.clone();

        let event = match pipeline.run(event) {
            Ok(event) => event,
            Err(e) => {
                self.shared.lock().counters.rejected += 1;
                tracing::warn!(error = %e, "Event rejected by middleware");
                return Err(e);
            }
        };

        let mut targets = self.select_targets(&event);
        targets.sort_by(|a, b| b.priority().cmp(&a.priority()));

        let mut delivered = 0u64;
        let mut failures: Vec<(Arc<Subscription>, EventError)> = Vec::new();
        for sub in &targets {
            // Skip subscriptions removed by an earlier handler in this pass
            if !sub.is_once() && !sub.is_active() {
                continue;
            }
            delivered += 1;
            if let Err(e) = sub.invoke(&event) {
                tracing::warn!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    subscription = %sub.id(),
                    error = %e,
                    "Handler failed"
                );
                pipeline.notify_handler_error(&event, &e);
                failures.push((sub.clone(), e));
            }
        }

        let mut state = self.shared.lock();
        state.counters.emitted += 1;
        state.counters.dispatched += delivered;
        state.counters.errors += failures.len() as u64;
        for (sub, error) in failures {
            let reason = match error {
                EventError::Handler { reason, .. } => reason,
                other => other.to_string(),
            };
            state.dead_letters.push(DeadLetter::new(
                event.clone(),
                sub.id(),
                sub.pattern().clone(),
                reason,
            ));
        }

        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            handlers = delivered,
            "Event dispatched"
        );

        if let Some(store) = state.store.as_mut() {
            store.append(event);
        }
        Ok(())
    }

    /// Snapshot matching subscriptions, apply filters, and claim `once` ones
    fn select_targets(&self, event: &Event) -> Vec<Arc<Subscription>> {
        let candidates = self.shared.lock().registry.matching(&event.event_type);

        let mut targets: Vec<Arc<Subscription>> =
            candidates.into_iter().filter(|s| s.accepts(event)).collect();

        if targets.iter().any(|s| s.is_once()) {
            let mut state = self.shared.lock();
            targets.retain(|s| !s.is_once() || state.registry.claim_once(s));
        }
        targets
    }


    pub fn get_stats(&self) -> BusStats {
        let state = self.shared.lock();
        BusStats {
            emitted: state.counters.emitted,
            dispatched: state.counters.dispatched,
            errors: state.counters.errors,
            rejected: state.counters.rejected,
            active_subscriptions: state.registry.len(),
            stored_events: state.store.as_ref().map_or(0, EventStore::len),
        }
    }

    /// Zero the emitted/dispatched/errors/rejected counters
    pub fn reset_stats(&self) {
        self.shared.lock().counters = Counters::default();
    }

    /// Handle to the event store, or `None` if storage is disabled
    pub fn get_event_store(&self) -> Option<EventStoreHandle> {
        self.shared.lock().store.as_ref().map(|_| EventStoreHandle {
            shared: self.shared.clone(),
        })
    }

    /// Up to `limit` failed deliveries, most recent first
    pub fn dead_letters(&self, limit: usize) -> Vec<DeadLetter> {
        self.shared.lock().dead_letters.list(limit)
    }

    pub fn dead_letter_count(&self) -> usize {
        self.shared.lock().dead_letters.len()
    }

    pub fn clear_dead_letters(&self) {
        self.shared.lock().dead_letters.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_config(EventBusConfig::default())
    }
}

/// Builder returned by [`EventBus::on`]
pub struct SubscriptionBuilder {
    bus: EventBus,
    pattern: String,
    options: SubscribeOptions,
}

impl SubscriptionBuilder {
    pub fn priority(mut self, priority: Priority) -> Self {
        self.options.priority = priority;
        self
    }

    /// Only deliver events the predicate accepts
    pub fn filter(mut self, filter: impl EventFilter + 'static) -> Self {
        self.options.filter = Some(Arc::new(filter));
        self
    }

    /// Remove the subscription after its first delivery
    pub fn once(mut self) -> Self {
        self.options.once = true;
        self
    }

    /// Register `handler` and return its subscription id
    pub fn subscribe(self, handler: impl EventHandler + 'static) -> Result<SubscriptionId> {
        self.bus.subscribe_with(&self.pattern, handler, self.options)
    }

    /// Register a channel-backed subscription and return its stream
    pub fn stream(self) -> Result<EventStream> {
        EventStream::open(&self.bus, &self.pattern, self.options)
    }
}

/// Read access to a bus's event store
///
/// Every call takes the bus lock, so results are consistent with
/// concurrent emits.
#[derive(Clone)]
pub struct EventStoreHandle {
    shared: Arc<Shared>,
}

impl EventStoreHandle {
    fn read<T: Default>(&self, f: impl FnOnce(&EventStore) -> T) -> T {
        self.shared.lock().store.as_ref().map(f).unwrap_or_default()
    }

    /// The `n` most recent events, oldest first
    pub fn get_recent(&self, n: usize) -> Vec<Event> {
        self.read(|store| store.get_recent(n))
    }

    pub fn get_by_correlation(&self, correlation_id: &str) -> Vec<Event> {
        self.read(|store| store.get_by_correlation(correlation_id))
    }

    /// Exact type lookup; wildcards are not interpreted
    pub fn get_by_type(&self, event_type: &str) -> Vec<Event> {
        self.read(|store| store.get_by_type(event_type))
    }

    /// Events with `start <= timestamp < end`
    pub fn get_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Event> {
        self.read(|store| store.get_by_time_range(start, end))
    }

    pub fn counts(&self) -> EventCounts {
        self.read(EventStore::counts)
    }

    pub fn len(&self) -> usize {
        self.read(EventStore::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.read(EventStore::capacity)
    }

    pub fn clear(&self) {
        if let Some(store) = self.shared.lock().store.as_mut() {
            store.clear();
        }
    }
}
