//! Async tap over a bus subscription
//!
//! An `EventStream` is a regular subscription whose handler forwards a copy
//! of each delivered event into an unbounded channel. Dispatch stays
//! synchronous; only the consumer side is async. Dropping the stream
//! unsubscribes it.

use crate::bus::{EventBus, Shared};
use crate::error::Result;
use crate::subscription::{HandlerResult, SubscribeOptions, SubscriptionId};
use crate::types::Event;
use futures::Stream;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

/// Stream of events delivered to one subscription
///
/// Ends when the subscription goes away: a `once` stream yields a single
/// event, and any stream ends after the bus clears its subscriptions.
pub struct EventStream {
    id: SubscriptionId,
    inner: UnboundedReceiverStream<Event>,
    bus: Weak<Shared>,
}

impl EventStream {
    pub(crate) fn open(bus: &EventBus, pattern: &str, options: SubscribeOptions) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = bus.subscribe_with(
            pattern,
            move |event: &Event| -> HandlerResult {
                // A closed receiver means the stream is being dropped
                let _ = tx.send(event.clone());
                Ok(())
            },
            options,
        )?;

        Ok(Self {
            id,
            inner: UnboundedReceiverStream::new(rx),
            bus: bus.downgrade(),
        })
    }

    /// Id of the backing subscription
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event
    pub async fn next(&mut self) -> Option<Event> {
        StreamExt::next(&mut self.inner).await
    }

    /// Take an already delivered event without waiting
    pub fn try_next(&mut self) -> Option<Event> {
        self.inner.as_mut().try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(bus) = EventBus::upgrade(&self.bus) {
            bus.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;

    fn event(event_type: &str) -> Event {
        Event::new(event_type, serde_json::json!({}), "test")
    }

    #[tokio::test]
    async fn test_stream_receives_matching_events() {
        let bus = EventBus::default();
        let mut stream = bus.stream("order:*").unwrap();

        bus.emit(event("order:created")).unwrap();
        bus.emit(event("user:login")).unwrap();
        bus.emit(event("order:paid")).unwrap();

        assert_eq!(stream.next().await.unwrap().event_type, "order:created");
        assert_eq!(stream.next().await.unwrap().event_type, "order:paid");
        assert!(stream.try_next().is_none());
    }

    #[tokio::test]
    async fn test_stream_drop_unsubscribes() {
        let bus = EventBus::default();
        let stream = bus.stream("order:*").unwrap();
        assert_eq!(bus.subscription_count(), 1);

        drop(stream);
        assert_eq!(bus.subscription_count(), 0);
        bus.emit(event("order:created")).unwrap();
        assert_eq!(bus.get_stats().dispatched, 0);
    }

    #[tokio::test]
    async fn test_once_stream_ends_after_first_event() {
        let bus = EventBus::default();
        let mut stream = bus.on("order:*").priority(Priority::High).once().stream().unwrap();

        bus.emit(event("order:created")).unwrap();
        bus.emit(event("order:paid")).unwrap();

        assert_eq!(stream.next().await.unwrap().event_type, "order:created");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_outlives_bus() {
        let bus = EventBus::default();
        let mut stream = bus.stream("*").unwrap();
        bus.emit(event("a:b")).unwrap();
        drop(bus);

        assert_eq!(stream.next().await.unwrap().event_type, "a:b");
        assert!(stream.next().await.is_none());
    }
}
