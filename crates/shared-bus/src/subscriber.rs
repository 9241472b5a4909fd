//! # Stream Subscriber
//!
//! Asynchronous consumers (background tasks, the session bridge) receive
//! events through a broadcast-backed subscription instead of a handler.

use crate::events::{BusEvent, EventFilter};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The bus was dropped.
    #[error("Message bus closed")]
    Closed,
}

/// Decrements the bus' stream count when dropped.
pub(crate) struct SubscriptionGuard {
    streams: Arc<RwLock<HashMap<String, usize>>>,
    key: String,
}

impl SubscriptionGuard {
    pub(crate) fn new(streams: Arc<RwLock<HashMap<String, usize>>>, key: String) -> Self {
        Self { streams, key }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let mut streams = self.streams.write();
        if let Some(count) = streams.get_mut(&self.key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                streams.remove(&self.key);
            }
        }
        debug!(filter = %self.key, "Stream subscription dropped");
    }
}

/// A subscription handle for receiving events.
///
/// When dropped, the subscription is automatically cleaned up.
pub struct Subscription<E: BusEvent> {
    receiver: broadcast::Receiver<E>,
    filter: EventFilter,
    guard: SubscriptionGuard,
}

impl<E: BusEvent> Subscription<E> {
    pub(crate) fn new(
        receiver: broadcast::Receiver<E>,
        filter: EventFilter,
        guard: SubscriptionGuard,
    ) -> Self {
        Self {
            receiver,
            filter,
            guard,
        }
    }

    /// Receive the next event that matches the filter.
    ///
    /// # Returns
    ///
    /// - `Some(event)` - The next matching event
    /// - `None` - The channel was closed (bus dropped)
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, some events dropped");
                    continue;
                }
            };

            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }

    /// Try to receive the next event without blocking.
    pub fn try_recv(&mut self) -> Result<Option<E>, SubscriptionError> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(e) => e,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if self.filter.matches(&event) {
                return Ok(Some(event));
            }
        }
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

/// A stream wrapper for subscriptions.
///
/// Implements `tokio_stream::Stream` for use with stream combinators.
pub struct EventStream<E: BusEvent> {
    inner: BroadcastStream<E>,
    filter: EventFilter,
    _guard: SubscriptionGuard,
}

impl<E: BusEvent> EventStream<E> {
    #[must_use]
    pub fn new(subscription: Subscription<E>) -> Self {
        let Subscription {
            receiver,
            filter,
            guard,
        } = subscription;
        Self {
            inner: BroadcastStream::new(receiver),
            filter,
            _guard: guard,
        }
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl<E: BusEvent> Stream for EventStream<E> {
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if self.filter.matches(&event) {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
                    debug!(lagged = count, "Stream lagged, some events dropped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::EventPublisher;
    use crate::test_support::{TestBus, TestEvent};
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_subscription_recv() {
        let bus = TestBus::new();
        let mut sub = bus.stream(EventFilter::all());

        bus.publish(TestEvent::Ping(7));

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");

        assert_eq!(received, TestEvent::Ping(7));
    }

    #[tokio::test]
    async fn test_subscription_filter() {
        let bus = TestBus::new();
        let mut sub = bus.stream(EventFilter::event_types(["Ponger:pong"]));

        // Filtered out
        bus.publish(TestEvent::Ping(1));
        // Delivered
        bus.publish(TestEvent::Pong(2));

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");

        assert_eq!(received, TestEvent::Pong(2));
    }

    #[tokio::test]
    async fn test_subscription_drop_cleanup() {
        let bus = TestBus::new();

        {
            let _sub1 = bus.stream(EventFilter::all());
            let _sub2 = bus.stream(EventFilter::all());
            assert_eq!(bus.subscriber_count(), 2);
        }

        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = TestBus::new();
        let mut sub = bus.stream(EventFilter::all());
        assert!(matches!(sub.try_recv(), Ok(None)));
    }

    #[tokio::test]
    async fn test_event_stream_yields_filtered_events() {
        let bus = TestBus::new();
        let mut stream = bus.event_stream(EventFilter::namespaces(["Pinger"]));

        bus.publish(TestEvent::Pong(1));
        bus.publish(TestEvent::Ping(3));

        let next = timeout(Duration::from_millis(100), stream.next())
            .await
            .expect("timeout");
        assert_eq!(next, Some(TestEvent::Ping(3)));
    }
}
