//! Client side of the session event bus. Appends go out through an
//! [`EventBus`] implementation; received events arrive on a [`Subscription`]
//! that releases its transport resources when dropped.

use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::stream::{Stream, StreamExt};
use livesync_shared::{EventKind, EventPayload, Role, SessionEvent};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("event bus is not connected")]
    NotConnected,
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(String),
}

pub trait EventBus {
    fn append(&self, session_id: &str, event_type: EventKind, event_data: Value)
        -> Result<(), BusError>;
    fn subscribe(&self, session_id: &str) -> Result<Subscription, BusError>;
}

/// Ordered stream of one session's events. Dropping it releases whatever the
/// bus allocated for it.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<SessionEvent>,
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<SessionEvent>,
        release: impl FnOnce() + 'static,
    ) -> Self {
        Self {
            receiver,
            release: Some(Box::new(release)),
        }
    }

    /// Next already-delivered event, without waiting.
    pub fn try_next(&mut self) -> Option<SessionEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Feeds every event of `subscription` to `on_event` until the bus closes it.
pub async fn pump(mut subscription: Subscription, mut on_event: impl FnMut(SessionEvent)) {
    while let Some(event) = subscription.next().await {
        on_event(event);
    }
}

/// Role-aware handle for one session. Only hosts write; a viewer's append is
/// a silent no-op.
pub struct BusClient {
    bus: Rc<dyn EventBus>,
    session_id: String,
    role: Role,
}

impl BusClient {
    pub fn new(bus: Rc<dyn EventBus>, session_id: impl Into<String>, role: Role) -> Self {
        Self {
            bus,
            session_id: session_id.into(),
            role,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns whether the event was handed to the bus. Failures are logged,
    /// never raised.
    pub fn append(&self, payload: EventPayload) -> bool {
        if !self.role.is_host() {
            debug!(session_id = %self.session_id, "Viewer append skipped");
            return false;
        }
        let (event_type, event_data) = payload.into_parts();
        match self.bus.append(&self.session_id, event_type, event_data) {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    session_id = %self.session_id,
                    kind = event_type.as_str(),
                    %error,
                    "Event append failed"
                );
                false
            }
        }
    }

    pub fn subscribe(&self) -> Result<Subscription, BusError> {
        self.bus.subscribe(&self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{circle, MemoryBus};
    use livesync_shared::{AnnotationPayload, ScrollOffset};

    #[test]
    fn test_viewer_append_is_a_no_op() {
        let bus = Rc::new(MemoryBus::default());
        let viewer = BusClient::new(bus.clone(), "s1", Role::Viewer);
        assert!(!viewer.append(EventPayload::Annotation(AnnotationPayload::Clear)));
        assert!(bus.log().is_empty());
    }

    #[test]
    fn test_host_append_reaches_subscribers_in_order() {
        let bus = Rc::new(MemoryBus::default());
        let host = BusClient::new(bus.clone(), "s1", Role::Host);
        let mut subscription = host.subscribe().unwrap();

        host.append(EventPayload::Annotation(AnnotationPayload::Add(circle(
            1.0, 2.0, "#FF00FF",
        ))));
        host.append(EventPayload::Scroll(ScrollOffset::new(0.0, 90.0)));

        let kinds = std::iter::from_fn(|| subscription.try_next())
            .map(|event| event.event_type)
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec![EventKind::Annotation, EventKind::Scroll]);
    }

    #[test]
    fn test_events_stay_within_their_session() {
        let bus = Rc::new(MemoryBus::default());
        let other = BusClient::new(bus.clone(), "s2", Role::Viewer);
        let mut subscription = other.subscribe().unwrap();
        BusClient::new(bus.clone(), "s1", Role::Host).append(EventPayload::Navigation);
        assert!(subscription.try_next().is_none());
    }

    #[test]
    fn test_dropping_subscription_releases_it() {
        let bus = Rc::new(MemoryBus::default());
        let client = BusClient::new(bus.clone(), "s1", Role::Viewer);
        for _ in 0..3 {
            let subscription = client.subscribe().unwrap();
            assert_eq!(bus.subscriber_count(), 1);
            drop(subscription);
            assert_eq!(bus.subscriber_count(), 0);
        }
    }

    #[test]
    fn test_failed_append_is_swallowed() {
        let bus = Rc::new(MemoryBus::default());
        bus.disconnect();
        let host = BusClient::new(bus.clone(), "s1", Role::Host);
        assert!(!host.append(EventPayload::Navigation));
    }

    #[test]
    fn test_pump_drains_until_closed() {
        let bus = Rc::new(MemoryBus::default());
        let host = BusClient::new(bus.clone(), "s1", Role::Host);
        let subscription = host.subscribe().unwrap();
        host.append(EventPayload::Navigation);
        host.append(EventPayload::Navigation);
        bus.close_all();

        let mut seen = 0;
        futures::executor::block_on(pump(subscription, |_| seen += 1));
        assert_eq!(seen, 2);
    }
}
