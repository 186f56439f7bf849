//! In-memory stand-ins for the browser-backed collaborators.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use futures::channel::mpsc;
use livesync_shared::{
    encode_annotation, AnnotationPayload, CircleShape, EventKind, RectShape, ScrollOffset,
    SessionEvent, VectorObject,
};
use serde_json::Value;

use crate::bus::{BusError, EventBus, Subscription};
use crate::canvas::Renderer;
use crate::notify::{NoticeKind, Notifier};
use crate::replay::backlog;
use crate::viewport::{AccessDenied, ScrollSurface};

pub fn circle(left: f64, top: f64, stroke: &str) -> VectorObject {
    VectorObject::Circle(CircleShape {
        left,
        top,
        radius: 50.0,
        stroke: stroke.to_string(),
        stroke_width: 3.0,
    })
}

pub fn rect(left: f64, top: f64, stroke: &str) -> VectorObject {
    VectorObject::Rect(RectShape {
        left,
        top,
        width: 100.0,
        height: 100.0,
        stroke: stroke.to_string(),
        stroke_width: 3.0,
    })
}

pub fn event(id: &str, event_type: EventKind, event_data: Value) -> SessionEvent {
    SessionEvent {
        id: id.to_string(),
        session_id: "s1".to_string(),
        event_type,
        event_data,
        created_at: 0,
    }
}

pub fn annotation_event(id: &str, annotation: AnnotationPayload) -> SessionEvent {
    event(id, EventKind::Annotation, encode_annotation(&annotation))
}

#[derive(Default)]
struct MemoryBusInner {
    log: Vec<SessionEvent>,
    subscribers: Vec<(u64, String, mpsc::UnboundedSender<SessionEvent>)>,
    next_subscriber: u64,
    disconnected: bool,
}

/// Single-process bus with the same ordering, backlog and fan-out rules as
/// the server.
#[derive(Default)]
pub struct MemoryBus {
    inner: Rc<RefCell<MemoryBusInner>>,
}

impl MemoryBus {
    pub fn log(&self) -> Vec<SessionEvent> {
        self.inner.borrow().log.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    pub fn disconnect(&self) {
        self.inner.borrow_mut().disconnected = true;
    }

    /// Ends every open subscription stream.
    pub fn close_all(&self) {
        self.inner.borrow_mut().subscribers.clear();
    }
}

impl EventBus for MemoryBus {
    fn append(
        &self,
        session_id: &str,
        event_type: EventKind,
        event_data: Value,
    ) -> Result<(), BusError> {
        let mut inner = self.inner.borrow_mut();
        if inner.disconnected {
            return Err(BusError::NotConnected);
        }
        let event = SessionEvent {
            id: format!("evt-{}", inner.log.len() + 1),
            session_id: session_id.to_string(),
            event_type,
            event_data,
            created_at: inner.log.len() as i64,
        };
        inner.log.push(event.clone());
        inner
            .subscribers
            .retain(|(_, session, tx)| session != session_id || tx.unbounded_send(event.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self, session_id: &str) -> Result<Subscription, BusError> {
        let (tx, rx) = mpsc::unbounded();
        let mut inner = self.inner.borrow_mut();
        if inner.disconnected {
            return Err(BusError::NotConnected);
        }
        let retained = inner
            .log
            .iter()
            .filter(|event| event.session_id == session_id)
            .cloned()
            .collect::<Vec<_>>();
        for event in backlog(retained) {
            let _ = tx.unbounded_send(event);
        }
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.push((id, session_id.to_string(), tx));
        let weak: Weak<RefCell<MemoryBusInner>> = Rc::downgrade(&self.inner);
        Ok(Subscription::new(rx, move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().subscribers.retain(|(other, _, _)| *other != id);
            }
        }))
    }
}

/// Records the object count of every redraw.
#[derive(Default)]
pub struct RecordingRenderer {
    frames: Rc<RefCell<Vec<usize>>>,
}

impl RecordingRenderer {
    pub fn frames(&self) -> Rc<RefCell<Vec<usize>>> {
        self.frames.clone()
    }
}

impl Renderer for RecordingRenderer {
    fn redraw(&mut self, objects: &[VectorObject]) {
        self.frames.borrow_mut().push(objects.len());
    }
}

#[derive(Default)]
pub struct FakeScrollSurface {
    position: Rc<RefCell<ScrollOffset>>,
    denied: Rc<Cell<bool>>,
}

impl FakeScrollSurface {
    /// A cross-origin page: every read and write is refused.
    pub fn denied() -> Self {
        let surface = Self::default();
        surface.denied.set(true);
        surface
    }

    pub fn position(&self) -> Rc<RefCell<ScrollOffset>> {
        self.position.clone()
    }

    pub fn set(&self, offset: ScrollOffset) {
        *self.position.borrow_mut() = offset;
    }
}

impl ScrollSurface for FakeScrollSurface {
    fn scroll_offset(&self) -> Result<ScrollOffset, AccessDenied> {
        if self.denied.get() {
            return Err(AccessDenied);
        }
        Ok(*self.position.borrow())
    }

    fn scroll_to(&self, offset: ScrollOffset) -> Result<(), AccessDenied> {
        if self.denied.get() {
            return Err(AccessDenied);
        }
        *self.position.borrow_mut() = offset;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: RefCell<Vec<(NoticeKind, String)>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<(NoticeKind, String)> {
        self.notices.borrow().clone()
    }

    pub fn last(&self) -> Option<(NoticeKind, String)> {
        self.notices.borrow().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        self.notices.borrow_mut().push((kind, message.to_string()));
    }
}
