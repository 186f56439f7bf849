use std::cell::RefCell;
use std::rc::{Rc, Weak};

use futures::channel::mpsc;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CloseEvent, Event, MessageEvent, WebSocket, Window};

use livesync_shared::{ClientMessage, EventKind, Role, ServerMessage, SessionEvent};

use crate::bus::{BusError, EventBus, Subscription};
use crate::net::websocket_url;
use crate::replay::backlog;

/// What an inbound frame asks of the socket owner.
#[derive(Clone, Debug, PartialEq)]
enum Inbound {
    Subscribed(Role),
    Delivered(usize),
    Ended,
}

/// Socket-independent half of the bus: subscribers, frames queued while
/// connecting, and inbound frame handling.
struct Hub {
    session_id: String,
    subscribers: Vec<(u64, mpsc::UnboundedSender<SessionEvent>)>,
    next_subscriber: u64,
    pending: Vec<String>,
    closed: bool,
}

impl Hub {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            subscribers: Vec::new(),
            next_subscriber: 0,
            pending: Vec::new(),
            closed: false,
        }
    }

    fn subscribe(&mut self) -> (u64, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded();
        let id = self.next_subscriber;
        self.next_subscriber += 1;
        self.subscribers.push((id, tx));
        (id, rx)
    }

    /// Returns true once no subscription remains.
    fn release(&mut self, id: u64) -> bool {
        self.subscribers.retain(|(other, _)| *other != id);
        self.subscribers.is_empty()
    }

    fn queue(&mut self, payload: String) {
        self.pending.push(payload);
    }

    fn take_pending(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }

    fn dispatch(&mut self, event: SessionEvent) -> bool {
        if event.session_id != self.session_id {
            return false;
        }
        self.subscribers
            .retain(|(_, tx)| tx.unbounded_send(event.clone()).is_ok());
        true
    }

    fn receive(&mut self, text: &str) -> Result<Inbound, serde_json::Error> {
        if self.closed {
            return Ok(Inbound::Delivered(0));
        }
        Ok(match serde_json::from_str::<ServerMessage>(text)? {
            ServerMessage::Subscribed { role, .. } => Inbound::Subscribed(role),
            ServerMessage::Sync { events } => {
                let mut delivered = 0;
                for event in backlog(events) {
                    if self.dispatch(event) {
                        delivered += 1;
                    }
                }
                Inbound::Delivered(delivered)
            }
            ServerMessage::Event { event } => Inbound::Delivered(usize::from(self.dispatch(event))),
            ServerMessage::Ended => Inbound::Ended,
        })
    }

    /// Ends every subscription stream and drops queued frames. Returns false
    /// when already shut.
    fn shut(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.subscribers.clear();
        self.pending.clear();
        true
    }
}

struct Handlers {
    onopen: Closure<dyn FnMut(Event)>,
    onmessage: Closure<dyn FnMut(MessageEvent)>,
    onclose: Closure<dyn FnMut(CloseEvent)>,
    onerror: Closure<dyn FnMut(Event)>,
}

struct Shared {
    socket: WebSocket,
    hub: RefCell<Hub>,
    handlers: RefCell<Option<Handlers>>,
}

impl Shared {
    fn flush_pending(&self) {
        let pending = self.hub.borrow_mut().take_pending();
        for payload in pending {
            if let Err(error) = self.socket.send_with_str(&payload) {
                web_sys::console::error_2(&"WS send failed".into(), &error);
            }
        }
    }

    fn close(&self) {
        if !self.hub.borrow_mut().shut() {
            return;
        }
        self.socket.set_onopen(None);
        self.socket.set_onmessage(None);
        self.socket.set_onclose(None);
        self.socket.set_onerror(None);
        let _ = self.socket.close();
        // May run from inside one of these handlers; drop them on a later tick.
        if let Some(handlers) = self.handlers.borrow_mut().take() {
            wasm_bindgen_futures::spawn_local(async move {
                drop(handlers);
            });
        }
    }
}

/// One WebSocket per mounted surface, bound to a single session. New
/// subscriptions first receive the session's retained log, then live events.
/// The socket closes when the last subscription is released.
pub struct WsBus {
    shared: Rc<Shared>,
}

impl WsBus {
    pub fn connect(
        window: &Window,
        session_id: &str,
        host_id: Option<&str>,
        on_ended: impl FnMut() + 'static,
    ) -> Result<Self, JsValue> {
        let socket = WebSocket::new(&websocket_url(window, session_id, host_id)?)?;
        let shared = Rc::new(Shared {
            socket: socket.clone(),
            hub: RefCell::new(Hub::new(session_id)),
            handlers: RefCell::new(None),
        });
        let on_ended = Rc::new(RefCell::new(on_ended));

        let onopen = {
            let shared = Rc::downgrade(&shared);
            Closure::<dyn FnMut(Event)>::new(move |_| {
                if let Some(shared) = shared.upgrade() {
                    shared.flush_pending();
                }
            })
        };

        let onmessage = {
            let shared = Rc::downgrade(&shared);
            let on_ended = on_ended.clone();
            Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
                let Some(text) = event.data().as_string() else {
                    web_sys::console::error_2(&"WS message data is not text".into(), &event.data());
                    return;
                };
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                let inbound = shared.hub.borrow_mut().receive(&text);
                match inbound {
                    Ok(Inbound::Subscribed(role)) => {
                        web_sys::console::log_1(&format!("Subscribed as {role:?}").into());
                    }
                    Ok(Inbound::Delivered(_)) => {}
                    Ok(Inbound::Ended) => {
                        shared.close();
                        on_ended.borrow_mut()();
                    }
                    Err(error) => {
                        web_sys::console::error_1(
                            &format!("WS message JSON parse error: {error}").into(),
                        );
                    }
                }
            })
        };

        let onclose = Closure::<dyn FnMut(CloseEvent)>::new(move |event: CloseEvent| {
            web_sys::console::log_1(
                &format!("WS closed code={} reason={}", event.code(), event.reason()).into(),
            );
        });

        let onerror = Closure::<dyn FnMut(Event)>::new(move |_| {
            web_sys::console::error_1(&"WS error".into());
        });

        socket.set_onopen(Some(onopen.as_ref().unchecked_ref()));
        socket.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        socket.set_onclose(Some(onclose.as_ref().unchecked_ref()));
        socket.set_onerror(Some(onerror.as_ref().unchecked_ref()));
        *shared.handlers.borrow_mut() = Some(Handlers {
            onopen,
            onmessage,
            onclose,
            onerror,
        });

        Ok(Self { shared })
    }

    fn accepts(&self, session_id: &str) -> bool {
        let hub = self.shared.hub.borrow();
        session_id == hub.session_id && !hub.closed
    }
}

impl EventBus for WsBus {
    fn append(
        &self,
        session_id: &str,
        event_type: EventKind,
        event_data: Value,
    ) -> Result<(), BusError> {
        if !self.accepts(session_id) {
            return Err(BusError::NotConnected);
        }
        let payload = serde_json::to_string(&ClientMessage::Append {
            event_type,
            event_data,
        })?;
        match self.shared.socket.ready_state() {
            WebSocket::CONNECTING => {
                self.shared.hub.borrow_mut().queue(payload);
                Ok(())
            }
            WebSocket::OPEN => self
                .shared
                .socket
                .send_with_str(&payload)
                .map_err(|error| BusError::Transport(format!("{error:?}"))),
            _ => Err(BusError::NotConnected),
        }
    }

    fn subscribe(&self, session_id: &str) -> Result<Subscription, BusError> {
        if !self.accepts(session_id) {
            return Err(BusError::NotConnected);
        }
        let (id, rx) = self.shared.hub.borrow_mut().subscribe();
        let shared: Weak<Shared> = Rc::downgrade(&self.shared);
        Ok(Subscription::new(rx, move || {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let last = shared.hub.borrow_mut().release(id);
            if last {
                shared.close();
            }
        }))
    }
}

impl Drop for WsBus {
    fn drop(&mut self) {
        self.shared.close();
    }
}
