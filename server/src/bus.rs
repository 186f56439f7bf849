//! The session event bus: ordered, append-only, host-written, fanned out to
//! every subscriber of the session.

use chrono::Utc;
use livesync_shared::{EventKind, Role, ScrollOffset, ServerMessage, SessionEvent};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::state::{Session, MAX_RETAINED_EVENTS};

/// Appends an event on behalf of a connection holding `role` and fans it out.
///
/// Viewer appends, appends to an ended session and malformed payloads are
/// dropped without a record or a broadcast. Fan-out happens under the same
/// borrow as the append so delivery order always matches log order.
pub fn append_event(
    session: &mut Session,
    sender: Uuid,
    role: Role,
    event_type: EventKind,
    event_data: Value,
) -> Option<SessionEvent> {
    if !role.is_host() {
        debug!(session_id = %session.record.id, conn = %sender, "Dropped append from viewer");
        return None;
    }
    if !session.record.active {
        debug!(session_id = %session.record.id, conn = %sender, "Dropped append to ended session");
        return None;
    }
    let Some(event_data) = sanitize_payload(event_type, event_data) else {
        debug!(
            session_id = %session.record.id,
            conn = %sender,
            kind = event_type.as_str(),
            "Dropped malformed payload"
        );
        return None;
    };

    let event = SessionEvent {
        id: Uuid::now_v7().to_string(),
        session_id: session.record.id.clone(),
        event_type,
        event_data,
        created_at: Utc::now().timestamp_millis(),
    };
    session.events.push(event.clone());
    let overflow = session.events.len().saturating_sub(MAX_RETAINED_EVENTS);
    if overflow > 0 {
        session.events.drain(0..overflow);
    }
    session.dirty = true;

    broadcast_all(
        session,
        ServerMessage::Event {
            event: event.clone(),
        },
    );
    Some(event)
}

pub fn broadcast_all(session: &mut Session, message: ServerMessage) {
    let mut stale = Vec::new();
    for (id, peer) in session.peers.iter() {
        if peer.tx.send(message.clone()).is_err() {
            stale.push(*id);
        }
    }
    for id in stale {
        session.peers.remove(&id);
    }
}

fn sanitize_payload(event_type: EventKind, event_data: Value) -> Option<Value> {
    match event_type {
        EventKind::Scroll => {
            let offset = serde_json::from_value::<ScrollOffset>(event_data).ok()?;
            offset
                .is_finite()
                .then(|| json!({ "x": offset.x, "y": offset.y }))
        }
        EventKind::Annotation => {
            let has_action = event_data
                .get("action")
                .map(Value::is_string)
                .unwrap_or(false);
            has_action.then_some(event_data)
        }
        EventKind::Navigation => Some(json!({})),
    }
}
