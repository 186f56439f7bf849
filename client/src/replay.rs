use livesync_shared::{
    decode_annotation, AnnotationPayload, EventKind, EventPayload, Role, ScrollOffset,
    SessionEvent,
};
use tracing::debug;

use crate::canvas::CanvasState;

/// What applying one event asked of the surface beyond the canvas mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplayOutcome {
    Ignored,
    Added,
    Cleared,
    Scroll(ScrollOffset),
    Reload,
}

/// Applies one bus event to `canvas`. Hosts ignore the stream entirely since
/// their local state already reflects their own actions.
pub fn replay(canvas: &mut CanvasState, role: Role, event: &SessionEvent) -> ReplayOutcome {
    if role.is_host() {
        return ReplayOutcome::Ignored;
    }
    match event.event_type {
        EventKind::Annotation => match decode_annotation(&event.event_data) {
            Some(AnnotationPayload::Add(object)) => {
                canvas.add(object);
                ReplayOutcome::Added
            }
            Some(AnnotationPayload::Clear) => {
                canvas.clear();
                ReplayOutcome::Cleared
            }
            None => {
                debug!(event_id = %event.id, "Undecodable annotation skipped");
                ReplayOutcome::Ignored
            }
        },
        EventKind::Scroll => match EventPayload::from_event(event) {
            Some(EventPayload::Scroll(offset)) => ReplayOutcome::Scroll(offset),
            _ => ReplayOutcome::Ignored,
        },
        EventKind::Navigation => ReplayOutcome::Reload,
    }
}

/// The part of a retained log a new subscriber replays. Navigation events
/// are left out: they only ask already-connected viewers to reload, and a
/// freshly loaded viewer replaying one would reload forever.
pub fn backlog(events: Vec<SessionEvent>) -> impl Iterator<Item = SessionEvent> {
    events
        .into_iter()
        .filter(|event| event.event_type != EventKind::Navigation)
}
