use bincode::{Decode, Encode};

use crate::{EventKind, SessionEvent, SessionRecord};

pub const SESSION_FILE_MAGIC: [u8; 4] = *b"LSSL";
pub const SESSION_FILE_VERSION: u32 = 1;
const SESSION_HEADER_LEN: usize = SESSION_FILE_MAGIC.len() + std::mem::size_of::<u32>();

/// Event as stored on disk; the payload is kept as JSON text.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct StoredEvent {
    pub id: String,
    pub event_type: String,
    pub event_data: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct SessionFileData {
    pub session: SessionRecord,
    pub events: Vec<StoredEvent>,
}

impl SessionFileData {
    pub fn from_parts(session: &SessionRecord, events: &[SessionEvent]) -> Self {
        let events = events
            .iter()
            .map(|event| StoredEvent {
                id: event.id.clone(),
                event_type: event.event_type.as_str().to_string(),
                event_data: event.event_data.to_string(),
                created_at: event.created_at,
            })
            .collect();
        Self {
            session: session.clone(),
            events,
        }
    }

    /// Entries that no longer parse are dropped.
    pub fn into_parts(self) -> (SessionRecord, Vec<SessionEvent>) {
        let session_id = self.session.id.clone();
        let events = self
            .events
            .into_iter()
            .filter_map(|stored| {
                Some(SessionEvent {
                    id: stored.id,
                    session_id: session_id.clone(),
                    event_type: EventKind::parse(&stored.event_type)?,
                    event_data: serde_json::from_str(&stored.event_data).ok()?,
                    created_at: stored.created_at,
                })
            })
            .collect();
        (self.session, events)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionFileDecodeError {
    #[error("unsupported session file version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid session file data")]
    InvalidData,
}

pub fn encode_session_file(data: &SessionFileData) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&SESSION_FILE_MAGIC);
    payload.extend_from_slice(&SESSION_FILE_VERSION.to_le_bytes());
    let body = bincode::encode_to_vec(data, bincode::config::standard()).unwrap_or_default();
    payload.extend_from_slice(&body);
    payload
}

pub fn decode_session_file(payload: &[u8]) -> Result<SessionFileData, SessionFileDecodeError> {
    if !(payload.len() >= SESSION_HEADER_LEN && payload.starts_with(&SESSION_FILE_MAGIC)) {
        return Err(SessionFileDecodeError::InvalidData);
    }
    let version = u32::from_le_bytes(
        payload[SESSION_FILE_MAGIC.len()..SESSION_HEADER_LEN]
            .try_into()
            .map_err(|_| SessionFileDecodeError::InvalidData)?,
    );
    let body = &payload[SESSION_HEADER_LEN..];
    match version {
        1 => bincode::decode_from_slice(body, bincode::config::standard())
            .map(|(data, _)| data)
            .map_err(|_| SessionFileDecodeError::InvalidData),
        _ => Err(SessionFileDecodeError::UnsupportedVersion(version)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> SessionRecord {
        SessionRecord {
            id: "s1".into(),
            url: "https://example.com".into(),
            host_id: "h1".into(),
            active: true,
        }
    }

    #[test]
    fn test_session_file_keeps_events_in_order() {
        let events = vec![
            SessionEvent {
                id: "e1".into(),
                session_id: "s1".into(),
                event_type: EventKind::Scroll,
                event_data: json!({ "x": 0.0, "y": 300.0 }),
                created_at: 1,
            },
            SessionEvent {
                id: "e2".into(),
                session_id: "s1".into(),
                event_type: EventKind::Annotation,
                event_data: json!({ "action": "clear" }),
                created_at: 2,
            },
        ];
        let bytes = encode_session_file(&SessionFileData::from_parts(&record(), &events));
        assert!(bytes.starts_with(b"LSSL"));
        let (session, decoded) = decode_session_file(&bytes).unwrap().into_parts();
        assert_eq!(session, record());
        assert_eq!(decoded, events);
    }

    #[test]
    fn test_rejects_bad_magic_and_version() {
        assert!(matches!(
            decode_session_file(b"YBSS\x01\x00\x00\x00"),
            Err(SessionFileDecodeError::InvalidData)
        ));
        let mut bytes = encode_session_file(&SessionFileData::from_parts(&record(), &[]));
        bytes[4] = 9;
        assert!(matches!(
            decode_session_file(&bytes),
            Err(SessionFileDecodeError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_unparseable_stored_events_are_dropped() {
        let data = SessionFileData {
            session: record(),
            events: vec![StoredEvent {
                id: "e1".into(),
                event_type: "zoom".into(),
                event_data: "{}".into(),
                created_at: 0,
            }],
        };
        let (_, events) = data.into_parts();
        assert!(events.is_empty());
    }
}
