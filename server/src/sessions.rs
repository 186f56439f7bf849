use std::sync::Arc;

use livesync_shared::session_format::SessionFileData;
use livesync_shared::{normalize_target_url, Role, ServerMessage, SessionRecord};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{ApiError, StorageError};
use crate::state::{AppState, Peer, Session};

pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn normalize_session_id(value: &str) -> Option<String> {
    let parsed = Uuid::parse_str(value).ok()?;
    Some(parsed.to_string())
}

/// Persists the record before it becomes reachable, so a storage failure
/// leaves nothing behind.
pub async fn create_session(
    state: &AppState,
    raw_url: &str,
    host_id: &str,
) -> Result<SessionRecord, ApiError> {
    let url = normalize_target_url(raw_url)
        .ok_or_else(|| ApiError::BadRequest("Please enter a URL".into()))?;
    let host_id = host_id.trim();
    if host_id.is_empty() {
        return Err(ApiError::BadRequest("host_id is required".into()));
    }
    let record = SessionRecord {
        id: new_session_id(),
        url,
        host_id: host_id.to_string(),
        active: true,
    };
    state
        .storage
        .save_session(&record.id, &SessionFileData::from_parts(&record, &[]))
        .await?;
    let session = Arc::new(RwLock::new(Session::new(record.clone(), Vec::new())));
    state
        .sessions
        .write()
        .await
        .insert(record.id.clone(), session);
    info!(session_id = %record.id, url = %record.url, "Session created");
    Ok(record)
}

/// Live session from memory, falling back to storage. `Ok(None)` when it
/// does not exist anywhere.
pub async fn find_session(
    state: &AppState,
    session_id: &str,
) -> Result<Option<Arc<RwLock<Session>>>, StorageError> {
    if let Some(session) = state.sessions.read().await.get(session_id).cloned() {
        return Ok(Some(session));
    }
    let data = match state.storage.load_session(session_id).await {
        Ok(data) => data,
        Err(StorageError::NotFound(_)) => return Ok(None),
        Err(error) => return Err(error),
    };
    info!(session_id, "Loaded session from storage");
    let (record, events) = data.into_parts();
    let session = Arc::new(RwLock::new(Session::new(record, events)));
    let mut sessions = state.sessions.write().await;
    let entry = sessions
        .entry(session_id.to_string())
        .or_insert_with(|| session.clone());
    Ok(Some(entry.clone()))
}

pub async fn find_active_session(
    state: &AppState,
    session_id: &str,
) -> Result<Option<Arc<RwLock<Session>>>, StorageError> {
    let Some(session) = find_session(state, session_id).await? else {
        return Ok(None);
    };
    let active = session.read().await.record.active;
    Ok(active.then_some(session))
}

pub struct Attached {
    pub session: Arc<RwLock<Session>>,
    pub role: Role,
}

/// Registers a connection on the live session and queues the retained log on
/// `tx` ahead of any live event. `Ok(None)` when the session is missing or
/// ended.
///
/// The map read lock is held while the peer is inserted, so an idle-session
/// unload either completes first (and the session is reloaded) or sees the
/// new peer.
pub async fn attach_peer(
    state: &AppState,
    session_id: &str,
    connection_id: Uuid,
    host_id: Option<&str>,
    tx: mpsc::UnboundedSender<ServerMessage>,
) -> Result<Option<Attached>, StorageError> {
    loop {
        let Some(session) = find_active_session(state, session_id).await? else {
            return Ok(None);
        };
        let sessions = state.sessions.read().await;
        let current = sessions
            .get(session_id)
            .is_some_and(|live| Arc::ptr_eq(live, &session));
        if !current {
            continue;
        }
        let mut guard = session.write().await;
        if !guard.record.active {
            return Ok(None);
        }
        let role = guard.role_for(host_id);
        let _ = tx.send(ServerMessage::Sync {
            events: guard.events.clone(),
        });
        guard.peers.insert(connection_id, Peer { tx });
        info!(
            session_id,
            conn = %connection_id,
            role = ?role,
            peers = guard.peers.len(),
            replayed = guard.events.len(),
            "WS connected"
        );
        drop(guard);
        return Ok(Some(Attached {
            session: session.clone(),
            role,
        }));
    }
}

/// Removes a connection. The last one out saves a dirty log and unloads the
/// session from memory.
pub async fn detach_peer(
    state: &AppState,
    session_id: &str,
    session: &Arc<RwLock<Session>>,
    connection_id: Uuid,
) {
    let maybe_data = {
        let mut guard = session.write().await;
        guard.peers.remove(&connection_id);
        info!(
            session_id,
            conn = %connection_id,
            peers = guard.peers.len(),
            "WS disconnected"
        );
        if guard.peers.is_empty() && guard.dirty {
            guard.dirty = false;
            Some(guard.to_persistent_session_data())
        } else {
            None
        }
    };
    if let Some(data) = maybe_data {
        info!(session_id, "Saving finished session");
        save_session(state, session_id, &data).await;
    }

    let mut sessions = state.sessions.write().await;
    let is_current = sessions
        .get(session_id)
        .is_some_and(|live| Arc::ptr_eq(live, session));
    if is_current && session.read().await.peers.is_empty() {
        sessions.remove(session_id);
        debug!(session_id, "Unloaded idle session");
    }
}

/// Deactivates the session and tells every subscriber it is over.
pub async fn end_session(state: &AppState, session_id: &str, host_id: &str) -> Result<(), ApiError> {
    let session = find_session(state, session_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let data = {
        let mut session = session.write().await;
        if session.record.host_id != host_id {
            return Err(ApiError::Forbidden);
        }
        session.record.active = false;
        session.dirty = false;
        for peer in session.peers.values() {
            let _ = peer.tx.send(ServerMessage::Ended);
        }
        session.to_persistent_session_data()
    };
    state.storage.save_session(session_id, &data).await?;
    info!(session_id, "Session ended");
    Ok(())
}

async fn save_session(state: &AppState, session_id: &str, data: &SessionFileData) {
    if let Err(error) = state.storage.save_session(session_id, data).await {
        error!(session_id, %error, "Failed to save session");
    }
}

/// Writes every session with unsaved events.
pub async fn save_dirty_sessions(state: &AppState) {
    let sessions = {
        let sessions = state.sessions.read().await;
        sessions
            .iter()
            .map(|(session_id, session)| (session_id.clone(), session.clone()))
            .collect::<Vec<_>>()
    };
    for (session_id, session) in sessions {
        let maybe_data = {
            let mut session = session.write().await;
            if !session.dirty {
                None
            } else {
                session.dirty = false;
                Some(session.to_persistent_session_data())
            }
        };
        if let Some(data) = maybe_data {
            save_session(state, &session_id, &data).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::append_event;
    use crate::storage::FileStorage;
    use livesync_shared::EventKind;
    use serde_json::json;

    fn test_state(dir: &tempfile::TempDir) -> AppState {
        AppState::new(
            Arc::new(FileStorage::new(dir.path().to_path_buf())),
            dir.path().join("index.html"),
        )
    }

    #[test]
    fn test_normalize_session_id() {
        let id = new_session_id();
        assert_eq!(normalize_session_id(&id.to_uppercase()), Some(id));
        assert_eq!(normalize_session_id("../etc/passwd"), None);
    }

    #[tokio::test]
    async fn test_create_session_persists_record() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let record = create_session(&state, "example.com", "host-1").await.unwrap();
        assert_eq!(record.url, "https://example.com");
        assert!(record.active);

        let stored = state.storage.load_session(&record.id).await.unwrap();
        assert_eq!(stored.session, record);
    }

    #[tokio::test]
    async fn test_create_session_rejects_empty_url() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let result = create_session(&state, "   ", "host-1").await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert!(state.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_find_session_reloads_from_storage() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let record = create_session(&state, "https://example.com", "host-1").await.unwrap();
        state.sessions.write().await.clear();

        let session = find_session(&state, &record.id).await.unwrap().unwrap();
        assert_eq!(session.read().await.record, record);
        assert!(find_session(&state, &new_session_id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_end_session_requires_host() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let record = create_session(&state, "https://example.com", "host-1").await.unwrap();

        let denied = end_session(&state, &record.id, "someone-else").await;
        assert!(matches!(denied, Err(ApiError::Forbidden)));
        assert!(find_active_session(&state, &record.id).await.unwrap().is_some());

        end_session(&state, &record.id, "host-1").await.unwrap();
        assert!(find_active_session(&state, &record.id).await.unwrap().is_none());
        let stored = state.storage.load_session(&record.id).await.unwrap();
        assert!(!stored.session.active);
    }

    #[tokio::test]
    async fn test_save_dirty_sessions_writes_new_events() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let record = create_session(&state, "https://example.com", "host-1").await.unwrap();
        let session = find_session(&state, &record.id).await.unwrap().unwrap();
        append_event(
            &mut *session.write().await,
            Uuid::new_v4(),
            Role::Host,
            EventKind::Navigation,
            json!({}),
        )
        .unwrap();
        assert!(session.read().await.dirty);

        save_dirty_sessions(&state).await;

        assert!(!session.read().await.dirty);
        let stored = state.storage.load_session(&record.id).await.unwrap();
        assert_eq!(stored.events.len(), 1);
    }

    #[tokio::test]
    async fn test_attach_peer_queues_retained_log_first() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let record = create_session(&state, "https://example.com", "host-1").await.unwrap();
        let session = find_session(&state, &record.id).await.unwrap().unwrap();
        let appended = append_event(
            &mut *session.write().await,
            Uuid::new_v4(),
            Role::Host,
            EventKind::Navigation,
            json!({}),
        )
        .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let attached = attach_peer(&state, &record.id, Uuid::new_v4(), None, tx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attached.role, Role::Viewer);
        match rx.try_recv().unwrap() {
            ServerMessage::Sync { events } => assert_eq!(events, vec![appended]),
            other => panic!("expected sync, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_last_detach_saves_and_unloads() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let record = create_session(&state, "https://example.com", "host-1").await.unwrap();
        let host = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        let attached = attach_peer(&state, &record.id, host, Some("host-1"), tx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attached.role, Role::Host);
        append_event(
            &mut *attached.session.write().await,
            host,
            Role::Host,
            EventKind::Navigation,
            json!({}),
        )
        .unwrap();

        detach_peer(&state, &record.id, &attached.session, host).await;
        assert!(state.sessions.read().await.is_empty());
        let stored = state.storage.load_session(&record.id).await.unwrap();
        assert_eq!(stored.events.len(), 1);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let reattached = attach_peer(&state, &record.id, Uuid::new_v4(), None, tx)
            .await
            .unwrap()
            .unwrap();
        assert!(!Arc::ptr_eq(&reattached.session, &attached.session));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::Sync { events } if events.len() == 1
        ));
    }

    #[tokio::test]
    async fn test_attach_to_ended_session_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let record = create_session(&state, "https://example.com", "host-1").await.unwrap();
        end_session(&state, &record.id, "host-1").await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let attached = attach_peer(&state, &record.id, Uuid::new_v4(), None, tx)
            .await
            .unwrap();
        assert!(attached.is_none());
    }
}
