use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use livesync_shared::session_format::SessionFileData;
use livesync_shared::{Role, ServerMessage, SessionEvent, SessionRecord};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::storage::Storage;

pub const MAX_RETAINED_EVENTS: usize = 5000;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, Arc<RwLock<Session>>>>>,
    pub storage: Arc<dyn Storage>,
    pub index_file: PathBuf,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, index_file: PathBuf) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage,
            index_file,
        }
    }
}

pub struct Peer {
    pub tx: mpsc::UnboundedSender<ServerMessage>,
}

/// Live state of one session: its record, the retained event log and the
/// connections subscribed to it.
pub struct Session {
    pub record: SessionRecord,
    pub events: Vec<SessionEvent>,
    pub peers: HashMap<Uuid, Peer>,
    pub dirty: bool,
}

impl Session {
    pub fn new(record: SessionRecord, events: Vec<SessionEvent>) -> Self {
        Self {
            record,
            events,
            peers: HashMap::new(),
            dirty: false,
        }
    }

    pub fn role_for(&self, host_id: Option<&str>) -> Role {
        match host_id {
            Some(host_id) if !host_id.is_empty() && host_id == self.record.host_id => Role::Host,
            _ => Role::Viewer,
        }
    }

    pub fn to_persistent_session_data(&self) -> SessionFileData {
        SessionFileData::from_parts(&self.record, &self.events)
    }
}
