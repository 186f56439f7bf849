use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use livesync_shared::{ClientMessage, PublicSession, ServerMessage, SessionEvent};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::append_event;
use crate::error::ApiError;
use crate::sessions::{
    attach_peer, create_session, detach_peer, end_session, find_active_session, find_session,
    normalize_session_id, Attached,
};
use crate::state::AppState;

pub async fn ping_handler() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

pub async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    match tokio::fs::read_to_string(&state.index_file).await {
        Ok(contents) => Html(contents).into_response(),
        Err(error) => {
            warn!(%error, path = %state.index_file.display(), "Failed to read index file");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub url: String,
    pub host_id: String,
}

pub async fn create_session_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = create_session(&state, &request.url, &request.host_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_session_handler(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PublicSession>, ApiError> {
    let session_id = normalize_session_id(&session_id).ok_or(ApiError::NotFound)?;
    let session = find_active_session(&state, &session_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let session = session.read().await;
    Ok(Json(PublicSession::from(&session.record)))
}

#[derive(Deserialize)]
pub struct EndSessionRequest {
    pub host_id: String,
}

pub async fn end_session_handler(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<EndSessionRequest>,
) -> Result<StatusCode, ApiError> {
    let session_id = normalize_session_id(&session_id).ok_or(ApiError::NotFound)?;
    end_session(&state, &session_id, &request.host_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn events_handler(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionEvent>>, ApiError> {
    let session_id = normalize_session_id(&session_id).ok_or(ApiError::NotFound)?;
    let session = find_session(&state, &session_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let events = session.read().await.events.clone();
    Ok(Json(events))
}

#[derive(Deserialize)]
pub struct SubscribeParams {
    pub host_id: Option<String>,
}

pub async fn ws_handler(
    Path(session_id): Path<String>,
    Query(params): Query<SubscribeParams>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let session_id = normalize_session_id(&session_id).ok_or(ApiError::NotFound)?;
    find_active_session(&state, &session_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, params.host_id)))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    session_id: String,
    host_id: Option<String>,
) {
    let (mut socket_sender, mut socket_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let connection_id = Uuid::new_v4();

    let Attached { session, role } =
        match attach_peer(&state, &session_id, connection_id, host_id.as_deref(), tx).await {
            Ok(Some(attached)) => attached,
            Ok(None) => {
                debug!(session_id = %session_id, conn = %connection_id, "Session gone before subscribe");
                let _ = socket_sender.close().await;
                return;
            }
            Err(error) => {
                warn!(session_id = %session_id, conn = %connection_id, %error, "Failed to load session");
                let _ = socket_sender.close().await;
                return;
            }
        };

    let subscribed = ServerMessage::Subscribed {
        session_id: session_id.clone(),
        role,
    };
    if let Ok(payload) = serde_json::to_string(&subscribed) {
        if let Err(error) = socket_sender.send(Message::Text(payload)).await {
            warn!(session_id = %session_id, conn = %connection_id, %error, "WS subscribe ack failed");
        }
    }

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let ended = matches!(message, ServerMessage::Ended);
            if let Ok(payload) = serde_json::to_string(&message) {
                if socket_sender.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            if ended {
                let _ = socket_sender.close().await;
                break;
            }
        }
    });

    while let Some(Ok(message)) = socket_receiver.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Append {
                    event_type,
                    event_data,
                }) => {
                    let mut session_guard = session.write().await;
                    if let Some(event) =
                        append_event(&mut session_guard, connection_id, role, event_type, event_data)
                    {
                        debug!(
                            session_id = %session_id,
                            conn = %connection_id,
                            event_id = %event.id,
                            kind = event.event_type.as_str(),
                            "Event appended"
                        );
                    }
                }
                Err(error) => {
                    debug!(session_id = %session_id, conn = %connection_id, %error, "WS message parse error");
                }
            },
            Message::Close(frame) => {
                if let Some(frame) = &frame {
                    debug!(
                        session_id = %session_id,
                        conn = %connection_id,
                        code = frame.code,
                        reason = %frame.reason,
                        "WS close frame"
                    );
                }
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    detach_peer(&state, &session_id, &session, connection_id).await;
}
