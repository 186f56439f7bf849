use std::path::PathBuf;

use axum::http::header::{HeaderValue, CACHE_CONTROL};
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

pub mod bus;
pub mod error;
pub mod handlers;
pub mod sessions;
pub mod state;
pub mod storage;

use crate::handlers::{
    create_session_handler, end_session_handler, events_handler, get_session_handler,
    index_handler, ping_handler, ws_handler,
};
use crate::state::AppState;

pub fn router(state: AppState, public_dir: PathBuf) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/host", get(index_handler))
        .route("/view/:session_id", get(index_handler))
        .route("/ping", get(ping_handler))
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/:session_id", get(get_session_handler))
        .route("/api/sessions/:session_id/end", post(end_session_handler))
        .route("/api/sessions/:session_id/events", get(events_handler))
        .route("/ws/:session_id", get(ws_handler))
        .fallback_service(ServeDir::new(public_dir).append_index_html_on_directories(true))
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
        .with_state(state)
}
