use serde::Serialize;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Headers, Request, RequestInit, Response, Window};

use livesync_shared::{PublicSession, SessionRecord};

use crate::screen::LookupError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Home,
    Host,
    View(String),
}

pub fn route_from_path(path: &str) -> Route {
    let mut parts = path.trim_matches('/').split('/');
    match (parts.next(), parts.next()) {
        (Some("host"), None) => Route::Host,
        (Some("view"), Some(session_id)) if !session_id.is_empty() => {
            Route::View(session_id.to_string())
        }
        _ => Route::Home,
    }
}

pub fn websocket_url(
    window: &Window,
    session_id: &str,
    host_id: Option<&str>,
) -> Result<String, JsValue> {
    let location = window.location();
    let protocol = location.protocol()?;
    let host = location.host()?;
    let scheme = if protocol == "https:" { "wss" } else { "ws" };
    Ok(match host_id {
        Some(host_id) => format!("{scheme}://{host}/ws/{session_id}?host_id={host_id}"),
        None => format!("{scheme}://{host}/ws/{session_id}"),
    })
}

pub fn origin(window: &Window) -> Result<String, JsValue> {
    window.location().origin()
}

#[derive(Serialize)]
struct CreateSessionBody<'a> {
    url: &'a str,
    host_id: &'a str,
}

#[derive(Serialize)]
struct EndSessionBody<'a> {
    host_id: &'a str,
}

fn transport(error: JsValue) -> LookupError {
    LookupError::Transport(
        error
            .as_string()
            .unwrap_or_else(|| format!("{error:?}")),
    )
}

async fn request(
    window: &Window,
    method: &str,
    url: &str,
    body: Option<String>,
) -> Result<(u16, String), LookupError> {
    let init = RequestInit::new();
    init.set_method(method);
    if let Some(body) = body {
        let headers = Headers::new().map_err(transport)?;
        headers
            .set("Content-Type", "application/json")
            .map_err(transport)?;
        init.set_headers(&headers);
        init.set_body(&JsValue::from_str(&body));
    }
    let request = Request::new_with_str_and_init(url, &init).map_err(transport)?;
    let response = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(transport)?
        .dyn_into::<Response>()
        .map_err(transport)?;
    let text = JsFuture::from(response.text().map_err(transport)?)
        .await
        .map_err(transport)?
        .as_string()
        .unwrap_or_default();
    Ok((response.status(), text))
}

/// `Ok(None)` when the server has no active session under `session_id`.
pub async fn lookup_session(
    window: &Window,
    session_id: &str,
) -> Result<Option<PublicSession>, LookupError> {
    let (status, text) = request(window, "GET", &format!("/api/sessions/{session_id}"), None).await?;
    match status {
        200 => serde_json::from_str(&text)
            .map(Some)
            .map_err(|error| LookupError::Decode(error.to_string())),
        404 => Ok(None),
        other => Err(LookupError::Status(other)),
    }
}

pub async fn create_session(
    window: &Window,
    url: &str,
    host_id: &str,
) -> Result<SessionRecord, LookupError> {
    let body = serde_json::to_string(&CreateSessionBody { url, host_id })
        .map_err(|error| LookupError::Decode(error.to_string()))?;
    let (status, text) = request(window, "POST", "/api/sessions", Some(body)).await?;
    if status != 201 {
        return Err(LookupError::Status(status));
    }
    serde_json::from_str(&text).map_err(|error| LookupError::Decode(error.to_string()))
}

pub async fn end_session(
    window: &Window,
    session_id: &str,
    host_id: &str,
) -> Result<(), LookupError> {
    let body = serde_json::to_string(&EndSessionBody { host_id })
        .map_err(|error| LookupError::Decode(error.to_string()))?;
    let (status, _) = request(
        window,
        "POST",
        &format!("/api/sessions/{session_id}/end"),
        Some(body),
    )
    .await?;
    match status {
        204 => Ok(()),
        other => Err(LookupError::Status(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes() {
        assert_eq!(route_from_path("/"), Route::Home);
        assert_eq!(route_from_path("/host"), Route::Host);
        assert_eq!(route_from_path("/host/"), Route::Host);
        assert_eq!(route_from_path("/view/abc-123"), Route::View("abc-123".into()));
        assert_eq!(route_from_path("/view/"), Route::Home);
        assert_eq!(route_from_path("/elsewhere"), Route::Home);
    }
}
