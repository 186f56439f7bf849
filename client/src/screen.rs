//! Which screen each route shows, decided from collaborator results.

use livesync_shared::{normalize_target_url, share_link, PublicSession, SessionRecord};
use thiserror::Error;
use tracing::warn;

use crate::notify::{NoticeKind, Notifier};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response status {0}")]
    Status(u16),
    #[error("invalid response body: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ViewScreen {
    Loading,
    NotFound,
    Live(PublicSession),
}

impl ViewScreen {
    /// Resolves a session lookup. Missing, ended and failed lookups all end
    /// on the not-found screen; nothing is retried.
    pub fn resolve(
        lookup: Result<Option<PublicSession>, LookupError>,
        notifier: &dyn Notifier,
    ) -> Self {
        match lookup {
            Ok(Some(session)) if session.active => ViewScreen::Live(session),
            Ok(_) => {
                notifier.notify(NoticeKind::Error, "Session not found or has ended");
                ViewScreen::NotFound
            }
            Err(error) => {
                warn!(%error, "Session lookup failed");
                notifier.notify(NoticeKind::Error, "Failed to load session");
                ViewScreen::NotFound
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HostScreen {
    Form,
    Live {
        session: SessionRecord,
        share_link: String,
    },
}

impl HostScreen {
    /// Target URL to submit from the host form, or `None` after telling the
    /// user the field is empty.
    pub fn submit_url(raw: &str, notifier: &dyn Notifier) -> Option<String> {
        let url = normalize_target_url(raw);
        if url.is_none() {
            notifier.notify(NoticeKind::Error, "Please enter a URL");
        }
        url
    }

    /// A failed create leaves the form in place.
    pub fn created(
        self,
        result: Result<SessionRecord, LookupError>,
        origin: &str,
        notifier: &dyn Notifier,
    ) -> Self {
        match result {
            Ok(session) => {
                notifier.notify(
                    NoticeKind::Success,
                    "Session created! Share the link with viewers.",
                );
                let share_link = share_link(origin, &session.id);
                HostScreen::Live {
                    session,
                    share_link,
                }
            }
            Err(error) => {
                warn!(%error, "Session create failed");
                notifier.notify(NoticeKind::Error, "Failed to create session");
                self
            }
        }
    }
}
