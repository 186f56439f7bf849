use livesync_shared::ScrollOffset;
use thiserror::Error;
use tracing::{debug, warn};

/// How long a remotely applied scroll keeps local scroll notifications muted.
pub const ECHO_SUPPRESSION_MS: f64 = 100.0;

/// The browsed page refused access, typically because it is cross-origin.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("access to the browsed page was denied")]
pub struct AccessDenied;

pub trait ScrollSurface {
    fn scroll_offset(&self) -> Result<ScrollOffset, AccessDenied>;
    fn scroll_to(&self, offset: ScrollOffset) -> Result<(), AccessDenied>;
}

pub struct ViewportSync {
    surface: Box<dyn ScrollSurface>,
    suppressed_until: Option<f64>,
}

impl ViewportSync {
    pub fn new(surface: Box<dyn ScrollSurface>) -> Self {
        Self {
            surface,
            suppressed_until: None,
        }
    }

    pub fn is_suppressed(&self, now_ms: f64) -> bool {
        matches!(self.suppressed_until, Some(until) if now_ms < until)
    }

    /// Offset to broadcast for a scroll notification at `now_ms`, or `None`
    /// while a remote scroll is still settling or the page is unreadable.
    pub fn capture(&mut self, now_ms: f64) -> Option<ScrollOffset> {
        if self.is_suppressed(now_ms) {
            debug!("Scroll notification suppressed");
            return None;
        }
        self.suppressed_until = None;
        match self.surface.scroll_offset() {
            Ok(offset) if offset.is_finite() => Some(offset),
            Ok(_) => None,
            Err(AccessDenied) => {
                warn!("Cannot read scroll position of browsed page");
                None
            }
        }
    }

    /// Moves the local page to a remote offset and opens the suppression
    /// window, whether or not the move itself was allowed.
    pub fn apply_remote(&mut self, offset: ScrollOffset, now_ms: f64) -> Result<(), AccessDenied> {
        self.suppressed_until = Some(now_ms + ECHO_SUPPRESSION_MS);
        self.surface.scroll_to(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeScrollSurface;

    #[test]
    fn test_capture_reads_current_offset() {
        let surface = FakeScrollSurface::default();
        surface.set(ScrollOffset::new(0.0, 420.0));
        let mut sync = ViewportSync::new(Box::new(surface));
        assert_eq!(sync.capture(0.0), Some(ScrollOffset::new(0.0, 420.0)));
    }

    #[test]
    fn test_remote_scroll_echo_is_suppressed_for_window() {
        let surface = FakeScrollSurface::default();
        let position = surface.position();
        let mut sync = ViewportSync::new(Box::new(surface));

        sync.apply_remote(ScrollOffset::new(10.0, 300.0), 1_000.0).unwrap();
        assert_eq!(*position.borrow(), ScrollOffset::new(10.0, 300.0));
        assert!(sync.capture(1_010.0).is_none());
        assert!(sync.capture(1_099.0).is_none());
        assert_eq!(sync.capture(1_100.0), Some(ScrollOffset::new(10.0, 300.0)));
        assert!(!sync.is_suppressed(1_101.0));
    }

    #[test]
    fn test_access_denied_is_contained() {
        let mut sync = ViewportSync::new(Box::new(FakeScrollSurface::denied()));
        assert!(sync.capture(0.0).is_none());
        assert_eq!(
            sync.apply_remote(ScrollOffset::new(0.0, 5.0), 0.0),
            Err(AccessDenied)
        );
        assert!(sync.is_suppressed(50.0));
    }
}
