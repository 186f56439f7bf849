//! The two annotation surfaces. A host surface owns the mode controller and
//! is the only writer; a viewer surface replays the stream and never takes
//! pointer input away from the browsed page.

use std::rc::Rc;

use livesync_shared::{
    AnnotationPayload, EventPayload, FreehandPath, Role, ScrollOffset, SessionEvent,
    VectorObject,
};
use tracing::{debug, warn};

use crate::bus::{BusClient, BusError, EventBus, Subscription};
use crate::canvas::CanvasState;
use crate::notify::{NoticeKind, Notifier};
use crate::replay::{replay, ReplayOutcome};
use crate::state::{InteractionMode, ModeController, PointerTarget, Tool};
use crate::viewport::{AccessDenied, ViewportSync};

pub const ANNOTATE_ENABLED: &str = "Annotation mode enabled - Click a tool to annotate";
pub const ANNOTATE_DISABLED: &str =
    "Annotation mode disabled - You can now interact with the website";
pub const ANNOTATE_FORCED: &str = "Annotation mode enabled";
pub const ANNOTATIONS_CLEARED: &str = "Annotations cleared";

pub struct HostSurface {
    bus: BusClient,
    canvas: CanvasState,
    viewport: ViewportSync,
    mode: ModeController,
    notifier: Rc<dyn Notifier>,
}

impl HostSurface {
    pub fn new(
        bus: Rc<dyn EventBus>,
        session_id: &str,
        canvas: CanvasState,
        viewport: ViewportSync,
        notifier: Rc<dyn Notifier>,
    ) -> Self {
        Self {
            bus: BusClient::new(bus, session_id, Role::Host),
            canvas,
            viewport,
            mode: ModeController::default(),
            notifier,
        }
    }

    pub fn subscribe(&self) -> Result<Subscription, BusError> {
        self.bus.subscribe()
    }

    pub fn canvas(&self) -> &CanvasState {
        &self.canvas
    }

    pub fn mode(&self) -> &ModeController {
        &self.mode
    }

    pub fn pointer_target(&self) -> PointerTarget {
        self.mode.pointer_target()
    }

    pub fn redraw(&mut self) {
        self.canvas.redraw();
    }

    pub fn toggle_mode(&mut self) -> InteractionMode {
        let mode = self.mode.toggle();
        let message = match mode {
            InteractionMode::Annotate => ANNOTATE_ENABLED,
            InteractionMode::Browse => ANNOTATE_DISABLED,
        };
        self.notifier.notify(NoticeKind::Info, message);
        mode
    }

    pub fn select_tool(&mut self, tool: Tool) {
        let selection = self.mode.select_tool(tool);
        if selection.entered_annotate {
            self.notifier.notify(NoticeKind::Info, ANNOTATE_FORCED);
        }
        if let Some(object) = selection.placed {
            self.publish(object);
        }
    }

    pub fn set_color(&mut self, color: &str) {
        self.mode.set_color(color);
    }

    /// A freehand stroke the overlay finished. Kept only while the pen is
    /// armed; returns whether it was published.
    pub fn finish_stroke(&mut self, path: FreehandPath) -> bool {
        if !self.mode.freehand_armed() {
            debug!(session_id = %self.bus.session_id(), "Stroke outside pen mode dropped");
            return false;
        }
        self.publish(VectorObject::Path(path));
        true
    }

    pub fn clear(&mut self) {
        self.canvas.clear();
        self.bus
            .append(EventPayload::Annotation(AnnotationPayload::Clear));
        self.notifier.notify(NoticeKind::Success, ANNOTATIONS_CLEARED);
    }

    pub fn on_page_scrolled(&mut self, now_ms: f64) {
        if let Some(offset) = self.viewport.capture(now_ms) {
            self.bus.append(EventPayload::Scroll(offset));
        }
    }

    /// Tells every viewer to reload its view of the session.
    pub fn reload_viewers(&mut self) -> bool {
        self.bus.append(EventPayload::Navigation)
    }

    pub fn handle_event(&mut self, event: &SessionEvent) -> ReplayOutcome {
        replay(&mut self.canvas, Role::Host, event)
    }

    fn publish(&mut self, object: VectorObject) {
        self.canvas.add(object.clone());
        self.bus
            .append(EventPayload::Annotation(AnnotationPayload::Add(object)));
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewerAction {
    None,
    Reload(String),
}

pub struct ViewerSurface {
    bus: BusClient,
    canvas: CanvasState,
    viewport: ViewportSync,
}

impl ViewerSurface {
    pub fn new(
        bus: Rc<dyn EventBus>,
        session_id: &str,
        canvas: CanvasState,
        viewport: ViewportSync,
    ) -> Self {
        Self {
            bus: BusClient::new(bus, session_id, Role::Viewer),
            canvas,
            viewport,
        }
    }

    pub fn subscribe(&self) -> Result<Subscription, BusError> {
        self.bus.subscribe()
    }

    pub fn canvas(&self) -> &CanvasState {
        &self.canvas
    }

    pub fn pointer_target(&self) -> PointerTarget {
        PointerTarget::Page
    }

    pub fn redraw(&mut self) {
        self.canvas.redraw();
    }

    /// The viewer's page scrolled. Movement caused by a remote scroll that
    /// was just applied is swallowed; anything else is the viewer's own
    /// scrolling, which is reported but never published.
    pub fn on_page_scrolled(&mut self, now_ms: f64) -> Option<ScrollOffset> {
        let offset = self.viewport.capture(now_ms)?;
        self.bus.append(EventPayload::Scroll(offset));
        Some(offset)
    }

    pub fn handle_event(&mut self, event: &SessionEvent, now_ms: f64) -> ViewerAction {
        match replay(&mut self.canvas, Role::Viewer, event) {
            ReplayOutcome::Scroll(offset) => {
                if let Err(AccessDenied) = self.viewport.apply_remote(offset, now_ms) {
                    warn!(session_id = %self.bus.session_id(), "Cannot sync scroll of browsed page");
                }
                ViewerAction::None
            }
            ReplayOutcome::Reload => {
                ViewerAction::Reload(format!("/view/{}", self.bus.session_id()))
            }
            ReplayOutcome::Added | ReplayOutcome::Cleared | ReplayOutcome::Ignored => {
                ViewerAction::None
            }
        }
    }
}
