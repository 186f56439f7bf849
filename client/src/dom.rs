use js_sys::{Function, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Event, EventTarget, HtmlCanvasElement, HtmlElement, HtmlIFrameElement, PointerEvent,
    Window,
};

use livesync_shared::ScrollOffset;

use crate::geometry::client_to_overlay;
use crate::notify::{NoticeKind, Notifier};
use crate::state::PointerTarget;
use crate::viewport::{AccessDenied, ScrollSurface};

const TOAST_MS: i32 = 3000;

pub fn get_element<T: JsCast>(document: &Document, id: &str) -> Result<T, JsValue> {
    let element = document
        .get_element_by_id(id)
        .ok_or_else(|| JsValue::from_str(&format!("Missing element: {id}")))?;
    element
        .dyn_into::<T>()
        .map_err(|_| JsValue::from_str(&format!("Invalid element type: {id}")))
}

pub fn set_tool_button(button: &HtmlElement, active: bool) {
    let pressed = if active { "true" } else { "false" };
    let _ = button.set_attribute("aria-pressed", pressed);
}

pub fn set_hidden(element: &HtmlElement, hidden: bool) {
    element.set_hidden(hidden);
}

/// Routes pointer input either to the overlay or through it to the page.
pub fn set_pointer_target(overlay: &HtmlCanvasElement, target: PointerTarget) {
    let (events, cursor) = match target {
        PointerTarget::Overlay => ("auto", "crosshair"),
        PointerTarget::Page => ("none", "default"),
    };
    let style = overlay.style();
    let _ = style.set_property("pointer-events", events);
    let _ = style.set_property("cursor", cursor);
}

pub fn event_to_overlay_point(
    overlay: &HtmlCanvasElement,
    event: &PointerEvent,
) -> Option<(f64, f64)> {
    let rect = overlay.get_bounding_client_rect();
    client_to_overlay(
        event.client_x() as f64,
        event.client_y() as f64,
        rect.left(),
        rect.top(),
        rect.width(),
        rect.height(),
    )
}

/// Keeps a listener attached for exactly as long as the guard lives.
pub struct EventListenerGuard {
    target: EventTarget,
    event: &'static str,
    closure: Closure<dyn FnMut(Event)>,
}

impl EventListenerGuard {
    pub fn attach(
        target: &EventTarget,
        event: &'static str,
        handler: impl FnMut(Event) + 'static,
    ) -> Result<Self, JsValue> {
        let closure = Closure::<dyn FnMut(Event)>::new(handler);
        target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())?;
        Ok(Self {
            target: target.clone(),
            event,
            closure,
        })
    }
}

impl Drop for EventListenerGuard {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event, self.closure.as_ref().unchecked_ref());
    }
}

/// Scroll position of the page inside the browsing frame. Every access goes
/// through `Reflect` so a cross-origin frame yields `AccessDenied` instead of
/// an uncaught exception.
pub struct FrameScroll {
    frame: HtmlIFrameElement,
}

impl FrameScroll {
    pub fn new(frame: HtmlIFrameElement) -> Self {
        Self { frame }
    }

    fn content_window(&self) -> Result<Window, AccessDenied> {
        self.frame.content_window().ok_or(AccessDenied)
    }
}

fn read_number(target: &JsValue, key: &str) -> Result<f64, AccessDenied> {
    Reflect::get(target, &JsValue::from_str(key))
        .map_err(|_| AccessDenied)?
        .as_f64()
        .ok_or(AccessDenied)
}

impl ScrollSurface for FrameScroll {
    fn scroll_offset(&self) -> Result<ScrollOffset, AccessDenied> {
        let window = self.content_window()?;
        let x = read_number(window.as_ref(), "scrollX")?;
        let y = read_number(window.as_ref(), "scrollY")?;
        Ok(ScrollOffset::new(x, y))
    }

    fn scroll_to(&self, offset: ScrollOffset) -> Result<(), AccessDenied> {
        let window = self.content_window()?;
        let scroll_to = Reflect::get(window.as_ref(), &JsValue::from_str("scrollTo"))
            .map_err(|_| AccessDenied)?
            .dyn_into::<Function>()
            .map_err(|_| AccessDenied)?;
        scroll_to
            .call2(window.as_ref(), &offset.x.into(), &offset.y.into())
            .map_err(|_| AccessDenied)?;
        Ok(())
    }
}

/// Listens for scroll notifications of the page currently in `frame`.
pub fn attach_frame_scroll(
    frame: &HtmlIFrameElement,
    handler: impl FnMut(Event) + 'static,
) -> Result<EventListenerGuard, AccessDenied> {
    let window = frame.content_window().ok_or(AccessDenied)?;
    EventListenerGuard::attach(window.as_ref(), "scroll", handler).map_err(|_| AccessDenied)
}

/// Transient toasts in the `toasts` container; every notice is mirrored to
/// the console.
pub struct ToastNotifier {
    window: Window,
    document: Document,
    container: HtmlElement,
}

impl ToastNotifier {
    pub fn new(window: &Window, document: &Document) -> Result<Self, JsValue> {
        Ok(Self {
            window: window.clone(),
            document: document.clone(),
            container: get_element(document, "toasts")?,
        })
    }
}

impl Notifier for ToastNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        match kind {
            NoticeKind::Error => web_sys::console::error_1(&message.into()),
            NoticeKind::Info | NoticeKind::Success => web_sys::console::log_1(&message.into()),
        }
        let Ok(toast) = self.document.create_element("div") else {
            return;
        };
        let _ = toast.set_attribute("class", &format!("toast {}", kind.as_str()));
        let _ = toast.set_attribute("role", "status");
        toast.set_text_content(Some(message));
        if self.container.append_child(&toast).is_err() {
            return;
        }
        let remove = Closure::once_into_js(move || toast.remove());
        let _ = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(remove.unchecked_ref(), TOAST_MS);
    }
}
