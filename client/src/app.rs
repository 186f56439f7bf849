use std::cell::RefCell;
use std::rc::Rc;

use futures::future::{AbortHandle, Abortable};
use js_sys::{Function, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{
    Document, Event, HtmlButtonElement, HtmlCanvasElement, HtmlElement, HtmlIFrameElement,
    HtmlInputElement, PointerEvent, Window,
};

use livesync_shared::{PublicSession, SessionEvent, SessionRecord, PALETTE};

use crate::bus::{pump, EventBus, Subscription};
use crate::canvas::CanvasState;
use crate::dom::{
    attach_frame_scroll, event_to_overlay_point, get_element, set_hidden, set_pointer_target,
    set_tool_button, EventListenerGuard, FrameScroll, ToastNotifier,
};
use crate::geometry::StrokeBuilder;
use crate::net::{create_session, end_session, lookup_session, origin, route_from_path, Route};
use crate::notify::{NoticeKind, Notifier};
use crate::palette::{color_from_event, render_palette};
use crate::render::{draw_segment, OverlayRenderer};
use crate::screen::{HostScreen, ViewScreen};
use crate::state::{InteractionMode, Tool};
use crate::surface::{HostSurface, ViewerAction, ViewerSurface};
use crate::util::{make_host_id, now_ms};
use crate::viewport::ViewportSync;
use crate::ws::WsBus;

const SCREENS: [&str; 5] = ["home", "hostForm", "loading", "notFound", "live"];

struct Page {
    window: Window,
    document: Document,
    notifier: Rc<dyn Notifier>,
}

/// Everything a mounted surface keeps alive. Dropping it detaches every
/// listener and stops the event pump, which releases the subscription.
struct Mounted {
    _listeners: Vec<EventListenerGuard>,
    pump: AbortHandle,
}

impl Drop for Mounted {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

thread_local! {
    static MOUNTED: RefCell<Option<Mounted>> = const { RefCell::new(None) };
}

fn is_mounted() -> bool {
    MOUNTED.with(|mounted| mounted.borrow().is_some())
}

/// Replaces the mounted surface; the previous one is torn down.
fn set_mounted(mounted: Option<Mounted>) {
    let previous = MOUNTED.with(|slot| slot.replace(mounted));
    drop(previous);
}

#[wasm_bindgen(start)]
pub fn run() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("Missing window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("Missing document"))?;
    let notifier: Rc<dyn Notifier> = Rc::new(ToastNotifier::new(&window, &document)?);
    let page = Rc::new(Page {
        window,
        document,
        notifier,
    });

    let path = page.window.location().pathname()?;
    match route_from_path(&path) {
        Route::Home => show_screen(&page, "home"),
        Route::Host => start_host(page)?,
        Route::View(session_id) => start_view(page, session_id),
    }
    Ok(())
}

fn show_screen(page: &Page, visible: &str) {
    for id in SCREENS {
        if let Ok(element) = get_element::<HtmlElement>(&page.document, id) {
            set_hidden(&element, id != visible);
        }
    }
}

fn spawn_pump(
    subscription: Subscription,
    on_event: impl FnMut(SessionEvent) + 'static,
) -> AbortHandle {
    let (handle, registration) = AbortHandle::new_pair();
    spawn_local(async move {
        let _ = Abortable::new(pump(subscription, on_event), registration).await;
    });
    handle
}

fn bus_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn copy_to_clipboard(window: &Window, text: &str) -> Result<(), JsValue> {
    let navigator = Reflect::get(window.as_ref(), &JsValue::from_str("navigator"))?;
    let clipboard = Reflect::get(&navigator, &JsValue::from_str("clipboard"))?;
    let write_text = Reflect::get(&clipboard, &JsValue::from_str("writeText"))?
        .dyn_into::<Function>()?;
    write_text.call1(&clipboard, &JsValue::from_str(text))?;
    Ok(())
}

fn start_host(page: Rc<Page>) -> Result<(), JsValue> {
    show_screen(&page, "hostForm");
    let host_id = Rc::new(make_host_id());
    let url_input: HtmlInputElement = get_element(&page.document, "urlInput")?;
    let create_button: HtmlButtonElement = get_element(&page.document, "createSession")?;

    let create_button_cb = create_button.clone();
    let onclick = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
        event.prevent_default();
        if is_mounted() {
            return;
        }
        let Some(url) = HostScreen::submit_url(&url_input.value(), page.notifier.as_ref()) else {
            return;
        };
        create_button_cb.set_disabled(true);
        let page = page.clone();
        let host_id = host_id.clone();
        let button = create_button_cb.clone();
        spawn_local(async move {
            let result = create_session(&page.window, &url, &host_id).await;
            let origin = origin(&page.window).unwrap_or_default();
            let screen = HostScreen::Form.created(result, &origin, page.notifier.as_ref());
            button.set_disabled(false);
            let HostScreen::Live {
                session,
                share_link,
            } = screen
            else {
                return;
            };
            match mount_host(&page, &session, &host_id, &share_link) {
                Ok(mounted) => set_mounted(Some(mounted)),
                Err(error) => {
                    web_sys::console::error_1(&error);
                    show_screen(&page, "hostForm");
                }
            }
        });
    });
    create_button.add_event_listener_with_callback("click", onclick.as_ref().unchecked_ref())?;
    onclick.forget();
    Ok(())
}

struct HostChrome {
    document: Document,
    overlay: HtmlCanvasElement,
    mode_toggle: HtmlButtonElement,
    tool_buttons: Vec<(Tool, HtmlElement)>,
    palette: HtmlElement,
}

impl HostChrome {
    fn sync(&self, surface: &HostSurface) {
        let mode = surface.mode();
        let annotating = mode.mode() == InteractionMode::Annotate;
        set_pointer_target(&self.overlay, surface.pointer_target());
        set_tool_button(&self.mode_toggle, annotating);
        self.mode_toggle.set_text_content(Some(if annotating {
            "Annotating"
        } else {
            "Browsing"
        }));
        for (tool, button) in &self.tool_buttons {
            set_tool_button(button, annotating && mode.tool() == *tool);
        }
        render_palette(&self.document, &self.palette, &PALETTE, mode.color());
    }
}

fn tool_buttons(toolbar: &HtmlElement) -> Result<Vec<(Tool, HtmlElement)>, JsValue> {
    let nodes = toolbar.query_selector_all("[data-tool]")?;
    let mut buttons = Vec::new();
    for index in 0..nodes.length() {
        let Some(node) = nodes.get(index) else {
            continue;
        };
        let Ok(button) = node.dyn_into::<HtmlElement>() else {
            continue;
        };
        if let Some(tool) = button.get_attribute("data-tool").as_deref().and_then(Tool::parse) {
            buttons.push((tool, button));
        }
    }
    Ok(buttons)
}

fn mount_host(
    page: &Rc<Page>,
    session: &SessionRecord,
    host_id: &str,
    share_link: &str,
) -> Result<Mounted, JsValue> {
    let document = &page.document;
    let frame: HtmlIFrameElement = get_element(document, "frame")?;
    let overlay: HtmlCanvasElement = get_element(document, "overlay")?;
    let toolbar: HtmlElement = get_element(document, "hostToolbar")?;
    let share_input: HtmlInputElement = get_element(document, "shareLink")?;
    let chrome = Rc::new(HostChrome {
        document: document.clone(),
        overlay: overlay.clone(),
        mode_toggle: get_element(document, "modeToggle")?,
        tool_buttons: tool_buttons(&toolbar)?,
        palette: get_element(document, "palette")?,
    });
    let clear_button: HtmlButtonElement = get_element(document, "clearAnnotations")?;
    let reload_button: HtmlButtonElement = get_element(document, "reloadViewers")?;
    let copy_button: HtmlButtonElement = get_element(document, "copyLink")?;
    let end_button: HtmlButtonElement = get_element(document, "endSession")?;

    set_hidden(&toolbar, false);
    share_input.set_value(share_link);
    // The overlay only has a size once the live screen is laid out.
    show_screen(page, "live");

    let renderer = OverlayRenderer::new(overlay.clone())?;
    let ctx = renderer.context();
    let bus: Rc<dyn EventBus> = Rc::new(WsBus::connect(
        &page.window,
        &session.id,
        Some(host_id),
        || set_mounted(None),
    )?);
    let surface = Rc::new(RefCell::new(HostSurface::new(
        bus,
        &session.id,
        CanvasState::new(Box::new(renderer)),
        ViewportSync::new(Box::new(FrameScroll::new(frame.clone()))),
        page.notifier.clone(),
    )));
    chrome.sync(&surface.borrow());

    let mut listeners = Vec::new();

    {
        let surface = surface.clone();
        listeners.push(EventListenerGuard::attach(
            page.window.as_ref(),
            "resize",
            move |_| surface.borrow_mut().redraw(),
        )?);
    }

    {
        let surface = surface.clone();
        let chrome_cb = chrome.clone();
        listeners.push(EventListenerGuard::attach(
            chrome.mode_toggle.as_ref(),
            "click",
            move |_| {
                let mut surface = surface.borrow_mut();
                surface.toggle_mode();
                chrome_cb.sync(&surface);
            },
        )?);
    }

    for (tool, button) in &chrome.tool_buttons {
        let surface = surface.clone();
        let chrome_cb = chrome.clone();
        let tool = *tool;
        listeners.push(EventListenerGuard::attach(button.as_ref(), "click", move |_| {
            let mut surface = surface.borrow_mut();
            surface.select_tool(tool);
            chrome_cb.sync(&surface);
        })?);
    }

    {
        let surface = surface.clone();
        let chrome_cb = chrome.clone();
        listeners.push(EventListenerGuard::attach(
            chrome.palette.as_ref(),
            "click",
            move |event| {
                let Some(color) = color_from_event(&event) else {
                    return;
                };
                let mut surface = surface.borrow_mut();
                surface.set_color(&color);
                chrome_cb.sync(&surface);
            },
        )?);
    }

    {
        let surface = surface.clone();
        listeners.push(EventListenerGuard::attach(clear_button.as_ref(), "click", move |_| {
            surface.borrow_mut().clear();
        })?);
    }

    {
        let surface = surface.clone();
        listeners.push(EventListenerGuard::attach(reload_button.as_ref(), "click", move |_| {
            surface.borrow_mut().reload_viewers();
        })?);
    }

    {
        let window = page.window.clone();
        let notifier = page.notifier.clone();
        let share_link = share_link.to_string();
        listeners.push(EventListenerGuard::attach(copy_button.as_ref(), "click", move |_| {
            match copy_to_clipboard(&window, &share_link) {
                Ok(()) => notifier.notify(NoticeKind::Success, "Link copied to clipboard!"),
                Err(error) => {
                    web_sys::console::error_2(&"Clipboard write failed".into(), &error);
                    notifier.notify(NoticeKind::Error, "Could not copy link");
                }
            }
        })?);
    }

    {
        let page_cb = page.clone();
        let session_id = session.id.clone();
        let host_id = host_id.to_string();
        listeners.push(EventListenerGuard::attach(end_button.as_ref(), "click", move |_| {
            let page = page_cb.clone();
            let session_id = session_id.clone();
            let host_id = host_id.clone();
            spawn_local(async move {
                match end_session(&page.window, &session_id, &host_id).await {
                    Ok(()) => {
                        set_mounted(None);
                        let _ = page.window.location().set_href("/");
                    }
                    Err(error) => {
                        web_sys::console::error_1(&format!("End session failed: {error}").into());
                        page.notifier.notify(NoticeKind::Error, "Failed to end session");
                    }
                }
            });
        })?);
    }

    let stroke: Rc<RefCell<Option<StrokeBuilder>>> = Rc::new(RefCell::new(None));

    {
        let surface = surface.clone();
        let stroke = stroke.clone();
        let overlay_cb = overlay.clone();
        listeners.push(EventListenerGuard::attach(overlay.as_ref(), "pointerdown", move |event| {
            let Ok(event) = event.dyn_into::<PointerEvent>() else {
                return;
            };
            if !surface.borrow().mode().freehand_armed() {
                return;
            }
            let Some((x, y)) = event_to_overlay_point(&overlay_cb, &event) else {
                return;
            };
            event.prevent_default();
            let _ = overlay_cb.set_pointer_capture(event.pointer_id());
            *stroke.borrow_mut() = StrokeBuilder::start(x, y);
        })?);
    }

    {
        let surface = surface.clone();
        let stroke = stroke.clone();
        let overlay_cb = overlay.clone();
        listeners.push(EventListenerGuard::attach(overlay.as_ref(), "pointermove", move |event| {
            let Ok(event) = event.dyn_into::<PointerEvent>() else {
                return;
            };
            let mut stroke = stroke.borrow_mut();
            let Some(builder) = stroke.as_mut() else {
                return;
            };
            let Some((x, y)) = event_to_overlay_point(&overlay_cb, &event) else {
                return;
            };
            if let Some((from, to)) = builder.push(x, y) {
                let surface = surface.borrow();
                let mode = surface.mode();
                draw_segment(&ctx, from, to, mode.color(), mode.stroke_width());
            }
        })?);
    }

    for event_name in ["pointerup", "pointercancel"] {
        let surface = surface.clone();
        let stroke = stroke.clone();
        listeners.push(EventListenerGuard::attach(overlay.as_ref(), event_name, move |_| {
            let Some(builder) = stroke.borrow_mut().take() else {
                return;
            };
            let mut surface = surface.borrow_mut();
            let (color, width) = (surface.mode().color().to_string(), surface.mode().stroke_width());
            let published = builder
                .finish(&color, width)
                .map(|path| surface.finish_stroke(path))
                .unwrap_or(false);
            if !published {
                surface.redraw();
            }
        })?);
    }

    {
        let surface = surface.clone();
        let frame_cb = frame.clone();
        let frame_scroll: RefCell<Option<EventListenerGuard>> = RefCell::new(None);
        listeners.push(EventListenerGuard::attach(frame.as_ref(), "load", move |_| {
            let surface = surface.clone();
            let guard = attach_frame_scroll(&frame_cb, move |_| {
                surface.borrow_mut().on_page_scrolled(now_ms());
            });
            if guard.is_err() {
                web_sys::console::log_1(&"Cannot attach scroll listener (cross-origin)".into());
            }
            *frame_scroll.borrow_mut() = guard.ok();
        })?);
    }
    frame.set_src(&session.url);

    let subscription = surface.borrow().subscribe().map_err(bus_error)?;
    let pump = spawn_pump(subscription, move |event| {
        surface.borrow_mut().handle_event(&event);
    });

    Ok(Mounted {
        _listeners: listeners,
        pump,
    })
}

fn start_view(page: Rc<Page>, session_id: String) {
    show_screen(&page, "loading");
    spawn_local(async move {
        let lookup = lookup_session(&page.window, &session_id).await;
        match ViewScreen::resolve(lookup, page.notifier.as_ref()) {
            ViewScreen::Live(session) => match mount_viewer(&page, &session) {
                Ok(mounted) => set_mounted(Some(mounted)),
                Err(error) => {
                    web_sys::console::error_1(&error);
                    show_screen(&page, "notFound");
                }
            },
            ViewScreen::NotFound => show_screen(&page, "notFound"),
            ViewScreen::Loading => {}
        }
    });
}

fn mount_viewer(page: &Rc<Page>, session: &PublicSession) -> Result<Mounted, JsValue> {
    let document = &page.document;
    let frame: HtmlIFrameElement = get_element(document, "frame")?;
    let overlay: HtmlCanvasElement = get_element(document, "overlay")?;
    let toolbar: HtmlElement = get_element(document, "hostToolbar")?;
    set_hidden(&toolbar, true);
    show_screen(page, "live");

    let bus: Rc<dyn EventBus> = Rc::new(WsBus::connect(&page.window, &session.id, None, {
        let page = page.clone();
        move || {
            set_mounted(None);
            page.notifier.notify(NoticeKind::Info, "The host ended this session");
            show_screen(&page, "notFound");
        }
    })?);
    let surface = Rc::new(RefCell::new(ViewerSurface::new(
        bus,
        &session.id,
        CanvasState::new(Box::new(OverlayRenderer::new(overlay.clone())?)),
        ViewportSync::new(Box::new(FrameScroll::new(frame.clone()))),
    )));
    set_pointer_target(&overlay, surface.borrow().pointer_target());

    let mut listeners = Vec::new();
    {
        let surface = surface.clone();
        listeners.push(EventListenerGuard::attach(
            page.window.as_ref(),
            "resize",
            move |_| surface.borrow_mut().redraw(),
        )?);
    }
    {
        let surface = surface.clone();
        let frame_cb = frame.clone();
        let frame_scroll: RefCell<Option<EventListenerGuard>> = RefCell::new(None);
        listeners.push(EventListenerGuard::attach(frame.as_ref(), "load", move |_| {
            let surface = surface.clone();
            let guard = attach_frame_scroll(&frame_cb, move |_| {
                surface.borrow_mut().on_page_scrolled(now_ms());
            });
            *frame_scroll.borrow_mut() = guard.ok();
        })?);
    }
    frame.set_src(&session.url);

    let subscription = surface.borrow().subscribe().map_err(bus_error)?;
    let window = page.window.clone();
    let pump = spawn_pump(subscription, move |event| {
        let action = surface.borrow_mut().handle_event(&event, now_ms());
        if let ViewerAction::Reload(path) = action {
            let _ = window.location().set_href(&path);
        }
    });

    Ok(Mounted {
        _listeners: listeners,
        pump,
    })
}
