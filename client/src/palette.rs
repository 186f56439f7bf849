use wasm_bindgen::JsCast;
use web_sys::{Document, Element, Event, HtmlButtonElement, HtmlElement};

pub fn render_palette(
    document: &Document,
    palette_el: &HtmlElement,
    colors: &[&str],
    selected: &str,
) {
    palette_el.set_inner_html("");
    for color in colors {
        let Ok(element) = document.create_element("button") else {
            continue;
        };
        let Ok(button) = element.dyn_into::<HtmlButtonElement>() else {
            continue;
        };
        let _ = button.set_attribute("type", "button");
        let _ = button.set_attribute("data-color", color);
        let _ = button.set_attribute("aria-label", &format!("Use color {color}"));
        let class_name = if color.eq_ignore_ascii_case(selected) {
            "swatch active"
        } else {
            "swatch"
        };
        let _ = button.set_attribute("class", class_name);
        let _ = button.style().set_property("background", color);
        let _ = palette_el.append_child(&button);
    }
}

/// Colour of the swatch a click landed on, if any.
pub fn color_from_event(event: &Event) -> Option<String> {
    let mut current = event
        .target()
        .and_then(|target| target.dyn_into::<Element>().ok());
    while let Some(element) = current {
        if let Some(color) = element.get_attribute("data-color") {
            return Some(color);
        }
        current = element.parent_element();
    }
    None
}
