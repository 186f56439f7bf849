use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use livesync_shared::{PathCommand, VectorObject};

use crate::canvas::Renderer;

/// Draws the annotation list onto the overlay canvas, keeping the backing
/// store matched to the element's CSS size and the device pixel ratio.
pub struct OverlayRenderer {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    width: f64,
    height: f64,
}

impl OverlayRenderer {
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self, JsValue> {
        let ctx = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("Missing 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()?;
        let mut renderer = Self {
            canvas,
            ctx,
            width: 0.0,
            height: 0.0,
        };
        renderer.fit();
        Ok(renderer)
    }

    pub fn context(&self) -> CanvasRenderingContext2d {
        self.ctx.clone()
    }

    fn fit(&mut self) {
        let rect = self.canvas.get_bounding_client_rect();
        if rect.width() == self.width && rect.height() == self.height {
            return;
        }
        let dpr = web_sys::window()
            .map(|window| window.device_pixel_ratio())
            .unwrap_or(1.0);
        self.canvas.set_width((rect.width() * dpr) as u32);
        self.canvas.set_height((rect.height() * dpr) as u32);
        let _ = self.ctx.set_transform(dpr, 0.0, 0.0, dpr, 0.0, 0.0);
        self.width = rect.width();
        self.height = rect.height();
    }
}

impl Renderer for OverlayRenderer {
    fn redraw(&mut self, objects: &[VectorObject]) {
        self.fit();
        self.ctx.clear_rect(0.0, 0.0, self.width, self.height);
        for object in objects {
            draw_object(&self.ctx, object);
        }
    }
}

pub fn draw_object(ctx: &CanvasRenderingContext2d, object: &VectorObject) {
    ctx.set_stroke_style_str(object.stroke());
    ctx.set_line_width(object.stroke_width());
    ctx.set_line_cap("round");
    ctx.set_line_join("round");
    ctx.begin_path();
    match object {
        VectorObject::Circle(circle) => {
            // Positioned by the top-left corner of its bounding box.
            let cx = circle.left + circle.radius;
            let cy = circle.top + circle.radius;
            let _ = ctx.arc(cx, cy, circle.radius, 0.0, std::f64::consts::PI * 2.0);
        }
        VectorObject::Rect(rect) => {
            ctx.rect(rect.left, rect.top, rect.width, rect.height);
        }
        VectorObject::Line(line) => {
            ctx.move_to(line.x1, line.y1);
            ctx.line_to(line.x2, line.y2);
        }
        VectorObject::Path(path) => {
            for command in &path.path {
                match *command {
                    PathCommand::MoveTo { x, y } => ctx.move_to(x, y),
                    PathCommand::LineTo { x, y } => ctx.line_to(x, y),
                    PathCommand::QuadTo { cx, cy, x, y } => ctx.quadratic_curve_to(cx, cy, x, y),
                }
            }
        }
    }
    ctx.stroke();
}

/// Live feedback for a stroke still being drawn.
pub fn draw_segment(
    ctx: &CanvasRenderingContext2d,
    from: (f64, f64),
    to: (f64, f64),
    color: &str,
    width: f64,
) {
    ctx.set_stroke_style_str(color);
    ctx.set_line_width(width);
    ctx.set_line_cap("round");
    ctx.begin_path();
    ctx.move_to(from.0, from.1);
    ctx.line_to(to.0, to.1);
    ctx.stroke();
}
