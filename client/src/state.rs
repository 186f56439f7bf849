//! Host-only interaction state: whether pointer input belongs to the overlay
//! or the browsed page, which tool is active and which colour it draws with.
//! Viewers never own one of these.

use livesync_shared::{
    CircleShape, LineShape, RectShape, VectorObject, DEFAULT_STROKE_COLOR, DEFAULT_STROKE_WIDTH,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InteractionMode {
    Browse,
    Annotate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tool {
    Select,
    Pen,
    Circle,
    Rectangle,
    Arrow,
    Eraser,
}

impl Tool {
    pub const ALL: [Tool; 6] = [
        Tool::Select,
        Tool::Pen,
        Tool::Circle,
        Tool::Rectangle,
        Tool::Arrow,
        Tool::Eraser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Select => "select",
            Tool::Pen => "pen",
            Tool::Circle => "circle",
            Tool::Rectangle => "rectangle",
            Tool::Arrow => "arrow",
            Tool::Eraser => "eraser",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Tool::ALL.into_iter().find(|tool| tool.as_str() == value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerTarget {
    Page,
    Overlay,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolSelection {
    /// Picking the tool forced the switch out of `Browse`.
    pub entered_annotate: bool,
    /// Shape materialised at its fixed default placement.
    pub placed: Option<VectorObject>,
}

#[derive(Clone, Debug)]
pub struct ModeController {
    mode: InteractionMode,
    tool: Tool,
    color: String,
    stroke_width: f64,
}

impl Default for ModeController {
    fn default() -> Self {
        Self {
            mode: InteractionMode::Browse,
            tool: Tool::Select,
            color: DEFAULT_STROKE_COLOR.to_string(),
            stroke_width: DEFAULT_STROKE_WIDTH,
        }
    }
}

impl ModeController {
    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn stroke_width(&self) -> f64 {
        self.stroke_width
    }

    /// Flips the mode and returns the new one. Leaving `Annotate` drops the
    /// active tool back to `Select`.
    pub fn toggle(&mut self) -> InteractionMode {
        self.mode = match self.mode {
            InteractionMode::Browse => InteractionMode::Annotate,
            InteractionMode::Annotate => {
                self.tool = Tool::Select;
                InteractionMode::Browse
            }
        };
        self.mode
    }

    pub fn select_tool(&mut self, tool: Tool) -> ToolSelection {
        let entered_annotate = self.mode == InteractionMode::Browse;
        self.mode = InteractionMode::Annotate;
        self.tool = tool;
        ToolSelection {
            entered_annotate,
            placed: default_shape(tool, &self.color, self.stroke_width),
        }
    }

    pub fn set_color(&mut self, color: &str) {
        let color = color.trim();
        if !color.is_empty() {
            self.color = color.to_string();
        }
    }

    pub fn pointer_target(&self) -> PointerTarget {
        match self.mode {
            InteractionMode::Annotate => PointerTarget::Overlay,
            InteractionMode::Browse => PointerTarget::Page,
        }
    }

    /// Whether completed freehand strokes should be kept and broadcast.
    pub fn freehand_armed(&self) -> bool {
        self.mode == InteractionMode::Annotate && self.tool == Tool::Pen
    }
}

/// Circle, rectangle and arrow land at a fixed spot and size; there is no
/// drag-to-size gesture.
pub fn default_shape(tool: Tool, color: &str, stroke_width: f64) -> Option<VectorObject> {
    let stroke = color.to_string();
    match tool {
        Tool::Circle => Some(VectorObject::Circle(CircleShape {
            left: 100.0,
            top: 100.0,
            radius: 50.0,
            stroke,
            stroke_width,
        })),
        Tool::Rectangle => Some(VectorObject::Rect(RectShape {
            left: 100.0,
            top: 100.0,
            width: 100.0,
            height: 100.0,
            stroke,
            stroke_width,
        })),
        Tool::Arrow => Some(VectorObject::Line(LineShape {
            x1: 100.0,
            y1: 100.0,
            x2: 200.0,
            y2: 200.0,
            stroke,
            stroke_width,
        })),
        Tool::Select | Tool::Pen | Tool::Eraser => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_in_browse_with_select() {
        let controller = ModeController::default();
        assert_eq!(controller.mode(), InteractionMode::Browse);
        assert_eq!(controller.tool(), Tool::Select);
        assert_eq!(controller.pointer_target(), PointerTarget::Page);
        assert!(!controller.freehand_armed());
    }

    #[test]
    fn test_toggle_out_of_annotate_resets_tool() {
        let mut controller = ModeController::default();
        controller.select_tool(Tool::Pen);
        assert_eq!(controller.pointer_target(), PointerTarget::Overlay);
        assert_eq!(controller.toggle(), InteractionMode::Browse);
        assert_eq!(controller.tool(), Tool::Select);
        assert_eq!(controller.toggle(), InteractionMode::Annotate);
        assert_eq!(controller.tool(), Tool::Select);
    }

    #[test]
    fn test_tool_in_browse_forces_annotate_once() {
        let mut controller = ModeController::default();
        let first = controller.select_tool(Tool::Eraser);
        assert!(first.entered_annotate);
        assert!(first.placed.is_none());
        let second = controller.select_tool(Tool::Pen);
        assert!(!second.entered_annotate);
        assert!(controller.freehand_armed());
    }

    #[test]
    fn test_shape_tools_place_fixed_geometry_in_active_color() {
        let mut controller = ModeController::default();
        controller.set_color("#00FF00");
        let placed = controller.select_tool(Tool::Arrow).placed;
        assert_eq!(
            placed,
            Some(VectorObject::Line(LineShape {
                x1: 100.0,
                y1: 100.0,
                x2: 200.0,
                y2: 200.0,
                stroke: "#00FF00".into(),
                stroke_width: 3.0,
            }))
        );
        let Some(VectorObject::Rect(rect)) = controller.select_tool(Tool::Rectangle).placed else {
            panic!("expected rect");
        };
        assert_eq!((rect.width, rect.height), (100.0, 100.0));
    }

    #[test]
    fn test_blank_color_is_ignored() {
        let mut controller = ModeController::default();
        controller.set_color("  ");
        assert_eq!(controller.color(), "#FF00FF");
    }

    #[test]
    fn test_tool_names() {
        for tool in Tool::ALL {
            assert_eq!(Tool::parse(tool.as_str()), Some(tool));
        }
        assert_eq!(Tool::parse("lasso"), None);
    }
}
