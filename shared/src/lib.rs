use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub mod codec;
pub mod session_format;

pub use codec::{decode_annotation, decode_object, encode_annotation, encode_object};

pub const DEFAULT_STROKE_COLOR: &str = "#FF00FF";
pub const DEFAULT_STROKE_WIDTH: f64 = 3.0;
pub const PALETTE: [&str; 6] = [
    "#FF00FF", "#00FFFF", "#FFFF00", "#FF0000", "#00FF00", "#FFFFFF",
];

/// Persisted record of one sharing instance.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct SessionRecord {
    pub id: String,
    pub url: String,
    pub host_id: String,
    pub active: bool,
}

/// What a viewer is allowed to learn about a session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicSession {
    pub id: String,
    pub url: String,
    pub active: bool,
}

impl From<&SessionRecord> for PublicSession {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id.clone(),
            url: record.url.clone(),
            active: record.active,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Scroll,
    Annotation,
    Navigation,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Scroll => "scroll",
            EventKind::Annotation => "annotation",
            EventKind::Navigation => "navigation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scroll" => Some(EventKind::Scroll),
            "annotation" => Some(EventKind::Annotation),
            "navigation" => Some(EventKind::Navigation),
            _ => None,
        }
    }
}

/// One entry of a session's append-only stream.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SessionEvent {
    pub id: String,
    pub session_id: String,
    pub event_type: EventKind,
    pub event_data: Value,
    pub created_at: i64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Viewer,
}

impl Role {
    pub fn is_host(self) -> bool {
        self == Role::Host
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct ScrollOffset {
    pub x: f64,
    pub y: f64,
}

impl ScrollOffset {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CircleShape {
    pub left: f64,
    pub top: f64,
    pub radius: f64,
    pub stroke: String,
    pub stroke_width: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RectShape {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub stroke: String,
    pub stroke_width: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LineShape {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub stroke: String,
    pub stroke_width: f64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(tag = "op")]
pub enum PathCommand {
    #[serde(rename = "M")]
    MoveTo { x: f64, y: f64 },
    #[serde(rename = "L")]
    LineTo { x: f64, y: f64 },
    #[serde(rename = "Q")]
    QuadTo { cx: f64, cy: f64, x: f64, y: f64 },
}

/// Freehand stroke geometry. Travels as one serialized object and is loaded
/// back in one step rather than field by field.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FreehandPath {
    pub left: f64,
    pub top: f64,
    pub path: Vec<PathCommand>,
    pub stroke: String,
    pub stroke_width: f64,
}

impl FreehandPath {
    /// Builds a polyline path through `points`; `None` when there are none.
    pub fn from_points(points: &[(f64, f64)], stroke: &str, stroke_width: f64) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut path = Vec::with_capacity(points.len());
        path.push(PathCommand::MoveTo {
            x: first.0,
            y: first.1,
        });
        for &(x, y) in rest {
            path.push(PathCommand::LineTo { x, y });
        }
        let left = points.iter().map(|p| p.0).fold(f64::MAX, f64::min);
        let top = points.iter().map(|p| p.1).fold(f64::MAX, f64::min);
        Some(Self {
            left,
            top,
            path,
            stroke: stroke.to_string(),
            stroke_width,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum VectorObject {
    Circle(CircleShape),
    Rect(RectShape),
    Line(LineShape),
    Path(FreehandPath),
}

impl VectorObject {
    pub fn kind(&self) -> &'static str {
        match self {
            VectorObject::Circle(_) => "circle",
            VectorObject::Rect(_) => "rect",
            VectorObject::Line(_) => "line",
            VectorObject::Path(_) => "path",
        }
    }

    pub fn stroke(&self) -> &str {
        match self {
            VectorObject::Circle(shape) => &shape.stroke,
            VectorObject::Rect(shape) => &shape.stroke,
            VectorObject::Line(shape) => &shape.stroke,
            VectorObject::Path(shape) => &shape.stroke,
        }
    }

    pub fn stroke_width(&self) -> f64 {
        match self {
            VectorObject::Circle(shape) => shape.stroke_width,
            VectorObject::Rect(shape) => shape.stroke_width,
            VectorObject::Line(shape) => shape.stroke_width,
            VectorObject::Path(shape) => shape.stroke_width,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnnotationPayload {
    Add(VectorObject),
    Clear,
}

/// Typed view over the `(event_type, event_data)` pair carried by the bus.
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    Scroll(ScrollOffset),
    Annotation(AnnotationPayload),
    Navigation,
}

impl EventPayload {
    pub fn into_parts(self) -> (EventKind, Value) {
        match self {
            EventPayload::Scroll(offset) => (EventKind::Scroll, json!({ "x": offset.x, "y": offset.y })),
            EventPayload::Annotation(annotation) => {
                (EventKind::Annotation, encode_annotation(&annotation))
            }
            EventPayload::Navigation => (EventKind::Navigation, json!({})),
        }
    }

    /// `None` when the data does not match its kind.
    pub fn from_event(event: &SessionEvent) -> Option<Self> {
        match event.event_type {
            EventKind::Scroll => serde_json::from_value::<ScrollOffset>(event.event_data.clone())
                .ok()
                .filter(ScrollOffset::is_finite)
                .map(EventPayload::Scroll),
            EventKind::Annotation => {
                decode_annotation(&event.event_data).map(EventPayload::Annotation)
            }
            EventKind::Navigation => Some(EventPayload::Navigation),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "event:append")]
    Append {
        event_type: EventKind,
        event_data: Value,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "subscribed")]
    Subscribed { session_id: String, role: Role },
    /// Retained log, sent once to a new subscriber before any live event.
    #[serde(rename = "sync")]
    Sync { events: Vec<SessionEvent> },
    #[serde(rename = "event")]
    Event { event: SessionEvent },
    #[serde(rename = "ended")]
    Ended,
}

/// Accepts bare hosts like `example.com` by assuming https.
pub fn normalize_target_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("http") {
        Some(trimmed.to_string())
    } else {
        Some(format!("https://{trimmed}"))
    }
}

pub fn share_link(origin: &str, session_id: &str) -> String {
    format!("{}/view/{session_id}", origin.trim_end_matches('/'))
}
