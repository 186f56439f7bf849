//! Conversion between vector objects and their transport payloads.
//!
//! Only position, size, stroke colour and stroke width travel. Fill is always
//! written as `"none"` and ignored on the way back in, so an overlay never
//! hides the page beneath it.

use serde_json::{json, Value};

use crate::{AnnotationPayload, CircleShape, FreehandPath, LineShape, RectShape, VectorObject};

pub const FILL_NONE: &str = "none";

pub fn encode_object(object: &VectorObject) -> Value {
    match object {
        VectorObject::Circle(shape) => json!({
            "type": object.kind(),
            "left": shape.left,
            "top": shape.top,
            "radius": shape.radius,
            "stroke": shape.stroke,
            "strokeWidth": shape.stroke_width,
            "fill": FILL_NONE,
        }),
        VectorObject::Rect(shape) => json!({
            "type": object.kind(),
            "left": shape.left,
            "top": shape.top,
            "width": shape.width,
            "height": shape.height,
            "stroke": shape.stroke,
            "strokeWidth": shape.stroke_width,
            "fill": FILL_NONE,
        }),
        VectorObject::Line(shape) => json!({
            "type": object.kind(),
            "x1": shape.x1,
            "y1": shape.y1,
            "x2": shape.x2,
            "y2": shape.y2,
            "stroke": shape.stroke,
            "strokeWidth": shape.stroke_width,
            "fill": FILL_NONE,
        }),
        VectorObject::Path(shape) => json!({
            "type": object.kind(),
            "left": shape.left,
            "top": shape.top,
            "path": shape.path,
            "stroke": shape.stroke,
            "strokeWidth": shape.stroke_width,
            "fill": FILL_NONE,
        }),
    }
}

/// Unknown kinds and malformed geometry decode to `None`.
pub fn decode_object(value: &Value) -> Option<VectorObject> {
    let kind = value.get("type")?.as_str()?;
    match kind {
        "circle" => Some(VectorObject::Circle(CircleShape {
            left: number(value, "left")?,
            top: number(value, "top")?,
            radius: number(value, "radius")?,
            stroke: text(value, "stroke")?,
            stroke_width: number(value, "strokeWidth")?,
        })),
        "rect" => Some(VectorObject::Rect(RectShape {
            left: number(value, "left")?,
            top: number(value, "top")?,
            width: number(value, "width")?,
            height: number(value, "height")?,
            stroke: text(value, "stroke")?,
            stroke_width: number(value, "strokeWidth")?,
        })),
        "line" => Some(VectorObject::Line(LineShape {
            x1: number(value, "x1")?,
            y1: number(value, "y1")?,
            x2: number(value, "x2")?,
            y2: number(value, "y2")?,
            stroke: text(value, "stroke")?,
            stroke_width: number(value, "strokeWidth")?,
        })),
        // Whole-geometry load, unlike the three kinds above.
        "path" => serde_json::from_value::<FreehandPath>(value.clone())
            .ok()
            .map(VectorObject::Path),
        _ => None,
    }
}

pub fn encode_annotation(annotation: &AnnotationPayload) -> Value {
    match annotation {
        AnnotationPayload::Add(object) => json!({
            "action": "add",
            "object": encode_object(object),
        }),
        AnnotationPayload::Clear => json!({ "action": "clear" }),
    }
}

pub fn decode_annotation(value: &Value) -> Option<AnnotationPayload> {
    match value.get("action")?.as_str()? {
        "clear" => Some(AnnotationPayload::Clear),
        "add" => decode_object(value.get("object")?).map(AnnotationPayload::Add),
        _ => None,
    }
}

fn number(value: &Value, key: &str) -> Option<f64> {
    value.get(key)?.as_f64().filter(|n| n.is_finite())
}

fn text(value: &Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PathCommand;

    fn samples() -> Vec<VectorObject> {
        vec![
            VectorObject::Circle(CircleShape {
                left: 100.0,
                top: 100.0,
                radius: 50.0,
                stroke: "#FF00FF".into(),
                stroke_width: 3.0,
            }),
            VectorObject::Rect(RectShape {
                left: 12.5,
                top: 40.0,
                width: 100.0,
                height: 64.0,
                stroke: "#00FFFF".into(),
                stroke_width: 2.0,
            }),
            VectorObject::Line(LineShape {
                x1: 100.0,
                y1: 100.0,
                x2: 200.0,
                y2: 200.0,
                stroke: "#FFFF00".into(),
                stroke_width: 3.0,
            }),
            VectorObject::Path(FreehandPath {
                left: 1.0,
                top: 2.0,
                path: vec![
                    PathCommand::MoveTo { x: 1.0, y: 2.0 },
                    PathCommand::QuadTo {
                        cx: 4.0,
                        cy: 4.0,
                        x: 8.0,
                        y: 3.0,
                    },
                    PathCommand::LineTo { x: 9.0, y: 9.0 },
                ],
                stroke: "#FF0000".into(),
                stroke_width: 5.0,
            }),
        ]
    }

    #[test]
    fn test_every_kind_survives_encoding() {
        for object in samples() {
            let decoded = decode_object(&encode_object(&object));
            assert_eq!(decoded.as_ref(), Some(&object), "kind {}", object.kind());
        }
    }

    #[test]
    fn test_fill_is_always_none() {
        for object in samples() {
            assert_eq!(encode_object(&object)["fill"], json!("none"));
        }
    }

    #[test]
    fn test_incoming_fill_is_ignored() {
        let value = json!({
            "type": "rect", "left": 0, "top": 0, "width": 10, "height": 10,
            "stroke": "#FFFFFF", "strokeWidth": 1, "fill": "#000000",
        });
        let Some(VectorObject::Rect(rect)) = decode_object(&value) else {
            panic!("expected rect");
        };
        assert_eq!(rect.width, 10.0);
        assert_eq!(encode_object(&VectorObject::Rect(rect))["fill"], json!("none"));
    }

    #[test]
    fn test_unknown_kind_decodes_to_nothing() {
        let value = json!({ "type": "triangle", "left": 1, "top": 1 });
        assert!(decode_object(&value).is_none());
        assert!(decode_object(&json!({ "left": 1 })).is_none());
        assert!(decode_object(&json!("circle")).is_none());
    }

    #[test]
    fn test_missing_field_decodes_to_nothing() {
        let value = json!({
            "type": "circle", "left": 1, "top": 1, "stroke": "#FFFFFF", "strokeWidth": 3,
        });
        assert!(decode_object(&value).is_none());
    }

    #[test]
    fn test_path_loads_whole_geometry() {
        let value = json!({
            "type": "path",
            "version": "5.3.0",
            "left": 3,
            "top": 4,
            "path": [{ "op": "M", "x": 3, "y": 4 }, { "op": "L", "x": 10, "y": 12 }],
            "stroke": "#00FF00",
            "strokeWidth": 3,
            "fill": null,
        });
        let Some(VectorObject::Path(path)) = decode_object(&value) else {
            panic!("expected path");
        };
        assert_eq!(path.path.len(), 2);
        assert_eq!(path.path[1], PathCommand::LineTo { x: 10.0, y: 12.0 });
    }

    #[test]
    fn test_annotation_actions() {
        assert_eq!(
            decode_annotation(&json!({ "action": "clear" })),
            Some(AnnotationPayload::Clear)
        );
        let circle = samples().remove(0);
        let encoded = encode_annotation(&AnnotationPayload::Add(circle.clone()));
        assert_eq!(encoded["action"], json!("add"));
        assert_eq!(
            decode_annotation(&encoded),
            Some(AnnotationPayload::Add(circle))
        );
        assert!(decode_annotation(&json!({ "action": "undo" })).is_none());
        assert!(decode_annotation(&json!({ "action": "add", "object": { "type": "blob" } })).is_none());
    }
}
