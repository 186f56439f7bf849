use livesync_shared::FreehandPath;

/// Pointer moves closer than this to the previous point are not recorded.
pub const MIN_POINT_DISTANCE: f64 = 1.0;

pub fn normalize_point(x: f64, y: f64) -> Option<(f64, f64)> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    Some((x, y))
}

/// Overlay coordinates of a client-space pointer position, given the overlay's
/// bounding box origin and size.
pub fn client_to_overlay(
    client_x: f64,
    client_y: f64,
    left: f64,
    top: f64,
    width: f64,
    height: f64,
) -> Option<(f64, f64)> {
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    normalize_point(client_x - left, client_y - top)
}

/// Points of one freehand stroke between pointer down and pointer up.
#[derive(Debug, Clone)]
pub struct StrokeBuilder {
    points: Vec<(f64, f64)>,
}

impl StrokeBuilder {
    pub fn start(x: f64, y: f64) -> Option<Self> {
        let point = normalize_point(x, y)?;
        Some(Self {
            points: vec![point],
        })
    }

    /// Records a move and returns the segment to draw as live feedback.
    pub fn push(&mut self, x: f64, y: f64) -> Option<((f64, f64), (f64, f64))> {
        let point = normalize_point(x, y)?;
        let last = *self.points.last()?;
        let (dx, dy) = (point.0 - last.0, point.1 - last.1);
        if (dx * dx + dy * dy).sqrt() < MIN_POINT_DISTANCE {
            return None;
        }
        self.points.push(point);
        Some((last, point))
    }

    pub fn finish(self, stroke: &str, stroke_width: f64) -> Option<FreehandPath> {
        FreehandPath::from_points(&self.points, stroke, stroke_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livesync_shared::PathCommand;

    #[test]
    fn test_client_to_overlay_offsets_by_origin() {
        assert_eq!(
            client_to_overlay(150.0, 90.0, 50.0, 40.0, 800.0, 600.0),
            Some((100.0, 50.0))
        );
        assert_eq!(client_to_overlay(1.0, 1.0, 0.0, 0.0, 0.0, 600.0), None);
    }

    #[test]
    fn test_builder_skips_jitter_and_non_finite() {
        let mut builder = StrokeBuilder::start(10.0, 10.0).unwrap();
        assert!(builder.push(10.2, 10.3).is_none());
        assert!(builder.push(f64::NAN, 4.0).is_none());
        assert_eq!(builder.push(14.0, 13.0), Some(((10.0, 10.0), (14.0, 13.0))));
        assert_eq!(builder.finish("#FF00FF", 3.0).unwrap().path.len(), 2);
        assert!(StrokeBuilder::start(f64::INFINITY, 0.0).is_none());
    }

    #[test]
    fn test_finish_builds_polyline_path() {
        let mut builder = StrokeBuilder::start(20.0, 30.0).unwrap();
        builder.push(25.0, 12.0);
        builder.push(5.0, 40.0);
        let path = builder.finish("#FF00FF", 3.0).unwrap();
        assert_eq!((path.left, path.top), (5.0, 12.0));
        assert_eq!(path.path.len(), 3);
        assert_eq!(path.path[0], PathCommand::MoveTo { x: 20.0, y: 30.0 });
        assert_eq!(path.path[2], PathCommand::LineTo { x: 5.0, y: 40.0 });
        assert_eq!(path.stroke, "#FF00FF");
    }
}
