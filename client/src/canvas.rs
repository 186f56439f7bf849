use livesync_shared::VectorObject;

/// Redraw-everything primitive supplied by whatever surface draws the overlay.
pub trait Renderer {
    fn redraw(&mut self, objects: &[VectorObject]);
}

/// Ordered annotation objects of one rendering surface. Insertion order is
/// paint order. Never shared between surfaces.
pub struct CanvasState {
    objects: Vec<VectorObject>,
    renderer: Option<Box<dyn Renderer>>,
}

impl CanvasState {
    pub fn new(renderer: Box<dyn Renderer>) -> Self {
        Self {
            objects: Vec::new(),
            renderer: Some(renderer),
        }
    }

    /// A canvas with nothing attached to draw on.
    pub fn detached() -> Self {
        Self {
            objects: Vec::new(),
            renderer: None,
        }
    }

    pub fn objects(&self) -> &[VectorObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn add(&mut self, object: VectorObject) {
        self.objects.push(object);
        self.redraw();
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.redraw();
    }

    pub fn redraw(&mut self) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.redraw(&self.objects);
        }
    }
}
