use crate::whiteboard::event::{DrawingEvent, Point};

/// Pointer input, already unified across mouse and touch sources.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerInput {
    Start(Point),
    Move(Point),
    /// Release, cancel, or the pointer leaving the surface.
    End,
}

impl PointerInput {
    /// Converts client coordinates to surface coordinates.
    pub fn at(client: Point, surface_origin: Point) -> Point {
        Point::new(client.x - surface_origin.x, client.y - surface_origin.y)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Brush {
    pub color: String,
    pub size: f64,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            color: "#000000".into(),
            size: 4.0,
        }
    }
}

/// Tracks the stroke in progress and emits one `Draw` per pointer move.
#[derive(Debug, Default)]
pub struct StrokeRecorder {
    brush: Brush,
    drawing: bool,
    last: Option<Point>,
}

impl StrokeRecorder {
    pub fn new(brush: Brush) -> Self {
        Self {
            brush,
            drawing: false,
            last: None,
        }
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn handle(&mut self, input: PointerInput) -> Option<DrawingEvent> {
        match input {
            PointerInput::Start(pos) => {
                self.drawing = true;
                self.last = Some(pos);
                None
            }
            PointerInput::Move(pos) => {
                if !self.drawing {
                    return None;
                }
                let event = self.last.map(|last| {
                    DrawingEvent::draw(last, pos, self.brush.color.clone(), self.brush.size)
                });
                self.last = Some(pos);
                event
            }
            PointerInput::End => {
                self.drawing = false;
                self.last = None;
                None
            }
        }
    }
}
