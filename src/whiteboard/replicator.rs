use crate::relay::OrderingKey;
use crate::whiteboard::event::{DrawingEvent, Point};

/// One straight stroke segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub from: Point,
    pub to: Point,
    pub color: String,
    pub size: f64,
}

impl Segment {
    fn is_drawable(&self) -> bool {
        self.from.is_finite() && self.to.is_finite() && self.size.is_finite() && self.size > 0.0
    }
}

/// A drawing target. Implementations paint synchronously; they are never
/// invoked across an await point.
pub trait Surface: Send {
    fn clear(&mut self);
    fn stroke(&mut self, segment: &Segment);
}

/// Headless surface: the ordered list of visible segments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayList {
    segments: Vec<Segment>,
}

impl DisplayList {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_blank(&self) -> bool {
        self.segments.is_empty()
    }
}

impl Surface for DisplayList {
    fn clear(&mut self) {
        self.segments.clear();
    }

    fn stroke(&mut self, segment: &Segment) {
        self.segments.push(segment.clone());
    }
}

/// Applies drawing-log entries to a surface in log order.
pub struct WhiteboardReplicator<S: Surface> {
    surface: S,
    last_applied: Option<OrderingKey>,
}

impl<S: Surface> WhiteboardReplicator<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            last_applied: None,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn last_applied(&self) -> Option<OrderingKey> {
        self.last_applied
    }

    /// Resets the surface and applies `events` in the given order.
    pub fn replay_from(&mut self, events: &[DrawingEvent]) {
        self.surface.clear();
        self.last_applied = None;
        for event in events {
            self.paint(event);
            if let Some(key) = event.timestamp() {
                self.last_applied = Some(self.last_applied.map_or(key, |k| k.max(key)));
            }
        }
    }

    /// Applies one live event on top of the current surface. Events not
    /// newer than the last applied one are ignored; returns whether the event
    /// was painted.
    pub fn apply_live(&mut self, event: &DrawingEvent) -> bool {
        if let Some(key) = event.timestamp() {
            if self.last_applied.is_some_and(|last| key <= last) {
                return false;
            }
            self.last_applied = Some(key);
        }
        self.paint(event);
        true
    }

    fn paint(&mut self, event: &DrawingEvent) {
        match event {
            DrawingEvent::Clear { .. } => self.surface.clear(),
            DrawingEvent::Draw {
                last_pos,
                current_pos,
                color,
                size,
                ..
            } => {
                let segment = Segment {
                    from: *last_pos,
                    to: *current_pos,
                    color: color.clone(),
                    size: *size,
                };
                if segment.is_drawable() {
                    self.surface.stroke(&segment);
                }
            }
        }
    }
}
