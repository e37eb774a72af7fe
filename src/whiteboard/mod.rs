//! Shared drawing surface replicated through an ordered event log.

pub mod event;
pub mod input;
pub mod log;
pub mod replicator;

pub use event::{DrawingEvent, Point};
pub use input::{Brush, PointerInput, StrokeRecorder};
pub use log::WhiteboardLog;
pub use replicator::{DisplayList, Segment, Surface, WhiteboardReplicator};
