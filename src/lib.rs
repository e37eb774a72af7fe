//! Call negotiation and shared-whiteboard replication over a relay store.
//!
//! Two peers with no prior contact meet through a shared document store:
//! the initiator creates a room and publishes an offer, the responder
//! answers it, and both trickle ICE candidates through the store until the
//! direct connection is up. The same room carries an ordered log of drawing
//! events that every client replays to keep the whiteboard consistent.
//!
//! - [`relay`] — store abstraction and in-memory implementation
//! - [`room`] — session records (offer / answer)
//! - [`peer`] — negotiation state machine, candidate relay, WebRTC agent
//! - [`whiteboard`] — drawing log, replicator, stroke input
//! - [`session`] — create / join a room and own its resources

pub mod config;
pub mod error;
pub mod logger;
pub mod peer;
pub mod relay;
pub mod room;
pub mod session;
pub mod utils;
pub mod whiteboard;

pub use config::{AppConfig, LogConfig};
pub use error::{Error, Result};
pub use peer::{
    AgentEvent, LinkState, NegotiationCoordinator, NegotiationState, PeerAgent, Role,
    WebRtcAgent,
};
pub use relay::{MemoryRelay, OrderingKey, RelayStore, Subscription};
pub use room::{RoomRegistry, SessionRecord};
pub use session::Session;
pub use whiteboard::{
    DisplayList, DrawingEvent, Point, PointerInput, WhiteboardLog, WhiteboardReplicator,
};
