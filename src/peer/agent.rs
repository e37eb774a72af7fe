use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::track::track_local::TrackLocal;

use crate::error::Result;
use crate::peer::state::LinkState;
use crate::peer::types::{IceCandidate, SessionDescription};

/// Notifications emitted by the local negotiation object.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A trickle candidate was gathered locally.
    LocalCandidate(IceCandidate),
    /// Local gathering finished (null candidate).
    GatheringComplete,
    LinkChanged(LinkState),
}

/// The local negotiation object (an `RTCPeerConnection` in production).
#[async_trait]
pub trait PeerAgent: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    async fn has_remote_description(&self) -> bool;

    /// Applies a remote candidate. Only valid once a remote description is set.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Hands out the event stream; subsequent calls return `None`.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AgentEvent>>;

    async fn close(&self) -> Result<()>;
}

/// Local capture supplied by the host. Capture itself is out of scope; the
/// crate only needs the tracks to attach.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn open(&self) -> Result<Vec<Arc<dyn TrackLocal + Send + Sync>>>;
}
