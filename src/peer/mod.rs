pub mod agent;
pub mod connection;
pub mod coordinator;
pub mod ice;
pub mod state;
pub mod types;

pub use agent::{AgentEvent, MediaSource, PeerAgent};
pub use connection::WebRtcAgent;
pub use coordinator::NegotiationCoordinator;
pub use ice::CandidateRelay;
pub use state::{CandidateBuffer, LinkState, NegotiationState, Role};
pub use types::{IceCandidate, SdpType, ServerConfig, SessionDescription};
