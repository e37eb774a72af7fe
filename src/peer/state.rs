use std::collections::VecDeque;

use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use crate::error::{Error, Result};
use crate::peer::types::IceCandidate;

/// Which side of the rendezvous this client plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Initiator => "CREATOR",
            Role::Responder => "JOINER",
        }
    }
}

/// Local negotiation progress.
///
/// There is no failed state: a negotiation that stalls simply never reaches
/// `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    // initiator
    OfferCreated,
    OfferPublished,
    AwaitingAnswer,
    // responder
    OfferFetched,
    AnswerCreated,
    AnswerPublished,
    Connected,
}

impl NegotiationState {
    fn sequence(role: Role) -> &'static [NegotiationState] {
        use NegotiationState::*;
        match role {
            Role::Initiator => &[Idle, OfferCreated, OfferPublished, AwaitingAnswer, Connected],
            Role::Responder => &[Idle, OfferFetched, AnswerCreated, AnswerPublished, Connected],
        }
    }

    /// Moves one step forward along the role's sequence.
    pub fn advance(&mut self, role: Role, to: NegotiationState) -> Result<()> {
        let seq = Self::sequence(role);
        let from = *self;
        let allowed = seq
            .iter()
            .position(|s| *s == from)
            .and_then(|i| seq.get(i + 1))
            .is_some_and(|next| *next == to);
        if !allowed {
            return Err(Error::InvalidTransition { from, to });
        }
        *self = to;
        Ok(())
    }

    /// States in which a connected link completes the negotiation.
    pub fn awaits_link(self) -> bool {
        matches!(
            self,
            NegotiationState::AwaitingAnswer | NegotiationState::AnswerPublished
        )
    }

    pub fn is_connected(self) -> bool {
        self == NegotiationState::Connected
    }
}

/// Transport-level connection state reported by the negotiation object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl From<RTCPeerConnectionState> for LinkState {
    fn from(st: RTCPeerConnectionState) -> Self {
        match st {
            RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => LinkState::New,
            RTCPeerConnectionState::Connecting => LinkState::Connecting,
            RTCPeerConnectionState::Connected => LinkState::Connected,
            RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
            RTCPeerConnectionState::Failed => LinkState::Failed,
            RTCPeerConnectionState::Closed => LinkState::Closed,
        }
    }
}

/// Remote candidates received before the remote description was applied.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: VecDeque<IceCandidate>,
}

impl CandidateBuffer {
    pub fn push(&mut self, candidate: IceCandidate) {
        self.pending.push_back(candidate);
    }

    /// Takes every buffered candidate in arrival order.
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.pending.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
