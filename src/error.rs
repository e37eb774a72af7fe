use std::time::Duration;
use thiserror::Error;

use crate::peer::state::NegotiationState;

/// Failures surfaced by the negotiation and whiteboard layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Local audio/video capture was denied or is absent.
    #[error("local media unavailable: {0}")]
    MediaUnavailable(String),

    /// Join attempted with an unknown or incomplete room id.
    #[error("room {0:?} does not exist or is invalid")]
    InvalidRoom(String),

    /// The room already carries an answer from another responder.
    #[error("room {0:?} has already been answered")]
    RoomOccupied(String),

    /// Any relay store read or write failed.
    #[error("relay store unavailable: {0}")]
    RelayUnavailable(String),

    /// Negotiation did not reach `Connected` within the configured timeout.
    #[error("negotiation did not complete within {0:?}")]
    NegotiationStall(Duration),

    /// The local negotiation object rejected an operation.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("invalid negotiation transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: NegotiationState,
        to: NegotiationState,
    },

    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    WebRtc(#[from] webrtc::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Message shown to the user when a top-level create/join action fails.
    pub fn user_message(&self) -> String {
        match self {
            Error::MediaUnavailable(_) => {
                "Camera/Mic access denied. Please allow permissions and refresh.".to_string()
            }
            Error::InvalidRoom(id) if id.is_empty() => "Please enter a room ID.".to_string(),
            Error::InvalidRoom(_) => "Room does not exist or is invalid.".to_string(),
            Error::RoomOccupied(_) => "Room is already in use.".to_string(),
            other => format!("Error: {other}"),
        }
    }

    /// Whether the failure came from the relay store rather than local state.
    pub fn is_relay(&self) -> bool {
        matches!(self, Error::RelayUnavailable(_))
    }
}
