//! Candidate exchange through the relay store.
//!
//! Each room has two append-only candidate collections:
//! `offerCandidates` (initiator → responder) and `answerCandidates`
//! (responder → initiator). A side publishes to its own collection and
//! subscribes to the other one.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::logger::dump_candidate;
use crate::peer::state::Role;
use crate::peer::types::IceCandidate;
use crate::relay::{room_path, RelayStore, Subscription};

pub const OFFER_CANDIDATES: &str = "offerCandidates";
pub const ANSWER_CANDIDATES: &str = "answerCandidates";

/// Collection a role publishes its own candidates to.
pub fn outgoing_collection(room_id: &str, role: Role) -> String {
    let name = match role {
        Role::Initiator => OFFER_CANDIDATES,
        Role::Responder => ANSWER_CANDIDATES,
    };
    format!("{}/{name}", room_path(room_id))
}

/// Collection a role reads the peer's candidates from.
pub fn incoming_collection(room_id: &str, role: Role) -> String {
    let peer = match role {
        Role::Initiator => Role::Responder,
        Role::Responder => Role::Initiator,
    };
    outgoing_collection(room_id, peer)
}

#[derive(Clone)]
pub struct CandidateRelay {
    store: Arc<dyn RelayStore>,
    role: Role,
    outgoing: String,
    incoming: String,
}

impl CandidateRelay {
    pub fn new(store: Arc<dyn RelayStore>, room_id: &str, role: Role) -> Self {
        Self {
            store,
            role,
            outgoing: outgoing_collection(room_id, role),
            incoming: incoming_collection(room_id, role),
        }
    }

    pub async fn publish(&self, candidate: &IceCandidate) -> Result<()> {
        dump_candidate(self.role.label(), candidate);
        let value = serde_json::to_value(candidate)?;
        self.store.append(&self.outgoing, value).await?;
        debug!(
            "[{}] Generated ICE candidate, sent to relay store.",
            self.role.label()
        );
        Ok(())
    }

    /// Peer candidates, each entry delivered exactly once even when the
    /// store re-delivers it.
    pub async fn subscribe(&self) -> Result<Subscription<IceCandidate>> {
        let sub = self.store.watch_collection(&self.incoming).await?;
        let label = self.role.label();
        let mut seen = HashSet::new();
        Ok(sub.filter_map(move |entry| {
            if !seen.insert(entry.id.clone()) {
                return None;
            }
            match serde_json::from_value::<IceCandidate>(entry.data) {
                Ok(candidate) => Some(candidate),
                Err(e) => {
                    warn!("[{label}] Skipping malformed candidate {}: {e}", entry.id);
                    None
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::MemoryRelay;

    fn host(n: u8) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n} 1 udp 2130706431 10.0.0.{n} 5000 typ host"),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    #[test]
    fn directions_are_mirrored() {
        assert_eq!(
            outgoing_collection("abc123", Role::Initiator),
            "webrtc_rooms/abc123/offerCandidates"
        );
        assert_eq!(
            incoming_collection("abc123", Role::Initiator),
            "webrtc_rooms/abc123/answerCandidates"
        );
        assert_eq!(
            incoming_collection("abc123", Role::Responder),
            outgoing_collection("abc123", Role::Initiator)
        );
    }

    #[tokio::test]
    async fn responder_sees_initiator_candidates_exactly_once() {
        let relay = MemoryRelay::new();
        relay.set_duplicate_delivery(true);
        let store: Arc<dyn RelayStore> = Arc::new(relay.clone());
        let initiator = CandidateRelay::new(store.clone(), "room01", Role::Initiator);
        let responder = CandidateRelay::new(store, "room01", Role::Responder);

        initiator.publish(&host(1)).await.unwrap();
        let mut sub = responder.subscribe().await.unwrap();
        initiator.publish(&host(2)).await.unwrap();

        assert_eq!(sub.next().await.unwrap(), host(1));
        assert_eq!(sub.next().await.unwrap(), host(2));
        // duplicates were filtered; nothing else is pending
        let pending = tokio::time::timeout(std::time::Duration::from_millis(50), sub.next()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn own_candidates_are_not_echoed() {
        let relay = MemoryRelay::new();
        let store: Arc<dyn RelayStore> = Arc::new(relay);
        let initiator = CandidateRelay::new(store, "room02", Role::Initiator);
        let mut sub = initiator.subscribe().await.unwrap();
        initiator.publish(&host(3)).await.unwrap();
        let pending = tokio::time::timeout(std::time::Duration::from_millis(50), sub.next()).await;
        assert!(pending.is_err());
    }
}
