#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use boardcall::error::{Error, Result};
use boardcall::peer::{AgentEvent, IceCandidate, LinkState, PeerAgent, SessionDescription};
use boardcall::whiteboard::{DisplayList, Segment};
use boardcall::{AppConfig, MemoryRelay, RelayStore, Session};

pub fn host_candidate(octet: u8) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{octet} 1 udp 2130706431 192.168.1.{octet} 50000 typ host"),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

pub fn srflx_candidate(octet: u8) -> IceCandidate {
    IceCandidate {
        candidate: format!(
            "candidate:{octet} 1 udp 1694498815 203.0.113.{octet} 40000 typ srflx raddr 0.0.0.0 rport 0"
        ),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

#[derive(Default)]
struct FakeState {
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    remote_sets: usize,
    applied: Vec<IceCandidate>,
    rejected: usize,
    connected: bool,
    closed: bool,
}

/// Scripted negotiation object.
///
/// Emits one host candidate when the local description is set, refuses remote
/// candidates before a remote description exists, and reports the link as
/// connected once both descriptions and a remote host candidate are in place.
pub struct FakeAgent {
    sdp: String,
    local: IceCandidate,
    state: Mutex<FakeState>,
    tx: mpsc::UnboundedSender<AgentEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<AgentEvent>>>,
}

impl FakeAgent {
    pub fn new(sdp: &str, octet: u8) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            sdp: sdp.to_string(),
            local: host_candidate(octet),
            state: Mutex::new(FakeState::default()),
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }

    pub fn remote(&self) -> Option<SessionDescription> {
        self.state.lock().remote.clone()
    }

    pub fn remote_sets(&self) -> usize {
        self.state.lock().remote_sets
    }

    pub fn applied(&self) -> Vec<IceCandidate> {
        self.state.lock().applied.clone()
    }

    pub fn rejected(&self) -> usize {
        self.state.lock().rejected
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn check_link(&self, state: &mut FakeState) {
        let ready = state.local.is_some()
            && state.remote.is_some()
            && state.applied.iter().any(|c| c.kind() == Some("host"));
        if ready && !state.connected {
            state.connected = true;
            let _ = self.tx.send(AgentEvent::LinkChanged(LinkState::Connecting));
            let _ = self.tx.send(AgentEvent::LinkChanged(LinkState::Connected));
        }
    }
}

#[async_trait]
impl PeerAgent for FakeAgent {
    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer(self.sdp.clone()))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        if self.state.lock().remote.is_none() {
            return Err(Error::Negotiation("no remote offer".into()));
        }
        Ok(SessionDescription::answer(self.sdp.clone()))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let mut state = self.state.lock();
        state.local = Some(desc);
        let _ = self.tx.send(AgentEvent::LocalCandidate(self.local.clone()));
        let _ = self.tx.send(AgentEvent::GatheringComplete);
        self.check_link(&mut state);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let mut state = self.state.lock();
        if state.remote.is_some() {
            return Err(Error::Negotiation("remote description already set".into()));
        }
        state.remote = Some(desc);
        state.remote_sets += 1;
        self.check_link(&mut state);
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.state.lock().remote.is_some()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut state = self.state.lock();
        if state.remote.is_none() {
            state.rejected += 1;
            return Err(Error::Negotiation("remote description not set".into()));
        }
        state.applied.push(candidate);
        self.check_link(&mut state);
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AgentEvent>> {
        self.rx.lock().take()
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

pub fn store(relay: &MemoryRelay) -> Arc<dyn RelayStore> {
    Arc::new(relay.clone())
}

pub fn config() -> AppConfig {
    AppConfig {
        answer_timeout_secs: Some(5),
        ..AppConfig::default()
    }
}

/// Polls the surface until it shows `count` segments or a second passes.
pub async fn segments_eventually(session: &Session<DisplayList>, count: usize) -> Vec<Segment> {
    let mut last = Vec::new();
    for _ in 0..100 {
        last = session.with_surface(|s| s.segments().to_vec()).await;
        if last.len() == count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    last
}
