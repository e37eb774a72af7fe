use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::peer::agent::{AgentEvent, MediaSource, PeerAgent};
use crate::peer::state::{LinkState, Role};
use crate::peer::types::{IceCandidate, ServerConfig, SessionDescription};
use crate::utils::add_ice_url_scheme;

/// `PeerAgent` backed by a real `RTCPeerConnection`.
pub struct WebRtcAgent {
    pc: Arc<RTCPeerConnection>,
    events: Mutex<Option<mpsc::UnboundedReceiver<AgentEvent>>>,
}

impl WebRtcAgent {
    /// Creates the peer with receive-ready audio and video transceivers.
    pub async fn new(config: &AppConfig, role: Role) -> Result<Self> {
        let agent = Self::build(config, role).await?;
        for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
            agent.pc.add_transceiver_from_kind(kind, None).await?;
        }
        Ok(agent)
    }

    /// Opens local media first; without it the session cannot start.
    pub async fn with_media(config: &AppConfig, role: Role, media: &dyn MediaSource) -> Result<Self> {
        let tracks = media.open().await.map_err(|e| match e {
            Error::MediaUnavailable(_) => e,
            other => Error::MediaUnavailable(other.to_string()),
        })?;
        if tracks.is_empty() {
            return Err(Error::MediaUnavailable("no local tracks".into()));
        }
        info!("[{}] Local camera and mic stream acquired.", role.label());

        let agent = Self::build(config, role).await?;
        for track in tracks {
            agent.pc.add_track(track).await?;
            debug!("[{}] Added local track to PeerConnection.", role.label());
        }
        Ok(agent)
    }

    /// Underlying connection, for hosts that render remote tracks.
    pub fn peer_connection(&self) -> Arc<RTCPeerConnection> {
        self.pc.clone()
    }

    async fn build(config: &AppConfig, role: Role) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(api.new_peer_connection(rtc_config(config)).await?);
        info!("[{}] RTCPeerConnection created.", role.label());

        let (tx, rx) = mpsc::unbounded_channel();
        let label = role.label();

        let cand_tx = tx.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let tx = cand_tx.clone();
            Box::pin(async move {
                match cand {
                    Some(c) => match c.to_json() {
                        Ok(init) => {
                            let _ = tx.send(AgentEvent::LocalCandidate(IceCandidate::from(init)));
                        }
                        Err(e) => warn!("[{label}] Failed to serialize ICE candidate: {e}"),
                    },
                    None => {
                        debug!("[{label}] ICE candidate gathering completed");
                        let _ = tx.send(AgentEvent::GatheringComplete);
                    }
                }
            })
        }));

        pc.on_ice_gathering_state_change(Box::new(move |state| {
            debug!("[{label}] ICE gathering state changed to: {state:?}");
            Box::pin(async {})
        }));

        let state_tx = tx;
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            info!("[{label}] Peer connection state: {st}");
            let link = LinkState::from(st);
            if matches!(link, LinkState::Disconnected | LinkState::Failed) {
                warn!("[{label}] Connection problem detected ({st})");
            }
            let _ = state_tx.send(AgentEvent::LinkChanged(link));
            Box::pin(async {})
        }));

        Ok(Self {
            pc,
            events: Mutex::new(Some(rx)),
        })
    }
}

#[async_trait]
impl PeerAgent for WebRtcAgent {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        SessionDescription::try_from(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await?;
        SessionDescription::try_from(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_local_description(desc.try_into()?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(desc.try_into()?).await?;
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.pc.remote_description().await.is_some()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc.add_ice_candidate(candidate.into()).await?;
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AgentEvent>> {
        self.events.lock().take()
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}

/// Peer connection configuration built from the host's settings.
pub fn rtc_config(config: &AppConfig) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers(&config.ice_servers),
        ice_candidate_pool_size: config.ice_candidate_pool_size,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

pub fn ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}
