//! Offer/answer negotiation over the relay store.
//!
//! Setup steps run inline in [`NegotiationCoordinator::initiate`] /
//! [`NegotiationCoordinator::respond`] so that relay failures reach the
//! caller. Afterwards a single driver task consumes session-record snapshots,
//! peer candidates and local agent events one at a time; it is the only
//! writer of the negotiation state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::logger::analyze_candidates;
use crate::peer::agent::{AgentEvent, PeerAgent};
use crate::peer::ice::CandidateRelay;
use crate::peer::state::{CandidateBuffer, LinkState, NegotiationState, Role};
use crate::peer::types::IceCandidate;
use crate::relay::Subscription;
use crate::room::{RoomRegistry, SessionRecord};
use crate::utils::normalize_room_id;

pub struct NegotiationCoordinator {
    role: Role,
    room_id: String,
    agent: Arc<dyn PeerAgent>,
    state_rx: watch::Receiver<NegotiationState>,
    link_rx: watch::Receiver<LinkState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
    answer_timeout: Option<Duration>,
}

impl NegotiationCoordinator {
    /// Initiator path: create and publish the offer, then wait for an answer.
    pub async fn initiate(
        agent: Arc<dyn PeerAgent>,
        registry: &RoomRegistry,
        room_id: &str,
        config: &AppConfig,
    ) -> Result<Self> {
        let role = Role::Initiator;
        let events = take_events(agent.as_ref())?;
        let relay = CandidateRelay::new(registry.store().clone(), room_id, role);
        let (mut driver, state_rx, link_rx) = Driver::new(role, agent.clone(), relay);

        let offer = agent.create_offer().await?;
        agent.set_local_description(offer.clone()).await?;
        driver.advance(NegotiationState::OfferCreated)?;
        info!("[CREATOR] Offer created and set as local description.");

        registry.publish_offer(room_id, &offer).await?;
        driver.advance(NegotiationState::OfferPublished)?;
        info!("[CREATOR] Offer sent to relay store.");

        let record = registry.watch(room_id).await?;
        let remote = driver.relay.subscribe().await?;
        driver.advance(NegotiationState::AwaitingAnswer)?;

        Ok(Self::spawn(
            role,
            room_id.to_string(),
            agent,
            driver,
            events,
            Some(record),
            remote,
            state_rx,
            link_rx,
            config,
        ))
    }

    /// Responder path: fetch the offer, answer it once.
    pub async fn respond(
        agent: Arc<dyn PeerAgent>,
        registry: &RoomRegistry,
        room_id: &str,
        config: &AppConfig,
    ) -> Result<Self> {
        let role = Role::Responder;
        let room_id = normalize_room_id(room_id)?;
        let record = registry.lookup(&room_id).await?;
        if record.answer.is_some() {
            return Err(Error::RoomOccupied(room_id));
        }
        let Some(offer) = record.offer else {
            return Err(Error::InvalidRoom(room_id));
        };
        info!("[JOINER] Room exists, proceeding.");

        let events = take_events(agent.as_ref())?;
        let relay = CandidateRelay::new(registry.store().clone(), &room_id, role);
        let (mut driver, state_rx, link_rx) = Driver::new(role, agent.clone(), relay);
        driver.advance(NegotiationState::OfferFetched)?;

        agent.set_remote_description(offer).await?;
        driver.remote_applied = true;
        info!("[JOINER] Received offer and set as remote description.");

        let answer = agent.create_answer().await?;
        agent.set_local_description(answer.clone()).await?;
        driver.advance(NegotiationState::AnswerCreated)?;
        info!("[JOINER] Answer created and set as local description.");

        registry.publish_answer(&room_id, &answer).await?;
        driver.advance(NegotiationState::AnswerPublished)?;
        info!("[JOINER] Answer sent to relay store.");

        let remote = driver.relay.subscribe().await?;

        Ok(Self::spawn(
            role, room_id, agent, driver, events, None, remote, state_rx, link_rx, config,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn(
        role: Role,
        room_id: String,
        agent: Arc<dyn PeerAgent>,
        driver: Driver,
        events: mpsc::UnboundedReceiver<AgentEvent>,
        record: Option<Subscription<SessionRecord>>,
        remote: Subscription<IceCandidate>,
        state_rx: watch::Receiver<NegotiationState>,
        link_rx: watch::Receiver<LinkState>,
        config: &AppConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(driver.run(events, record, remote, shutdown_rx));
        Self {
            role,
            room_id,
            agent,
            state_rx,
            link_rx,
            shutdown_tx: Some(shutdown_tx),
            driver: Some(handle),
            answer_timeout: config.answer_timeout(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn state(&self) -> NegotiationState {
        *self.state_rx.borrow()
    }

    pub fn link_state(&self) -> LinkState {
        *self.link_rx.borrow()
    }

    /// Connection-state indicator, independent of negotiation progress.
    pub fn watch_link(&self) -> watch::Receiver<LinkState> {
        self.link_rx.clone()
    }

    /// Resolves once negotiation reaches `Connected`. With an answer timeout
    /// configured, a negotiation that does not get there in time (no answer,
    /// or no working candidate pair) fails with `NegotiationStall`.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut rx = self.state_rx.clone();
        let wait = async move {
            loop {
                if rx.borrow_and_update().is_connected() {
                    return Ok(());
                }
                if rx.changed().await.is_err() {
                    return Err(Error::Negotiation("negotiation stopped".into()));
                }
            }
        };
        match self.answer_timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| Error::NegotiationStall(limit))?,
            None => wait.await,
        }
    }

    /// Stops the driver, releasing every subscription, and closes the agent.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.driver.take() {
            if let Err(e) = handle.await {
                warn!("[{}] Negotiation driver ended abnormally: {e}", self.role.label());
            }
        }
        self.agent.close().await
    }
}

impl std::fmt::Debug for NegotiationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiationCoordinator")
            .field("role", &self.role)
            .field("room_id", &self.room_id)
            .field("state", &self.state())
            .field("link", &self.link_state())
            .finish_non_exhaustive()
    }
}

/// Dropping without [`NegotiationCoordinator::shutdown`] aborts the driver
/// and closes the agent in the background.
impl Drop for NegotiationCoordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.take() {
            handle.abort();
        }
        if self.shutdown_tx.take().is_none() {
            return;
        }
        warn!(
            "[{}] Negotiation for room {} dropped without shutdown",
            self.role.label(),
            self.room_id
        );
        let agent = self.agent.clone();
        let label = self.role.label();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = agent.close().await {
                    warn!("[{label}] Failed to close dropped agent: {e}");
                }
            });
        }
    }
}

fn take_events(agent: &dyn PeerAgent) -> Result<mpsc::UnboundedReceiver<AgentEvent>> {
    agent
        .take_events()
        .ok_or_else(|| Error::Negotiation("agent is already driven by another negotiation".into()))
}

async fn next_record(record: &mut Option<Subscription<SessionRecord>>) -> Option<SessionRecord> {
    match record {
        Some(sub) => sub.next().await,
        None => std::future::pending().await,
    }
}

struct Driver {
    role: Role,
    agent: Arc<dyn PeerAgent>,
    relay: CandidateRelay,
    state: NegotiationState,
    state_tx: watch::Sender<NegotiationState>,
    link_tx: watch::Sender<LinkState>,
    pending: CandidateBuffer,
    remote_applied: bool,
    gathered: Vec<IceCandidate>,
}

impl Driver {
    fn new(
        role: Role,
        agent: Arc<dyn PeerAgent>,
        relay: CandidateRelay,
    ) -> (
        Self,
        watch::Receiver<NegotiationState>,
        watch::Receiver<LinkState>,
    ) {
        let (state_tx, state_rx) = watch::channel(NegotiationState::Idle);
        let (link_tx, link_rx) = watch::channel(LinkState::New);
        let driver = Self {
            role,
            agent,
            relay,
            state: NegotiationState::Idle,
            state_tx,
            link_tx,
            pending: CandidateBuffer::default(),
            remote_applied: false,
            gathered: Vec::new(),
        };
        (driver, state_rx, link_rx)
    }

    fn label(&self) -> &'static str {
        self.role.label()
    }

    fn advance(&mut self, to: NegotiationState) -> Result<()> {
        self.state.advance(self.role, to)?;
        self.state_tx.send_replace(to);
        debug!("[{}] Negotiation state: {to:?}", self.label());
        Ok(())
    }

    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<AgentEvent>,
        mut record: Option<Subscription<SessionRecord>>,
        mut remote: Subscription<IceCandidate>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut events_open = true;
        let mut remote_open = true;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                snapshot = next_record(&mut record) => match snapshot {
                    Some(snapshot) => self.on_record(snapshot).await,
                    None => record = None,
                },
                candidate = remote.next(), if remote_open => match candidate {
                    Some(candidate) => self.on_remote_candidate(candidate).await,
                    None => remote_open = false,
                },
                event = events.recv(), if events_open => match event {
                    Some(event) => self.on_agent_event(event).await,
                    None => events_open = false,
                },
            }
        }
        debug!("[{}] Negotiation driver stopped", self.label());
    }

    /// Applies the first observed answer; later snapshots are no-ops.
    async fn on_record(&mut self, record: SessionRecord) {
        if self.remote_applied {
            return;
        }
        let Some(answer) = record.answer else {
            return;
        };
        if self.agent.has_remote_description().await {
            self.remote_applied = true;
            self.flush_pending().await;
            return;
        }
        info!("[{}] Received answer from relay store.", self.label());
        match self.agent.set_remote_description(answer).await {
            Ok(()) => {
                self.remote_applied = true;
                info!("[{}] Set remote description with the answer.", self.label());
                self.flush_pending().await;
            }
            Err(e) => error!("[{}] Failed to apply answer: {e}", self.label()),
        }
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        debug!("[{}] Received ICE candidate from peer.", self.label());
        if self.remote_applied {
            self.apply_candidate(candidate).await;
        } else {
            debug!(
                "[{}] Remote description not set yet, queuing candidate",
                self.label()
            );
            self.pending.push(candidate);
        }
    }

    async fn flush_pending(&mut self) {
        for candidate in self.pending.drain() {
            debug!("[{}] Applying pending candidate", self.label());
            self.apply_candidate(candidate).await;
        }
    }

    async fn apply_candidate(&self, candidate: IceCandidate) {
        if let Err(e) = self.agent.add_ice_candidate(candidate).await {
            warn!("[{}] Failed to add ICE candidate: {e}", self.label());
        }
    }

    async fn on_agent_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::LocalCandidate(candidate) => {
                if let Err(e) = self.relay.publish(&candidate).await {
                    error!("[{}] Failed to publish ICE candidate: {e}", self.label());
                }
                self.gathered.push(candidate);
            }
            AgentEvent::GatheringComplete => {
                analyze_candidates(self.label(), &self.gathered);
            }
            AgentEvent::LinkChanged(link) => {
                self.link_tx.send_replace(link);
                info!("[{}] ICE Connection State: {link:?}", self.label());
                if link == LinkState::Connected && self.state.awaits_link() {
                    if let Err(e) = self.advance(NegotiationState::Connected) {
                        error!("[{}] {e}", self.label());
                    }
                }
            }
        }
    }
}
