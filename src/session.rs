//! One collaboration: a negotiation plus a replicated whiteboard.
//!
//! `Session` owns everything that belongs to a room (negotiation driver,
//! live whiteboard subscription, local stroke state) so that switching rooms
//! is a matter of closing one value and creating another.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::Result;
use crate::peer::agent::PeerAgent;
use crate::peer::coordinator::NegotiationCoordinator;
use crate::peer::state::Role;
use crate::relay::RelayStore;
use crate::room::RoomRegistry;
use crate::whiteboard::{
    Brush, DrawingEvent, PointerInput, StrokeRecorder, Surface, WhiteboardLog,
    WhiteboardReplicator,
};

pub struct Session<S: Surface + 'static> {
    room_id: String,
    negotiation: NegotiationCoordinator,
    board: WhiteboardLog,
    replicator: Arc<Mutex<WhiteboardReplicator<S>>>,
    recorder: StrokeRecorder,
    live: LiveTask,
}

/// Live whiteboard task; aborted when dropped.
struct LiveTask(Option<JoinHandle<()>>);

impl LiveTask {
    async fn stop(mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for LiveTask {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

impl<S: Surface + 'static> Session<S> {
    /// Creates a room and starts negotiating as the initiator.
    pub async fn create(
        store: Arc<dyn RelayStore>,
        agent: Arc<dyn PeerAgent>,
        surface: S,
        config: &AppConfig,
    ) -> Result<Self> {
        info!("--- [CREATOR] Starting 'Create Room' process ---");
        let registry = RoomRegistry::new(store.clone(), config);
        let room_id = registry.create().await?;
        info!("Initializing main app for room: {room_id}");

        let board = WhiteboardLog::new(store, &room_id);
        let replicator = Arc::new(Mutex::new(WhiteboardReplicator::new(surface)));
        let live = attach_board(&board, &replicator).await?;

        let negotiation =
            match NegotiationCoordinator::initiate(agent, &registry, &room_id, config).await {
                Ok(negotiation) => negotiation,
                Err(e) => {
                    live.stop().await;
                    return Err(e);
                }
            };
        Ok(Self::assemble(room_id, negotiation, board, replicator, live))
    }

    /// Joins an existing room as the responder.
    pub async fn join(
        store: Arc<dyn RelayStore>,
        agent: Arc<dyn PeerAgent>,
        room_id: &str,
        surface: S,
        config: &AppConfig,
    ) -> Result<Self> {
        info!("--- [JOINER] Starting 'Join Room' process ---");
        let registry = RoomRegistry::new(store.clone(), config);
        let negotiation = NegotiationCoordinator::respond(agent, &registry, room_id, config).await?;
        let room_id = negotiation.room_id().to_string();
        info!("Initializing main app for room: {room_id}");

        let board = WhiteboardLog::new(store, &room_id);
        let replicator = Arc::new(Mutex::new(WhiteboardReplicator::new(surface)));
        let live = match attach_board(&board, &replicator).await {
            Ok(live) => live,
            Err(e) => {
                if let Err(close_err) = negotiation.shutdown().await {
                    warn!("Failed to close negotiation after join error: {close_err}");
                }
                return Err(e);
            }
        };
        Ok(Self::assemble(room_id, negotiation, board, replicator, live))
    }

    fn assemble(
        room_id: String,
        negotiation: NegotiationCoordinator,
        board: WhiteboardLog,
        replicator: Arc<Mutex<WhiteboardReplicator<S>>>,
        live: LiveTask,
    ) -> Self {
        Self {
            room_id,
            negotiation,
            board,
            replicator,
            recorder: StrokeRecorder::default(),
            live,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn role(&self) -> Role {
        self.negotiation.role()
    }

    pub fn negotiation(&self) -> &NegotiationCoordinator {
        &self.negotiation
    }

    pub fn brush(&self) -> &Brush {
        self.recorder.brush()
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.recorder.set_brush(brush);
    }

    /// Feeds local pointer input; completed segments go to the log and are
    /// painted when they come back through the live subscription.
    pub async fn handle_input(&mut self, input: PointerInput) -> bool {
        match self.recorder.handle(input) {
            Some(event) => self.board.append(&event).await,
            None => false,
        }
    }

    /// Clears the board for everyone. Failures are logged only.
    pub async fn clear_board(&self) {
        if let Err(e) = self.board.clear().await {
            error!("Error clearing whiteboard: {e}");
        }
    }

    /// Repaints from the full history, e.g. after the surface was resized.
    pub async fn redraw(&self) {
        // hold the surface so live events wait for the replay
        let mut replicator = self.replicator.lock().await;
        match self.board.read_all().await {
            Ok(events) => replicator.replay_from(&events),
            Err(e) => error!("Error reading whiteboard history: {e}"),
        }
    }

    /// Runs `f` against the current surface.
    pub async fn with_surface<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let replicator = self.replicator.lock().await;
        f(replicator.surface())
    }

    /// Releases the whiteboard subscription and shuts the negotiation down.
    pub async fn close(self) -> Result<()> {
        self.live.stop().await;
        info!("Closed room {}", self.room_id);
        self.negotiation.shutdown().await
    }
}

/// Replays the history, then applies live events one at a time.
async fn attach_board<S: Surface + 'static>(
    board: &WhiteboardLog,
    replicator: &Arc<Mutex<WhiteboardReplicator<S>>>,
) -> Result<LiveTask> {
    let after = match board.read_all().await {
        Ok(history) => {
            let mut rep = replicator.lock().await;
            rep.replay_from(&history);
            rep.last_applied()
        }
        Err(e) => {
            warn!("Error reading whiteboard history: {e}");
            None
        }
    };
    let mut sub = board.subscribe(after).await?;
    let replicator = replicator.clone();
    Ok(LiveTask(Some(tokio::spawn(async move {
        while let Some(event) = sub.next().await {
            let painted = replicator.lock().await.apply_live(&event);
            if painted && matches!(event, DrawingEvent::Clear { .. }) {
                debug!("Whiteboard cleared");
            }
        }
    }))))
}
