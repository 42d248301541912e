//! Binds tracker envelopes to transport dials and transport frames to
//! `meshcast_swarm`'s pure `Action`s — the engine described in SPEC_FULL.md
//! §4.5. Grounded on the teacher's `P2pNode`/`P2pHandle` split: a
//! [`Coordinator`] owns the event loop and runs to completion in a spawned
//! task, while [`CoordinatorHandle`] lets the host application issue
//! commands (`share_model`, `join`) into that loop from the outside.

use std::collections::HashMap;
use std::sync::Arc;

use meshcast_chunker::{Provenance, Transform};
use meshcast_swarm::{Action, Bitfield, ContentId, ParticipantId, Swarm};
use meshcast_transport::{Frame, Multiaddr, PeerId, TransportEvent, TransportHandle, TransportNode};
use meshcast_tracker::{Envelope, PeerInfo};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::address_book::AddressBook;
use crate::config::EngineConfig;
use crate::error::CoordinatorError;
use crate::peer::PeerState;
use crate::scene::{CoordinatorEvent, SceneSink};
use crate::tracker_client::TrackerConnection;

enum Command {
    ShareModel {
        bytes: Vec<u8>,
        transform: Transform,
        provenance: Provenance,
        reply: oneshot::Sender<Result<ContentId, CoordinatorError>>,
    },
    Join {
        content: ContentId,
        reply: oneshot::Sender<Result<(), CoordinatorError>>,
    },
    Shutdown,
}

#[derive(Clone)]
pub struct CoordinatorHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    /// Slice `bytes` into pieces, create a seeder swarm, announce it to the
    /// tracker as complete, and push `metadata`+`bitfield` to every peer
    /// already on the open mesh (§4.5 "Sharing a new artifact").
    pub async fn share_model(
        &self,
        bytes: Vec<u8>,
        transform: Transform,
        provenance: Provenance,
    ) -> Result<ContentId, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ShareModel { bytes, transform, provenance, reply })
            .await
            .map_err(|_| CoordinatorError::Tracker("coordinator loop gone".into()))?;
        rx.await.map_err(|_| CoordinatorError::Tracker("coordinator loop gone".into()))?
    }

    /// Register interest in `content` with the tracker (visibility only —
    /// the actual leecher swarm is created lazily the moment a peer's
    /// `metadata` frame for it arrives, per §4.5 "On inbound metadata").
    pub async fn join(&self, content: ContentId) -> Result<(), CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Join { content, reply })
            .await
            .map_err(|_| CoordinatorError::Tracker("coordinator loop gone".into()))?;
        rx.await.map_err(|_| CoordinatorError::Tracker("coordinator loop gone".into()))?
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown).await;
    }
}

pub struct Coordinator {
    config: EngineConfig,
    scene: Arc<dyn SceneSink>,
    events_tx: broadcast::Sender<CoordinatorEvent>,
    cmd_rx: mpsc::Receiver<Command>,
}

impl Coordinator {
    pub fn new(config: EngineConfig, scene: Arc<dyn SceneSink>) -> (Self, CoordinatorHandle, broadcast::Receiver<CoordinatorEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (events_tx, events_rx) = broadcast::channel(256);
        (Coordinator { config, scene, events_tx, cmd_rx }, CoordinatorHandle { cmd_tx }, events_rx)
    }

    /// Runs until a `shutdown` command arrives or the transport dies.
    /// Tracker connectivity is reconnected-with-backoff internally (§6
    /// default 3s delay); a dropped tracker session never tears down the
    /// already-open peer transports.
    pub async fn run(mut self) -> Result<(), CoordinatorError> {
        let (node, transport) = TransportNode::new(self.config.transport.clone());
        let mut transport_events = transport.subscribe_events();
        tokio::spawn(node.run(self.config.listen_addr.clone()));

        let own_addr = wait_for_listen_addr(&mut transport_events, &transport).await?;
        tracing::info!(%own_addr, "transport listening");

        let mut state = EngineState {
            self_participant: None,
            own_addr,
            swarms: HashMap::new(),
            peers: HashMap::new(),
            book: AddressBook::new(),
            transport,
            scene: self.scene.clone(),
            events_tx: self.events_tx.clone(),
            pending_reannounce: Vec::new(),
        };

        let mut cmd_open = true;
        loop {
            let tracker = match TrackerConnection::connect(&self.config.tracker_url).await {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(error = %e, "tracker unreachable, retrying");
                    let _ = state.events_tx.send(CoordinatorEvent::TrackerUnavailable);
                    tokio::time::sleep(self.config.tracker_reconnect_delay).await;
                    continue;
                }
            };

            match run_session(&mut state, tracker, &mut self.cmd_rx, &mut transport_events, &mut cmd_open).await {
                SessionOutcome::Shutdown => return Ok(()),
                SessionOutcome::Lost(e) => {
                    tracing::warn!(error = %e, "tracker session ended, reconnecting");
                    let _ = state.events_tx.send(CoordinatorEvent::TrackerUnavailable);
                    tokio::time::sleep(self.config.tracker_reconnect_delay).await;
                }
            }
        }
    }
}

enum SessionOutcome {
    Shutdown,
    Lost(CoordinatorError),
}

/// Coordinator-owned runtime state, split out of [`Coordinator`] so it
/// survives across tracker reconnects — only the tracker connection itself
/// is torn down and rebuilt, never the peer transports or swarm state.
struct EngineState {
    /// Our own tracker-assigned identity, set at the start of each tracker
    /// session (it is ephemeral and may change across reconnects, per §6 —
    /// participant identities are not persisted).
    self_participant: Option<ParticipantId>,
    own_addr: Multiaddr,
    swarms: HashMap<ContentId, Swarm>,
    peers: HashMap<ParticipantId, PeerState>,
    book: AddressBook,
    transport: TransportHandle,
    scene: Arc<dyn SceneSink>,
    events_tx: broadcast::Sender<CoordinatorEvent>,
    /// Content ids that just finished reassembly and still owe the tracker a
    /// `complete=true` re-announce (§4.5, §8 #1/#6). Frame handling has no
    /// access to the live `TrackerConnection` — only `run_session` does — so
    /// completion is queued here and drained once control returns to it.
    pending_reannounce: Vec<ContentId>,
}

async fn wait_for_listen_addr(
    events: &mut broadcast::Receiver<TransportEvent>,
    transport: &TransportHandle,
) -> Result<Multiaddr, CoordinatorError> {
    loop {
        match events.recv().await {
            Ok(TransportEvent::Listening { address }) => {
                return address
                    .with_p2p(transport.local_peer_id())
                    .map_err(|a| CoordinatorError::BadAddr(format!("could not attach peer id to {a}")));
            }
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => {
                return Err(CoordinatorError::Transport(meshcast_transport::TransportError::Shutdown))
            }
        }
    }
}

fn addr_meta(addr: &Multiaddr) -> serde_json::Value {
    serde_json::json!({"addr": addr.to_string()})
}

async fn announce(state: &EngineState, tracker: &mut TrackerConnection, content: ContentId, complete: bool) -> Result<(), CoordinatorError> {
    tracker
        .send(&Envelope::Announce { content, complete, meta: Some(addr_meta(&state.own_addr)) })
        .await
}

async fn run_session(
    state: &mut EngineState,
    mut tracker: TrackerConnection,
    cmd_rx: &mut mpsc::Receiver<Command>,
    transport_events: &mut broadcast::Receiver<TransportEvent>,
    cmd_open: &mut bool,
) -> SessionOutcome {
    state.self_participant = Some(tracker.participant_id);

    if let Err(e) = tracker.send(&Envelope::RequestConnection { from: None, meta: Some(addr_meta(&state.own_addr)) }).await {
        return SessionOutcome::Lost(e);
    }

    let active: Vec<(ContentId, bool)> = state.swarms.iter().map(|(c, s)| (c.clone(), s.is_seeder())).collect();
    for (content, complete) in active {
        if let Err(e) = announce(state, &mut tracker, content, complete).await {
            return SessionOutcome::Lost(e);
        }
    }
    let _ = state.events_tx.send(CoordinatorEvent::TrackerReconnected);

    loop {
        tokio::select! {
            result = tracker.recv() => {
                match result {
                    Ok(Some(envelope)) => {
                        handle_tracker_envelope(state, envelope).await;
                    }
                    Ok(None) => return SessionOutcome::Lost(CoordinatorError::Tracker("connection closed".into())),
                    Err(e) => return SessionOutcome::Lost(e),
                }
            }
            event = transport_events.recv() => {
                match event {
                    Ok(ev) => handle_transport_event(state, ev).await,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return SessionOutcome::Shutdown,
                }
            }
            cmd = cmd_rx.recv(), if *cmd_open => {
                match cmd {
                    Some(Command::Shutdown) | None => {
                        *cmd_open = false;
                        if cmd.is_none() { continue; }
                        return SessionOutcome::Shutdown;
                    }
                    Some(other) => {
                        if let Err(e) = handle_command(state, &mut tracker, other).await {
                            return SessionOutcome::Lost(e);
                        }
                    }
                }
            }
        }

        let finished: Vec<ContentId> = state.pending_reannounce.drain(..).collect();
        for content in finished {
            if let Err(e) = announce(state, &mut tracker, content, true).await {
                return SessionOutcome::Lost(e);
            }
        }
    }
}

async fn handle_command(state: &mut EngineState, tracker: &mut TrackerConnection, cmd: Command) -> Result<(), CoordinatorError> {
    match cmd {
        Command::ShareModel { bytes, transform, provenance, reply } => {
            let result = share_model(state, tracker, bytes, transform, provenance).await;
            let _ = reply.send(result);
        }
        Command::Join { content, reply } => {
            let result = announce(state, tracker, content, false).await;
            let _ = reply.send(result);
        }
        Command::Shutdown => unreachable!("handled by caller"),
    }
    Ok(())
}

async fn share_model(
    state: &mut EngineState,
    tracker: &mut TrackerConnection,
    bytes: Vec<u8>,
    transform: Transform,
    provenance: Provenance,
) -> Result<ContentId, CoordinatorError> {
    let (package, pieces) = meshcast_chunker::prepare(&bytes, transform, provenance)?;
    let content = package.content_id.clone();
    let swarm = meshcast_swarm::create_swarm(content.clone(), Some(package), pieces);
    state.swarms.insert(content.clone(), swarm);
    announce(state, tracker, content.clone(), true).await?;

    let transport = state.transport.clone();
    let swarm = state.swarms[&content].clone();
    for peer_state in state.peers.values_mut() {
        push_swarm_to_peer(&transport, &swarm, peer_state).await;
    }
    Ok(content)
}

/// Push `metadata`+`bitfield` for `swarm` to `peer` if not already done
/// (§4.5 "Idempotence" — repeated resolution of the same peer must not
/// resend).
async fn push_swarm_to_peer(transport: &TransportHandle, swarm: &Swarm, peer: &mut PeerState) {
    if peer.informed.contains(&swarm.content_id) {
        return;
    }
    let Some(package) = swarm.metadata.clone() else { return };
    if transport.send_frame(peer.peer_id, Frame::Metadata { package }).await.is_err() {
        return;
    }
    let bitfield = bitfield_from_swarm(swarm);
    let _ = transport
        .send_frame(peer.peer_id, Frame::Bitfield { content: swarm.content_id.clone(), total: swarm.total, raw: bitfield.raw().to_vec() })
        .await;
    peer.informed.insert(swarm.content_id.clone());
}

fn bitfield_from_swarm(swarm: &Swarm) -> Bitfield {
    let mut bf = Bitfield::empty(swarm.total);
    for index in &swarm.owned {
        bf.set(*index);
    }
    bf
}

async fn handle_tracker_envelope(state: &mut EngineState, envelope: Envelope) {
    match envelope {
        Envelope::RequestConnection { from: Some(participant), meta } => {
            match state.book.learn(participant, meta.as_ref()) {
                Ok(Some(addr)) => {
                    if let Err(e) = state.transport.dial(addr).await {
                        tracing::warn!(peer = %participant, error = %e, "dial to newly-announced participant failed");
                    }
                }
                Ok(None) => tracing::debug!(peer = %participant, "request-connection carried no dial address"),
                Err(e) => tracing::warn!(peer = %participant, error = %e, "malformed request-connection meta"),
            }
        }
        Envelope::AnnounceResponse { peers, .. } | Envelope::PeerJoinedSwarm { peers, .. } => {
            learn_peer_addrs(state, &peers);
        }
        Envelope::Welcome { .. } => {
            tracing::debug!("unexpected welcome mid-session, ignoring");
        }
        Envelope::PeerLeftSwarm { content, peer_id } => {
            tracing::debug!(peer = %peer_id, content = %content, "peer left swarm");
        }
        Envelope::RequestConnection { from: None, .. }
        | Envelope::Offer { .. }
        | Envelope::Answer { .. }
        | Envelope::IceCandidate { .. }
        | Envelope::Unknown => {
            tracing::debug!("ignoring envelope not used by this transport's connection bootstrap");
        }
        Envelope::Leave { .. } => {}
        Envelope::Announce { .. } => {
            // Outbound-only from this side; the tracker never echoes it back.
        }
    }
}

fn learn_peer_addrs(state: &mut EngineState, peers: &[PeerInfo]) {
    for peer in peers {
        if let Err(e) = state.book.learn(peer.peer_id, peer.meta.as_ref()) {
            tracing::debug!(peer = %peer.peer_id, error = %e, "could not learn address from room snapshot");
        }
    }
}

async fn handle_transport_event(state: &mut EngineState, event: TransportEvent) {
    match event {
        TransportEvent::Listening { .. } => {}
        TransportEvent::PeerConnected { peer } => {
            if let Some(self_id) = state.self_participant {
                let _ = state.transport.send_frame(peer, Frame::Hello { participant_id: self_id }).await;
            }
            if let Some(participant) = state.book.participant_for(&peer) {
                resolve_peer(state, participant, peer).await;
            }
            state.scene.on_peer_connected(peer);
            let _ = state.events_tx.send(CoordinatorEvent::PeerConnected { peer });
        }
        TransportEvent::PeerDisconnected { peer } => {
            if let Some(participant) = state.book.participant_for(&peer) {
                state.peers.remove(&participant);
            }
            state.scene.on_peer_disconnected(peer);
            let _ = state.events_tx.send(CoordinatorEvent::PeerDisconnected { peer });
        }
        TransportEvent::FrameReceived { peer, frame } => {
            handle_frame(state, peer, frame).await;
        }
        TransportEvent::Error(e) => {
            tracing::warn!(error = %e, "transport error");
        }
    }
}

async fn resolve_peer(state: &mut EngineState, participant: ParticipantId, peer_id: PeerId) {
    if state.peers.contains_key(&participant) {
        return;
    }
    state.peers.insert(participant, PeerState::new(peer_id));
    let transport = state.transport.clone();
    let swarms: Vec<Swarm> = state.swarms.values().cloned().collect();
    let peer_state = state.peers.get_mut(&participant).expect("just inserted");
    for swarm in &swarms {
        push_swarm_to_peer(&transport, swarm, peer_state).await;
    }
}

async fn handle_frame(state: &mut EngineState, peer_id: PeerId, frame: Frame) {
    match frame {
        Frame::Hello { participant_id } => {
            state.book.learn_peer_id(participant_id, peer_id);
            resolve_peer(state, participant_id, peer_id).await;
        }
        Frame::Metadata { package } => {
            let content = package.content_id.clone();
            state
                .swarms
                .entry(content.clone())
                .or_insert_with(|| meshcast_swarm::create_swarm(content, Some(package.clone()), Vec::new()))
                .adopt_metadata(package);
        }
        Frame::Bitfield { content, total, raw } => {
            let Some(participant) = state.book.participant_for(&peer_id) else { return };
            let bitfield = Bitfield::from_raw(total, raw);
            if let Some(peer_state) = state.peers.get_mut(&participant) {
                peer_state.bitfields.insert(content.clone(), bitfield.clone());
                peer_state.touch();
            }
            if let Some(swarm) = state.swarms.get_mut(&content) {
                if !swarm.is_seeder() {
                    let actions = meshcast_swarm::request_chunks_from_peer(swarm, participant, &bitfield);
                    dispatch_actions(state, actions).await;
                }
            }
        }
        Frame::Have { content, index } => {
            let Some(participant) = state.book.participant_for(&peer_id) else { return };
            let Some(swarm) = state.swarms.get_mut(&content) else { return };
            let bitfield = state
                .peers
                .get_mut(&participant)
                .map(|p| p.bitfields.entry(content.clone()).or_insert_with(|| Bitfield::empty(swarm.total)));
            let Some(bitfield) = bitfield else { return };
            bitfield.set(index);
            if !swarm.is_seeder() {
                let bitfield = bitfield.clone();
                let actions = meshcast_swarm::request_chunks_from_peer(swarm, participant, &bitfield);
                dispatch_actions(state, actions).await;
            }
        }
        Frame::Request { content, index } => {
            let Some(participant) = state.book.participant_for(&peer_id) else { return };
            if let Some(swarm) = state.swarms.get(&content) {
                if let Some(action) = meshcast_swarm::handle_request(swarm, participant, index) {
                    dispatch_actions(state, vec![action]).await;
                }
            }
        }
        Frame::Piece { piece } => {
            let Some(participant) = state.book.participant_for(&peer_id) else { return };
            let content = piece.content_id.clone();
            let Some(swarm) = state.swarms.get_mut(&content) else { return };
            let peer_bitfields = collect_bitfields_for(&state.peers, &content);
            let actions = meshcast_swarm::handle_piece(swarm, participant, piece, &peer_bitfields);
            dispatch_actions(state, actions).await;
        }
        Frame::Unknown => {
            tracing::debug!(peer = %peer_id, "dropping frame of unrecognized kind");
        }
    }
}

fn collect_bitfields_for(peers: &HashMap<ParticipantId, PeerState>, content: &ContentId) -> HashMap<ParticipantId, Bitfield> {
    peers.iter().filter_map(|(id, p)| p.bitfields.get(content).map(|bf| (*id, bf.clone()))).collect()
}

async fn dispatch_actions(state: &mut EngineState, actions: Vec<Action>) {
    for action in actions {
        match action {
            Action::RequestChunk { peer, content, index } => {
                if let Some(peer_id) = state.peers.get(&peer).map(|p| p.peer_id) {
                    let _ = state.transport.send_frame(peer_id, Frame::Request { content, index }).await;
                }
            }
            Action::SendPiece { peer, piece, .. } => {
                if let Some(peer_id) = state.peers.get(&peer).map(|p| p.peer_id) {
                    let _ = state.transport.send_frame(peer_id, Frame::Piece { piece }).await;
                }
            }
            Action::BroadcastHave { content, index } => {
                let transport = state.transport.clone();
                let targets: Vec<PeerId> = state.peers.values().map(|p| p.peer_id).collect();
                for peer_id in targets {
                    let _ = transport.send_frame(peer_id, Frame::Have { content: content.clone(), index }).await;
                }
            }
            Action::DownloadProgress { content, percent } => {
                state.scene.on_download_progress(content.clone(), percent);
                let _ = state.events_tx.send(CoordinatorEvent::DownloadProgress { content, percent });
            }
            Action::DownloadComplete { content } => {
                assemble_and_announce(state, content).await;
            }
        }
    }
}

/// On assembly failure (corrupt/missing piece despite passing per-piece
/// checksums, e.g. a short last piece mismatch), log and leave the swarm as
/// is rather than emitting a model to the scene collaborator (§7
/// AssemblyError) — the tracker re-announce is skipped too, since the swarm
/// isn't actually complete.
async fn assemble_and_announce(state: &mut EngineState, content: ContentId) {
    let Some(swarm) = state.swarms.get(&content) else { return };
    let pieces = swarm.received.values().cloned().collect();
    match meshcast_chunker::assemble(swarm.total, pieces) {
        Ok(bytes) => {
            if let Some(package) = swarm.metadata.clone() {
                state.scene.on_model_received(package.clone(), bytes.clone());
                let _ = state.events_tx.send(CoordinatorEvent::ModelReceived { package, blob: bytes });
            }
            state.pending_reannounce.push(content);
        }
        Err(e) => {
            tracing::warn!(content = %content, error = %e, "assembly failed, not emitting model-received");
        }
    }
}
