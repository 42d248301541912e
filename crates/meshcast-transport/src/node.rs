//! Transport node event loop: owns the libp2p swarm, dials peers handed out
//! by the tracker, exchanges [`Frame`]s, and enforces the connection
//! lifecycle in [`crate::lifecycle`].
//!
//! Grounded on the teacher's `P2pNode`/`P2pHandle`/`NodeState` split:
//! obtain a [`TransportHandle`] before calling `run()` so commands can be
//! sent and events subscribed to while the loop runs in a spawned task.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use libp2p::{
    identify, identity, request_response,
    swarm::{dial_opts::DialOpts, Swarm, SwarmEvent},
    Multiaddr, PeerId,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

use crate::behaviour::{TransportBehaviour, TransportBehaviourEvent};
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::frame::{Ack, Frame};
use crate::lifecycle::ConnTracker;
use crate::transport::{build_transport, swarm_config};

type NodeSwarm = Swarm<TransportBehaviour>;

const GRACE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub enum TransportEvent {
    Listening { address: Multiaddr },
    PeerConnected { peer: PeerId },
    PeerDisconnected { peer: PeerId },
    FrameReceived { peer: PeerId, frame: Frame },
    Error(TransportError),
}

#[derive(Debug)]
pub(crate) enum TransportCommand {
    Dial {
        addr: Multiaddr,
        reply_tx: oneshot::Sender<Result<(), TransportError>>,
    },
    SendFrame {
        peer: PeerId,
        frame: Frame,
        reply_tx: oneshot::Sender<Result<(), TransportError>>,
    },
    Shutdown,
}

#[derive(Clone)]
pub struct TransportHandle {
    cmd_tx: mpsc::Sender<TransportCommand>,
    event_tx: broadcast::Sender<TransportEvent>,
    local_peer_id: PeerId,
}

impl TransportHandle {
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent> {
        self.event_tx.subscribe()
    }

    pub async fn dial(&self, addr: Multiaddr) -> Result<(), TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(TransportCommand::Dial { addr, reply_tx })
            .await
            .map_err(|_| TransportError::Shutdown)?;
        reply_rx.await.map_err(|_| TransportError::Shutdown)?
    }

    pub async fn send_frame(&self, peer: PeerId, frame: Frame) -> Result<(), TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(TransportCommand::SendFrame { peer, frame, reply_tx })
            .await
            .map_err(|_| TransportError::Shutdown)?;
        reply_rx.await.map_err(|_| TransportError::Shutdown)?
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(TransportCommand::Shutdown).await;
    }
}

pub struct TransportNode {
    config: TransportConfig,
    key: identity::Keypair,
    event_tx: broadcast::Sender<TransportEvent>,
    cmd_rx: mpsc::Receiver<TransportCommand>,
}

impl TransportNode {
    /// Build a node with a fresh ed25519 identity (participant keys are not
    /// persisted — there is no state to carry across sessions for a
    /// participant, per §6).
    pub fn new(config: TransportConfig) -> (Self, TransportHandle) {
        let key = identity::Keypair::generate_ed25519();
        let (event_tx, _) = broadcast::channel(256);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let local_peer_id = PeerId::from(key.public());
        let handle = TransportHandle { cmd_tx, event_tx: event_tx.clone(), local_peer_id };
        (TransportNode { config, key, event_tx, cmd_rx }, handle)
    }

    pub fn local_peer_id(&self) -> PeerId {
        PeerId::from(self.key.public())
    }

    pub async fn run(self, listen_addr: Multiaddr) -> Result<(), TransportError> {
        let local_peer_id = self.local_peer_id();
        let transport = build_transport(&self.key)?;
        let behaviour = TransportBehaviour::new(&self.key);
        let mut swarm = Swarm::new(transport, behaviour, local_peer_id, swarm_config(self.config.idle_timeout));
        swarm
            .listen_on(listen_addr)
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        let state = NodeState {
            lifecycle: ConnTracker::new(self.config.peer_cap),
            config: self.config,
            event_tx: self.event_tx,
            dial_addrs: HashMap::new(),
            pending_dials: HashMap::new(),
            pending_sends: HashMap::new(),
        };

        state.event_loop(swarm, self.cmd_rx).await
    }
}

struct NodeState {
    config: TransportConfig,
    event_tx: broadcast::Sender<TransportEvent>,
    lifecycle: ConnTracker,
    /// Dial address used for each peer we initiated the connection to —
    /// needed to redial on an ICE-restart-style recovery attempt.
    dial_addrs: HashMap<PeerId, Multiaddr>,
    pending_dials: HashMap<PeerId, oneshot::Sender<Result<(), TransportError>>>,
    pending_sends: HashMap<request_response::OutboundRequestId, oneshot::Sender<Result<(), TransportError>>>,
}

impl NodeState {
    async fn event_loop(mut self, mut swarm: NodeSwarm, mut cmd_rx: mpsc::Receiver<TransportCommand>) -> Result<(), TransportError> {
        let mut grace_check = interval(GRACE_CHECK_INTERVAL);
        grace_check.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = swarm.select_next_some() => {
                    self.on_swarm_event(&mut swarm, event);
                }
                _ = grace_check.tick() => {
                    self.on_grace_check(&mut swarm);
                }
                Some(cmd) = cmd_rx.recv() => {
                    if self.on_command(&mut swarm, cmd) {
                        break;
                    }
                }
                else => break,
            }
        }
        Ok(())
    }

    fn on_swarm_event(&mut self, swarm: &mut NodeSwarm, event: SwarmEvent<TransportBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                tracing::info!("transport listening on {address}");
                self.emit(TransportEvent::Listening { address });
            }
            SwarmEvent::ConnectionEstablished { peer_id, connection_id, .. } => {
                // Outbound peers already reserved a slot via `try_begin_offering`
                // in `on_command`; inbound peers reserve one here. Over-cap
                // inbound introductions are refused by closing the connection
                // without marking it open (§7 ResourceExhausted).
                if self.lifecycle.state_of(&peer_id) == crate::lifecycle::ConnState::New
                    && !self.lifecycle.try_begin_connecting(peer_id)
                {
                    tracing::warn!(peer = %peer_id, "peer cap reached, refusing inbound connection");
                    swarm.close_connection(connection_id);
                    return;
                }
                self.lifecycle.mark_open(peer_id);
                tracing::info!(peer = %peer_id, "peer connection open");
                if let Some(reply_tx) = self.pending_dials.remove(&peer_id) {
                    let _ = reply_tx.send(Ok(()));
                }
                self.emit(TransportEvent::PeerConnected { peer: peer_id });
            }
            SwarmEvent::ConnectionClosed { peer_id, num_established, .. } => {
                if num_established > 0 {
                    return;
                }
                if self.lifecycle.mark_disconnected(peer_id) {
                    tracing::info!(peer = %peer_id, "peer disconnected, entering grace window");
                }
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                tracing::debug!(peer = ?peer_id, %error, "outgoing connection error");
                if let Some(peer_id) = peer_id {
                    if let Some(reply_tx) = self.pending_dials.remove(&peer_id) {
                        let _ = reply_tx.send(Err(TransportError::Dial(error.to_string())));
                    }
                    if self.lifecycle.mark_disconnected(peer_id) {
                        tracing::info!(peer = %peer_id, "dial failed, entering grace window");
                    }
                }
            }
            SwarmEvent::Behaviour(TransportBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                for addr in info.listen_addrs {
                    swarm.add_peer_address(peer_id, addr);
                }
            }
            SwarmEvent::Behaviour(TransportBehaviourEvent::Frames(request_response::Event::Message {
                peer,
                message,
                ..
            })) => {
                self.on_frame_message(swarm, peer, message);
            }
            SwarmEvent::Behaviour(TransportBehaviourEvent::Frames(request_response::Event::OutboundFailure {
                request_id,
                error,
                ..
            })) => {
                if let Some(reply_tx) = self.pending_sends.remove(&request_id) {
                    let _ = reply_tx.send(Err(TransportError::SendFailed));
                }
                tracing::debug!(%error, "frame send failed");
            }
            SwarmEvent::Behaviour(TransportBehaviourEvent::Ping(event)) => {
                if let Err(error) = event.result {
                    tracing::debug!(peer = %event.peer, %error, "ping failed");
                }
            }
            _ => {}
        }
    }

    fn on_frame_message(&mut self, swarm: &mut NodeSwarm, peer: PeerId, message: request_response::Message<Frame, Ack>) {
        match message {
            request_response::Message::Request { request, channel, .. } => {
                self.emit(TransportEvent::FrameReceived { peer, frame: request });
                let _ = swarm.behaviour_mut().frames.send_response(channel, Ack);
            }
            request_response::Message::Response { request_id, .. } => {
                if let Some(reply_tx) = self.pending_sends.remove(&request_id) {
                    let _ = reply_tx.send(Ok(()));
                }
            }
        }
    }

    fn on_grace_check(&mut self, swarm: &mut NodeSwarm) {
        let now = tokio::time::Instant::now().into_std();

        for peer in self.lifecycle.due_for_ice_restart(self.config.disconnect_grace, now) {
            self.lifecycle.mark_ice_restart_attempted(peer);
            if let Some(addr) = self.dial_addrs.get(&peer).cloned() {
                tracing::info!(peer = %peer, "attempting ICE-restart-style redial");
                if let Err(e) = swarm.dial(DialOpts::peer_id(peer).addresses(vec![addr]).build()) {
                    tracing::debug!(peer = %peer, %e, "redial failed to start");
                }
            }
        }

        for peer in self.lifecycle.due_for_close(self.config.ice_restart_grace, now) {
            if self.lifecycle.mark_closed(peer) {
                tracing::info!(peer = %peer, "peer closed after failed ICE restart");
                self.dial_addrs.remove(&peer);
                self.emit(TransportEvent::PeerDisconnected { peer });
            }
        }
    }

    fn on_command(&mut self, swarm: &mut NodeSwarm, cmd: TransportCommand) -> bool {
        match cmd {
            TransportCommand::Dial { addr, reply_tx } => {
                let Some(peer) = peer_id_from_addr(&addr) else {
                    let _ = reply_tx.send(Err(TransportError::Dial("multiaddr missing /p2p suffix".into())));
                    return false;
                };
                if !self.lifecycle.try_begin_offering(peer) {
                    let _ = reply_tx.send(Err(TransportError::PeerCapReached(self.config.peer_cap)));
                    return false;
                }
                self.dial_addrs.insert(peer, addr.clone());
                match swarm.dial(addr) {
                    Ok(()) => {
                        self.pending_dials.insert(peer, reply_tx);
                    }
                    Err(e) => {
                        let _ = reply_tx.send(Err(TransportError::Dial(e.to_string())));
                    }
                }
                false
            }
            TransportCommand::SendFrame { peer, frame, reply_tx } => {
                if self.lifecycle.state_of(&peer) != crate::lifecycle::ConnState::Open {
                    let _ = reply_tx.send(Err(TransportError::NotConnected(peer.to_string())));
                    return false;
                }
                let request_id = swarm.behaviour_mut().frames.send_request(&peer, frame);
                self.pending_sends.insert(request_id, reply_tx);
                false
            }
            TransportCommand::Shutdown => true,
        }
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.event_tx.send(event);
    }
}

fn peer_id_from_addr(addr: &Multiaddr) -> Option<PeerId> {
    use libp2p::multiaddr::Protocol;
    addr.iter().find_map(|p| match p {
        Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    })
}
