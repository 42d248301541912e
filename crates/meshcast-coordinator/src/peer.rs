use std::collections::{HashMap, HashSet};
use std::time::Instant;

use meshcast_swarm::{Bitfield, ContentId};
use meshcast_transport::PeerId;

/// Coordinator-owned per-neighbor state (spec §3 "Peer"). `peer_id` is the
/// transport-level identity frames are addressed to; `ParticipantId` (the
/// map key this lives under in `EngineState::peers`) is the tracker-level
/// identity the swarm manager keys bitfields and requests by.
pub struct PeerState {
    pub peer_id: PeerId,
    pub bitfields: HashMap<ContentId, Bitfield>,
    /// Contents we have already sent `metadata`+`bitfield` to this peer
    /// for — suppresses duplicate sends on repeated `channelOpen`-style
    /// resolution (§4.5 "Idempotence").
    pub informed: HashSet<ContentId>,
    pub last_activity: Instant,
}

impl PeerState {
    pub fn new(peer_id: PeerId) -> Self {
        PeerState { peer_id, bitfields: HashMap::new(), informed: HashSet::new(), last_activity: Instant::now() }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}
