//! Room/membership state (spec §3, §4.2): content id → participant id →
//! record, guarded by one coarse mutex since mutation rate is low (§5).

use std::collections::HashMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use meshcast_swarm::{ContentId, ParticipantId};
use tokio::sync::{mpsc, Mutex};

use crate::envelope::{Envelope, PeerInfo};

fn epoch_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[derive(Debug, Clone)]
struct Membership {
    complete: bool,
    last_seen: Instant,
    last_seen_epoch_ms: u64,
    meta: Option<serde_json::Value>,
}

#[derive(Default)]
struct Rooms {
    rooms: HashMap<ContentId, HashMap<ParticipantId, Membership>>,
}

/// Shared tracker state: rooms plus the live outbound channel for every
/// currently connected participant (used for `to`-addressed forwarding and
/// the `request-connection` fan-out, both of which are scoped to the whole
/// connected set, not to a single room — see DESIGN.md).
pub struct TrackerState {
    rooms: Mutex<Rooms>,
    connections: Mutex<HashMap<ParticipantId, mpsc::Sender<Envelope>>>,
}

impl Default for TrackerState {
    fn default() -> Self {
        TrackerState { rooms: Mutex::new(Rooms::default()), connections: Mutex::new(HashMap::new()) }
    }
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_connection(&self, id: ParticipantId, tx: mpsc::Sender<Envelope>) {
        self.connections.lock().await.insert(id, tx);
    }

    pub async fn unregister_connection(&self, id: ParticipantId) {
        self.connections.lock().await.remove(&id);
    }

    pub async fn send_to(&self, to: ParticipantId, envelope: Envelope) {
        let connections = self.connections.lock().await;
        if let Some(tx) = connections.get(&to) {
            let _ = tx.send(envelope).await;
        }
    }

    /// Fan out to every connected participant other than `except`.
    pub async fn broadcast_all_except(&self, except: ParticipantId, envelope: Envelope) {
        let connections = self.connections.lock().await;
        for (id, tx) in connections.iter() {
            if *id != except {
                let _ = tx.send(envelope.clone()).await;
            }
        }
    }

    /// `announce{content, complete}`: create the room if absent, upsert the
    /// record (idempotent refresh), return the peer list excluding the
    /// announcer and the room's other members so the tracker can notify them.
    pub async fn announce(
        &self,
        content: ContentId,
        participant: ParticipantId,
        complete: bool,
        meta: Option<serde_json::Value>,
    ) -> (Vec<PeerInfo>, Vec<ParticipantId>) {
        let mut rooms = self.rooms.lock().await;
        let room = rooms.rooms.entry(content).or_default();
        room.insert(
            participant,
            Membership { complete, last_seen: Instant::now(), last_seen_epoch_ms: epoch_millis(), meta },
        );

        let peers: Vec<PeerInfo> = room
            .iter()
            .filter(|(id, _)| **id != participant)
            .map(|(id, m)| PeerInfo {
                peer_id: *id,
                complete: m.complete,
                last_seen: m.last_seen_epoch_ms,
                meta: m.meta.clone(),
            })
            .collect();
        let others: Vec<ParticipantId> = peers.iter().map(|p| p.peer_id).collect();
        (peers, others)
    }

    /// `leave{content}` or transport close for one room: remove the
    /// participant, drop the room if it becomes empty, return whether the
    /// participant was actually present (so callers only broadcast once).
    pub async fn leave(&self, content: &ContentId, participant: ParticipantId) -> bool {
        let mut rooms = self.rooms.lock().await;
        let Some(room) = rooms.rooms.get_mut(content) else { return false };
        let removed = room.remove(&participant).is_some();
        if room.is_empty() {
            rooms.rooms.remove(content);
        }
        removed
    }

    /// Remove a participant from every room it belongs to (full
    /// disconnect). Returns the list of rooms it was a member of.
    pub async fn leave_all(&self, participant: ParticipantId) -> Vec<ContentId> {
        let mut rooms = self.rooms.lock().await;
        let mut left = Vec::new();
        rooms.rooms.retain(|content, room| {
            if room.remove(&participant).is_some() {
                left.push(content.clone());
            }
            !room.is_empty()
        });
        left
    }

    /// Members of `content` other than `except` — used to scope the
    /// `peer-joined-swarm`/`peer-left-swarm` broadcast to the right room.
    pub async fn members_except(&self, content: &ContentId, except: ParticipantId) -> Vec<ParticipantId> {
        let rooms = self.rooms.lock().await;
        rooms
            .rooms
            .get(content)
            .map(|room| room.keys().filter(|id| **id != except).copied().collect())
            .unwrap_or_default()
    }

    /// `GET /peers?infoHash=<id>` (§6): the current snapshot for a room.
    pub async fn room_snapshot(&self, content: &ContentId) -> Vec<PeerInfo> {
        let rooms = self.rooms.lock().await;
        rooms
            .rooms
            .get(content)
            .map(|room| {
                room.iter()
                    .map(|(id, m)| PeerInfo {
                        peer_id: *id,
                        complete: m.complete,
                        last_seen: m.last_seen_epoch_ms,
                        meta: m.meta.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Stale sweep (§4.2): evict records whose `last_seen` exceeds
    /// `threshold`, returning `(content, peer_id)` pairs to broadcast
    /// `peer-left-swarm` for.
    pub async fn sweep_stale(&self, threshold: std::time::Duration) -> Vec<(ContentId, ParticipantId)> {
        let mut rooms = self.rooms.lock().await;
        let now = Instant::now();
        let mut evicted = Vec::new();
        rooms.rooms.retain(|content, room| {
            room.retain(|peer, membership| {
                if now.duration_since(membership.last_seen) >= threshold {
                    evicted.push((content.clone(), *peer));
                    false
                } else {
                    true
                }
            });
            !room.is_empty()
        });
        evicted
    }
}
