//! Announce/leave/sweep dispatch (spec §4.2). Kept separate from `ws.rs` so
//! the room-mutation policy is independent of the WebSocket framing.

use std::sync::Arc;
use std::time::Instant;

use meshcast_swarm::{ContentId, ParticipantId};
use tracing::info;

use crate::envelope::Envelope;
use crate::room::TrackerState;

/// `announce{content, complete}`: idempotent upsert, respond to the sender
/// with the current membership, broadcast `peer-joined-swarm` to the rest
/// of the room.
pub async fn on_announce(
    state: &Arc<TrackerState>,
    from: ParticipantId,
    content: ContentId,
    complete: bool,
    meta: Option<serde_json::Value>,
    _now: Instant,
) {
    let (peers, others) = state.announce(content.clone(), from, complete, meta).await;
    state.send_to(from, Envelope::AnnounceResponse { content: content.clone(), peers: peers.clone() }).await;

    let joined = Envelope::PeerJoinedSwarm { content: content.clone(), peer_id: from, complete, peers };
    for other in others {
        state.send_to(other, joined.clone()).await;
    }
    info!(%from, content = %content.as_str(), complete, "announce processed");
}

/// `leave{content}` (explicit) — scoped to one room.
pub async fn on_leave(state: &Arc<TrackerState>, content: ContentId, participant: ParticipantId) {
    if state.leave(&content, participant).await {
        broadcast_left(state, content, participant).await;
    }
}

/// Transport close — leave every room the participant belonged to.
pub async fn on_disconnect(state: &Arc<TrackerState>, participant: ParticipantId) {
    for content in state.leave_all(participant).await {
        broadcast_left(state, content, participant).await;
    }
}

async fn broadcast_left(state: &Arc<TrackerState>, content: ContentId, participant: ParticipantId) {
    let members = state.members_except(&content, participant).await;
    let envelope = Envelope::PeerLeftSwarm { content, peer_id: participant };
    for member in members {
        state.send_to(member, envelope.clone()).await;
    }
    info!(%participant, "peer-left-swarm broadcast");
}

/// Stale sweep (§4.2): periodic task, evicts memberships whose `lastSeen`
/// exceeds the configured threshold and broadcasts `peer-left-swarm` for
/// each, exactly as an explicit `leave` would.
pub async fn run_stale_sweep(state: Arc<TrackerState>, config: crate::config::TrackerConfig) {
    let mut interval = tokio::time::interval(config.sweep_period);
    loop {
        interval.tick().await;
        let evicted = state.sweep_stale(config.stale_threshold).await;
        for (content, participant) in evicted {
            info!(%participant, content = %content.as_str(), "stale sweep evicted membership");
            broadcast_left(&state, content, participant).await;
        }
    }
}
