//! WebSocket bridge, grounded on the gateway's `ws_handler`/`handle_socket`
//! pair: upgrade, then a `tokio::select!` between inbound browser frames and
//! outbound events from a per-connection channel. Here the outbound side is
//! a point-to-point `mpsc` (per participant) rather than a shared broadcast,
//! since envelopes are individually addressed or room-scoped, not global.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use meshcast_swarm::ParticipantId;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::rate_limit::EnvelopeLimiter;
use crate::room::TrackerState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<TrackerState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

pub async fn handle_socket(mut socket: WebSocket, state: Arc<TrackerState>) {
    let participant_id = ParticipantId::generate();
    let (tx, mut rx) = mpsc::channel::<Envelope>(64);
    state.register_connection(participant_id, tx).await;

    if send_envelope(&mut socket, &Envelope::Welcome { participant_id }).await.is_err() {
        state.unregister_connection(participant_id).await;
        return;
    }

    let limiter = EnvelopeLimiter::new(&Default::default());

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !limiter.check() {
                            warn!(%participant_id, "envelope rate limit exceeded, dropping");
                            continue;
                        }
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => {
                                handle_inbound(&state, participant_id, envelope).await;
                            }
                            Err(e) => {
                                debug!(%participant_id, error = %e, "malformed envelope, dropping");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(%participant_id, error = %e, "WebSocket recv error");
                        break;
                    }
                }
            }
            outgoing = rx.recv() => {
                match outgoing {
                    Some(envelope) => {
                        if send_envelope(&mut socket, &envelope).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.unregister_connection(participant_id).await;
    crate::tracker::on_disconnect(&state, participant_id).await;
    debug!(%participant_id, "tracker connection closed");
}

async fn handle_inbound(state: &Arc<TrackerState>, from: ParticipantId, envelope: Envelope) {
    match envelope {
        Envelope::Announce { content, complete, meta } => {
            crate::tracker::on_announce(state, from, content, complete, meta, Instant::now()).await;
        }
        Envelope::Leave { content } => {
            crate::tracker::on_leave(state, content, from).await;
        }
        Envelope::RequestConnection { meta, .. } => {
            state.broadcast_all_except(from, Envelope::RequestConnection { from: Some(from), meta }).await;
        }
        Envelope::Offer { to, .. } | Envelope::Answer { to, .. } | Envelope::IceCandidate { to, .. } => {
            state.send_to(to, envelope).await;
        }
        Envelope::Welcome { .. } | Envelope::AnnounceResponse { .. } | Envelope::PeerJoinedSwarm { .. }
        | Envelope::PeerLeftSwarm { .. } => {
            warn!(%from, "dropping tracker-originated envelope type received from a participant");
        }
        Envelope::Unknown => {
            debug!(%from, "dropping envelope of unknown type");
        }
    }
}

async fn send_envelope(socket: &mut WebSocket, envelope: &Envelope) -> Result<(), axum::Error> {
    let json = serde_json::to_string(envelope).expect("Envelope serialization is infallible");
    socket.send(Message::Text(json)).await
}
