//! Debug HTTP surface (§6): `GET /peers?infoHash=<id>` alongside the `/ws`
//! upgrade route.

use std::sync::Arc;

use axum::{extract::{Query, State}, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};

use crate::envelope::PeerInfo;
use crate::room::TrackerState;
use crate::ws::ws_handler;

#[derive(Debug, Deserialize)]
pub struct PeersQuery {
    #[serde(rename = "infoHash")]
    info_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PeersResponse {
    #[serde(rename = "infoHash")]
    pub info_hash: String,
    pub peers: Vec<PeerInfo>,
}

async fn get_peers(State(state): State<Arc<TrackerState>>, Query(q): Query<PeersQuery>) -> Json<PeersResponse> {
    let content = meshcast_swarm::ContentId::from(q.info_hash.clone());
    let peers = state.room_snapshot(&content).await;
    Json(PeersResponse { info_hash: q.info_hash, peers })
}

pub fn router(state: Arc<TrackerState>) -> Router {
    Router::new().route("/ws", get(ws_handler)).route("/peers", get(get_peers)).with_state(state)
}
