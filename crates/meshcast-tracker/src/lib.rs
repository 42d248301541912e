//! Connection-oriented coordinator (spec §2, §4.2): groups peers by content
//! id into rooms, forwards signaling envelopes, and emits join/leave events.
//! Many participants connect concurrently; mutations to the shared rooms
//! map are serialized behind one coarse mutex since mutation rate is low
//! (spec §5) — an async-task-per-connection model (axum's own) on top of
//! that is sufficient.

mod config;
mod envelope;
mod error;
mod http;
mod rate_limit;
mod room;
mod tracker;
mod ws;

pub use config::TrackerConfig;
pub use envelope::{Envelope, PeerInfo};
pub use error::TrackerError;
pub use room::TrackerState;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

/// Binds the tracker's HTTP/WebSocket listener and runs it, along with the
/// stale-sweep background task, until the process is torn down.
pub async fn serve(bind: SocketAddr, config: TrackerConfig) -> Result<(), TrackerError> {
    let state = Arc::new(TrackerState::new());

    tokio::spawn(tracker::run_stale_sweep(state.clone(), config.clone()));

    let app = http::router(state);
    let listener = TcpListener::bind(bind).await.map_err(|e| TrackerError::Bind(e.to_string()))?;
    info!(%bind, "tracker listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|e| TrackerError::Bind(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use meshcast_swarm::{ContentId, ParticipantId};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    async fn spawn_tracker(config: TrackerConfig) -> SocketAddr {
        let state = Arc::new(TrackerState::new());
        tokio::spawn(tracker::run_stale_sweep(state.clone(), config));
        let app = http::router(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await.unwrap();
        });
        addr
    }

    type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    async fn connect(addr: SocketAddr) -> (ParticipantId, WsStream) {
        let url = format!("ws://{addr}/ws");
        let (mut stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let welcome = recv_envelope(&mut stream).await;
        let Envelope::Welcome { participant_id } = welcome else { panic!("expected welcome, got {welcome:?}") };
        (participant_id, stream)
    }

    async fn recv_envelope(stream: &mut WsStream) -> Envelope {
        loop {
            match tokio::time::timeout(Duration::from_secs(5), stream.next()).await {
                Ok(Some(Ok(WsMessage::Text(text)))) => return serde_json::from_str(&text).unwrap(),
                Ok(Some(Ok(_))) => continue,
                other => panic!("did not receive expected envelope: {other:?}"),
            }
        }
    }

    async fn send_envelope(stream: &mut WsStream, envelope: &Envelope) {
        stream.send(WsMessage::Text(serde_json::to_string(envelope).unwrap())).await.unwrap();
    }

    #[tokio::test]
    async fn announce_gets_welcomed_peer_list_and_joins_broadcast() {
        let addr = spawn_tracker(TrackerConfig::default()).await;
        let (a_id, mut a) = connect(addr).await;
        let (b_id, mut b) = connect(addr).await;

        let content = ContentId::from("room-1".to_string());
        send_envelope(&mut a, &Envelope::Announce { content: content.clone(), complete: true, meta: None }).await;
        let response = recv_envelope(&mut a).await;
        assert_eq!(response, Envelope::AnnounceResponse { content: content.clone(), peers: vec![] });

        send_envelope(&mut b, &Envelope::Announce { content: content.clone(), complete: false, meta: None }).await;
        let response_b = recv_envelope(&mut b).await;
        match response_b {
            Envelope::AnnounceResponse { peers, .. } => {
                assert_eq!(peers.len(), 1);
                assert_eq!(peers[0].peer_id, a_id);
                assert!(peers[0].complete);
            }
            other => panic!("unexpected: {other:?}"),
        }

        let joined = recv_envelope(&mut a).await;
        match joined {
            Envelope::PeerJoinedSwarm { peer_id, complete, .. } => {
                assert_eq!(peer_id, b_id);
                assert!(!complete);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn leave_broadcasts_peer_left_swarm() {
        let addr = spawn_tracker(TrackerConfig::default()).await;
        let (_a_id, mut a) = connect(addr).await;
        let (b_id, mut b) = connect(addr).await;

        let content = ContentId::from("room-2".to_string());
        send_envelope(&mut a, &Envelope::Announce { content: content.clone(), complete: false, meta: None }).await;
        let _ = recv_envelope(&mut a).await;
        send_envelope(&mut b, &Envelope::Announce { content: content.clone(), complete: false, meta: None }).await;
        let _ = recv_envelope(&mut b).await;
        let _ = recv_envelope(&mut a).await; // peer-joined-swarm for b

        send_envelope(&mut b, &Envelope::Leave { content: content.clone() }).await;
        let left = recv_envelope(&mut a).await;
        assert_eq!(left, Envelope::PeerLeftSwarm { content, peer_id: b_id });
    }

    #[tokio::test]
    async fn request_connection_fans_out_to_other_connected_participants() {
        let addr = spawn_tracker(TrackerConfig::default()).await;
        let (a_id, mut a) = connect(addr).await;
        let (_b_id, mut b) = connect(addr).await;

        let meta = serde_json::json!({"addr": "/ip4/127.0.0.1/tcp/4001/p2p/12D3Koo..."});
        send_envelope(&mut a, &Envelope::RequestConnection { from: None, meta: Some(meta.clone()) }).await;
        let received = recv_envelope(&mut b).await;
        assert_eq!(received, Envelope::RequestConnection { from: Some(a_id), meta: Some(meta) });
    }

    #[tokio::test]
    async fn offer_is_forwarded_only_to_its_recipient() {
        let addr = spawn_tracker(TrackerConfig::default()).await;
        let (a_id, mut a) = connect(addr).await;
        let (b_id, mut b) = connect(addr).await;

        let payload = serde_json::json!({"sdp": "v=0"});
        send_envelope(&mut a, &Envelope::Offer { from: a_id, to: b_id, payload: payload.clone() }).await;
        let received = recv_envelope(&mut b).await;
        assert_eq!(received, Envelope::Offer { from: a_id, to: b_id, payload });

        let _ = a;
    }

    #[tokio::test]
    async fn unknown_envelope_type_is_dropped_without_disconnect() {
        let addr = spawn_tracker(TrackerConfig::default()).await;
        let (_id, mut a) = connect(addr).await;
        a.send(WsMessage::Text(r#"{"type":"bogus"}"#.to_string())).await.unwrap();

        let content = ContentId::from("room-3".to_string());
        send_envelope(&mut a, &Envelope::Announce { content: content.clone(), complete: false, meta: None }).await;
        let response = recv_envelope(&mut a).await;
        assert_eq!(response, Envelope::AnnounceResponse { content, peers: vec![] });
    }

    #[tokio::test]
    async fn peers_debug_endpoint_reports_room_membership() {
        let addr = spawn_tracker(TrackerConfig::default()).await;
        let (a_id, mut a) = connect(addr).await;

        let content = ContentId::from("room-http".to_string());
        send_envelope(&mut a, &Envelope::Announce { content: content.clone(), complete: true, meta: None }).await;
        let _ = recv_envelope(&mut a).await;

        let url = format!("http://{addr}/peers?infoHash=room-http");
        let body: crate::http::PeersResponse = reqwest::get(url).await.unwrap().json().await.unwrap();
        assert_eq!(body.peers.len(), 1);
        assert_eq!(body.peers[0].peer_id, a_id);
        assert!(body.peers[0].complete);
        assert!(body.peers[0].last_seen > 0);
    }

    #[tokio::test]
    async fn stale_sweep_evicts_abandoned_memberships() {
        let config = TrackerConfig {
            sweep_period: Duration::from_millis(20),
            stale_threshold: Duration::from_millis(10),
            ..TrackerConfig::default()
        };
        let addr = spawn_tracker(config).await;
        let (_a_id, mut a) = connect(addr).await;

        let content = ContentId::from("room-stale".to_string());
        send_envelope(&mut a, &Envelope::Announce { content: content.clone(), complete: false, meta: None }).await;
        let _ = recv_envelope(&mut a).await;

        // Never refreshed again: the sweep must evict it once the threshold
        // passes, even though the transport itself stays open.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let url = format!("http://{addr}/peers?infoHash=room-stale");
            let body: crate::http::PeersResponse = reqwest::get(&url).await.unwrap().json().await.unwrap();
            if body.peers.is_empty() {
                break;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("stale membership was never swept");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
