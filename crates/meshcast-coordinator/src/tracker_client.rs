//! Thin WebSocket client for the tracker's envelope protocol. Grounded on
//! `meshcast-tracker`'s own test harness (`connect`/`send_envelope`/
//! `recv_envelope` in its `lib.rs` test module) — same wire shape, promoted
//! to a real client instead of a test-only helper.

use futures::{SinkExt, StreamExt};
use meshcast_swarm::ParticipantId;
use meshcast_tracker::Envelope;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::CoordinatorError;

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TrackerConnection {
    pub participant_id: ParticipantId,
    stream: WsStream,
}

impl TrackerConnection {
    /// Connect to `url` (e.g. `ws://127.0.0.1:9000/ws`) and consume the
    /// tracker's `welcome` envelope, which is always the first message.
    pub async fn connect(url: &str) -> Result<Self, CoordinatorError> {
        let (mut stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| CoordinatorError::Tracker(e.to_string()))?;
        let participant_id = match recv_raw(&mut stream).await? {
            Some(Envelope::Welcome { participant_id }) => participant_id,
            Some(other) => return Err(CoordinatorError::Tracker(format!("expected welcome, got {other:?}"))),
            None => return Err(CoordinatorError::Tracker("tracker closed before welcome".into())),
        };
        Ok(TrackerConnection { participant_id, stream })
    }

    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), CoordinatorError> {
        let text = serde_json::to_string(envelope).map_err(|e| CoordinatorError::Tracker(e.to_string()))?;
        self.stream
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| CoordinatorError::Tracker(e.to_string()))
    }

    /// `Ok(None)` means the tracker closed the connection cleanly.
    pub async fn recv(&mut self) -> Result<Option<Envelope>, CoordinatorError> {
        recv_raw(&mut self.stream).await
    }
}

async fn recv_raw(stream: &mut WsStream) -> Result<Option<Envelope>, CoordinatorError> {
    loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                let envelope = serde_json::from_str(&text).map_err(|e| CoordinatorError::Tracker(e.to_string()))?;
                return Ok(Some(envelope));
            }
            Some(Ok(WsMessage::Close(_))) | None => return Ok(None),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(CoordinatorError::Tracker(e.to_string())),
        }
    }
}
