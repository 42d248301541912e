//! libp2p-backed transport: dials peers at multiaddrs the tracker hands
//! out, exchanges [`Frame`]s over a length-prefixed CBOR request/response
//! channel, and layers an explicit connection lifecycle state machine on
//! top of libp2p's own connection events.

mod behaviour;
mod codec;
mod config;
mod error;
mod frame;
mod lifecycle;
mod node;
mod transport;

pub use config::TransportConfig;
pub use error::TransportError;
pub use frame::{Ack, Frame};
pub use lifecycle::ConnState;
pub use node::{TransportEvent, TransportHandle, TransportNode};

pub use libp2p::{Multiaddr, PeerId};

#[cfg(test)]
mod tests {
    use super::*;
    use meshcast_swarm::ContentId;
    use std::time::Duration;

    #[tokio::test]
    async fn two_nodes_dial_and_exchange_a_frame() {
        let (node_a, handle_a) = TransportNode::new(TransportConfig::default());
        let (node_b, handle_b) = TransportNode::new(TransportConfig::default());

        let mut events_b = handle_b.subscribe_events();
        let mut events_a = handle_a.subscribe_events();

        tokio::spawn(node_a.run("/ip4/127.0.0.1/tcp/0".parse().unwrap()));
        tokio::spawn(node_b.run("/ip4/127.0.0.1/tcp/0".parse().unwrap()));

        let listen_addr_b = loop {
            match tokio::time::timeout(Duration::from_secs(5), events_b.recv()).await {
                Ok(Ok(TransportEvent::Listening { address })) => break address,
                Ok(Ok(_)) => continue,
                _ => panic!("node B never reported a listen address"),
            }
        };

        let dial_addr = listen_addr_b.with_p2p(handle_b.local_peer_id()).unwrap();
        handle_a.dial(dial_addr).await.expect("dial should succeed");

        let connected = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(TransportEvent::PeerConnected { peer }) = events_a.recv().await {
                    return peer;
                }
            }
        })
        .await
        .expect("node A should see a PeerConnected event");
        assert_eq!(connected, handle_b.local_peer_id());

        handle_a
            .send_frame(handle_b.local_peer_id(), Frame::Have { content: ContentId::from("c1"), index: 3 })
            .await
            .expect("frame send should be acked");

        let received = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(TransportEvent::FrameReceived { frame, .. }) = events_b.recv().await {
                    return frame;
                }
            }
        })
        .await
        .expect("node B should receive the frame");

        match received {
            Frame::Have { content, index } => {
                assert_eq!(content.as_str(), "c1");
                assert_eq!(index, 3);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_frame_to_unconnected_peer_fails() {
        let (node_a, handle_a) = TransportNode::new(TransportConfig::default());
        tokio::spawn(node_a.run("/ip4/127.0.0.1/tcp/0".parse().unwrap()));

        let ghost = PeerId::random();
        let err = handle_a.send_frame(ghost, Frame::Unknown).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected(_)));
    }
}
