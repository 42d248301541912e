//! Combined libp2p `NetworkBehaviour` for a transport node.
//!
//! Carries `identify` (address exchange) and `ping` (idle keepalive) from
//! the teacher's `P2pBehaviour`, plus a `request_response` channel for
//! frames. `relay`/`dcutr`/`autonat`/`mdns` are dropped: this engine's
//! rendezvous is the centralized tracker, which hands out dial multiaddrs
//! directly, so there is no NAT-traversal or local-discovery concern here.

use std::time::Duration;

use libp2p::{identify, identity, ping, request_response, swarm::NetworkBehaviour};

use crate::codec::{FrameCodec, FRAME_PROTO};
use crate::frame::{Ack, Frame};

const APP_PROTO: &str = "/meshcast/1.0.0";

#[derive(NetworkBehaviour)]
#[behaviour(out_event = "TransportBehaviourEvent")]
pub struct TransportBehaviour {
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
    pub frames: request_response::Behaviour<FrameCodec>,
}

#[derive(Debug)]
pub enum TransportBehaviourEvent {
    Identify(identify::Event),
    Ping(ping::Event),
    Frames(request_response::Event<Frame, Ack>),
}

impl From<identify::Event> for TransportBehaviourEvent {
    fn from(e: identify::Event) -> Self {
        TransportBehaviourEvent::Identify(e)
    }
}

impl From<ping::Event> for TransportBehaviourEvent {
    fn from(e: ping::Event) -> Self {
        TransportBehaviourEvent::Ping(e)
    }
}

impl From<request_response::Event<Frame, Ack>> for TransportBehaviourEvent {
    fn from(e: request_response::Event<Frame, Ack>) -> Self {
        TransportBehaviourEvent::Frames(e)
    }
}

impl TransportBehaviour {
    pub fn new(key: &identity::Keypair) -> Self {
        Self {
            identify: identify::Behaviour::new(identify::Config::new(APP_PROTO.into(), key.public())),
            ping: ping::Behaviour::new(ping::Config::new().with_interval(Duration::from_secs(15))),
            frames: request_response::Behaviour::with_codec(
                FrameCodec,
                [(FRAME_PROTO, request_response::ProtocolSupport::Full)],
                request_response::Config::default().with_request_timeout(Duration::from_secs(30)),
            ),
        }
    }
}
