//! Signaling envelope, the wire protocol between a participant and the
//! tracker (spec §3). Tagged on a JSON `type` field with a catch-all
//! `Unknown` variant: unknown types are logged and dropped, never rejected.
//!
//! This crate picks the `-swarm`-suffixed variant names paired with
//! `ice-candidate`, per the spec's explicit Open Question resolution (the
//! source had two divergent trackers; this is the one that matches the
//! participant-side handler).
//!
//! `PeerInfo.meta` carries this redesign's one wire addition: a libp2p
//! transport dials a multiaddr directly and has no use for an SDP
//! offer/answer/ICE-candidate triad (those stay implemented as opaque
//! tracker pass-through for protocol completeness, see `tracker.rs`, but
//! the coordinator's own connection bootstrap never round-trips through
//! them — see DESIGN.md). `meta` is already generic per §6's debug-endpoint
//! shape (`{peerId, lastSeen, meta?}`); the coordinator populates it with
//! `{"addr": "<dial multiaddr>"}` and nothing else needs a new field.

use meshcast_swarm::{ContentId, ParticipantId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerInfo {
    pub peer_id: ParticipantId,
    pub complete: bool,
    /// Milliseconds since the Unix epoch, per §6's debug shape.
    pub last_seen: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    /// Tracker → participant, sent once at connection establishment.
    Welcome { participant_id: ParticipantId },

    /// Participant → tracker. `meta` is this redesign's substitute for SDP
    /// negotiation: the coordinator fills it with `{"addr": "<multiaddr>"}`,
    /// the tracker treats it as opaque and echoes it back in `PeerInfo`.
    Announce {
        content: ContentId,
        complete: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<serde_json::Value>,
    },

    /// Tracker → participant, in direct response to `Announce`.
    AnnounceResponse { content: ContentId, peers: Vec<PeerInfo> },

    /// Tracker → everyone else already in the room.
    PeerJoinedSwarm { content: ContentId, peer_id: ParticipantId, complete: bool, peers: Vec<PeerInfo> },

    /// Participant → tracker, or implicit on transport close.
    Leave { content: ContentId },

    /// Tracker → room, mirrors a `Leave` or a stale-sweep eviction.
    PeerLeftSwarm { content: ContentId, peer_id: ParticipantId },

    /// Bidirectional, same tag both ways (spec §3): participant → tracker
    /// asks the tracker to prompt everyone else currently connected to
    /// initiate toward the sender (`from` absent/ignored on this leg);
    /// tracker → other participants fills `from` in with the asker's id.
    /// `meta` is opaque and echoed verbatim — the coordinator uses it to
    /// carry its own dial multiaddr, since the asker is always the side
    /// the others must connect *to* (see DESIGN.md's initiator-selection
    /// note).
    RequestConnection {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ParticipantId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<serde_json::Value>,
    },

    /// Session-description offer, opaque payload, forwarded verbatim.
    Offer { from: ParticipantId, to: ParticipantId, payload: serde_json::Value },

    /// Session-description answer, opaque payload, forwarded verbatim.
    Answer { from: ParticipantId, to: ParticipantId, payload: serde_json::Value },

    /// ICE candidate, opaque payload, forwarded verbatim.
    IceCandidate { from: ParticipantId, to: ParticipantId, payload: serde_json::Value },

    /// Catch-all for unrecognized `type` values. Logged and dropped, never
    /// a protocol error — the tracker is liberal in what it accepts.
    #[serde(other)]
    Unknown,
}

impl Envelope {
    pub fn type_name(&self) -> &'static str {
        match self {
            Envelope::Welcome { .. } => "welcome",
            Envelope::Announce { .. } => "announce",
            Envelope::AnnounceResponse { .. } => "announce-response",
            Envelope::PeerJoinedSwarm { .. } => "peer-joined-swarm",
            Envelope::Leave { .. } => "leave",
            Envelope::PeerLeftSwarm { .. } => "peer-left-swarm",
            Envelope::RequestConnection { .. } => "request-connection",
            Envelope::Offer { .. } => "offer",
            Envelope::Answer { .. } => "answer",
            Envelope::IceCandidate { .. } => "ice-candidate",
            Envelope::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_is_dropped_not_rejected() {
        let raw = r#"{"type":"bogus","foo":"bar"}"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env, Envelope::Unknown);
    }

    #[test]
    fn announce_round_trips() {
        let env = Envelope::Announce { content: ContentId::from("c1".to_string()), complete: true, meta: None };
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"type\":\"announce\""));
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn announce_carries_optional_addr_meta() {
        let meta = serde_json::json!({"addr": "/ip4/127.0.0.1/tcp/4001/p2p/12D3Koo..."});
        let env = Envelope::Announce {
            content: ContentId::from("c1".to_string()),
            complete: false,
            meta: Some(meta.clone()),
        };
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(env, back);
        let Envelope::Announce { meta: Some(back_meta), .. } = back else { panic!("expected announce") };
        assert_eq!(back_meta, meta);
    }

    #[test]
    fn request_connection_broadcast_carries_from() {
        let env = Envelope::RequestConnection { from: Some(ParticipantId::generate()), meta: None };
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"type\":\"request-connection\""));
        assert!(json.contains("\"from\""));
    }

    #[test]
    fn request_connection_ask_omits_from() {
        let env = Envelope::RequestConnection { from: None, meta: None };
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(json, r#"{"type":"request-connection"}"#);
    }

    #[test]
    fn request_connection_carries_addr_meta() {
        let meta = serde_json::json!({"addr": "/ip4/127.0.0.1/tcp/4001/p2p/12D3Koo..."});
        let env = Envelope::RequestConnection { from: None, meta: Some(meta.clone()) };
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        let Envelope::RequestConnection { meta: Some(back_meta), .. } = back else { panic!("expected request-connection") };
        assert_eq!(back_meta, meta);
    }
}
