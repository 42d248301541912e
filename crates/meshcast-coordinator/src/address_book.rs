//! Resolves between the tracker's transport-agnostic `ParticipantId` and the
//! transport's own libp2p `PeerId` (spec §9 Open Question #2 / DESIGN.md's
//! connection-bootstrap redesign). A dial multiaddr already embeds its
//! target's `/p2p/<peer id>` suffix, so registering one address gives us
//! both directions for free — no separate discovery round-trip needed.

use std::collections::HashMap;

use meshcast_swarm::ParticipantId;
use meshcast_transport::{Multiaddr, PeerId};

use crate::error::CoordinatorError;

#[derive(Default)]
pub struct AddressBook {
    addrs: HashMap<ParticipantId, Multiaddr>,
    by_peer_id: HashMap<PeerId, ParticipantId>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `participant`'s dial multiaddr, parsed out of a `meta`
    /// JSON value shaped `{"addr": "<multiaddr>"}`. No-op on any other
    /// shape (`meta` is opaque and may carry unrelated debug info).
    pub fn learn(
        &mut self,
        participant: ParticipantId,
        meta: Option<&serde_json::Value>,
    ) -> Result<Option<Multiaddr>, CoordinatorError> {
        let Some(addr_str) = meta.and_then(|m| m.get("addr")).and_then(|v| v.as_str()) else {
            return Ok(None);
        };
        let addr: Multiaddr = addr_str.parse().map_err(|_| CoordinatorError::BadAddr(addr_str.to_string()))?;
        let peer_id = extract_peer_id(&addr).ok_or_else(|| CoordinatorError::BadAddr(addr_str.to_string()))?;
        self.addrs.insert(participant, addr.clone());
        self.by_peer_id.insert(peer_id, participant);
        Ok(Some(addr))
    }

    /// Register a mapping learned directly from a `Frame::Hello` (no dial
    /// address involved — the connection already exists).
    pub fn learn_peer_id(&mut self, participant: ParticipantId, peer_id: PeerId) {
        self.by_peer_id.insert(peer_id, participant);
    }

    pub fn participant_for(&self, peer_id: &PeerId) -> Option<ParticipantId> {
        self.by_peer_id.get(peer_id).copied()
    }

    pub fn addr_for(&self, participant: &ParticipantId) -> Option<&Multiaddr> {
        self.addrs.get(participant)
    }
}

fn extract_peer_id(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|proto| match proto {
        libp2p::multiaddr::Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learn_extracts_addr_and_peer_id_and_is_queryable_both_ways() {
        let mut book = AddressBook::new();
        let participant = ParticipantId::generate();
        let peer_id = PeerId::random();
        let addr_str = format!("/ip4/127.0.0.1/tcp/4001/p2p/{peer_id}");
        let meta = serde_json::json!({"addr": addr_str});

        let learned = book.learn(participant, Some(&meta)).unwrap();
        assert!(learned.is_some());
        assert_eq!(book.participant_for(&peer_id), Some(participant));
        assert_eq!(book.addr_for(&participant).unwrap().to_string(), addr_str);
    }

    #[test]
    fn missing_addr_key_is_a_no_op() {
        let mut book = AddressBook::new();
        let participant = ParticipantId::generate();
        let meta = serde_json::json!({"note": "unrelated"});
        assert_eq!(book.learn(participant, Some(&meta)).unwrap(), None);
        assert!(book.addr_for(&participant).is_none());
    }

    #[test]
    fn malformed_addr_is_rejected() {
        let mut book = AddressBook::new();
        let participant = ParticipantId::generate();
        let meta = serde_json::json!({"addr": "not a multiaddr"});
        assert!(book.learn(participant, Some(&meta)).is_err());
    }
}
