//! Swarm manager: per-content bitfield accounting, rarest-first piece
//! selection, duplicate/timeout suppression, and request pipelining.
//!
//! This crate performs no I/O. Every operation is a pure function of state
//! that returns [`Action`] intents for the coordinator to dispatch — the
//! single refactor that makes piece-selection policy unit-testable without
//! a tracker or transport in scope.

mod action;
mod bitfield;
mod peer;
mod swarm;

pub use action::Action;
pub use bitfield::Bitfield;
pub use meshcast_chunker::{ContentId, Package, Piece};
pub use peer::ParticipantId;
pub use swarm::{RequestedFrom, Swarm};

use std::collections::HashMap;
use std::time::Instant;

/// Pipelining budget: max in-flight requests per peer (§6 default: 5).
pub const PIPELINE_BUDGET: usize = 5;

/// Piece request timeout before a slot is released for re-request
/// (§6 default: 30s).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Create a seeder swarm (owns every piece already) or a leecher swarm
/// (owns none, waiting on `total` pieces from `metadata`).
pub fn create_swarm(content_id: ContentId, metadata: Option<Package>, initial: Vec<Piece>) -> Swarm {
    if initial.is_empty() {
        Swarm::new_leecher(content_id, metadata)
    } else {
        Swarm::new_seeder(content_id, metadata, initial)
    }
}

/// Verify and ingest an inbound piece. On checksum failure the request slot
/// is released and no progress action is emitted. On success: store, mark
/// owned, clear the request slot, and emit `BroadcastHave`, `DownloadProgress`,
/// and either `DownloadComplete` or the result of [`request_more_chunks`].
pub fn handle_piece(
    swarm: &mut Swarm,
    from: ParticipantId,
    piece: Piece,
    peer_bitfields: &HashMap<ParticipantId, Bitfield>,
) -> Vec<Action> {
    let index = piece.index;

    if !meshcast_chunker::verify(&piece) {
        tracing::warn!(peer = %from, content = %swarm.content_id, index, "piece failed checksum, releasing request slot");
        swarm.requested.remove(&index);
        return Vec::new();
    }

    swarm.requested.remove(&index);
    if swarm.owned.contains(&index) {
        // Duplicate delivery of an already-owned piece: no-op.
        return Vec::new();
    }
    swarm.owned.insert(index);
    swarm.received.insert(index, piece);

    let mut actions = vec![
        Action::BroadcastHave {
            content: swarm.content_id.clone(),
            index,
        },
        Action::DownloadProgress {
            content: swarm.content_id.clone(),
            percent: swarm.percent_owned(),
        },
    ];

    if swarm.is_seeder() {
        actions.push(Action::DownloadComplete {
            content: swarm.content_id.clone(),
        });
    } else {
        actions.extend(request_more_chunks(swarm, peer_bitfields));
    }

    actions
}

/// Compute the needed set, rank by rarity (fewest owning peers first, ties
/// broken by ascending index), and emit `RequestChunk` actions up to the
/// per-peer pipelining budget. Peers are scanned in ascending-id order so
/// the result is reproducible in tests.
pub fn request_more_chunks(
    swarm: &mut Swarm,
    peer_bitfields: &HashMap<ParticipantId, Bitfield>,
) -> Vec<Action> {
    check_timeouts(swarm);

    let mut needed: Vec<u32> = (0..swarm.total)
        .filter(|i| !swarm.owned.contains(i) && !swarm.requested.contains_key(i))
        .collect();
    if needed.is_empty() {
        return Vec::new();
    }

    let rarity = |index: u32| -> usize { peer_bitfields.values().filter(|bf| bf.get(index)).count() };
    needed.sort_by_key(|&i| (rarity(i), i));

    let mut peers: Vec<&ParticipantId> = peer_bitfields.keys().collect();
    peers.sort();

    let mut in_flight: HashMap<ParticipantId, usize> = HashMap::new();
    for r in swarm.requested.values() {
        *in_flight.entry(r.peer).or_insert(0) += 1;
    }

    // Outer loop over pieces in rarity order (ties by index) so the overall
    // request order matches rarest-first regardless of which peer ends up
    // serving a given piece; inner loop picks the first peer (in id order,
    // for reproducibility) with spare pipeline budget that owns the piece.
    let mut actions = Vec::new();
    for index in needed {
        if swarm.owned.contains(&index) || swarm.requested.contains_key(&index) {
            continue;
        }
        for peer in &peers {
            let bitfield = &peer_bitfields[*peer];
            if bitfield.is_empty() || !bitfield.get(index) {
                continue;
            }
            let used = in_flight.entry(**peer).or_insert(0);
            if *used >= PIPELINE_BUDGET {
                continue;
            }
            swarm.requested.insert(
                index,
                RequestedFrom {
                    peer: **peer,
                    at: Instant::now(),
                },
            );
            actions.push(Action::RequestChunk {
                peer: **peer,
                content: swarm.content_id.clone(),
                index,
            });
            *used += 1;
            break;
        }
    }

    actions
}

/// Single-request bootstrap used when we first learn a peer's bitfield:
/// request the first piece the peer has that we neither own nor have
/// in flight.
pub fn request_chunks_from_peer(swarm: &mut Swarm, peer: ParticipantId, bitfield: &Bitfield) -> Vec<Action> {
    for index in 0..swarm.total {
        if swarm.owned.contains(&index) || swarm.requested.contains_key(&index) {
            continue;
        }
        if bitfield.get(index) {
            swarm.requested.insert(
                index,
                RequestedFrom {
                    peer,
                    at: Instant::now(),
                },
            );
            return vec![Action::RequestChunk {
                peer,
                content: swarm.content_id.clone(),
                index,
            }];
        }
    }
    Vec::new()
}

/// Reply to an inbound `request` frame: serve the piece if owned, otherwise
/// emit nothing (log-only at the caller).
pub fn handle_request(swarm: &Swarm, peer: ParticipantId, index: u32) -> Option<Action> {
    if !swarm.owned.contains(&index) {
        return None;
    }
    swarm.received.get(&index).map(|piece| Action::SendPiece {
        peer,
        content: swarm.content_id.clone(),
        piece: piece.clone(),
    })
}

/// Release any requested slot whose age exceeds [`REQUEST_TIMEOUT_SECS`] so
/// it becomes re-schedulable from any peer holding the piece.
pub fn check_timeouts(swarm: &mut Swarm) {
    let timeout = std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS);
    let now = Instant::now();
    swarm
        .requested
        .retain(|_, requested| now.duration_since(requested.at) < timeout);
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshcast_chunker::Provenance;

    fn content() -> ContentId {
        ContentId::from("content-a")
    }

    fn package(total: u32) -> Package {
        Package {
            content_id: content(),
            transform: meshcast_chunker::Transform::identity(),
            provenance: Provenance {
                producer_id: "producer".into(),
                prompt: None,
                created_at_ms: 0,
                total_bytes: total as u64 * 10,
                total_pieces: total,
            },
        }
    }

    fn piece(index: u32, total: u32) -> Piece {
        let bytes = vec![index as u8; 10];
        Piece {
            content_id: content(),
            index,
            total,
            checksum: meshcast_chunker::checksum(&bytes),
            bytes,
        }
    }

    fn full_bitfield(total: u32) -> Bitfield {
        let mut bf = Bitfield::empty(total);
        for i in 0..total {
            bf.set(i);
        }
        bf
    }

    #[test]
    fn invariant_owned_and_requested_are_disjoint() {
        let mut swarm = create_swarm(content(), Some(package(3)), Vec::new());
        let peer = ParticipantId::generate();
        let mut bitfields = HashMap::new();
        bitfields.insert(peer, full_bitfield(3));

        request_more_chunks(&mut swarm, &bitfields);
        for idx in swarm.owned.iter() {
            assert!(!swarm.requested.contains_key(idx));
        }

        handle_piece(&mut swarm, peer, piece(0, 3), &bitfields);
        for idx in swarm.owned.iter() {
            assert!(!swarm.requested.contains_key(idx));
        }
    }

    #[test]
    fn seeder_iff_owned_equals_total() {
        let swarm = create_swarm(content(), Some(package(2)), vec![piece(0, 2), piece(1, 2)]);
        assert!(swarm.is_seeder());
        assert_eq!(swarm.owned.len(), 2);

        let leecher = create_swarm(content(), Some(package(2)), Vec::new());
        assert!(!leecher.is_seeder());
    }

    #[test]
    fn checksum_failure_releases_slot_without_storing() {
        let mut swarm = create_swarm(content(), Some(package(1)), Vec::new());
        let peer = ParticipantId::generate();
        let mut bf = Bitfield::empty(1);
        bf.set(0);
        let mut bitfields = HashMap::new();
        bitfields.insert(peer, bf);

        request_more_chunks(&mut swarm, &bitfields);
        assert!(swarm.requested.contains_key(&0));

        let mut bad = piece(0, 1);
        bad.bytes[0] ^= 0xFF;
        let actions = handle_piece(&mut swarm, peer, bad, &bitfields);
        assert!(actions.is_empty());
        assert!(!swarm.owned.contains(&0));
        assert!(!swarm.requested.contains_key(&0));
    }

    #[test]
    fn rarest_first_orders_by_fewest_owners_then_index() {
        // A has {0,1,2,3,4}; B has {0,1}; we (C) have nothing.
        let mut swarm = create_swarm(content(), Some(package(5)), Vec::new());
        let a = ParticipantId::generate();
        let b = ParticipantId::generate();
        let mut a_bf = Bitfield::empty(5);
        for i in 0..5 {
            a_bf.set(i);
        }
        let mut b_bf = Bitfield::empty(5);
        b_bf.set(0);
        b_bf.set(1);

        let mut bitfields = HashMap::new();
        bitfields.insert(a, a_bf);
        bitfields.insert(b, b_bf);

        let actions = request_more_chunks(&mut swarm, &bitfields);
        let requested_indices: Vec<u32> = actions
            .iter()
            .filter_map(|a| match a {
                Action::RequestChunk { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        // Rarity-1 pieces (2,3,4, only on A) must be requested before
        // rarity-2 pieces (0,1, on both).
        let pos = |idx: u32| requested_indices.iter().position(|&i| i == idx).unwrap();
        assert!(pos(2) < pos(0));
        assert!(pos(3) < pos(0));
        assert!(pos(4) < pos(1));
    }

    #[test]
    fn pipelining_budget_is_respected() {
        let mut swarm = create_swarm(content(), Some(package(20)), Vec::new());
        let peer = ParticipantId::generate();
        let mut bitfields = HashMap::new();
        bitfields.insert(peer, full_bitfield(20));

        let actions = request_more_chunks(&mut swarm, &bitfields);
        let count = actions.iter().filter(|a| matches!(a, Action::RequestChunk { .. })).count();
        assert!(count <= PIPELINE_BUDGET);
        assert_eq!(swarm.requested.values().filter(|r| r.peer == peer).count(), count);
    }

    #[test]
    fn all_zero_bitfield_produces_no_requests() {
        let mut swarm = create_swarm(content(), Some(package(3)), Vec::new());
        let peer = ParticipantId::generate();
        let mut bitfields = HashMap::new();
        bitfields.insert(peer, Bitfield::empty(3));
        assert!(request_more_chunks(&mut swarm, &bitfields).is_empty());
    }

    #[test]
    fn handle_request_serves_owned_piece_only() {
        let swarm = create_swarm(content(), Some(package(2)), vec![piece(0, 2)]);
        let peer = ParticipantId::generate();
        assert!(handle_request(&swarm, peer, 0).is_some());
        assert!(handle_request(&swarm, peer, 1).is_none());
    }

    #[test]
    fn checked_timeouts_release_stale_requests() {
        let mut swarm = create_swarm(content(), Some(package(1)), Vec::new());
        let peer = ParticipantId::generate();
        swarm.requested.insert(
            0,
            RequestedFrom {
                peer,
                at: Instant::now() - std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS + 1),
            },
        );
        check_timeouts(&mut swarm);
        assert!(!swarm.requested.contains_key(&0));
    }

    #[test]
    fn duplicate_have_bit_is_a_no_op() {
        let mut bf = Bitfield::empty(4);
        assert!(bf.set(1));
        assert!(!bf.set(1));
    }
}
