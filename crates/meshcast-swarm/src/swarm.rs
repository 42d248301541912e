use std::collections::{HashMap, HashSet};
use std::time::Instant;

use meshcast_chunker::{ContentId, Package, Piece};

use crate::peer::ParticipantId;

/// A piece currently asked for, and from whom and when — the per-request
/// timestamp a correct implementation needs to age out stale requests
/// (rather than approximating from the swarm's start time).
#[derive(Debug, Clone, Copy)]
pub struct RequestedFrom {
    pub peer: ParticipantId,
    pub at: Instant,
}

/// Per-content transfer state.
///
/// Invariants upheld by every function in this crate:
/// - `owned ⊆ [0, total)`
/// - `owned ∩ keys(requested) = ∅`
/// - every index in `received` is also in `owned`
/// - `|owned| = total` ⇔ seeder
#[derive(Debug, Clone)]
pub struct Swarm {
    pub content_id: ContentId,
    pub metadata: Option<Package>,
    pub owned: HashSet<u32>,
    pub requested: HashMap<u32, RequestedFrom>,
    pub received: HashMap<u32, Piece>,
    pub total: u32,
    /// Start-of-transfer timestamp; only meaningful for leechers.
    pub started_at: Instant,
}

impl Swarm {
    pub fn new_leecher(content_id: ContentId, metadata: Option<Package>) -> Self {
        let total = metadata
            .as_ref()
            .map(|m| m.provenance.total_pieces)
            .unwrap_or(0);
        Swarm {
            content_id,
            metadata,
            owned: HashSet::new(),
            requested: HashMap::new(),
            received: HashMap::new(),
            total,
            started_at: Instant::now(),
        }
    }

    pub fn new_seeder(content_id: ContentId, metadata: Option<Package>, pieces: Vec<Piece>) -> Self {
        let total = pieces.len() as u32;
        let owned = pieces.iter().map(|p| p.index).collect();
        let received = pieces.into_iter().map(|p| (p.index, p)).collect();
        Swarm {
            content_id,
            metadata,
            owned,
            requested: HashMap::new(),
            received,
            total,
            started_at: Instant::now(),
        }
    }

    pub fn is_seeder(&self) -> bool {
        self.total > 0 && self.owned.len() as u32 == self.total
    }

    pub fn percent_owned(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.owned.len() as u64 * 100) / self.total as u64) as u8
    }

    /// Learn the final total once `metadata` arrives for a swarm created
    /// before it was known.
    pub fn adopt_metadata(&mut self, metadata: Package) {
        if self.metadata.is_none() {
            self.total = metadata.provenance.total_pieces;
            self.metadata = Some(metadata);
        }
    }
}
