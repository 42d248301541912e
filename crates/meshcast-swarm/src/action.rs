use meshcast_chunker::{ContentId, Piece};

use crate::peer::ParticipantId;

/// Action intents emitted by the swarm manager. The coordinator dispatches
/// each to the appropriate subsystem; the swarm manager never performs I/O
/// itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    RequestChunk {
        peer: ParticipantId,
        content: ContentId,
        index: u32,
    },
    SendPiece {
        peer: ParticipantId,
        content: ContentId,
        piece: Piece,
    },
    BroadcastHave {
        content: ContentId,
        index: u32,
    },
    DownloadProgress {
        content: ContentId,
        percent: u8,
    },
    DownloadComplete {
        content: ContentId,
    },
}
