use meshcast_swarm::{ContentId, Package, ParticipantId, Piece};
use serde::{Deserialize, Serialize};

/// Wire message exchanged over the per-peer frame channel.
///
/// Unknown `kind` values deserialize into `Unknown` rather than failing the
/// whole stream — handlers log and drop it (§7 ProtocolError).
///
/// `Hello` is not named in the spec's P2P Frame union: the transport's own
/// identity (a libp2p `PeerId`) is not the tracker-assigned `ParticipantId`
/// that the swarm manager keys bitfields and requests by, so whichever side
/// didn't originate the dial has no way to learn the other's participant id
/// without it. Sent once, idempotently, immediately after `channelOpen`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Frame {
    Hello { participant_id: ParticipantId },
    Metadata { package: Package },
    Bitfield { content: ContentId, total: u32, raw: Vec<u8> },
    Have { content: ContentId, index: u32 },
    Request { content: ContentId, index: u32 },
    Piece { piece: Piece },
    #[serde(other)]
    Unknown,
}

/// Trivial response to every frame request; frames are fire-and-forget in
/// content but request/response gives the sender a signal that the peer's
/// substream accepted the write, which the coordinator uses to serialize
/// frame delivery (e.g. metadata before bitfield) by awaiting each send.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Ack;
