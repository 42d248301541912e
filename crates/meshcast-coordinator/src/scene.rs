//! External seams (§6 "Scene collaborator boundary"), grounded on the
//! teacher's outbound-event-sink pattern (`P2pHandle::subscribe_events`):
//! a typed trait for the host application plus a broadcast channel of the
//! same events for observability/TUI-style consumers that don't want to
//! implement the trait.

use meshcast_chunker::{ContentId, Package};
use meshcast_transport::PeerId;

pub trait SceneSink: Send + Sync {
    fn on_peer_connected(&self, _peer: PeerId) {}
    fn on_peer_disconnected(&self, _peer: PeerId) {}
    fn on_model_received(&self, _package: Package, _blob: Vec<u8>) {}
    fn on_download_progress(&self, _content: ContentId, _percent: u8) {}
}

/// A `SceneSink` that does nothing; the default when a caller only wants
/// the broadcast channel.
pub struct NullSceneSink;
impl SceneSink for NullSceneSink {}

#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    PeerConnected { peer: PeerId },
    PeerDisconnected { peer: PeerId },
    ModelReceived { package: Package, blob: Vec<u8> },
    DownloadProgress { content: ContentId, percent: u8 },
    TrackerUnavailable,
    TrackerReconnected,
}
