//! Transport construction: TCP + Noise + Yamux, no relay/NAT-traversal
//! behaviours — the tracker hands out dial multiaddrs directly.

use libp2p::{
    core::{muxing::StreamMuxerBox, upgrade},
    identity, noise,
    swarm::Config as SwarmConfig,
    tcp, yamux, PeerId, Transport,
};
use std::time::Duration;

use crate::error::TransportError;

pub fn build_transport(
    key: &identity::Keypair,
) -> Result<libp2p::core::transport::Boxed<(PeerId, StreamMuxerBox)>, TransportError> {
    let noise_config = noise::Config::new(key).map_err(|e| TransportError::Setup(e.to_string()))?;
    let transport = tcp::tokio::Transport::new(tcp::Config::default().nodelay(true))
        .upgrade(upgrade::Version::V1)
        .authenticate(noise_config)
        .multiplex(yamux::Config::default())
        .map(|(p, m), _| (p, StreamMuxerBox::new(m)))
        .boxed();
    Ok(transport)
}

pub fn swarm_config(idle_timeout: Duration) -> SwarmConfig {
    SwarmConfig::with_tokio_executor().with_idle_connection_timeout(idle_timeout)
}
