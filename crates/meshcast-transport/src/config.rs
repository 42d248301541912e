use std::time::Duration;

/// Tunables for the connection lifecycle and peer accounting (§6 defaults).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum simultaneous connections (offering, connecting, or open).
    /// Introductions past this cap are refused without mutating any state.
    pub peer_cap: usize,

    /// How long a peer stays `Disconnected` before a single redial ("ICE
    /// restart") attempt is made.
    pub disconnect_grace: Duration,

    /// How long to wait for the redial attempt to succeed before giving up
    /// and transitioning to `Closed`.
    pub ice_restart_grace: Duration,

    /// Idle-connection keepalive timeout handed to the libp2p swarm config.
    pub idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            peer_cap: 50,
            disconnect_grace: Duration::from_secs(10),
            ice_restart_grace: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
        }
    }
}
