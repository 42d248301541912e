use std::path::Path;
use std::time::Duration;

use meshcast_transport::TransportConfig;
use serde::Deserialize;

use crate::error::CoordinatorError;

/// Aggregates the per-crate tunables (§6's configuration table) that the
/// coordinator itself is responsible for — the chunker and swarm manager
/// have no runtime config of their own (piece size and pipelining budget
/// are compile-time constants per §4.1/§4.4).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// WebSocket URL of the tracker, e.g. `ws://127.0.0.1:9000/ws`.
    pub tracker_url: String,
    /// Delay before retrying a dropped tracker connection (§6 default: 3s).
    pub tracker_reconnect_delay: Duration,
    /// Local libp2p listen address.
    pub listen_addr: meshcast_transport::Multiaddr,
    pub transport: TransportConfig,
}

impl EngineConfig {
    pub fn new(tracker_url: impl Into<String>) -> Self {
        EngineConfig {
            tracker_url: tracker_url.into(),
            tracker_reconnect_delay: Duration::from_secs(3),
            listen_addr: "/ip4/127.0.0.1/tcp/0".parse().expect("static multiaddr"),
            transport: TransportConfig::default(),
        }
    }

    /// Loads a TOML config file and layers it over `Default`-supplied
    /// values — any field the file omits keeps its built-in default. CLI
    /// flags are applied by the caller after this returns, so they win over
    /// both the file and the defaults (teacher precedent: `sven-config`'s
    /// `load` layering, simplified here to a single explicit path since this
    /// engine has no multi-location search path to merge).
    pub fn load_file(path: &Path) -> Result<Self, CoordinatorError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| CoordinatorError::ConfigIo { path: path.display().to_string(), source })?;
        let file: FileConfig =
            toml::from_str(&text).map_err(|source| CoordinatorError::ConfigParse { path: path.display().to_string(), source })?;

        let mut config = EngineConfig::new(file.tracker_url.unwrap_or_else(|| "ws://127.0.0.1:9000/ws".into()));
        if let Some(secs) = file.tracker_reconnect_delay_secs {
            config.tracker_reconnect_delay = Duration::from_secs(secs);
        }
        if let Some(addr) = file.listen_addr {
            config.listen_addr = addr
                .parse()
                .map_err(|_| CoordinatorError::BadAddr(format!("config file listen_addr {addr:?} is not a multiaddr")))?;
        }
        if let Some(transport) = file.transport {
            transport.apply_onto(&mut config.transport);
        }
        Ok(config)
    }
}

/// Deserializable mirror of [`EngineConfig`]'s optional file-sourced fields.
/// Kept separate from `EngineConfig` itself so every field can be absent
/// without forcing `Option` onto the struct the rest of the crate uses.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    tracker_url: Option<String>,
    tracker_reconnect_delay_secs: Option<u64>,
    listen_addr: Option<String>,
    transport: Option<FileTransportConfig>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileTransportConfig {
    peer_cap: Option<usize>,
    disconnect_grace_secs: Option<u64>,
    ice_restart_grace_secs: Option<u64>,
    idle_timeout_secs: Option<u64>,
}

impl FileTransportConfig {
    fn apply_onto(self, transport: &mut TransportConfig) {
        if let Some(peer_cap) = self.peer_cap {
            transport.peer_cap = peer_cap;
        }
        if let Some(secs) = self.disconnect_grace_secs {
            transport.disconnect_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = self.ice_restart_grace_secs {
            transport.ice_restart_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = self.idle_timeout_secs {
            transport.idle_timeout = Duration::from_secs(secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_keep_their_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "tracker_url = \"ws://example.test/ws\"").unwrap();
        let config = EngineConfig::load_file(f.path()).unwrap();
        assert_eq!(config.tracker_url, "ws://example.test/ws");
        assert_eq!(config.tracker_reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.transport.peer_cap, TransportConfig::default().peer_cap);
    }

    #[test]
    fn file_overrides_nested_transport_tunables() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            "tracker_url = \"ws://example.test/ws\"\ntracker_reconnect_delay_secs = 7\n\n[transport]\npeer_cap = 5\nidle_timeout_secs = 45"
        )
        .unwrap();
        let config = EngineConfig::load_file(f.path()).unwrap();
        assert_eq!(config.tracker_reconnect_delay, Duration::from_secs(7));
        assert_eq!(config.transport.peer_cap, 5);
        assert_eq!(config.transport.idle_timeout, Duration::from_secs(45));
        // Untouched transport fields keep their defaults.
        assert_eq!(config.transport.disconnect_grace, TransportConfig::default().disconnect_grace);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "bogus_field = 1").unwrap();
        assert!(EngineConfig::load_file(f.path()).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = EngineConfig::load_file(Path::new("/nonexistent/meshcast-config-test.toml")).unwrap_err();
        assert!(matches!(err, CoordinatorError::ConfigIo { .. }));
    }
}
