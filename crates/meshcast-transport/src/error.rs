use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("transport setup error: {0}")]
    Setup(String),

    #[error("dial error: {0}")]
    Dial(String),

    #[error("peer cap reached ({0} connections)")]
    PeerCapReached(usize),

    #[error("peer not connected: {0}")]
    NotConnected(String),

    #[error("send failed: channel not open or peer gone")]
    SendFailed,

    #[error("node already shut down")]
    Shutdown,

    #[error("codec error: {0}")]
    Codec(String),
}
