use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("tracker connection error: {0}")]
    Tracker(String),

    #[error("transport error: {0}")]
    Transport(#[from] meshcast_transport::TransportError),

    #[error("assembly error: {0}")]
    Assembly(#[from] meshcast_chunker::ChunkerError),

    #[error("malformed dial address in tracker meta: {0}")]
    BadAddr(String),

    #[error("loading config file {path}: {source}")]
    ConfigIo { path: String, #[source] source: std::io::Error },

    #[error("parsing config file {path}: {source}")]
    ConfigParse { path: String, #[source] source: toml::de::Error },
}
