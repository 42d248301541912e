use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("bind error: {0}")]
    Bind(String),
}
