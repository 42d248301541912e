use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("artifact must not be empty")]
    EmptyArtifact,

    #[error("missing piece at index {0}")]
    MissingPiece(u32),

    #[error("piece {index} has wrong length: expected {expected}, got {actual}")]
    WrongLength {
        index: u32,
        expected: usize,
        actual: usize,
    },

    #[error("transform component is not finite")]
    NonFiniteTransform,
}
