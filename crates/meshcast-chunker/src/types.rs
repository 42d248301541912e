use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::ChunkerError;

/// Opaque, collision-resistant-within-a-session content identifier.
///
/// A bare `String` would let a tracker or transport API accidentally accept
/// a peer id where a content id is expected; this newtype closes that seam.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ContentId(String);

impl ContentId {
    /// Timestamp-plus-random. Not cryptographic — the system never relies
    /// on cryptographic properties of this id (spec §3).
    pub fn generate() -> Self {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let salt: u16 = rand::random();
        ContentId(format!("{now_ms:x}-{salt:04x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ContentId {
    fn from(s: String) -> Self {
        ContentId(s)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        ContentId(s.to_string())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Placement transform: three triples of finite floats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: [f32; 3],
    pub rotation_euler: [f32; 3],
    pub scale: [f32; 3],
}

impl Transform {
    pub fn new(
        position: [f32; 3],
        rotation_euler: [f32; 3],
        scale: [f32; 3],
    ) -> Result<Self, ChunkerError> {
        let all_finite = position
            .iter()
            .chain(rotation_euler.iter())
            .chain(scale.iter())
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(ChunkerError::NonFiniteTransform);
        }
        Ok(Transform {
            position,
            rotation_euler,
            scale,
        })
    }

    pub fn identity() -> Self {
        Transform {
            position: [0.0; 3],
            rotation_euler: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

/// Producer-stamped provenance metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub producer_id: String,
    pub prompt: Option<String>,
    pub created_at_ms: u64,
    pub total_bytes: u64,
    pub total_pieces: u32,
}

/// Immutable content artifact: a GLB mesh blob's placement and provenance,
/// once it has been sliced into pieces by [`crate::prepare`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub content_id: ContentId,
    pub transform: Transform,
    pub provenance: Provenance,
}

/// A byte range of the artifact, addressed by zero-based index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    pub content_id: ContentId,
    pub index: u32,
    pub total: u32,
    pub bytes: Vec<u8>,
    pub checksum: u32,
}
