use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity assigned to a participant by the tracker at connection time.
///
/// Deliberately independent of the transport's own connection identity (see
/// the coordinator's Open Question decision on why these are kept separate):
/// the tracker can mint and route by this id without any transport-layer
/// dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    pub fn generate() -> Self {
        ParticipantId(Uuid::new_v4())
    }
}

impl From<Uuid> for ParticipantId {
    fn from(id: Uuid) -> Self {
        ParticipantId(id)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
