//! Content model and chunker.
//!
//! Splits an artifact into fixed-size, checksummed pieces keyed by a content
//! id, and reconstructs them. No I/O, no async — a pure function of its
//! inputs so it can be exercised without a tracker or transport in scope.

#![forbid(unsafe_code)]

mod checksum;
mod error;
mod types;

pub use checksum::checksum;
pub use error::ChunkerError;
pub use types::{ContentId, Package, Piece, Provenance, Transform};

/// Piece size in bytes. Chosen so one piece fits inside the transport's
/// per-frame limit (16 KiB) with headroom for the frame envelope.
pub const PIECE_SIZE: usize = 15 * 1024;

/// Partition `bytes` into `ceil(len / PIECE_SIZE)` pieces, assign a fresh
/// content id, stamp `provenance`, and return the package plus its pieces.
///
/// `provenance.total_bytes` and `provenance.total_pieces` are overwritten
/// with the values derived from `bytes` — the caller only supplies
/// `producer_id` and `prompt`.
pub fn prepare(
    bytes: &[u8],
    transform: Transform,
    mut provenance: Provenance,
) -> Result<(Package, Vec<Piece>), ChunkerError> {
    if bytes.is_empty() {
        return Err(ChunkerError::EmptyArtifact);
    }

    let total = bytes.len().div_ceil(PIECE_SIZE) as u32;
    let content_id = ContentId::generate();

    let pieces: Vec<Piece> = bytes
        .chunks(PIECE_SIZE)
        .enumerate()
        .map(|(index, chunk)| Piece {
            content_id: content_id.clone(),
            index: index as u32,
            total,
            bytes: chunk.to_vec(),
            checksum: checksum(chunk),
        })
        .collect();

    provenance.total_bytes = bytes.len() as u64;
    provenance.total_pieces = total;

    let package = Package {
        content_id,
        transform,
        provenance,
    };

    Ok((package, pieces))
}

/// Recompute the checksum over `piece.bytes` and compare against the stored
/// value. Integrity-only: detects channel or encoding corruption, not
/// tampering.
pub fn verify(piece: &Piece) -> bool {
    checksum(&piece.bytes) == piece.checksum
}

/// Sort `pieces` by index ascending and concatenate their bytes.
///
/// Fails if any index in `[0, total)` is missing, or if a piece's length
/// does not match its expected position (full `PIECE_SIZE` for every index
/// but the last, which may be shorter).
pub fn assemble(total: u32, mut pieces: Vec<Piece>) -> Result<Vec<u8>, ChunkerError> {
    pieces.sort_by_key(|p| p.index);

    let mut out = Vec::new();
    let mut next = 0u32;
    for piece in pieces {
        if piece.index != next {
            return Err(ChunkerError::MissingPiece(next));
        }
        let is_last = piece.index + 1 == total;
        if !is_last && piece.bytes.len() != PIECE_SIZE {
            return Err(ChunkerError::WrongLength {
                index: piece.index,
                expected: PIECE_SIZE,
                actual: piece.bytes.len(),
            });
        }
        out.extend_from_slice(&piece.bytes);
        next += 1;
    }
    if next != total {
        return Err(ChunkerError::MissingPiece(next));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform() -> Transform {
        Transform::new([0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [1.0, 1.0, 1.0]).unwrap()
    }

    fn provenance() -> Provenance {
        Provenance {
            producer_id: "alice".into(),
            prompt: None,
            created_at_ms: 0,
            total_bytes: 0,
            total_pieces: 0,
        }
    }

    #[test]
    fn empty_artifact_is_rejected() {
        assert!(matches!(
            prepare(&[], transform(), provenance()),
            Err(ChunkerError::EmptyArtifact)
        ));
    }

    #[test]
    fn single_byte_artifact_is_one_piece_index_zero() {
        let (pkg, pieces) = prepare(&[7u8], transform(), provenance()).unwrap();
        assert_eq!(pkg.provenance.total_pieces, 1);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].index, 0);
    }

    #[test]
    fn piece_size_exactly_divides_artifact_length() {
        let bytes = vec![1u8; PIECE_SIZE * 3];
        let (pkg, pieces) = prepare(&bytes, transform(), provenance()).unwrap();
        assert_eq!(pkg.provenance.total_pieces, 3);
        assert!(pieces.iter().all(|p| p.bytes.len() == PIECE_SIZE));
    }

    #[test]
    fn assemble_is_inverse_of_prepare() {
        let bytes: Vec<u8> = (0..(PIECE_SIZE * 2 + 123)).map(|i| (i % 251) as u8).collect();
        let (pkg, pieces) = prepare(&bytes, transform(), provenance()).unwrap();
        let rebuilt = assemble(pkg.provenance.total_pieces, pieces).unwrap();
        assert_eq!(rebuilt, bytes);
    }

    #[test]
    fn verify_detects_corruption() {
        let bytes = vec![9u8; 100];
        let (_pkg, mut pieces) = prepare(&bytes, transform(), provenance()).unwrap();
        assert!(verify(&pieces[0]));
        pieces[0].bytes[0] ^= 0xFF;
        assert!(!verify(&pieces[0]));
    }

    #[test]
    fn assemble_fails_on_missing_piece() {
        let bytes = vec![1u8; PIECE_SIZE * 2 + 1];
        let (pkg, mut pieces) = prepare(&bytes, transform(), provenance()).unwrap();
        pieces.remove(1);
        assert!(matches!(
            assemble(pkg.provenance.total_pieces, pieces),
            Err(ChunkerError::MissingPiece(1))
        ));
    }

    #[test]
    fn assemble_fails_on_wrong_length_non_last_piece() {
        let bytes = vec![1u8; PIECE_SIZE * 2 + 1];
        let (pkg, mut pieces) = prepare(&bytes, transform(), provenance()).unwrap();
        pieces[0].bytes.pop();
        assert!(matches!(
            assemble(pkg.provenance.total_pieces, pieces),
            Err(ChunkerError::WrongLength { index: 0, .. })
        ));
    }

    #[test]
    fn transform_rejects_non_finite_components() {
        assert!(Transform::new([f32::NAN, 0.0, 0.0], [0.0; 3], [1.0; 3]).is_err());
        assert!(Transform::new([0.0; 3], [0.0; 3], [f32::INFINITY, 1.0, 1.0]).is_err());
    }
}
