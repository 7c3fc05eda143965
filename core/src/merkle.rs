//! Single-level merkle root over ordered file digests.
//!
//! The root is `sha256(d_0 || d_1 || ... || d_n)` over the raw digest bytes,
//! hashed once. Order matters; callers canonicalize (see
//! [`PreparedContent`](crate::PreparedContent)).

use proposald_types::{DIGEST_SIZE, File, MerkleRoot};
use sha2::{Digest, Sha256};

use crate::content::{ContentError, declared_digest};

#[must_use]
pub fn merkle_root(digests: &[[u8; DIGEST_SIZE]]) -> MerkleRoot {
    let mut hasher = Sha256::new();
    for digest in digests {
        hasher.update(digest);
    }
    MerkleRoot::new(hasher.finalize().into())
}

/// Merkle root of `files` in the given order.
///
/// Only the declared digests are read; payloads are not re-hashed.
pub fn compute_merkle(files: &[File]) -> Result<MerkleRoot, ContentError> {
    let digests = files
        .iter()
        .map(declared_digest)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(merkle_root(&digests))
}
