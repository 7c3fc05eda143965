//! SHA-256 helpers and the merkle root newtype.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Size in bytes of every digest handled by the store.
pub const DIGEST_SIZE: usize = 32;

/// Hash `bytes` with SHA-256.
#[must_use]
pub fn sha256(bytes: &[u8]) -> [u8; DIGEST_SIZE] {
    Sha256::digest(bytes).into()
}

/// Hash `bytes` with SHA-256 and return the lowercase hex encoding.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha256(bytes))
}

/// Single-level merkle root over the ordered digests of a proposal's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerkleRoot(#[serde(with = "hex::serde")] [u8; DIGEST_SIZE]);

impl MerkleRoot {
    #[must_use]
    pub const fn new(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Rebuild a root from stored bytes. Returns `None` on a length mismatch.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; DIGEST_SIZE]>::try_from(bytes).ok().map(Self)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for MerkleRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
