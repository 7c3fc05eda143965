//! Content verification: the only gate between a caller's files and storage.
//!
//! Every file is decoded, re-hashed and compared against its declared digest
//! before a merkle root is computed or any record is touched. Runs on
//! caller-local data and takes no locks.

use std::collections::HashSet;

use proposald_types::{ContentPolicy, DIGEST_SIZE, File, MerkleRoot};
use thiserror::Error;

use crate::merkle::merkle_root;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("proposal has no files")]
    NoFiles,
    #[error("proposal has {count} files, limit is {limit}")]
    TooManyFiles { count: usize, limit: usize },
    #[error("invalid file name {name:?}")]
    InvalidName { name: String },
    #[error("duplicate file name {name:?}")]
    DuplicateName { name: String },
    #[error("{name}: unsupported MIME type {mime:?}")]
    UnsupportedMime { name: String, mime: String },
    #[error("{name}: payload is not valid base64: {source}")]
    Decode {
        name: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("{name}: decoded size {size} exceeds limit {limit}")]
    FileTooLarge {
        name: String,
        size: usize,
        limit: usize,
    },
    #[error("{name}: malformed digest {digest:?}")]
    MalformedDigest { name: String, digest: String },
    #[error("{name}: digest mismatch (declared {expected}, actual {actual})")]
    DigestMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

/// Check a candidate file set against `policy`.
///
/// Cheap structural checks run over the whole set first so that a malformed
/// submission is rejected before any payload is decoded.
pub fn verify_content(files: &[File], policy: &ContentPolicy) -> Result<(), ContentError> {
    if files.is_empty() {
        return Err(ContentError::NoFiles);
    }
    if files.len() > policy.max_files() {
        return Err(ContentError::TooManyFiles {
            count: files.len(),
            limit: policy.max_files(),
        });
    }

    let mut seen = HashSet::with_capacity(files.len());
    for file in files {
        if !is_basename(&file.name) {
            return Err(ContentError::InvalidName {
                name: file.name.clone(),
            });
        }
        if !seen.insert(file.name.as_str()) {
            return Err(ContentError::DuplicateName {
                name: file.name.clone(),
            });
        }
        if !policy.allows_mime(&file.mime) {
            return Err(ContentError::UnsupportedMime {
                name: file.name.clone(),
                mime: file.mime.clone(),
            });
        }
        declared_digest(file)?;
    }

    for file in files {
        verify_file(file, policy)?;
    }
    Ok(())
}

fn verify_file(file: &File, policy: &ContentPolicy) -> Result<(), ContentError> {
    // Padded base64 decodes to at most two bytes fewer than the estimate.
    let min_size = base64::decoded_len_estimate(file.payload.len()).saturating_sub(2);
    if min_size > policy.max_file_size() {
        return Err(ContentError::FileTooLarge {
            name: file.name.clone(),
            size: min_size,
            limit: policy.max_file_size(),
        });
    }

    let bytes = file.decode_payload().map_err(|source| ContentError::Decode {
        name: file.name.clone(),
        source,
    })?;
    if bytes.len() > policy.max_file_size() {
        return Err(ContentError::FileTooLarge {
            name: file.name.clone(),
            size: bytes.len(),
            limit: policy.max_file_size(),
        });
    }

    let actual = proposald_types::sha256(&bytes);
    if actual != declared_digest(file)? {
        return Err(ContentError::DigestMismatch {
            name: file.name.clone(),
            expected: file.digest.clone(),
            actual: hex::encode(actual),
        });
    }
    Ok(())
}

/// Decode the declared hex digest of `file`. Accepts either case.
pub(crate) fn declared_digest(file: &File) -> Result<[u8; DIGEST_SIZE], ContentError> {
    let mut out = [0u8; DIGEST_SIZE];
    hex::decode_to_slice(&file.digest, &mut out).map_err(|_| ContentError::MalformedDigest {
        name: file.name.clone(),
        digest: file.digest.clone(),
    })?;
    Ok(out)
}

fn is_basename(name: &str) -> bool {
    !name.is_empty()
        && name.trim() == name
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Proof that a file set passed verification.
///
/// Files are canonicalized (sorted by name) so that the stored order and the
/// merkle root agree on every later re-computation. The only way to obtain a
/// value is [`PreparedContent::prepare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedContent {
    files: Vec<File>,
    merkle: MerkleRoot,
}

impl PreparedContent {
    pub fn prepare(mut files: Vec<File>, policy: &ContentPolicy) -> Result<Self, ContentError> {
        verify_content(&files, policy)?;
        files.sort_by(|a, b| a.name.cmp(&b.name));

        let digests = files
            .iter()
            .map(declared_digest)
            .collect::<Result<Vec<_>, _>>()?;
        let merkle = merkle_root(&digests);
        Ok(Self { files, merkle })
    }

    #[must_use]
    pub fn files(&self) -> &[File] {
        &self.files
    }

    #[must_use]
    pub fn merkle(&self) -> MerkleRoot {
        self.merkle
    }

    #[must_use]
    pub fn into_parts(self) -> (Vec<File>, MerkleRoot) {
        (self.files, self.merkle)
    }
}
