use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::digest::sha256_hex;

/// One named file of a proposal.
///
/// `digest` is the lowercase hex SHA-256 of the *decoded* payload. A `File`
/// received from a caller is untrusted until the backend has verified it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct File {
    /// Basename of the file
    pub name: String,
    pub mime: String,
    pub digest: String,
    /// Base64 encoded content
    pub payload: String,
}

impl File {
    /// Build a consistent file from raw content.
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, mime: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            digest: sha256_hex(bytes),
            payload: STANDARD.encode(bytes),
        }
    }

    pub fn decode_payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.payload.as_bytes())
    }
}
