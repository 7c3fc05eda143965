use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of tokens minted by the backend. Tokens read back from storage or
/// supplied by callers are opaque and may have any non-zero length.
pub const TOKEN_SIZE: usize = 32;

/// Opaque, immutable identity of a proposal across versions and status changes.
///
/// Serialized as lowercase hex. Deserialization goes through [`FromStr`], so
/// an empty token is rejected on every entry point.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Token(Vec<u8>);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TokenParseError {
    #[error("token must not be empty")]
    Empty,
    #[error("token is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl Token {
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.to_hex())
    }
}

impl FromStr for Token {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TokenParseError::Empty);
        }
        Ok(Self(hex::decode(s)?))
    }
}

impl TryFrom<String> for Token {
    type Error = TokenParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.to_hex()
    }
}

impl AsRef<[u8]> for Token {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
