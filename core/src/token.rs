use proposald_types::{TOKEN_SIZE, Token};

/// Mint a fresh random token from the thread-local CSPRNG.
///
/// Uniqueness against existing records is checked by the backend at insert time.
#[must_use]
pub fn generate_token() -> Token {
    let bytes: [u8; TOKEN_SIZE] = rand::random();
    Token::from_bytes(bytes.to_vec())
}
