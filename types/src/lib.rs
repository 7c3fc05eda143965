//! Core domain types for proposald.
//!
//! This crate contains the pure data model of the proposal store: files,
//! storage records, status codes and tokens. No IO, no locking, no storage.
//! Everything here can be used from any layer of the application.
//!
//! # Architecture
//!
//! ```text
//! ProposalStorageRecord
//! ├── token: Token            (immutable identity)
//! ├── status: PsrStatus       (unvetted -> vetted | censored)
//! ├── merkle: MerkleRoot      (sha256 over ordered file digests)
//! └── version / name
//!
//! File (name, mime, digest, payload) -- referenced via merkle, never embedded
//! ```

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod digest;
mod file;
mod record;
mod settings;
mod status;
mod token;

pub use digest::{DIGEST_SIZE, MerkleRoot, sha256, sha256_hex};
pub use file::File;
pub use record::ProposalStorageRecord;
pub use settings::{
    ContentPolicy, ContentPolicyError, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_FILES, MIME_PNG,
    MIME_TEXT_UTF8,
};
pub use status::{InvalidTransition, ParseStatusError, PsrStatus, StatusCodeError};
pub use token::{TOKEN_SIZE, Token, TokenParseError};
