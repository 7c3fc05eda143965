//! Durable storage for proposald.
//!
//! [`SqliteBackend`] implements [`proposald_core::Backend`] on a single
//! SQLite database file:
//!
//! ```text
//! proposals        token -> name, version, status, merkle, timestamps
//! proposal_files   (token, seq) -> name, mime, digest, payload
//! status_changes   append-only audit trail of vetting decisions
//! ```

mod sqlite;
mod sqlite_security;

pub use sqlite::{SqliteBackend, StatusChange};
