use proposald_types::{File, ProposalStorageRecord, PsrStatus, Token};
use serde::Serialize;

use crate::error::Result;

/// A snapshot of one proposal: its files and its storage record.
///
/// Both halves always come from the same committed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proposal {
    pub files: Vec<File>,
    pub record: ProposalStorageRecord,
}

/// The proposal store contract.
///
/// Implementations own the canonical copy of every record and serialize
/// mutations per token. Every method is callable concurrently from many
/// threads. After [`Backend::close`] every mutating call fails with
/// [`BackendError::Shutdown`](crate::BackendError::Shutdown).
pub trait Backend: Send + Sync {
    /// Verify `files`, assign a fresh token and store the proposal as
    /// `unvetted` at version 1.
    fn new_proposal(&self, name: &str, files: Vec<File>) -> Result<ProposalStorageRecord>;

    /// Fetch a proposal that is currently `unvetted`.
    ///
    /// A proposal in any other state is reported as not found.
    fn get_unvetted(&self, token: &Token) -> Result<Proposal>;

    /// Fetch a proposal that is currently `vetted`.
    fn get_vetted(&self, token: &Token) -> Result<Proposal>;

    /// Replace the content of an unvetted proposal and bump its version.
    ///
    /// The version only moves when the new files pass verification.
    fn update_unvetted(&self, token: &Token, files: Vec<File>) -> Result<ProposalStorageRecord>;

    /// Move an unvetted proposal to `vetted` or `censored`.
    fn set_unvetted_status(&self, token: &Token, status: PsrStatus) -> Result<PsrStatus>;

    /// Stop accepting work. Idempotent.
    fn close(&self);
}
