use serde::{Deserialize, Serialize};

use crate::digest::MerkleRoot;
use crate::status::PsrStatus;
use crate::token::Token;

/// Proposal storage record: the metadata envelope of one proposal version.
///
/// The record references its files through `merkle` and never embeds them.
/// Callers always receive owned snapshots; the backend keeps the canonical copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalStorageRecord {
    /// Iteration count of the proposal, starting at 1
    pub version: u32,
    pub status: PsrStatus,
    /// Merkle root of all files in the proposal
    pub merkle: MerkleRoot,
    /// Short name of the proposal, not used for identity
    pub name: String,
    pub token: Token,
}

impl ProposalStorageRecord {
    #[must_use]
    pub fn is_unvetted(&self) -> bool {
        self.status == PsrStatus::Unvetted
    }

    #[must_use]
    pub fn is_vetted(&self) -> bool {
        self.status == PsrStatus::Vetted
    }
}
