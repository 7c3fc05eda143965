//! In-memory backend.
//!
//! The outer map lock is held only long enough to look up or insert an entry;
//! each proposal then has its own `RwLock`, which gives per-token exclusion
//! for mutations and consistent snapshots for readers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::anyhow;
use proposald_types::{ContentPolicy, File, ProposalStorageRecord, PsrStatus, Token};

use crate::backend::{Backend, Proposal};
use crate::content::PreparedContent;
use crate::error::{BackendError, Result};
use crate::lifecycle::ShutdownFlag;
use crate::token::generate_token;

#[derive(Debug)]
struct Entry {
    record: ProposalStorageRecord,
    files: Vec<File>,
}

/// Volatile [`Backend`] for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    policy: ContentPolicy,
    shutdown: ShutdownFlag,
    entries: RwLock<HashMap<Token, Arc<RwLock<Entry>>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(policy: ContentPolicy) -> Self {
        Self {
            policy,
            shutdown: ShutdownFlag::new(),
            entries: RwLock::default(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, token: &Token) -> Result<Arc<RwLock<Entry>>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
            .ok_or_else(|| BackendError::not_found(token))
    }

    fn get_scoped(&self, token: &Token, scope: PsrStatus) -> Result<Proposal> {
        self.shutdown.ensure_open()?;
        let entry = self.entry(token)?;
        let entry = entry.read().unwrap_or_else(PoisonError::into_inner);
        if entry.record.status != scope {
            return Err(BackendError::not_found(token));
        }
        tracing::debug!(token = %token, status = %scope, "proposal read");
        Ok(Proposal {
            files: entry.files.clone(),
            record: entry.record.clone(),
        })
    }
}

impl Backend for MemoryBackend {
    fn new_proposal(&self, name: &str, files: Vec<File>) -> Result<ProposalStorageRecord> {
        self.shutdown.ensure_open()?;
        let prepared = PreparedContent::prepare(files, &self.policy).inspect_err(|err| {
            tracing::warn!(name, error = %err, "rejected new proposal");
        })?;
        let (files, merkle) = prepared.into_parts();

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        self.shutdown.ensure_open()?;

        let mut token = generate_token();
        while entries.contains_key(&token) {
            token = generate_token();
        }
        let record = ProposalStorageRecord {
            version: 1,
            status: PsrStatus::Unvetted,
            merkle,
            name: name.to_string(),
            token: token.clone(),
        };
        entries.insert(
            token,
            Arc::new(RwLock::new(Entry {
                record: record.clone(),
                files,
            })),
        );

        tracing::info!(token = %record.token, merkle = %record.merkle, "proposal created");
        Ok(record)
    }

    fn get_unvetted(&self, token: &Token) -> Result<Proposal> {
        self.get_scoped(token, PsrStatus::Unvetted)
    }

    fn get_vetted(&self, token: &Token) -> Result<Proposal> {
        self.get_scoped(token, PsrStatus::Vetted)
    }

    fn update_unvetted(&self, token: &Token, files: Vec<File>) -> Result<ProposalStorageRecord> {
        self.shutdown.ensure_open()?;
        let prepared = PreparedContent::prepare(files, &self.policy).inspect_err(|err| {
            tracing::warn!(token = %token, error = %err, "rejected proposal update");
        })?;
        let entry = self.entry(token)?;

        let mut entry = entry.write().unwrap_or_else(PoisonError::into_inner);
        self.shutdown.ensure_open()?;
        if entry.record.status != PsrStatus::Unvetted {
            return Err(BackendError::InvalidTransition(
                proposald_types::InvalidTransition {
                    from: entry.record.status,
                    to: PsrStatus::Unvetted,
                },
            ));
        }

        let version = entry
            .record
            .version
            .checked_add(1)
            .ok_or_else(|| anyhow!("version overflow for proposal {token}"))?;
        let (files, merkle) = prepared.into_parts();
        entry.record.version = version;
        entry.record.merkle = merkle;
        entry.files = files;

        tracing::info!(token = %token, version, merkle = %merkle, "proposal updated");
        Ok(entry.record.clone())
    }

    fn set_unvetted_status(&self, token: &Token, status: PsrStatus) -> Result<PsrStatus> {
        self.shutdown.ensure_open()?;
        let entry = self.entry(token)?;

        let mut entry = entry.write().unwrap_or_else(PoisonError::into_inner);
        self.shutdown.ensure_open()?;
        let next = entry.record.status.transition(status).inspect_err(|err| {
            tracing::warn!(token = %token, error = %err, "rejected status change");
        })?;
        entry.record.status = next;

        tracing::info!(token = %token, status = %next, "proposal status changed");
        Ok(next)
    }

    fn close(&self) {
        if self.shutdown.trigger() {
            tracing::info!("memory backend closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use proposald_types::{MIME_TEXT_UTF8, MerkleRoot, sha256};

    use super::*;
    use crate::ErrorKind;

    fn index(body: &str) -> File {
        File::from_bytes("index.md", MIME_TEXT_UTF8, body.as_bytes())
    }

    fn backend() -> MemoryBackend {
        MemoryBackend::new(ContentPolicy::default())
    }

    #[test]
    fn new_creates_unvetted_version_one() {
        let backend = backend();
        let record = backend
            .new_proposal("Fund the thing", vec![index("C")])
            .unwrap();

        assert_eq!(record.version, 1);
        assert_eq!(record.status, PsrStatus::Unvetted);
        assert_eq!(record.name, "Fund the thing");
        assert_eq!(record.merkle, MerkleRoot::new(sha256(&sha256(b"C"))));
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn vetting_scenario() {
        let backend = backend();
        let file = index("C");
        let record = backend
            .new_proposal("A", vec![file.clone()])
            .unwrap();
        let token = record.token.clone();

        let unvetted = backend.get_unvetted(&token).unwrap();
        assert_eq!(unvetted.files, vec![file.clone()]);
        assert_eq!(
            backend.get_vetted(&token).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        assert_eq!(
            backend
                .set_unvetted_status(&token, PsrStatus::Vetted)
                .unwrap(),
            PsrStatus::Vetted
        );

        let vetted = backend.get_vetted(&token).unwrap();
        assert_eq!(vetted.files, vec![file]);
        assert_eq!(
            vetted.record,
            ProposalStorageRecord {
                status: PsrStatus::Vetted,
                ..record
            }
        );
        assert_eq!(
            backend.get_unvetted(&token).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn vetting_is_one_way() {
        let backend = backend();
        let token = backend.new_proposal("A", vec![index("x")]).unwrap().token;

        backend
            .set_unvetted_status(&token, PsrStatus::Vetted)
            .unwrap();
        for target in PsrStatus::ALL {
            let err = backend.set_unvetted_status(&token, target).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidTransition, "{target}");
        }
    }

    #[test]
    fn censored_stays_censored() {
        let backend = backend();
        let token = backend.new_proposal("A", vec![index("x")]).unwrap().token;

        backend
            .set_unvetted_status(&token, PsrStatus::Censored)
            .unwrap();
        assert!(matches!(
            backend.set_unvetted_status(&token, PsrStatus::Vetted),
            Err(BackendError::InvalidTransition(t))
                if t.from == PsrStatus::Censored && t.to == PsrStatus::Vetted
        ));
        assert_eq!(
            backend.get_unvetted(&token).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            backend.get_vetted(&token).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn illegal_targets_from_unvetted() {
        let backend = backend();
        let token = backend.new_proposal("A", vec![index("x")]).unwrap().token;
        for target in [PsrStatus::Invalid, PsrStatus::Unvetted] {
            assert_eq!(
                backend
                    .set_unvetted_status(&token, target)
                    .unwrap_err()
                    .kind(),
                ErrorKind::InvalidTransition
            );
        }
        assert!(backend.get_unvetted(&token).is_ok());
    }

    #[test]
    fn unknown_token_is_not_found() {
        let backend = backend();
        let token = Token::from_bytes(vec![0; 32]);
        assert_eq!(
            backend
                .set_unvetted_status(&token, PsrStatus::Vetted)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            backend
                .update_unvetted(&token, vec![index("x")])
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn bad_content_is_rejected_before_storage() {
        let backend = backend();
        let mut file = index("real");
        file.digest = proposald_types::sha256_hex(b"fake");
        let err = backend.new_proposal("A", vec![file]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContentVerification);
        assert!(backend.is_empty());
    }

    #[test]
    fn update_bumps_version_only_when_verified() {
        let backend = backend();
        let token = backend.new_proposal("A", vec![index("v1")]).unwrap().token;

        let mut bad = index("v2");
        bad.payload = index("other").payload;
        assert_eq!(
            backend
                .update_unvetted(&token, vec![bad])
                .unwrap_err()
                .kind(),
            ErrorKind::ContentVerification
        );
        assert_eq!(backend.get_unvetted(&token).unwrap().record.version, 1);

        let updated = backend.update_unvetted(&token, vec![index("v2")]).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.status, PsrStatus::Unvetted);
        assert_eq!(updated.token, token);
        assert_eq!(updated.merkle, MerkleRoot::new(sha256(&sha256(b"v2"))));

        let current = backend.get_unvetted(&token).unwrap();
        assert_eq!(current.record, updated);
        assert_eq!(current.files, vec![index("v2")]);
    }

    #[test]
    fn update_rejected_once_vetted() {
        let backend = backend();
        let token = backend.new_proposal("A", vec![index("v1")]).unwrap().token;
        backend
            .set_unvetted_status(&token, PsrStatus::Vetted)
            .unwrap();

        assert_eq!(
            backend
                .update_unvetted(&token, vec![index("v2")])
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidTransition
        );
        assert_eq!(backend.get_vetted(&token).unwrap().record.version, 1);
    }

    #[test]
    fn close_fails_fast() {
        let backend = backend();
        let token = backend.new_proposal("A", vec![index("x")]).unwrap().token;
        backend.close();
        backend.close();

        assert_eq!(
            backend
                .new_proposal("B", vec![index("y")])
                .unwrap_err()
                .kind(),
            ErrorKind::Shutdown
        );
        assert_eq!(
            backend
                .set_unvetted_status(&token, PsrStatus::Vetted)
                .unwrap_err()
                .kind(),
            ErrorKind::Shutdown
        );
        assert_eq!(
            backend
                .update_unvetted(&token, vec![index("z")])
                .unwrap_err()
                .kind(),
            ErrorKind::Shutdown
        );
        assert_eq!(
            backend.get_unvetted(&token).unwrap_err().kind(),
            ErrorKind::Shutdown
        );
    }

    #[test]
    fn concurrent_vetting_has_one_winner() {
        let backend = backend();
        let token = backend.new_proposal("A", vec![index("x")]).unwrap().token;

        let results: Vec<Result<PsrStatus>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let backend = &backend;
                    let token = &token;
                    let target = if i % 2 == 0 {
                        PsrStatus::Vetted
                    } else {
                        PsrStatus::Censored
                    };
                    scope.spawn(move || backend.set_unvetted_status(token, target))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("thread panicked"))
                .collect()
        });

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|e| {
            e.kind() == ErrorKind::InvalidTransition
        }));
    }

    #[test]
    fn proposal_snapshot_serializes() {
        let backend = backend();
        let token = backend.new_proposal("A", vec![index("x")]).unwrap().token;
        let proposal = backend.get_unvetted(&token).unwrap();
        let json = serde_json::to_value(&proposal).unwrap();
        assert_eq!(json["record"]["status"], "unvetted");
        assert_eq!(json["record"]["token"], token.to_hex());
        assert_eq!(json["files"][0]["name"], "index.md");
    }
}
