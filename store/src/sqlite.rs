//! SQLite-backed proposal store.
//!
//! One connection guarded by a mutex. Every mutation runs in an `IMMEDIATE`
//! transaction and status changes are conditional on the status read inside
//! that transaction, so two writers racing on one token (even from separate
//! processes sharing the file) produce exactly one winner.
//!
//! Reads re-check the stored merkle root against the stored file digests and
//! report a mismatch as a storage failure rather than returning corrupt data.

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};

use proposald_core::{
    Backend, BackendError, PreparedContent, Proposal, Result, ShutdownFlag, compute_merkle,
    generate_token,
};
use proposald_types::{
    ContentPolicy, File, InvalidTransition, MerkleRoot, ProposalStorageRecord, PsrStatus, Token,
};

use crate::sqlite_security::open_secure_db;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One recorded status change of a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: PsrStatus,
    pub to: PsrStatus,
    pub changed_at: String,
}

/// Durable [`Backend`] on a single SQLite database file.
pub struct SqliteBackend {
    policy: ContentPolicy,
    shutdown: ShutdownFlag,
    db: Mutex<Option<Connection>>,
}

impl SqliteBackend {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS proposals (
            token BLOB PRIMARY KEY,
            name TEXT NOT NULL,
            version INTEGER NOT NULL CHECK (version >= 1),
            status INTEGER NOT NULL CHECK (status IN (1, 2, 3)),
            merkle BLOB NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS proposal_files (
            token BLOB NOT NULL,
            seq INTEGER NOT NULL,
            name TEXT NOT NULL,
            mime TEXT NOT NULL,
            digest TEXT NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (token, seq),
            FOREIGN KEY (token) REFERENCES proposals(token) ON DELETE CASCADE
        );

        -- Append-only audit trail of vetting decisions
        CREATE TABLE IF NOT EXISTS status_changes (
            id INTEGER PRIMARY KEY,
            token BLOB NOT NULL,
            from_status INTEGER NOT NULL,
            to_status INTEGER NOT NULL,
            changed_at TEXT NOT NULL,
            FOREIGN KEY (token) REFERENCES proposals(token)
        );

        CREATE INDEX IF NOT EXISTS idx_status_changes_token
        ON status_changes(token, id);
    ";

    /// Open or create the proposal database at the given path.
    pub fn open(path: impl AsRef<Path>, policy: ContentPolicy) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let db = open_secure_db(path)?;
        let backend = Self::initialize(db, policy)?;
        tracing::info!(path = %path.display(), "proposal store opened");
        Ok(backend)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory(policy: ContentPolicy) -> anyhow::Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory proposal store")?;
        Self::initialize(db, policy)
    }

    fn initialize(db: Connection, policy: ContentPolicy) -> anyhow::Result<Self> {
        db.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;",
        )
        .context("Failed to set proposal store pragmas")?;
        db.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")?;
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create proposal store schema")?;
        Ok(Self {
            policy,
            shutdown: ShutdownFlag::new(),
            db: Mutex::new(Some(db)),
        })
    }

    /// Vetting decisions recorded for `token`, oldest first.
    ///
    /// Fails with not-found when no proposal exists under `token`.
    pub fn status_history(&self, token: &Token) -> Result<Vec<StatusChange>> {
        self.with_db(|db| {
            let exists = db
                .query_row(
                    "SELECT 1 FROM proposals WHERE token = ?1",
                    [token.as_bytes()],
                    |_| Ok(()),
                )
                .optional()
                .context("Failed to look up proposal")?;
            if exists.is_none() {
                return Err(BackendError::not_found(token));
            }

            let mut stmt = db
                .prepare(
                    "SELECT from_status, to_status, changed_at
                     FROM status_changes
                     WHERE token = ?1
                     ORDER BY id ASC",
                )
                .context("Failed to prepare status history query")?;
            let rows = stmt
                .query_map([token.as_bytes()], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .context("Failed to query status history")?;

            let mut history = Vec::new();
            for row in rows {
                let (from, to, changed_at) = row.context("Failed to read status change")?;
                history.push(StatusChange {
                    from: stored_status(from)?,
                    to: stored_status(to)?,
                    changed_at,
                });
            }
            Ok(history)
        })
    }

    /// Run `f` against the open connection. Fails with shutdown once closed.
    fn with_db<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        self.shutdown.ensure_open()?;
        let db = guard.as_mut().ok_or(BackendError::Shutdown)?;
        f(db)
    }

    fn get_scoped(&self, token: &Token, scope: PsrStatus) -> Result<Proposal> {
        self.shutdown.ensure_open()?;
        let proposal = self.with_db(|db| {
            let tx = db
                .transaction()
                .context("Failed to start read transaction")?;
            let proposal = load_proposal(&tx, token)?;
            tx.commit().context("Failed to finish read transaction")?;
            Ok(proposal)
        })?;

        match proposal {
            Some(proposal) if proposal.record.status == scope => {
                tracing::debug!(token = %token, status = %scope, "proposal read");
                Ok(proposal)
            }
            _ => Err(BackendError::not_found(token)),
        }
    }
}

impl Backend for SqliteBackend {
    fn new_proposal(&self, name: &str, files: Vec<File>) -> Result<ProposalStorageRecord> {
        self.shutdown.ensure_open()?;
        let prepared = PreparedContent::prepare(files, &self.policy).inspect_err(|err| {
            tracing::warn!(name, error = %err, "rejected new proposal");
        })?;

        let record = self.with_db(|db| {
            let tx = db
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .context("Failed to start proposal transaction")?;

            let mut token = generate_token();
            while record_status(&tx, &token)?.is_some() {
                token = generate_token();
            }

            let now = timestamp();
            tx.execute(
                "INSERT INTO proposals (token, name, version, status, merkle, created_at, updated_at)
                 VALUES (?1, ?2, 1, ?3, ?4, ?5, ?5)",
                params![
                    token.as_bytes(),
                    name,
                    i64::from(PsrStatus::Unvetted),
                    prepared.merkle().as_bytes().as_slice(),
                    now
                ],
            )
            .context("Failed to insert proposal")?;
            insert_files(&tx, &token, prepared.files())?;
            tx.commit().context("Failed to commit proposal")?;

            Ok(ProposalStorageRecord {
                version: 1,
                status: PsrStatus::Unvetted,
                merkle: prepared.merkle(),
                name: name.to_string(),
                token,
            })
        })?;

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

        let record = self.with_db(|db| {
            let tx = db
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .context("Failed to start update transaction")?;

            let mut record =
                load_record(&tx, token)?.ok_or_else(|| BackendError::not_found(token))?;
            if record.status != PsrStatus::Unvetted {
                return Err(InvalidTransition {
                    from: record.status,
                    to: PsrStatus::Unvetted,
                }
                .into());
            }
            record.version = record
                .version
                .checked_add(1)
                .ok_or_else(|| anyhow!("version overflow for proposal {token}"))?;
            record.merkle = prepared.merkle();

            tx.execute(
                "UPDATE proposals SET version = ?1, merkle = ?2, updated_at = ?3
                 WHERE token = ?4 AND status = ?5",
                params![
                    i64::from(record.version),
                    record.merkle.as_bytes().as_slice(),
                    timestamp(),
                    token.as_bytes(),
                    i64::from(PsrStatus::Unvetted)
                ],
            )
            .context("Failed to update proposal")?;
            tx.execute(
                "DELETE FROM proposal_files WHERE token = ?1",
                [token.as_bytes()],
            )
            .context("Failed to remove previous files")?;
            insert_files(&tx, token, prepared.files())?;
            tx.commit().context("Failed to commit proposal update")?;
            Ok(record)
        })?;

        tracing::info!(
            token = %token,
            version = record.version,
            merkle = %record.merkle,
            "proposal updated"
        );
        Ok(record)
    }

    fn set_unvetted_status(&self, token: &Token, status: PsrStatus) -> Result<PsrStatus> {
        self.shutdown.ensure_open()?;
        let next = self.with_db(|db| {
            let tx = db
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .context("Failed to start status transaction")?;

            let current = record_status(&tx, token)?.ok_or_else(|| BackendError::not_found(token))?;
            let next = current.transition(status).inspect_err(|err| {
                tracing::warn!(token = %token, error = %err, "rejected status change");
            })?;

            let now = timestamp();
            let changed = tx
                .execute(
                    "UPDATE proposals SET status = ?1, updated_at = ?2
                     WHERE token = ?3 AND status = ?4",
                    params![
                        i64::from(next),
                        now,
                        token.as_bytes(),
                        i64::from(current)
                    ],
                )
                .context("Failed to update proposal status")?;
            if changed != 1 {
                return Err(anyhow!("status of proposal {token} changed concurrently").into());
            }
            tx.execute(
                "INSERT INTO status_changes (token, from_status, to_status, changed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    token.as_bytes(),
                    i64::from(current),
                    i64::from(next),
                    now
                ],
            )
            .context("Failed to record status change")?;
            tx.commit().context("Failed to commit status change")?;
            Ok(next)
        })?;

        tracing::info!(token = %token, status = %next, "proposal status changed");
        Ok(next)
    }

    fn close(&self) {
        if !self.shutdown.trigger() {
            return;
        }
        let db = self
            .db
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(db) = db
            && let Err((_, err)) = db.close()
        {
            tracing::warn!(error = %err, "Failed to close proposal store cleanly");
        }
        tracing::info!("proposal store closed");
    }
}

impl Drop for SqliteBackend {
    fn drop(&mut self) {
        self.close();
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn stored_status(code: i64) -> anyhow::Result<PsrStatus> {
    let status = PsrStatus::from_code(code).context("Corrupt proposal status")?;
    if !status.is_resting() {
        bail!("Corrupt proposal status: {status} is never persisted");
    }
    Ok(status)
}

fn record_status(tx: &Transaction<'_>, token: &Token) -> anyhow::Result<Option<PsrStatus>> {
    let code: Option<i64> = tx
        .query_row(
            "SELECT status FROM proposals WHERE token = ?1",
            [token.as_bytes()],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to query proposal status")?;
    code.map(stored_status).transpose()
}

fn load_record(
    tx: &Transaction<'_>,
    token: &Token,
) -> anyhow::Result<Option<ProposalStorageRecord>> {
    let row = tx
        .query_row(
            "SELECT name, version, status, merkle FROM proposals WHERE token = ?1",
            [token.as_bytes()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            },
        )
        .optional()
        .context("Failed to query proposal")?;

    let Some((name, version, status, merkle)) = row else {
        return Ok(None);
    };
    let version = u32::try_from(version)
        .with_context(|| format!("Corrupt version {version} for proposal {token}"))?;
    let merkle = MerkleRoot::from_slice(&merkle)
        .with_context(|| format!("Corrupt merkle root for proposal {token}"))?;

    Ok(Some(ProposalStorageRecord {
        version,
        status: stored_status(status)?,
        merkle,
        name,
        token: token.clone(),
    }))
}

fn load_files(tx: &Transaction<'_>, token: &Token) -> anyhow::Result<Vec<File>> {
    let mut stmt = tx
        .prepare(
            "SELECT name, mime, digest, payload
             FROM proposal_files
             WHERE token = ?1
             ORDER BY seq ASC",
        )
        .context("Failed to prepare file query")?;
    let rows = stmt
        .query_map([token.as_bytes()], |row| {
            Ok(File {
                name: row.get(0)?,
                mime: row.get(1)?,
                digest: row.get(2)?,
                payload: row.get(3)?,
            })
        })
        .context("Failed to query proposal files")?;

    let mut files = Vec::new();
    for row in rows {
        files.push(row.context("Failed to read proposal file")?);
    }
    Ok(files)
}

fn load_proposal(tx: &Transaction<'_>, token: &Token) -> anyhow::Result<Option<Proposal>> {
    let Some(record) = load_record(tx, token)? else {
        return Ok(None);
    };
    let files = load_files(tx, token)?;

    let merkle = compute_merkle(&files)
        .with_context(|| format!("Corrupt file digest in proposal {token}"))?;
    if merkle != record.merkle {
        bail!(
            "Merkle mismatch for proposal {token}: stored {}, computed {merkle}",
            record.merkle
        );
    }
    Ok(Some(Proposal { files, record }))
}

fn insert_files(tx: &Transaction<'_>, token: &Token, files: &[File]) -> anyhow::Result<()> {
    for (seq, file) in files.iter().enumerate() {
        tx.execute(
            "INSERT INTO proposal_files (token, seq, name, mime, digest, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                token.as_bytes(),
                seq as i64,
                &file.name,
                &file.mime,
                &file.digest,
                &file.payload
            ],
        )
        .with_context(|| format!("Failed to insert file {}", file.name))?;
    }
    Ok(())
}
