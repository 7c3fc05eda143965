//! Owner-only filesystem permissions for the proposal database.
//!
//! The parent directory is tightened to 0o700 when we own it, and the
//! database file plus its WAL/SHM sidecars to 0o600. No-ops off Unix.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create the parent directory and database file with secure permissions,
/// then open the connection.
pub(crate) fn open_secure_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_secure_dir(parent)?;
    }
    ensure_secure_db_file(path)?;

    Connection::open(path)
        .with_context(|| format!("Failed to open proposal database at {}", path.display()))
}

fn ensure_secure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let metadata = std::fs::metadata(dir)
            .with_context(|| format!("Failed to read directory metadata: {}", dir.display()))?;
        let our_uid = unsafe { libc::getuid() };
        if metadata.uid() == our_uid && metadata.permissions().mode() & 0o077 != 0 {
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
                .with_context(|| format!("Failed to tighten permissions: {}", dir.display()))?;
        }
    }
    Ok(())
}

fn ensure_secure_db_file(path: &Path) -> Result<()> {
    let mut options = OpenOptions::new();
    options.create(true).truncate(false).read(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
        .open(path)
        .with_context(|| format!("Failed to create database file: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set database permissions: {}", path.display()))?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = sidecar_path(path, suffix);
            if sidecar.exists()
                && let Err(err) =
                    std::fs::set_permissions(&sidecar, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(
                    path = %sidecar.display(),
                    error = %err,
                    "Failed to tighten sidecar permissions"
                );
            }
        }
    }
    Ok(())
}

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_appends_suffix() {
        assert_eq!(
            sidecar_path(Path::new("/tmp/db/proposals.db"), "-wal"),
            PathBuf::from("/tmp/db/proposals.db-wal")
        );
    }

    #[test]
    fn creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("proposals.db");
        let conn = open_secure_db(&path).unwrap();
        drop(conn);
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn database_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proposals.db");
        let _conn = open_secure_db(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
