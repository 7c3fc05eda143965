//! Typed failures returned by every [`Backend`](crate::Backend) operation.

use proposald_types::{InvalidTransition, Token};
use thiserror::Error;

use crate::content::ContentError;

pub type Result<T, E = BackendError> = std::result::Result<T, E>;

/// Discriminant of [`BackendError`] for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Shutdown,
    InvalidTransition,
    ContentVerification,
    Storage,
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// No record in the requested state matches the token.
    #[error("proposal not found: {token}")]
    NotFound { token: Token },

    #[error("backend is shutting down")]
    Shutdown,

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// The submitted files were rejected. Nothing was written.
    #[error("content verification failed: {0}")]
    ContentVerification(#[from] ContentError),

    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl BackendError {
    #[must_use]
    pub fn not_found(token: &Token) -> Self {
        Self::NotFound {
            token: token.clone(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Shutdown => ErrorKind::Shutdown,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::ContentVerification(_) => ErrorKind::ContentVerification,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<anyhow::Error> for BackendError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err)
    }
}
