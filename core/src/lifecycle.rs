//! Shutdown signalling shared by backends.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{BackendError, Result};

/// One-way open -> closed switch observed by every backend operation.
#[derive(Debug, Default)]
pub struct ShutdownFlag {
    closed: AtomicBool,
}

impl ShutdownFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip to closed. Returns `true` only for the call that closed it.
    pub fn trigger(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(BackendError::Shutdown)
        } else {
            Ok(())
        }
    }
}
