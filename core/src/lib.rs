//! Backend contract and domain logic for proposald.
//!
//! This crate owns everything a storage medium must not get wrong:
//! content verification, merkle computation, the backend contract, token
//! minting and shutdown signalling. Concrete stores
//! implement [`Backend`]; [`MemoryBackend`] is the reference implementation.
//!
//! # Architecture
//!
//! ```text
//! Backend (trait)
//! ├── MemoryBackend            (this crate)
//! └── SqliteBackend            (proposald-store)
//!
//! submission -> PreparedContent::prepare (verify + canonicalize + merkle)
//!            -> per-token exclusion -> PsrStatus::transition -> commit
//! ```

mod backend;
mod content;
mod error;
mod lifecycle;
mod memory;
mod merkle;
mod token;

pub use backend::{Backend, Proposal};
pub use content::{ContentError, PreparedContent, verify_content};
pub use error::{BackendError, ErrorKind, Result};
pub use lifecycle::ShutdownFlag;
pub use memory::MemoryBackend;
pub use merkle::{compute_merkle, merkle_root};
pub use token::generate_token;
