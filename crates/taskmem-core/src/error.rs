use thiserror::Error;

use crate::category::Category;
use crate::id::PageNumber;
use crate::ledger::PoolWarning;

/// Canonical result for the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("out of memory: {0}")]
    OutOfMemory(PoolWarning),

    #[error("page table exhausted: all {slots} page slots are in use")]
    TableExhausted { slots: usize },

    #[error("double free of {0}")]
    DoubleFree(PageNumber),

    #[error("{page} is outside the page table (len {len})")]
    OutOfRange { page: PageNumber, len: usize },

    #[error("{0} is not allocated")]
    NotFound(PageNumber),

    #[error("block allocator failed for {bytes} bytes: {reason}")]
    AllocatorFailure { bytes: usize, reason: String },

    #[error("released {requested} bytes from {category} region but only {reserved} are reserved")]
    LedgerUnderflow {
        category: Category,
        requested: usize,
        reserved: usize,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Conditions callers are expected to handle (spill, back off, retry).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::OutOfMemory(_) | Error::TableExhausted { .. })
    }

    /// Bookkeeping violations that indicate a bug in the caller or a collaborator.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Error::DoubleFree(_) | Error::OutOfRange { .. } | Error::LedgerUnderflow { .. }
        )
    }

    /// Wrap any failure reported by a block allocator as `AllocatorFailure`.
    pub fn into_allocator_failure(self, bytes: usize) -> Error {
        match self {
            e @ Error::AllocatorFailure { .. } => e,
            other => Error::AllocatorFailure {
                bytes,
                reason: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
