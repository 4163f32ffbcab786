//! Category ledger interface.
//!
//! The concrete implementation lives in `taskmem-mem`. A ledger only counts
//! bytes; it never touches physical memory.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::error::Result;

/// Shortfall detail attached to a partial (or empty) grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolWarning {
    pub category: Category,
    pub requested: usize,
    pub granted: usize,
    /// Configured budget of the category.
    pub budget: usize,
    /// Reserved bytes in the category right after the grant.
    pub reserved: usize,
}

impl PoolWarning {
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.granted)
    }

    /// Bytes that were still free before this request.
    pub fn available(&self) -> usize {
        self.budget
            .saturating_sub(self.reserved)
            .saturating_add(self.granted)
    }
}

impl fmt::Display for PoolWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} region granted {} of {} bytes ({} available, budget {})",
            self.category,
            self.granted,
            self.requested,
            self.available(),
            self.budget
        )
    }
}

/// Result of a best-effort acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub granted: usize,
    /// Present whenever `granted` is smaller than the request.
    pub warning: Option<PoolWarning>,
}

impl Grant {
    pub fn full(bytes: usize) -> Self {
        Self {
            granted: bytes,
            warning: None,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.warning.is_some()
    }
}

/// Per-category byte budgets.
///
/// `acquire` never blocks waiting for another task; it grants what fits and
/// reports the rest through `Grant::warning`. Callers decide whether to spill,
/// retry smaller, or fail.
pub trait CategoryLedger: Send + Sync + 'static {
    /// Reserve up to `bytes` in `category`. Zero is an `InvalidRequest`.
    fn acquire(&self, category: Category, bytes: usize) -> Result<Grant>;

    /// Credit `bytes` back. Releasing more than is reserved is a `LedgerUnderflow`.
    fn release(&self, category: Category, bytes: usize) -> Result<()>;

    /// Zero the category. Task teardown only.
    fn release_all(&self, category: Category);

    /// Bytes currently reserved (advisory under concurrency).
    fn reserved(&self, category: Category) -> usize;

    /// Configured budget.
    fn budget(&self, category: Category) -> usize;
}
