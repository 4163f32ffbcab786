//! Diagnostics hooks.
//!
//! The manager reports lifecycle events here instead of logging directly.
//! `taskmem-mem` ships a `tracing`-backed implementation.

use crate::category::Category;
use crate::error::Error;
use crate::id::PageNumber;
use crate::ledger::PoolWarning;

pub trait MemoryObserver: Send + Sync {
    fn page_allocated(&self, _page: PageNumber, _bytes: usize, _category: Category) {}

    fn page_freed(&self, _page: PageNumber, _bytes: usize, _category: Category) {}

    /// The ledger granted less than was asked for.
    fn shortfall(&self, _warning: &PoolWarning) {}

    /// A partial allocation was undone before `cause` was returned.
    fn rolled_back(&self, _category: Category, _bytes: usize, _cause: &Error) {}

    /// The ledger refused the credit of a rollback. `cause` is still what the
    /// caller gets back.
    fn rollback_failed(&self, _category: Category, _bytes: usize, _cause: &Error, _err: &Error) {}

    fn teardown(&self, _pages_freed: usize) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl MemoryObserver for NoopObserver {}
