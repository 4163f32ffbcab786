//! `tracing`-backed observer (feature: `tracing`).

use taskmem_core::category::Category;
use taskmem_core::error::Error;
use taskmem_core::id::PageNumber;
use taskmem_core::ledger::PoolWarning;
use taskmem_core::observer::MemoryObserver;

/// Default observer of `TaskMemoryManager` when the `tracing` feature is on.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl MemoryObserver for TracingObserver {
    fn page_allocated(&self, page: PageNumber, bytes: usize, category: Category) {
        tracing::debug!(page = page.get(), bytes, %category, "allocated page");
    }

    fn page_freed(&self, page: PageNumber, bytes: usize, category: Category) {
        tracing::debug!(page = page.get(), bytes, %category, "freed page");
    }

    fn shortfall(&self, warning: &PoolWarning) {
        tracing::warn!(
            category = %warning.category,
            requested = warning.requested,
            granted = warning.granted,
            budget = warning.budget,
            "memory grant fell short"
        );
    }

    fn rolled_back(&self, category: Category, bytes: usize, cause: &Error) {
        tracing::warn!(%category, bytes, error = %cause, "rolled back page allocation");
    }

    fn rollback_failed(&self, category: Category, bytes: usize, cause: &Error, err: &Error) {
        tracing::error!(
            %category,
            bytes,
            cause = %cause,
            error = %err,
            "ledger rejected rollback credit"
        );
    }

    fn teardown(&self, pages_freed: usize) {
        tracing::debug!(pages_freed, "released all task memory");
    }
}
