//! Static three-region ledger.
//!
//! Each region has a fixed budget and an atomic reserved counter. Grants are
//! best-effort: a request is trimmed to what is left and the shortfall is
//! reported as a `PoolWarning`. Nothing here blocks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use taskmem_core::category::{Category, CategoryBreakdown};
use taskmem_core::config::MemoryConfig;
use taskmem_core::error::{Error, Result};
use taskmem_core::ledger::{CategoryLedger, Grant, PoolWarning};

use crate::tracking::PeakTracker;

/// One region's budget.
struct Region {
    capacity: usize,
    reserved: AtomicUsize,
}

impl Region {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            reserved: AtomicUsize::new(0),
        }
    }

    /// Reserve up to `bytes`. Returns `(granted, reserved_after)`.
    fn try_reserve(&self, bytes: usize) -> (usize, usize) {
        let mut cur = self.reserved.load(Ordering::Relaxed);
        loop {
            let granted = bytes.min(self.capacity.saturating_sub(cur));
            if granted == 0 {
                return (0, cur);
            }
            let next = cur + granted;
            match self
                .reserved
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return (granted, next),
                Err(observed) => cur = observed,
            }
        }
    }

    /// Give back `bytes`. On underflow returns the reserved total unchanged.
    fn unreserve(&self, bytes: usize) -> std::result::Result<(), usize> {
        let mut cur = self.reserved.load(Ordering::Relaxed);
        loop {
            if bytes > cur {
                return Err(cur);
            }
            match self.reserved.compare_exchange_weak(
                cur,
                cur - bytes,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => cur = observed,
            }
        }
    }
}

struct LedgerInner {
    regions: [Region; 3],
    peaks: PeakTracker,
}

/// Concrete `CategoryLedger` with fixed per-category budgets.
///
/// Cloning yields another handle to the same counters, so a test (or the
/// owning task) can keep a handle while the manager owns another.
#[derive(Clone)]
pub struct StaticLedger {
    inner: Arc<LedgerInner>,
}

/// Serializable view of a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    pub budget: CategoryBreakdown,
    pub reserved: CategoryBreakdown,
    pub peak: CategoryBreakdown,
}

impl StaticLedger {
    /// Budgets must all be non-zero.
    pub fn new(storage: usize, shuffle: usize, intersection: usize) -> Result<Self> {
        for (category, budget) in [
            (Category::Storage, storage),
            (Category::Shuffle, shuffle),
            (Category::Intersection, intersection),
        ] {
            if budget == 0 {
                return Err(Error::Config(format!(
                    "{category} budget must be greater than zero"
                )));
            }
        }
        Ok(Self {
            inner: Arc::new(LedgerInner {
                regions: [
                    Region::new(storage),
                    Region::new(shuffle),
                    Region::new(intersection),
                ],
                peaks: PeakTracker::new(),
            }),
        })
    }

    pub fn from_config(cfg: &MemoryConfig) -> Result<Self> {
        Self::new(
            cfg.storage_budget_bytes,
            cfg.shuffle_budget_bytes,
            cfg.intersection_budget_bytes,
        )
    }

    fn region(&self, category: Category) -> &Region {
        &self.inner.regions[category.index()]
    }

    /// Highest reserved total seen for `category`.
    pub fn peak(&self, category: Category) -> usize {
        self.inner.peaks.peak(category)
    }

    /// Bytes still available in `category` (advisory).
    pub fn available(&self, category: Category) -> usize {
        self.budget(category).saturating_sub(self.reserved(category))
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            budget: CategoryBreakdown::from_fn(|c| self.budget(c)),
            reserved: CategoryBreakdown::from_fn(|c| self.reserved(c)),
            peak: self.inner.peaks.snapshot(),
        }
    }
}

impl CategoryLedger for StaticLedger {
    fn acquire(&self, category: Category, bytes: usize) -> Result<Grant> {
        if bytes == 0 {
            return Err(Error::InvalidRequest(format!(
                "cannot acquire zero bytes from {category} region"
            )));
        }
        let region = self.region(category);
        let (granted, reserved) = region.try_reserve(bytes);
        if granted > 0 {
            self.inner.peaks.record(category, reserved);
        }
        if granted == bytes {
            return Ok(Grant::full(granted));
        }
        Ok(Grant {
            granted,
            warning: Some(PoolWarning {
                category,
                requested: bytes,
                granted,
                budget: region.capacity,
                reserved,
            }),
        })
    }

    fn release(&self, category: Category, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Err(Error::InvalidRequest(format!(
                "cannot release zero bytes to {category} region"
            )));
        }
        self.region(category)
            .unreserve(bytes)
            .map_err(|reserved| Error::LedgerUnderflow {
                category,
                requested: bytes,
                reserved,
            })
    }

    fn release_all(&self, category: Category) {
        self.region(category).reserved.store(0, Ordering::Release);
    }

    fn reserved(&self, category: Category) -> usize {
        self.region(category).reserved.load(Ordering::Acquire)
    }

    fn budget(&self, category: Category) -> usize {
        self.region(category).capacity
    }
}
