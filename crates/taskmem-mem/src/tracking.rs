//! Per-category peak tracking.
//!
//! Keep this cheap: one atomic max per category on every successful reserve.

use std::sync::atomic::{AtomicUsize, Ordering};

use taskmem_core::category::{Category, CategoryBreakdown};

#[derive(Default)]
pub struct PeakTracker {
    peaks: [AtomicUsize; 3],
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the reserved total of `category` after a grant.
    pub fn record(&self, category: Category, reserved: usize) {
        let prev = self.peaks[category.index()].fetch_max(reserved, Ordering::AcqRel);
        if reserved > prev {
            #[cfg(feature = "tracing")]
            tracing::trace!(%category, reserved, "new peak reservation");
        }
    }

    pub fn peak(&self, category: Category) -> usize {
        self.peaks[category.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CategoryBreakdown {
        CategoryBreakdown::from_fn(|c| self.peak(c))
    }
}
