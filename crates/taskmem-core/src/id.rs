//! Strongly-typed identifiers used across the workspace.
//!
//! Downstream crates should *not* pass raw integers around for page numbers
//! or block ids.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! new_id {
    ($name:ident, $repr:ty) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            pub const fn new(v: $repr) -> Self {
                Self(v)
            }
            pub const fn get(self) -> $repr {
                self.0
            }
        }
    };
}

new_id!(BlockId, u64);
new_id!(PageNumber, u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

impl PageNumber {
    /// Sentinel carried by a page handle once it has been freed.
    pub const FREED: PageNumber = PageNumber(u32::MAX);

    /// Largest page table the sentinel leaves room for.
    pub const MAX_PAGES: usize = u32::MAX as usize;

    /// Page number for a table index. `None` if the index collides with the
    /// sentinel range.
    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index)
            .ok()
            .filter(|&v| v != u32::MAX)
            .map(PageNumber)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_freed(self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_freed() {
            f.write_str("PageNumber(freed)")
        } else {
            write!(f, "PageNumber({})", self.0)
        }
    }
}
