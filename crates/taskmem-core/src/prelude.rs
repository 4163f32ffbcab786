//! Convenient re-exports for downstream crates.

pub use crate::block::{BlockAllocator, MemoryBlock};
pub use crate::category::{Category, CategoryBreakdown};
pub use crate::config::{parse_byte_size, MemoryConfig};
pub use crate::consumer::{MemoryConsumer, StaticConsumer};
pub use crate::error::{Error, Result};
pub use crate::id::{BlockId, PageNumber};
pub use crate::ledger::{CategoryLedger, Grant, PoolWarning};
pub use crate::observer::{MemoryObserver, NoopObserver};
