#![forbid(unsafe_code)]
//! taskmem-mem: category ledger, page table, and the task memory manager.
//!
//! This crate provides concrete implementations for the *interfaces* defined
//! in `taskmem-core`. All page allocations of a task should flow through
//! `TaskMemoryManager` so every block is charged to exactly one category and
//! freed exactly once.

pub mod allocator;
pub mod ledger;
pub mod manager;
#[cfg(feature = "tracing")]
pub mod observer;
pub mod page_table;
pub mod tracking;

pub use allocator::{HeapBlock, HeapBlockAllocator};
pub use ledger::{LedgerSnapshot, StaticLedger};
pub use manager::{MemorySnapshot, Page, PageInfo, TaskMemoryManager};
#[cfg(feature = "tracing")]
pub use observer::TracingObserver;
pub use page_table::PageTable;
