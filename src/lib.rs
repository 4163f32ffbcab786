#![forbid(unsafe_code)]
//! taskmem: per-task memory accounting and page allocation.
//!
//! Facade over the workspace crates.

pub use taskmem_core::prelude::*;
pub use taskmem_mem::{
    HeapBlockAllocator, MemorySnapshot, Page, PageInfo, StaticLedger, TaskMemoryManager,
};
