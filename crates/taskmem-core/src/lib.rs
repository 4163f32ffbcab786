#![forbid(unsafe_code)]
//! taskmem-core: categories, IDs, configuration, and collaborator traits.
//!
//! The concrete ledger, block allocator, page table and the task memory
//! manager live in `taskmem-mem`. We keep only value types and traits here so
//! any crate can depend on the contract without pulling the locking logic.

pub mod block;
pub mod category;
pub mod config;
pub mod consumer;
pub mod error;
pub mod id;
pub mod ledger;
pub mod observer;
pub mod prelude;

pub use category::{Category, CategoryBreakdown};
pub use config::MemoryConfig;
pub use error::{Error, Result};
pub use id::{BlockId, PageNumber};
