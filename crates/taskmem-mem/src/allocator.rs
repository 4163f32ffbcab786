//! Heap-backed block allocator.
//!
//! Blocks are zeroed boxed slices. The allocation itself is fallible
//! (`try_reserve_exact`), so an exhausted heap surfaces as `AllocatorFailure`
//! instead of an abort.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use taskmem_core::block::{BlockAllocator, MemoryBlock};
use taskmem_core::error::{Error, Result};
use taskmem_core::id::BlockId;

/// Owned physical block. Deliberately not `Clone`.
pub struct HeapBlock {
    id: BlockId,
    buf: Box<[u8]>,
}

impl MemoryBlock for HeapBlock {
    fn id(&self) -> BlockId {
        self.id
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

#[derive(Default)]
struct AllocatorInner {
    next_id: AtomicU64,
    outstanding_blocks: AtomicUsize,
    outstanding_bytes: AtomicUsize,
}

/// Allocator facade over the global heap.
///
/// Cheap to clone; clones share the outstanding-block counters, which makes
/// leak checks possible from outside the owning manager.
#[derive(Clone, Default)]
pub struct HeapBlockAllocator {
    inner: Arc<AllocatorInner>,
}

impl HeapBlockAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks handed out and not yet released.
    pub fn outstanding_blocks(&self) -> usize {
        self.inner.outstanding_blocks.load(Ordering::Acquire)
    }

    pub fn outstanding_bytes(&self) -> usize {
        self.inner.outstanding_bytes.load(Ordering::Acquire)
    }
}

impl BlockAllocator for HeapBlockAllocator {
    type Block = HeapBlock;

    fn obtain_block(&self, bytes: usize) -> Result<HeapBlock> {
        if bytes == 0 {
            return Err(Error::InvalidRequest("cannot obtain a zero-byte block".into()));
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(bytes)
            .map_err(|e| Error::AllocatorFailure {
                bytes,
                reason: e.to_string(),
            })?;
        buf.resize(bytes, 0u8);

        let id = BlockId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.outstanding_blocks.fetch_add(1, Ordering::AcqRel);
        self.inner.outstanding_bytes.fetch_add(bytes, Ordering::AcqRel);

        Ok(HeapBlock {
            id,
            buf: buf.into_boxed_slice(),
        })
    }

    fn release_block(&self, block: HeapBlock) {
        self.inner.outstanding_blocks.fetch_sub(1, Ordering::AcqRel);
        self.inner
            .outstanding_bytes
            .fetch_sub(block.buf.len(), Ordering::AcqRel);
    }
}
