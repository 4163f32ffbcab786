//! Physical block allocator interface.

use crate::error::Result;
use crate::id::BlockId;

/// An opaque, move-only handle to a physical memory region.
///
/// Implementations must not be `Clone`: ownership moves from the allocator
/// into a page and back exactly once.
pub trait MemoryBlock: Send + Sync {
    fn id(&self) -> BlockId;

    /// Size in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_bytes(&self) -> &[u8];

    fn as_bytes_mut(&mut self) -> &mut [u8];
}

/// Turns byte counts into blocks and back.
pub trait BlockAllocator: Send + Sync + 'static {
    type Block: MemoryBlock;

    /// Obtain a block of exactly `bytes` bytes.
    fn obtain_block(&self, bytes: usize) -> Result<Self::Block>;

    /// Give a block back. Consumes the handle.
    fn release_block(&self, block: Self::Block);
}
