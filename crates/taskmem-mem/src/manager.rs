//! Task memory manager: the one object a task talks to for memory.
//!
//! Allocation is two-phase: bytes are reserved from the ledger, then a block
//! is obtained from the allocator and bound to a page number. Every failure
//! after the first phase undoes what was already done before the error is
//! returned, so callers never have to compensate for a half-made page.
//!
//! The page table lock covers only the slot update itself. Ledger and
//! allocator calls always run outside it, and so does caller code passed to
//! `with_block`/`with_block_mut`: each block sits behind its own lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;

use taskmem_core::block::{BlockAllocator, MemoryBlock};
use taskmem_core::category::{Category, CategoryBreakdown};
use taskmem_core::config::MemoryConfig;
use taskmem_core::consumer::MemoryConsumer;
use taskmem_core::error::{Error, Result};
use taskmem_core::id::{BlockId, PageNumber};
use taskmem_core::ledger::{CategoryLedger, Grant, PoolWarning};
use taskmem_core::observer::MemoryObserver;

use crate::allocator::HeapBlockAllocator;
use crate::ledger::StaticLedger;
use crate::page_table::PageTable;

/// A page's block. Emptied when the page is freed, so a caller that resolved
/// the slot before the free finds nothing once it gets the lock.
type SharedBlock<B> = Arc<RwLock<Option<B>>>;

struct PageEntry<B> {
    block: SharedBlock<B>,
    block_id: BlockId,
    category: Category,
    /// Bytes charged to `category` for this page.
    bytes: usize,
    /// Distinguishes successive occupants of the same slot.
    stamp: u64,
}

/// Caller's handle to an allocated page.
///
/// Not `Clone`: the manager keeps the block, the caller keeps the right to
/// free it. After `free_page` the handle carries `PageNumber::FREED`.
#[derive(Debug)]
pub struct Page {
    number: PageNumber,
    size_bytes: usize,
    category: Category,
    stamp: u64,
}

impl Page {
    pub fn number(&self) -> PageNumber {
        self.number
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn is_freed(&self) -> bool {
        self.number.is_freed()
    }
}

/// What a lookup reveals about a live page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub number: PageNumber,
    pub size_bytes: usize,
    pub category: Category,
    pub block: BlockId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemorySnapshot {
    pub budget: CategoryBreakdown,
    pub reserved: CategoryBreakdown,
    /// Bytes held by live pages, per category.
    pub page_bytes: CategoryBreakdown,
    pub live_pages: usize,
    pub table_slots: usize,
}

pub struct TaskMemoryManager<
    L: CategoryLedger = StaticLedger,
    A: BlockAllocator = HeapBlockAllocator,
> {
    ledger: L,
    allocator: A,
    table: RwLock<PageTable<PageEntry<A::Block>>>,
    next_stamp: AtomicU64,
    observer: Arc<dyn MemoryObserver>,
    strict: bool,
}

#[cfg(feature = "tracing")]
fn default_observer() -> Arc<dyn MemoryObserver> {
    Arc::new(crate::observer::TracingObserver)
}

#[cfg(not(feature = "tracing"))]
fn default_observer() -> Arc<dyn MemoryObserver> {
    Arc::new(taskmem_core::observer::NoopObserver)
}

fn category_of<C: MemoryConsumer + ?Sized>(consumer: &C) -> Result<Category> {
    consumer.category().ok_or_else(|| {
        Error::InvalidRequest(format!(
            "consumer '{}' is not assigned to a memory category",
            consumer.name()
        ))
    })
}

impl TaskMemoryManager<StaticLedger, HeapBlockAllocator> {
    /// Manager with a `StaticLedger` sized from `cfg` and a heap allocator.
    pub fn new(cfg: &MemoryConfig) -> Result<Self> {
        cfg.validate()?;
        Self::with_parts(StaticLedger::from_config(cfg)?, HeapBlockAllocator::new(), cfg)
    }
}

impl<L: CategoryLedger, A: BlockAllocator> TaskMemoryManager<L, A> {
    /// Manager over caller-supplied collaborators.
    ///
    /// Budgets come from `ledger`; `cfg` supplies page-table sizing and
    /// strictness. The whole config is still validated.
    pub fn with_parts(ledger: L, allocator: A, cfg: &MemoryConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            ledger,
            allocator,
            table: RwLock::new(PageTable::new(cfg.initial_slots(), cfg.max_pages)),
            next_stamp: AtomicU64::new(0),
            observer: default_observer(),
            strict: cfg.strict,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn MemoryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// In strict mode bookkeeping violations panic instead of propagating.
    fn escalate(&self, err: Error) -> Error {
        if self.strict && err.is_programmer_error() {
            panic!("task memory bookkeeping violated: {err}");
        }
        err
    }

    // ----- raw byte accounting -----

    /// Reserve bytes for `consumer` without allocating a page.
    pub fn acquire_memory<C: MemoryConsumer + ?Sized>(
        &self,
        bytes: usize,
        consumer: &C,
    ) -> Result<Grant> {
        self.acquire_for(category_of(consumer)?, bytes)
    }

    pub fn release_memory<C: MemoryConsumer + ?Sized>(
        &self,
        bytes: usize,
        consumer: &C,
    ) -> Result<()> {
        self.release_for(category_of(consumer)?, bytes)
    }

    /// Best-effort reservation in `category`. A short grant is not an error;
    /// check `Grant::warning`.
    pub fn acquire_for(&self, category: Category, bytes: usize) -> Result<Grant> {
        if bytes == 0 {
            return Err(Error::InvalidRequest("cannot acquire zero bytes".into()));
        }
        let grant = self.ledger.acquire(category, bytes)?;
        if let Some(warning) = &grant.warning {
            self.observer.shortfall(warning);
        }
        Ok(grant)
    }

    pub fn release_for(&self, category: Category, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Err(Error::InvalidRequest("cannot release zero bytes".into()));
        }
        self.ledger
            .release(category, bytes)
            .map_err(|e| self.escalate(e))
    }

    /// Zero a category's reservation. Teardown only: live pages charged to
    /// `category` are not freed by this.
    pub fn release_all(&self, category: Category) {
        self.ledger.release_all(category);
    }

    // ----- pages -----

    /// Reserve `num_bytes` for `consumer`, back them with a block and bind the
    /// block to the lowest free page number.
    ///
    /// A partial grant fails with `OutOfMemory`; request the granted amount
    /// explicitly if a smaller page will do.
    pub fn allocate_page<C: MemoryConsumer + ?Sized>(
        &self,
        num_bytes: usize,
        consumer: &C,
    ) -> Result<Page> {
        if num_bytes == 0 {
            return Err(Error::InvalidRequest("page size must be non-zero".into()));
        }
        let category = category_of(consumer)?;

        let grant = self.acquire_for(category, num_bytes)?;
        if grant.granted < num_bytes {
            let warning = grant.warning.unwrap_or_else(|| PoolWarning {
                category,
                requested: num_bytes,
                granted: grant.granted,
                budget: self.ledger.budget(category),
                reserved: self.ledger.reserved(category),
            });
            let err = Error::OutOfMemory(warning);
            if grant.granted > 0 {
                self.rollback(category, grant.granted, &err);
            }
            return Err(err);
        }
        let granted = grant.granted;

        let block = match self.allocator.obtain_block(granted) {
            Ok(block) => block,
            Err(err) => {
                let err = err.into_allocator_failure(granted);
                self.rollback(category, granted, &err);
                return Err(err);
            }
        };

        let stamp = self.next_stamp.fetch_add(1, Ordering::Relaxed);
        let entry = PageEntry {
            block_id: block.id(),
            block: Arc::new(RwLock::new(Some(block))),
            category,
            bytes: granted,
            stamp,
        };
        let inserted = {
            let mut table = self.table.write();
            table.insert(entry).map_err(|entry| (entry, table.max_slots()))
        };

        match inserted {
            Ok(number) => {
                self.observer.page_allocated(number, granted, category);
                Ok(Page {
                    number,
                    size_bytes: granted,
                    category,
                    stamp,
                })
            }
            Err((entry, slots)) => {
                let err = Error::TableExhausted { slots };
                self.retire_block(&entry.block);
                self.rollback(category, entry.bytes, &err);
                Err(err)
            }
        }
    }

    /// Hand back a reservation made for a failed allocation. The caller
    /// returns `cause` whatever happens here; a rejected credit is reported
    /// on its own.
    fn rollback(&self, category: Category, bytes: usize, cause: &Error) {
        match self.ledger.release(category, bytes) {
            Ok(()) => self.observer.rolled_back(category, bytes, cause),
            Err(e) => {
                let e = self.escalate(e);
                self.observer.rollback_failed(category, bytes, cause, &e);
            }
        }
    }

    /// Take the block out of its cell and return it to the allocator. Waits
    /// for any `with_block`/`with_block_mut` closure still running on it.
    fn retire_block(&self, block: &SharedBlock<A::Block>) {
        let taken = block.write().take();
        if let Some(block) = taken {
            self.allocator.release_block(block);
        }
    }

    /// Free a page: clear its slot, return the block, credit the bytes.
    ///
    /// A handle that was already freed (or whose page was reclaimed by
    /// `clean_all_allocated_memory`) yields `DoubleFree` and touches nothing.
    pub fn free_page(&self, page: &mut Page) -> Result<()> {
        if page.is_freed() {
            return Err(self.escalate(Error::DoubleFree(page.number)));
        }
        let number = page.number;
        let stamp = page.stamp;

        let removed = self.table.write().remove_if(number, |e| e.stamp == stamp);
        let entry = removed.map_err(|e| self.escalate(e))?;
        page.number = PageNumber::FREED;

        let PageEntry {
            block,
            category,
            bytes,
            ..
        } = entry;
        self.retire_block(&block);
        self.observer.page_freed(number, bytes, category);
        self.ledger
            .release(category, bytes)
            .map_err(|e| self.escalate(e))
    }

    pub fn lookup(&self, number: PageNumber) -> Result<PageInfo> {
        let table = self.table.read();
        let entry = table.get(number).map_err(|e| self.escalate(e))?;
        Ok(PageInfo {
            number,
            size_bytes: entry.bytes,
            category: entry.category,
            block: entry.block_id,
        })
    }

    /// Resolve `page` to its block cell. The table lock is released before
    /// this returns.
    fn block_of(&self, page: &Page) -> Result<SharedBlock<A::Block>> {
        if page.is_freed() {
            return Err(self.escalate(Error::DoubleFree(page.number)));
        }
        let table = self.table.read();
        match table.get(page.number) {
            Ok(entry) if entry.stamp == page.stamp => Ok(Arc::clone(&entry.block)),
            _ => Err(self.escalate(Error::DoubleFree(page.number))),
        }
    }

    /// Read a page's memory. `f` runs under the page's own shared lock only,
    /// so it may call back into the manager, except to free this page.
    pub fn with_block<R>(&self, page: &Page, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let cell = self.block_of(page)?;
        let mapped = RwLockReadGuard::try_map(cell.read(), |b| b.as_ref());
        let out = match mapped {
            Ok(block) => Ok(f(block.as_bytes())),
            Err(_) => Err(self.escalate(Error::DoubleFree(page.number))),
        };
        out
    }

    /// Write a page's memory. `f` holds the page's own exclusive lock; other
    /// pages and the page table stay available.
    pub fn with_block_mut<R>(&self, page: &Page, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let cell = self.block_of(page)?;
        let mapped = RwLockWriteGuard::try_map(cell.write(), |b| b.as_mut());
        let out = match mapped {
            Ok(mut block) => Ok(f(block.as_bytes_mut())),
            Err(_) => Err(self.escalate(Error::DoubleFree(page.number))),
        };
        out
    }

    pub fn live_pages(&self) -> usize {
        self.table.read().live()
    }

    pub fn page_table_len(&self) -> usize {
        self.table.read().len()
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        let (page_bytes, live_pages, table_slots) = {
            let table = self.table.read();
            let mut bytes = CategoryBreakdown::default();
            for (_, entry) in table.iter() {
                bytes.add(entry.category, entry.bytes);
            }
            (bytes, table.live(), table.len())
        };
        MemorySnapshot {
            budget: CategoryBreakdown::from_fn(|c| self.ledger.budget(c)),
            reserved: CategoryBreakdown::from_fn(|c| self.ledger.reserved(c)),
            page_bytes,
            live_pages,
            table_slots,
        }
    }

    /// Task teardown: free every live page once, then zero all categories.
    ///
    /// Returns the number of pages freed. Calling it again is a no-op.
    pub fn clean_all_allocated_memory(&self) -> usize {
        let mut freed = 0;
        loop {
            let next = {
                let mut table = self.table.write();
                table
                    .first_occupied()
                    .and_then(|number| table.remove(number).ok().map(|e| (number, e)))
            };
            let Some((number, entry)) = next else {
                break;
            };

            let PageEntry {
                block,
                category,
                bytes,
                ..
            } = entry;
            self.retire_block(&block);
            self.observer.page_freed(number, bytes, category);
            // release_all below zeroes the category either way.
            if let Err(_err) = self.ledger.release(category, bytes) {
                #[cfg(feature = "tracing")]
                tracing::warn!(page = number.get(), error = %_err, "credit rejected during teardown");
            }
            freed += 1;
        }

        for category in Category::ALL {
            self.ledger.release_all(category);
        }
        self.observer.teardown(freed);
        freed
    }
}

impl<L: CategoryLedger, A: BlockAllocator> Drop for TaskMemoryManager<L, A> {
    fn drop(&mut self) {
        self.clean_all_allocated_memory();
    }
}
