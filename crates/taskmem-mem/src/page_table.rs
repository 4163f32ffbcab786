//! Page table paired with an occupancy bit-vector.
//!
//! Slot `i` holds an entry iff bit `i` is set. Every method that changes one
//! changes the other before returning, so a caller holding the table's lock
//! never sees them disagree.

use fixedbitset::FixedBitSet;

use taskmem_core::error::{Error, Result};
use taskmem_core::id::PageNumber;

pub struct PageTable<E> {
    entries: Vec<Option<E>>,
    occupied: FixedBitSet,
    max_slots: usize,
    /// Every slot below this index is occupied.
    next_free_hint: usize,
    live: usize,
}

impl<E> PageTable<E> {
    /// Table with `initial_slots` slots that doubles up to `max_slots`.
    ///
    /// `initial_slots` is clamped to `1..=max_slots`.
    pub fn new(initial_slots: usize, max_slots: usize) -> Self {
        let max_slots = max_slots.min(PageNumber::MAX_PAGES);
        let initial = initial_slots.clamp(1, max_slots.max(1));
        let mut entries = Vec::with_capacity(initial);
        entries.resize_with(initial, || None);
        Self {
            entries,
            occupied: FixedBitSet::with_capacity(initial),
            max_slots,
            next_free_hint: 0,
            live: 0,
        }
    }

    /// Table that never grows.
    pub fn fixed(slots: usize) -> Self {
        Self::new(slots, slots)
    }

    /// Current number of slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    /// Occupied slots.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Store `entry` in the lowest free slot, growing the table if allowed.
    ///
    /// On exhaustion the entry is handed back so the caller can dispose of it.
    pub fn insert(&mut self, entry: E) -> std::result::Result<PageNumber, E> {
        let Some(index) = self.find_free_slot() else {
            return Err(entry);
        };
        let Some(page) = PageNumber::from_index(index) else {
            return Err(entry);
        };
        self.occupied.insert(index);
        self.entries[index] = Some(entry);
        self.next_free_hint = index + 1;
        self.live += 1;
        Ok(page)
    }

    fn find_free_slot(&mut self) -> Option<usize> {
        let len = self.entries.len();
        if let Some(i) = (self.next_free_hint..len).find(|&i| !self.occupied.contains(i)) {
            return Some(i);
        }
        if len >= self.max_slots {
            return None;
        }
        let grown = len.saturating_mul(2).clamp(len + 1, self.max_slots);
        self.entries.resize_with(grown, || None);
        self.occupied.grow(grown);
        Some(len)
    }

    /// Clear slot `page` and return its entry.
    pub fn remove(&mut self, page: PageNumber) -> Result<E> {
        self.remove_if(page, |_| true)
    }

    /// Clear slot `page` only if `owned` accepts its entry. A slot that is empty
    /// or owned by someone else reports `DoubleFree` and is left untouched.
    pub fn remove_if(&mut self, page: PageNumber, owned: impl FnOnce(&E) -> bool) -> Result<E> {
        let index = self.check_range(page)?;
        if !self.entries[index].as_ref().map_or(false, owned) {
            return Err(Error::DoubleFree(page));
        }
        let entry = self.entries[index].take().ok_or(Error::DoubleFree(page))?;
        self.occupied.set(index, false);
        self.next_free_hint = self.next_free_hint.min(index);
        self.live -= 1;
        Ok(entry)
    }

    pub fn get(&self, page: PageNumber) -> Result<&E> {
        let index = self.check_range(page)?;
        self.entries[index].as_ref().ok_or(Error::NotFound(page))
    }

    pub fn get_mut(&mut self, page: PageNumber) -> Result<&mut E> {
        let index = self.check_range(page)?;
        self.entries[index].as_mut().ok_or(Error::NotFound(page))
    }

    /// Lowest occupied slot, if any.
    pub fn first_occupied(&self) -> Option<PageNumber> {
        self.occupied.ones().next().and_then(PageNumber::from_index)
    }

    /// Occupied slots with their entries, in page-number order.
    pub fn iter(&self) -> impl Iterator<Item = (PageNumber, &E)> + '_ {
        self.occupied.ones().filter_map(move |i| {
            let page = PageNumber::from_index(i)?;
            self.entries[i].as_ref().map(|e| (page, e))
        })
    }

    fn check_range(&self, page: PageNumber) -> Result<usize> {
        let index = page.index();
        if page.is_freed() || index >= self.entries.len() {
            return Err(Error::OutOfRange {
                page,
                len: self.entries.len(),
            });
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32) -> PageNumber {
        PageNumber::new(n)
    }

    #[test]
    fn hands_out_lowest_free_slot() {
        let mut table = PageTable::fixed(4);
        assert_eq!(table.insert("a").unwrap(), page(0));
        assert_eq!(table.insert("b").unwrap(), page(1));
        assert_eq!(table.insert("c").unwrap(), page(2));

        assert_eq!(table.remove(page(1)).unwrap(), "b");
        assert_eq!(table.insert("d").unwrap(), page(1));
        assert_eq!(table.insert("e").unwrap(), page(3));
        assert_eq!(table.live(), 4);
    }

    #[test]
    fn fixed_table_exhausts() {
        let mut table = PageTable::fixed(2);
        table.insert(1).unwrap();
        table.insert(2).unwrap();
        assert_eq!(table.insert(3), Err(3));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn growable_table_doubles_up_to_max() {
        let mut table = PageTable::new(1, 5);
        for expected in 0..5u32 {
            assert_eq!(table.insert(expected).unwrap(), page(expected));
        }
        assert_eq!(table.len(), 5);
        assert!(table.insert(99).is_err());
    }

    #[test]
    fn double_remove_is_rejected() {
        let mut table = PageTable::fixed(2);
        let p = table.insert("x").unwrap();
        table.remove(p).unwrap();
        assert!(matches!(table.remove(p), Err(Error::DoubleFree(_))));
        assert!(table.is_empty());
    }

    #[test]
    fn out_of_range_is_reported() {
        let mut table: PageTable<u8> = PageTable::fixed(2);
        assert!(matches!(
            table.remove(page(7)),
            Err(Error::OutOfRange { len: 2, .. })
        ));
        assert!(matches!(
            table.get(PageNumber::FREED),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn remove_if_leaves_foreign_entry_alone() {
        let mut table = PageTable::fixed(2);
        let p = table.insert(10u64).unwrap();
        assert!(matches!(
            table.remove_if(p, |stamp| *stamp == 11),
            Err(Error::DoubleFree(_))
        ));
        assert_eq!(*table.get(p).unwrap(), 10);
        assert_eq!(table.live(), 1);
    }

    #[test]
    fn bits_and_entries_stay_in_step() {
        let mut table = PageTable::new(2, 64);
        let pages: Vec<_> = (0..40).map(|i| table.insert(i).unwrap()).collect();
        for p in pages.iter().step_by(3) {
            table.remove(*p).unwrap();
        }
        let occupied: Vec<_> = table.iter().map(|(p, _)| p).collect();
        assert_eq!(occupied.len(), table.live());
        for i in 0..table.len() {
            let p = page(i as u32);
            assert_eq!(table.get(p).is_ok(), occupied.contains(&p));
        }
        assert_eq!(table.first_occupied(), Some(page(1)));
    }
}
