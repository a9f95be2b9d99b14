//! Debounce windows.
//!
//! A window opens with the first item added after a flush and closes
//! when the deferred flush takes the batch. Items added while it is open
//! are merged into the same batch.

use std::cell::RefCell;
use std::hash::Hash;

use indexmap::IndexSet;

use crate::scheduler::{Granularity, Scheduler};

/// Accumulator behind a window.
pub trait Batch: Default {
    type Item;

    fn insert(&mut self, item: Self::Item);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deduplicating, keeps first-insertion order.
impl<T: Hash + Eq> Batch for IndexSet<T> {
    type Item = T;

    fn insert(&mut self, item: T) {
        IndexSet::insert(self, item);
    }

    fn len(&self) -> usize {
        IndexSet::len(self)
    }
}

/// Keeps arrival order, duplicates included.
impl<T> Batch for Vec<T> {
    type Item = T;

    fn insert(&mut self, item: T) {
        self.push(item);
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

pub struct CoalescingWindow<B: Batch> {
    granularity: Granularity,
    batch: RefCell<B>,
}

impl<B: Batch> CoalescingWindow<B> {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            batch: RefCell::new(B::default()),
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Add an item, deferring `flush` if this item opens the window.
    ///
    /// Returns `true` when a flush was scheduled.
    pub fn add(&self, item: B::Item, scheduler: &dyn Scheduler, flush: impl FnOnce() + 'static) -> bool {
        let opens = self.batch.borrow().is_empty();
        if opens {
            scheduler.defer(self.granularity, Box::new(flush));
        }
        self.batch.borrow_mut().insert(item);
        opens
    }

    /// Take the batch, or `None` when there is nothing to flush.
    ///
    /// A flush that lost a race against an explicit flush or a `clear`
    /// finds the window empty and does nothing.
    pub fn take(&self) -> Option<B> {
        let mut batch = self.batch.borrow_mut();
        if batch.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut *batch))
    }

    pub fn clear(&self) {
        *self.batch.borrow_mut() = B::default();
    }

    pub fn len(&self) -> usize {
        self.batch.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.borrow().is_empty()
    }
}

impl<T> CoalescingWindow<Vec<T>> {
    /// Drop pending items rejected by `keep`. A scheduled flush still runs
    /// and finds whatever is left.
    pub fn retain(&self, keep: impl FnMut(&T) -> bool) {
        self.batch.borrow_mut().retain(keep);
    }
}
