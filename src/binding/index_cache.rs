//! Row-identity to row-index cache.
//!
//! `index_of_row` is on the hot path of grid updates, and a linear scan per
//! lookup turns bulk appends quadratic. The cache maps row identity (the
//! allocation address of the `Rc<BindingRow>`) to its position. Structural
//! changes mark it dirty; the next lookup rebuilds it in one pass. A pure
//! trailing append updates it in place instead, which keeps streaming
//! time-series appends linear.

use std::collections::HashMap;
use std::rc::Rc;

use super::row::BindingRow;

fn row_key(row: &BindingRow) -> usize {
    row as *const BindingRow as usize
}

pub(crate) struct RowIndexCache {
    map: HashMap<usize, usize>,
    dirty: bool,
}

impl RowIndexCache {
    pub(crate) fn new() -> Self {
        RowIndexCache {
            map: HashMap::new(),
            dirty: true,
        }
    }

    /// Invalidates the cache; the next lookup pays for a full rebuild.
    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Records a row appended at the tail without invalidating the rest.
    /// No-op while dirty, since the rebuild will cover it anyway.
    pub(crate) fn record_append(&mut self, row: &Rc<BindingRow>, index: usize) {
        if !self.dirty {
            self.map.insert(row_key(row), index);
        }
    }

    pub(crate) fn index_of(&mut self, rows: &[Rc<BindingRow>], row: &BindingRow) -> Option<usize> {
        if self.dirty {
            self.rebuild(rows);
        }
        self.map.get(&row_key(row)).copied()
    }

    fn rebuild(&mut self, rows: &[Rc<BindingRow>]) {
        self.map.clear();
        for (index, row) in rows.iter().enumerate() {
            self.map.insert(row_key(row), index);
        }
        self.dirty = false;
    }

    #[cfg(test)]
    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }
}
