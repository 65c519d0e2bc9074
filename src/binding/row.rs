//! One grid row of a bound function.
//!
//! A row is an identity, not a value holder: reads go straight to the
//! function at the row's current position. The first write puts the row into
//! an edit-in-progress state; subsequent writes buffer per column, and
//! nothing reaches the function until `end_edit` commits the buffer as one
//! transaction.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::value::Value;

use super::{BindingError, BindingShared};

struct RowEditState {
    editing: bool,
    /// Set while the row was produced by `add_new` and has not yet been
    /// committed. Deleting or cancelling such a row removes the transient
    /// key from the function again.
    add_mode: bool,
    buffer: Vec<Option<Value>>,
}

pub struct BindingRow {
    list: Weak<BindingShared>,
    edit: RefCell<RowEditState>,
}

impl BindingRow {
    pub(crate) fn new(list: Weak<BindingShared>, columns: usize, add_mode: bool) -> Rc<BindingRow> {
        Rc::new(BindingRow {
            list,
            edit: RefCell::new(RowEditState {
                editing: add_mode,
                add_mode,
                buffer: vec![None; columns],
            }),
        })
    }

    fn shared(&self) -> Result<Rc<BindingShared>, BindingError> {
        self.list.upgrade().ok_or(BindingError::DetachedRow)
    }

    /// Current position of this row in the list.
    pub fn index(&self) -> Result<usize, BindingError> {
        let shared = self.shared()?;
        shared.index_of(self).ok_or(BindingError::DetachedRow)
    }

    pub fn is_editing(&self) -> bool {
        self.edit.borrow().editing
    }

    pub fn is_add_pending(&self) -> bool {
        self.edit.borrow().add_mode
    }

    /// Reads one cell, preferring an uncommitted buffered value.
    pub fn value(&self, column: usize) -> Result<Value, BindingError> {
        {
            let edit = self.edit.borrow();
            if let Some(Some(value)) = edit.buffer.get(column) {
                return Ok(value.clone());
            }
        }
        let shared = self.shared()?;
        let index = shared.index_of(self).ok_or(BindingError::DetachedRow)?;
        shared.cell_at(index, column)
    }

    /// Buffers one cell write; the function is untouched until `end_edit`.
    pub fn set_value(&self, column: usize, value: Value) -> Result<(), BindingError> {
        let shared = self.shared()?;
        let count = shared.column_count();
        if column >= count {
            return Err(BindingError::ColumnOutOfRange {
                index: column,
                count,
            });
        }
        let mut edit = self.edit.borrow_mut();
        if edit.buffer.len() < count {
            edit.buffer.resize(count, None);
        }
        edit.editing = true;
        edit.buffer[column] = Some(value);
        Ok(())
    }

    /// Commits all buffered writes as one function edit transaction.
    ///
    /// Columns are applied in reverse order, so components land before the
    /// argument key: the sort-induced row move, if any, happens last, when
    /// the whole row is already consistent. On failure the transaction is
    /// cancelled and an add-pending row is removed entirely.
    pub fn end_edit(&self) -> Result<(), BindingError> {
        if !self.edit.borrow().editing {
            return Ok(());
        }
        let shared = self.shared()?;
        BindingShared::commit_row(&shared, self)
    }

    /// Discards buffered writes. An add-pending row is removed from the
    /// function and the list.
    pub fn cancel_edit(&self) -> Result<(), BindingError> {
        if self.edit.borrow().add_mode {
            let shared = self.shared()?;
            return BindingShared::abandon_new(&shared, self);
        }
        self.clear_edit();
        Ok(())
    }

    pub(crate) fn commit_state(&self) -> (Vec<Option<Value>>, bool) {
        let edit = self.edit.borrow();
        (edit.buffer.clone(), edit.add_mode)
    }

    pub(crate) fn clear_edit(&self) {
        let mut edit = self.edit.borrow_mut();
        edit.editing = false;
        edit.add_mode = false;
        for slot in &mut edit.buffer {
            *slot = None;
        }
    }
}
