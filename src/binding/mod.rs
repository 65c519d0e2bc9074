//! # Tabular Binding
//!
//! A [`FunctionBindingList`] projects an N-dimensional [`Function`] onto a
//! flat editable table: one column per argument and component, one row per
//! element of the component grid, rows ordered by the row-major linear index.
//! The list mirrors function mutations into [`ListChange`] notifications a
//! grid control can consume, and turns grid edits back into function
//! mutations.
//!
//! Reentrancy is controlled by two flags. A [`ChangeGuard`](sync::ChangeGuard)
//! is held while the list reacts to a function event or applies a grid edit,
//! so a listener that mutates the list mid-update gets an error instead of
//! corrupting the row set. A separate `from_gui` flag suppresses the list's
//! own reaction to function events it caused itself, since it already knows
//! the row consequences.
//!
//! ```rust
//! use std::rc::Rc;
//! use functab::binding::FunctionBindingList;
//! use functab::function::Function;
//! use functab::value::Value;
//! use functab::variable::Variable;
//!
//! let function = Function::new("y(x)");
//! function.add_argument(Rc::new(Variable::<i32>::new("x"))).unwrap();
//! function.add_component(Rc::new(Variable::<f64>::new("y"))).unwrap();
//! let list = FunctionBindingList::new(Rc::clone(&function));
//!
//! function.add_argument_value(0, Value::Int(10)).unwrap();
//! assert_eq!(list.row_count(), 1);
//! list.set_cell(0, 1, Value::Double(0.5)).unwrap();
//! assert_eq!(function.component_value(0, &[0]).unwrap(), Value::Double(0.5));
//! ```

pub mod multiple;
pub mod row;
pub mod sync;

mod index_cache;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use log::debug;
use thiserror::Error;

use crate::array::{ArrayError, ChangeAction, Shape, SubscriptionId};
use crate::function::{Function, FunctionError, FunctionEvent, Listeners, VariableRole};
use crate::value::{Value, ValueKind};

use index_cache::RowIndexCache;
use sync::{ChangeGuard, FlagGuard, GuardHeld, InlineInvoke, SynchronizeInvoke};

pub use multiple::MultipleFunctionBindingList;
pub use row::BindingRow;

/// Errors raised by binding-list operations.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error(transparent)]
    Function(#[from] FunctionError),

    #[error(transparent)]
    Array(#[from] ArrayError),

    #[error(transparent)]
    Busy(#[from] GuardHeld),

    #[error("row {index} out of range; list has {count} rows")]
    RowOutOfRange { index: usize, count: usize },

    #[error("column {index} out of range; list has {count} columns")]
    ColumnOutOfRange { index: usize, count: usize },

    #[error("row is no longer part of the binding list")]
    DetachedRow,

    #[error("row operations need a single-argument function; this one has {count} arguments")]
    MultiArgumentRowEdit { count: usize },

    #[error("function '{name}' no longer shares the first argument axis")]
    Misaligned { name: String },
}

/// One notification to the bound control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListChange {
    /// The row set was rebuilt; re-read everything.
    Reset,
    ItemChanged(usize),
    ItemAdded(usize),
    ItemDeleted(usize),
    ItemMoved { from: usize, to: usize },
}

/// Static description of one bound column.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub display_name: String,
    pub kind: ValueKind,
    pub read_only: bool,
}

/// How a committed row edit affected row positions.
enum CommitEffect {
    InPlace,
    RowMoved { from: usize, to: usize },
    Refill,
}

struct BindingInner {
    rows: Vec<Rc<BindingRow>>,
    cache: RowIndexCache,
}

/// State shared between the list facade, its rows, and the function-event
/// subscriptions.
pub(crate) struct BindingShared {
    function: Rc<Function>,
    guard: ChangeGuard,
    from_gui: Cell<bool>,
    inner: RefCell<BindingInner>,
    listeners: RefCell<Listeners<ListChange>>,
    sync: Rc<dyn SynchronizeInvoke>,
    self_weak: Weak<BindingShared>,
    values_subscription: Cell<Option<SubscriptionId>>,
    structure_subscription: Cell<Option<SubscriptionId>>,
}

impl BindingShared {
    pub(crate) fn column_count(&self) -> usize {
        self.function.argument_count() + self.function.component_count()
    }

    pub(crate) fn index_of(&self, row: &BindingRow) -> Option<usize> {
        let mut inner = self.inner.borrow_mut();
        let BindingInner { rows, cache } = &mut *inner;
        cache.index_of(rows, row)
    }

    /// Reads the cell at a row/column position straight from the function.
    pub(crate) fn cell_at(&self, row: usize, column: usize) -> Result<Value, BindingError> {
        let arguments = self.function.argument_count();
        if column < arguments {
            let sizes = self.function.argument_shape();
            let indices = Shape::new(&sizes).multi_index(row)?;
            Ok(self.function.argument_value(column, indices[column])?)
        } else {
            let component = self.function.component(column - arguments)?;
            Ok(component.cell(row).map_err(FunctionError::from)?)
        }
    }

    fn emit(&self, pending: &[ListChange]) {
        if pending.is_empty() {
            return;
        }
        let listeners = self.listeners.borrow().snapshot();
        for change in pending {
            for listener in &listeners {
                listener(change);
            }
        }
    }

    /// Rebuilds the whole row set. Caller holds the guard.
    fn fill_locked(&self, pending: &mut Vec<ListChange>) {
        let count = self.function.row_count();
        let columns = self.column_count();
        let mut inner = self.inner.borrow_mut();
        inner.rows = (0..count)
            .map(|_| BindingRow::new(self.self_weak.clone(), columns, false))
            .collect();
        inner.cache.mark_dirty();
        debug!(
            "binding list for '{}': rebuilt with {count} rows",
            self.function.name()
        );
        pending.push(ListChange::Reset);
    }

    /// Reaction to a structural change of the argument/component collections.
    fn refill(shared: &Rc<Self>) {
        if shared.from_gui.get() {
            return;
        }
        let Ok(token) = shared.guard.try_enter() else {
            return;
        };
        let mut pending = Vec::new();
        shared.sync.invoke(&mut || shared.fill_locked(&mut pending));
        drop(token);
        shared.emit(&pending);
    }

    /// Reaction to a function value event not caused by the list itself.
    fn on_values_event(shared: &Rc<Self>, event: &FunctionEvent) {
        if shared.from_gui.get() {
            return;
        }
        let Ok(token) = shared.guard.try_enter() else {
            return;
        };
        let mut pending = Vec::new();
        shared.sync.invoke(&mut || shared.react(event, &mut pending));
        drop(token);
        shared.emit(&pending);
    }

    fn react(&self, event: &FunctionEvent, pending: &mut Vec<ListChange>) {
        match (event.role, event.action) {
            (_, ChangeAction::Reset) => self.fill_locked(pending),
            (VariableRole::Component, ChangeAction::Replace) => {
                pending.push(ListChange::ItemChanged(event.index));
            }
            // Component slice inserts/removes always accompany an argument
            // event, which carries the row bookkeeping.
            (VariableRole::Component, _) => {}
            (VariableRole::Argument, ChangeAction::Replace) => {
                self.react_argument_replace(event, pending);
            }
            (VariableRole::Argument, ChangeAction::Add) => {
                self.react_argument_add(event, pending);
            }
            (VariableRole::Argument, ChangeAction::Remove) => {
                self.react_argument_remove(event, pending);
            }
        }
    }

    fn react_argument_replace(&self, event: &FunctionEvent, pending: &mut Vec<ListChange>) {
        let sizes = self.function.argument_shape();
        if sizes.len() == 1 {
            pending.push(ListChange::ItemChanged(event.index));
            return;
        }
        // Every row whose multi-index hits the changed axis position shows
        // the new key.
        let axis = event.axis.unwrap_or(0);
        for (linear, indices) in Shape::new(&sizes).iter_indices().enumerate() {
            if indices[axis] == event.index {
                pending.push(ListChange::ItemChanged(linear));
            }
        }
    }

    fn react_argument_add(&self, event: &FunctionEvent, pending: &mut Vec<ListChange>) {
        let sizes = self.function.argument_shape();
        let mut inner = self.inner.borrow_mut();
        if sizes.iter().any(|&size| size == 0) {
            // Another axis is still empty: the grid has no rows yet.
            inner.cache.mark_dirty();
            return;
        }
        let columns = self.function.argument_count() + self.function.component_count();
        if sizes.len() == 1 {
            let row = BindingRow::new(self.self_weak.clone(), columns, false);
            let appended = event.index == inner.rows.len();
            inner.rows.insert(event.index, Rc::clone(&row));
            if appended {
                inner.cache.record_append(&row, event.index);
            } else {
                inner.cache.mark_dirty();
            }
            pending.push(ListChange::ItemAdded(event.index));
            return;
        }
        // One new axis position fans out into product-of-other-dimensions
        // rows; their linear positions are ascending, so inserting in order
        // keeps earlier positions valid.
        let axis = event.axis.unwrap_or(0);
        for (linear, indices) in Shape::new(&sizes).iter_indices().enumerate() {
            if indices[axis] == event.index {
                let row = BindingRow::new(self.self_weak.clone(), columns, false);
                inner.rows.insert(linear, row);
                pending.push(ListChange::ItemAdded(linear));
            }
        }
        inner.cache.mark_dirty();
    }

    fn react_argument_remove(&self, event: &FunctionEvent, pending: &mut Vec<ListChange>) {
        let sizes = self.function.argument_shape();
        let mut inner = self.inner.borrow_mut();
        if sizes.len() == 1 {
            if event.index < inner.rows.len() {
                inner.rows.remove(event.index);
                inner.cache.mark_dirty();
                pending.push(ListChange::ItemDeleted(event.index));
            }
            return;
        }
        // Row positions are only meaningful against the shape the rows were
        // built for, which still had the removed axis position.
        let axis = event.axis.unwrap_or(0);
        let mut old_sizes = sizes.clone();
        old_sizes[axis] += 1;
        let old_shape = Shape::new(&old_sizes);
        if inner.rows.len() != old_shape.element_count() {
            // Rows were already empty because another axis is empty.
            inner.cache.mark_dirty();
            return;
        }
        for linear in (0..inner.rows.len()).rev() {
            let hits = old_shape
                .multi_index(linear)
                .map(|indices| indices[axis] == event.index)
                .unwrap_or(false);
            if hits {
                inner.rows.remove(linear);
                pending.push(ListChange::ItemDeleted(linear));
            }
        }
        inner.cache.mark_dirty();
    }

    /// Applies a row's buffered writes as one function edit transaction.
    pub(crate) fn commit_row(shared: &Rc<Self>, row: &BindingRow) -> Result<(), BindingError> {
        let token = shared.guard.try_enter()?;
        let _gui = FlagGuard::set(&shared.from_gui);
        let index = shared.index_of(row).ok_or(BindingError::DetachedRow)?;
        let (buffer, add_mode) = row.commit_state();

        shared.function.begin_edit()?;
        match shared.apply_buffer(index, &buffer) {
            Ok(effect) => {
                shared.function.end_edit();
                row.clear_edit();
                let mut pending = Vec::new();
                match effect {
                    CommitEffect::InPlace => pending.push(ListChange::ItemChanged(index)),
                    CommitEffect::RowMoved { from, to } => {
                        let mut inner = shared.inner.borrow_mut();
                        let moved = inner.rows.remove(from);
                        inner.rows.insert(to, moved);
                        inner.cache.mark_dirty();
                        drop(inner);
                        pending.push(ListChange::ItemMoved { from, to });
                        pending.push(ListChange::ItemChanged(to));
                    }
                    CommitEffect::Refill => shared.fill_locked(&mut pending),
                }
                drop(token);
                shared.emit(&pending);
                Ok(())
            }
            Err(error) => {
                shared.function.cancel_edit();
                row.clear_edit();
                if add_mode {
                    // The transient key added by add_new survives the
                    // snapshot restore; take it out along with the row.
                    let _ = shared.function.remove_argument_value(0, index);
                    let mut inner = shared.inner.borrow_mut();
                    if index < inner.rows.len() {
                        inner.rows.remove(index);
                    }
                    inner.cache.mark_dirty();
                    drop(inner);
                    drop(token);
                    shared.emit(&[ListChange::ItemDeleted(index)]);
                } else {
                    drop(token);
                }
                Err(error)
            }
        }
    }

    /// Writes buffered columns in reverse order, so component values land
    /// before the argument key and a sort-induced move happens last.
    fn apply_buffer(
        &self,
        row: usize,
        buffer: &[Option<Value>],
    ) -> Result<CommitEffect, BindingError> {
        let arguments = self.function.argument_count();
        let sizes = self.function.argument_shape();
        let mut effect = CommitEffect::InPlace;
        for (column, slot) in buffer.iter().enumerate().rev() {
            let Some(value) = slot else { continue };
            if column < arguments {
                let indices = Shape::new(&sizes).multi_index(row)?;
                let moved =
                    self.function
                        .set_argument_value(column, indices[column], value.clone())?;
                if let Some(target) = moved {
                    effect = if sizes.len() == 1 {
                        CommitEffect::RowMoved {
                            from: row,
                            to: target,
                        }
                    } else {
                        CommitEffect::Refill
                    };
                }
            } else {
                self.function
                    .set_component_value_linear(column - arguments, row, value.clone())?;
            }
        }
        Ok(effect)
    }

    /// Removes an uncommitted add-pending row and its transient key.
    pub(crate) fn abandon_new(shared: &Rc<Self>, row: &BindingRow) -> Result<(), BindingError> {
        let token = shared.guard.try_enter()?;
        let _gui = FlagGuard::set(&shared.from_gui);
        let index = shared.index_of(row).ok_or(BindingError::DetachedRow)?;
        shared.function.remove_argument_value(0, index)?;
        {
            let mut inner = shared.inner.borrow_mut();
            inner.rows.remove(index);
            inner.cache.mark_dirty();
        }
        row.clear_edit();
        drop(token);
        shared.emit(&[ListChange::ItemDeleted(index)]);
        Ok(())
    }
}

/// Editable tabular view over one [`Function`].
pub struct FunctionBindingList {
    shared: Rc<BindingShared>,
}

impl FunctionBindingList {
    pub fn new(function: Rc<Function>) -> Self {
        FunctionBindingList::with_invoker(function, Rc::new(InlineInvoke))
    }

    /// Creates a list whose reactions are marshaled through `sync`.
    pub fn with_invoker(function: Rc<Function>, sync: Rc<dyn SynchronizeInvoke>) -> Self {
        let shared = Rc::new_cyclic(|weak: &Weak<BindingShared>| BindingShared {
            function: Rc::clone(&function),
            guard: ChangeGuard::new(),
            from_gui: Cell::new(false),
            inner: RefCell::new(BindingInner {
                rows: Vec::new(),
                cache: RowIndexCache::new(),
            }),
            listeners: RefCell::new(Listeners::new()),
            sync,
            self_weak: weak.clone(),
            values_subscription: Cell::new(None),
            structure_subscription: Cell::new(None),
        });

        let weak = Rc::downgrade(&shared);
        let values_id = function.subscribe_values(move |event| {
            if let Some(shared) = weak.upgrade() {
                BindingShared::on_values_event(&shared, event);
            }
        });
        shared.values_subscription.set(Some(values_id));

        let weak = Rc::downgrade(&shared);
        let structure_id = function.subscribe_structure(move |_| {
            if let Some(shared) = weak.upgrade() {
                BindingShared::refill(&shared);
            }
        });
        shared.structure_subscription.set(Some(structure_id));

        BindingShared::refill(&shared);
        FunctionBindingList { shared }
    }

    pub fn function(&self) -> Rc<Function> {
        Rc::clone(&self.shared.function)
    }

    pub fn row_count(&self) -> usize {
        self.shared.inner.borrow().rows.len()
    }

    pub fn rows(&self) -> Vec<Rc<BindingRow>> {
        self.shared.inner.borrow().rows.clone()
    }

    pub fn row(&self, index: usize) -> Result<Rc<BindingRow>, BindingError> {
        let inner = self.shared.inner.borrow();
        inner
            .rows
            .get(index)
            .cloned()
            .ok_or(BindingError::RowOutOfRange {
                index,
                count: inner.rows.len(),
            })
    }

    /// Position of a row by identity, served from the index cache.
    pub fn index_of_row(&self, row: &Rc<BindingRow>) -> Result<usize, BindingError> {
        self.shared.index_of(row).ok_or(BindingError::DetachedRow)
    }

    pub fn column_count(&self) -> usize {
        self.shared.column_count()
    }

    /// Column descriptions: arguments first, then components. Refused while
    /// a structural update is in flight, since the set may be mid-change.
    pub fn columns(&self) -> Result<Vec<ColumnInfo>, BindingError> {
        if self.shared.guard.is_held() {
            return Err(GuardHeld.into());
        }
        let function = &self.shared.function;
        let mut columns = Vec::with_capacity(self.shared.column_count());
        for argument in function.arguments() {
            columns.push(ColumnInfo {
                name: argument.name(),
                display_name: argument.display_name(),
                kind: argument.value_kind(),
                read_only: argument.is_read_only(),
            });
        }
        for component in function.components() {
            columns.push(ColumnInfo {
                name: component.name(),
                display_name: component.display_name(),
                kind: component.value_kind(),
                read_only: component.is_read_only(),
            });
        }
        Ok(columns)
    }

    pub fn column_names(&self) -> Result<Vec<String>, BindingError> {
        Ok(self.columns()?.into_iter().map(|c| c.name).collect())
    }

    pub fn cell(&self, row: usize, column: usize) -> Result<Value, BindingError> {
        self.shared.cell_at(row, column)
    }

    /// Writes one cell and commits immediately.
    pub fn set_cell(&self, row: usize, column: usize, value: Value) -> Result<(), BindingError> {
        let row = self.row(row)?;
        row.set_value(column, value)?;
        row.end_edit()
    }

    /// Appends a row with a synthesized unique argument key; the row stays
    /// add-pending until its first commit.
    ///
    /// Unique-default synthesis is forced on for the duration of the add and
    /// restored afterwards, whatever the outcome.
    pub fn add_new(&self) -> Result<Rc<BindingRow>, BindingError> {
        let shared = &self.shared;
        let count = shared.function.argument_count();
        if count != 1 {
            return Err(BindingError::MultiArgumentRowEdit { count });
        }
        let token = shared.guard.try_enter()?;
        let _gui = FlagGuard::set(&shared.from_gui);

        let argument = shared.function.argument(0)?;
        let previous = argument.generates_unique_value_for_default();
        argument
            .set_generate_unique_value_for_default(true)
            .map_err(FunctionError::from)?;
        let added = shared.function.add_argument_value(0, Value::Empty);
        let restored = argument.set_generate_unique_value_for_default(previous);
        let index = added?;
        restored.map_err(FunctionError::from)?;

        let row = BindingRow::new(shared.self_weak.clone(), shared.column_count(), true);
        {
            let mut inner = shared.inner.borrow_mut();
            let appended = index == inner.rows.len();
            inner.rows.insert(index, Rc::clone(&row));
            if appended {
                inner.cache.record_append(&row, index);
            } else {
                inner.cache.mark_dirty();
            }
        }
        drop(token);
        shared.emit(&[ListChange::ItemAdded(index)]);
        Ok(row)
    }

    /// Deletes a row: the argument value and the matching component slice.
    /// An add-pending row is cancelled instead. Refused for multi-argument
    /// functions, where one grid row does not own its axis positions.
    pub fn delete_row(&self, index: usize) -> Result<(), BindingError> {
        let shared = &self.shared;
        let row = self.row(index)?;
        if row.is_add_pending() {
            return row.cancel_edit();
        }
        let count = shared.function.argument_count();
        if count != 1 {
            return Err(BindingError::MultiArgumentRowEdit { count });
        }
        let token = shared.guard.try_enter()?;
        let _gui = FlagGuard::set(&shared.from_gui);
        shared.function.remove_argument_value(0, index)?;
        {
            let mut inner = shared.inner.borrow_mut();
            inner.rows.remove(index);
            inner.cache.mark_dirty();
        }
        drop(token);
        shared.emit(&[ListChange::ItemDeleted(index)]);
        Ok(())
    }

    /// Rebuilds the row set from the function.
    pub fn fill(&self) -> Result<(), BindingError> {
        let token = self.shared.guard.try_enter()?;
        let mut pending = Vec::new();
        self.shared.fill_locked(&mut pending);
        drop(token);
        self.shared.emit(&pending);
        Ok(())
    }

    /// Waits until no structural update is in flight.
    pub fn wait_until_idle(&self, timeout: Duration) -> Result<(), GuardHeld> {
        self.shared.guard.wait_idle(timeout)
    }

    pub fn subscribe(&self, listener: impl Fn(&ListChange) + 'static) -> SubscriptionId {
        self.shared.listeners.borrow_mut().subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.listeners.borrow_mut().unsubscribe(id);
    }
}

impl Drop for FunctionBindingList {
    fn drop(&mut self) {
        if let Some(id) = self.shared.values_subscription.take() {
            self.shared.function.unsubscribe_values(id);
        }
        if let Some(id) = self.shared.structure_subscription.take() {
            self.shared.function.unsubscribe_structure(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Variable;

    fn sorted_xy() -> (Rc<Function>, FunctionBindingList) {
        let function = Function::new("y(x)");
        let x = Rc::new(Variable::<i32>::new("x"));
        x.set_auto_sorted(true).unwrap();
        function.add_argument(x).unwrap();
        function
            .add_component(Rc::new(Variable::<i32>::new("y")))
            .unwrap();
        let list = FunctionBindingList::new(Rc::clone(&function));
        (function, list)
    }

    mod fill_tests {
        use super::*;

        #[test]
        fn test_list_has_one_row_per_grid_cell() {
            let function = Function::new("f(x,t)");
            function
                .add_argument(Rc::new(Variable::<i32>::new("x")))
                .unwrap();
            function
                .add_argument(Rc::new(Variable::<i32>::new("t")))
                .unwrap();
            function
                .add_component(Rc::new(Variable::<f64>::new("f")))
                .unwrap();
            for x in [1, 2] {
                function.add_argument_value(0, Value::Int(x)).unwrap();
            }
            for t in [10, 20, 30] {
                function.add_argument_value(1, Value::Int(t)).unwrap();
            }

            let list = FunctionBindingList::new(function);
            assert_eq!(list.row_count(), 6);
            assert_eq!(list.column_names().unwrap(), vec!["x", "t", "f"]);
        }

        #[test]
        fn test_rows_empty_while_any_argument_is_empty() {
            let function = Function::new("f(x,t)");
            function
                .add_argument(Rc::new(Variable::<i32>::new("x")))
                .unwrap();
            function
                .add_argument(Rc::new(Variable::<i32>::new("t")))
                .unwrap();
            function
                .add_component(Rc::new(Variable::<f64>::new("f")))
                .unwrap();
            let list = FunctionBindingList::new(Rc::clone(&function));

            function.add_argument_value(0, Value::Int(1)).unwrap();
            function.add_argument_value(0, Value::Int(2)).unwrap();
            assert_eq!(list.row_count(), 0);

            function.add_argument_value(1, Value::Int(10)).unwrap();
            assert_eq!(list.row_count(), 2);
        }
    }

    mod reaction_tests {
        use super::*;
        use std::cell::RefCell as StdRefCell;

        #[test]
        fn test_external_add_inserts_row_at_sorted_position() {
            let (function, list) = sorted_xy();
            for x in [1, 5, 10] {
                function.add_argument_value(0, Value::Int(x)).unwrap();
            }
            let seen: Rc<StdRefCell<Vec<ListChange>>> = Rc::new(StdRefCell::new(Vec::new()));
            let sink = Rc::clone(&seen);
            list.subscribe(move |change| sink.borrow_mut().push(change.clone()));

            function.add_argument_value(0, Value::Int(3)).unwrap();

            assert_eq!(list.row_count(), 4);
            assert_eq!(*seen.borrow(), vec![ListChange::ItemAdded(1)]);
        }

        #[test]
        fn test_external_remove_deletes_row() {
            let (function, list) = sorted_xy();
            for x in [1, 5, 10] {
                function.add_argument_value(0, Value::Int(x)).unwrap();
            }
            function.remove_argument_value(0, 1).unwrap();
            assert_eq!(list.row_count(), 2);
            assert_eq!(list.cell(1, 0).unwrap(), Value::Int(10));
        }

        #[test]
        fn test_component_write_notifies_single_row() {
            let (function, list) = sorted_xy();
            function.add_argument_value(0, Value::Int(1)).unwrap();
            let seen: Rc<StdRefCell<Vec<ListChange>>> = Rc::new(StdRefCell::new(Vec::new()));
            let sink = Rc::clone(&seen);
            list.subscribe(move |change| sink.borrow_mut().push(change.clone()));

            function
                .set_component_value(0, &[0], Value::Int(9))
                .unwrap();
            assert_eq!(*seen.borrow(), vec![ListChange::ItemChanged(0)]);
        }
    }

    mod row_edit_tests {
        use super::*;

        #[test]
        fn test_add_new_synthesizes_unique_key() {
            let (function, list) = sorted_xy();
            for x in [0, 1] {
                function.add_argument_value(0, Value::Int(x)).unwrap();
            }
            let row = list.add_new().unwrap();
            assert!(row.is_add_pending());
            assert_eq!(list.row_count(), 3);
            // Key synthesis never reuses an existing key.
            let keys: Vec<Value> = (0..3).map(|r| list.cell(r, 0).unwrap()).collect();
            assert_eq!(keys.iter().filter(|k| **k == keys[2]).count(), 1);
            // The forced synthesis flag was restored.
            assert!(!function.argument(0).unwrap().generates_unique_value_for_default());
        }

        #[test]
        fn test_delete_pending_row_removes_transient_key() {
            let (function, list) = sorted_xy();
            function.add_argument_value(0, Value::Int(1)).unwrap();
            let row = list.add_new().unwrap();
            let index = list.index_of_row(&row).unwrap();
            list.delete_row(index).unwrap();
            assert_eq!(list.row_count(), 1);
            assert_eq!(function.row_count(), 1);
        }

        #[test]
        fn test_multi_argument_row_edits_refused() {
            let function = Function::new("f(x,t)");
            function
                .add_argument(Rc::new(Variable::<i32>::new("x")))
                .unwrap();
            function
                .add_argument(Rc::new(Variable::<i32>::new("t")))
                .unwrap();
            function
                .add_component(Rc::new(Variable::<f64>::new("f")))
                .unwrap();
            function.add_argument_value(0, Value::Int(1)).unwrap();
            function.add_argument_value(1, Value::Int(2)).unwrap();
            let list = FunctionBindingList::new(function);

            assert!(matches!(
                list.add_new(),
                Err(BindingError::MultiArgumentRowEdit { count: 2 })
            ));
            assert!(matches!(
                list.delete_row(0),
                Err(BindingError::MultiArgumentRowEdit { count: 2 })
            ));
        }
    }

    mod index_cache_tests {
        use super::*;

        #[test]
        fn test_index_of_row_survives_streaming_appends() {
            let (function, list) = sorted_xy();
            for x in 0..100 {
                function.add_argument_value(0, Value::Int(x)).unwrap();
            }
            let rows = list.rows();
            for (expected, row) in rows.iter().enumerate() {
                assert_eq!(list.index_of_row(row).unwrap(), expected);
            }
            // Appends after a lookup keep the cache incremental.
            function.add_argument_value(0, Value::Int(100)).unwrap();
            let last = list.row(100).unwrap();
            assert_eq!(list.index_of_row(&last).unwrap(), 100);
        }
    }
}
