//! Binding several functions that share their first argument axis.
//!
//! A [`MultipleFunctionBindingList`] presents one table for a group of
//! single-argument functions measured against the same axis, typically a set
//! of time series. Columns are the first function's argument and components
//! followed by every other function's components; the shared axis appears
//! once. Row operations are applied to every function as one guarded batch:
//! each function opens an edit transaction, and a failure anywhere cancels
//! them all, so no partial group update can be observed.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::array::{ChangeAction, SubscriptionId};
use crate::function::{Function, FunctionEvent, Listeners, VariableRole};
use crate::value::Value;

use super::sync::{ChangeGuard, FlagGuard};
use super::{BindingError, ColumnInfo, ListChange};

/// Where a flat column index lands within the function group.
enum ColumnTarget {
    SharedArgument,
    Component { function: usize, component: usize },
}

struct MultiShared {
    functions: Vec<Rc<Function>>,
    guard: ChangeGuard,
    from_gui: Cell<bool>,
    listeners: RefCell<Listeners<ListChange>>,
    subscriptions: RefCell<Vec<(usize, SubscriptionId)>>,
}

impl MultiShared {
    fn emit(&self, change: &ListChange) {
        let listeners = self.listeners.borrow().snapshot();
        for listener in &listeners {
            listener(change);
        }
    }

    fn locate(&self, column: usize) -> Result<ColumnTarget, BindingError> {
        let mut offset = 0;
        for (index, function) in self.functions.iter().enumerate() {
            if index == 0 {
                if column == 0 {
                    return Ok(ColumnTarget::SharedArgument);
                }
                offset += 1;
            }
            let components = function.component_count();
            if column < offset + components {
                return Ok(ColumnTarget::Component {
                    function: index,
                    component: column - offset,
                });
            }
            offset += components;
        }
        Err(BindingError::ColumnOutOfRange {
            index: column,
            count: offset,
        })
    }

    /// Applies one operation to every function inside per-function edit
    /// transactions; any failure cancels all of them.
    fn guarded_batch<T>(
        &self,
        apply: impl Fn(&Rc<Function>) -> Result<T, BindingError>,
    ) -> Result<Vec<T>, BindingError> {
        let mut opened = 0;
        for function in &self.functions {
            if let Err(error) = function.begin_edit() {
                for begun in &self.functions[..opened] {
                    begun.end_edit();
                }
                return Err(error.into());
            }
            opened += 1;
        }
        let mut results = Vec::with_capacity(self.functions.len());
        for function in &self.functions {
            match apply(function) {
                Ok(value) => results.push(value),
                Err(error) => {
                    for begun in &self.functions {
                        begun.cancel_edit();
                    }
                    return Err(error);
                }
            }
        }
        for function in &self.functions {
            function.end_edit();
        }
        Ok(results)
    }

    fn on_event(shared: &Rc<Self>, event: &FunctionEvent) {
        if shared.from_gui.get() {
            return;
        }
        let Ok(token) = shared.guard.try_enter() else {
            return;
        };
        let change = match (event.role, event.action) {
            (_, ChangeAction::Reset) => Some(ListChange::Reset),
            (VariableRole::Component, ChangeAction::Replace) => {
                Some(ListChange::ItemChanged(event.index))
            }
            (VariableRole::Component, _) => None,
            // An axis edited behind the group's back, whichever function it
            // belongs to: the others were not updated with it, so alignment
            // can no longer be assumed.
            (VariableRole::Argument, _) => Some(ListChange::Reset),
        };
        drop(token);
        if let Some(change) = change {
            shared.emit(&change);
        }
    }
}

/// One editable table over several functions with a shared first axis.
pub struct MultipleFunctionBindingList {
    shared: Rc<MultiShared>,
}

impl MultipleFunctionBindingList {
    /// Groups single-argument functions into one table.
    ///
    /// All functions must have exactly one argument and agree on the current
    /// row count; group row operations keep them in step from then on.
    pub fn new(functions: Vec<Rc<Function>>) -> Result<Self, BindingError> {
        let first = functions.first().ok_or(BindingError::Misaligned {
            name: String::new(),
        })?;
        let expected = first.row_count();
        for function in &functions {
            if function.argument_count() != 1 {
                return Err(BindingError::MultiArgumentRowEdit {
                    count: function.argument_count(),
                });
            }
            if function.row_count() != expected {
                return Err(BindingError::Misaligned {
                    name: function.name().to_string(),
                });
            }
        }

        let shared = Rc::new(MultiShared {
            functions,
            guard: ChangeGuard::new(),
            from_gui: Cell::new(false),
            listeners: RefCell::new(Listeners::new()),
            subscriptions: RefCell::new(Vec::new()),
        });
        for (index, function) in shared.functions.iter().enumerate() {
            let weak = Rc::downgrade(&shared);
            let id = function.subscribe_values(move |event| {
                if let Some(shared) = weak.upgrade() {
                    MultiShared::on_event(&shared, event);
                }
            });
            shared.subscriptions.borrow_mut().push((index, id));
        }
        Ok(MultipleFunctionBindingList { shared })
    }

    pub fn functions(&self) -> Vec<Rc<Function>> {
        self.shared.functions.clone()
    }

    pub fn row_count(&self) -> usize {
        self.shared
            .functions
            .first()
            .map(|f| f.row_count())
            .unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        1 + self
            .shared
            .functions
            .iter()
            .map(|f| f.component_count())
            .sum::<usize>()
    }

    /// Shared argument first, then each function's components in order.
    pub fn columns(&self) -> Result<Vec<ColumnInfo>, BindingError> {
        let mut columns = Vec::with_capacity(self.column_count());
        for (index, function) in self.shared.functions.iter().enumerate() {
            if index == 0 {
                let argument = function.argument(0)?;
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
        }
        Ok(columns)
    }

    pub fn cell(&self, row: usize, column: usize) -> Result<Value, BindingError> {
        match self.shared.locate(column)? {
            ColumnTarget::SharedArgument => {
                let first = self.first_function()?;
                Ok(first.argument_value(0, row)?)
            }
            ColumnTarget::Component {
                function,
                component,
            } => {
                let target = self.shared.functions[function].component(component)?;
                Ok(target
                    .cell(row)
                    .map_err(crate::function::FunctionError::from)?)
            }
        }
    }

    /// Writes one cell. A shared-axis write is replicated to every function
    /// as a guarded batch.
    pub fn set_cell(&self, row: usize, column: usize, value: Value) -> Result<(), BindingError> {
        let target = self.shared.locate(column)?;
        let _token = self.shared.guard.try_enter()?;
        let _gui = FlagGuard::set(&self.shared.from_gui);
        match target {
            ColumnTarget::SharedArgument => {
                let moved: Cell<Option<usize>> = Cell::new(None);
                self.shared.guarded_batch(|function| {
                    moved.set(function.set_argument_value(0, row, value.clone())?);
                    Ok(())
                })?;
                if let Some(to) = moved.get() {
                    self.shared.emit(&ListChange::ItemMoved { from: row, to });
                    self.shared.emit(&ListChange::ItemChanged(to));
                } else {
                    self.shared.emit(&ListChange::ItemChanged(row));
                }
            }
            ColumnTarget::Component {
                function,
                component,
            } => {
                self.shared.functions[function].set_component_value_linear(
                    component,
                    row,
                    value,
                )?;
                self.shared.emit(&ListChange::ItemChanged(row));
            }
        }
        Ok(())
    }

    /// Adds one row: the key is appended to every function's axis, and all
    /// functions must land it at the same position.
    pub fn add_row(&self, key: Value) -> Result<usize, BindingError> {
        let _token = self.shared.guard.try_enter()?;
        let _gui = FlagGuard::set(&self.shared.from_gui);
        let expected: Cell<Option<usize>> = Cell::new(None);
        self.shared.guarded_batch(|function| {
            let position = function.add_argument_value(0, key.clone())?;
            match expected.get() {
                None => expected.set(Some(position)),
                Some(agreed) if agreed == position => {}
                Some(_) => {
                    return Err(BindingError::Misaligned {
                        name: function.name().to_string(),
                    });
                }
            }
            Ok(())
        })?;
        let position = expected.get().unwrap_or(0);
        self.shared.emit(&ListChange::ItemAdded(position));
        Ok(position)
    }

    /// Removes one row from every function.
    pub fn delete_row(&self, index: usize) -> Result<(), BindingError> {
        let _token = self.shared.guard.try_enter()?;
        let _gui = FlagGuard::set(&self.shared.from_gui);
        self.shared.guarded_batch(|function| {
            function.remove_argument_value(0, index)?;
            Ok(())
        })?;
        self.shared.emit(&ListChange::ItemDeleted(index));
        Ok(())
    }

    pub fn subscribe(&self, listener: impl Fn(&ListChange) + 'static) -> SubscriptionId {
        self.shared.listeners.borrow_mut().subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.listeners.borrow_mut().unsubscribe(id);
    }

    fn first_function(&self) -> Result<&Rc<Function>, BindingError> {
        self.shared
            .functions
            .first()
            .ok_or(BindingError::Misaligned {
                name: String::new(),
            })
    }
}

impl Drop for MultipleFunctionBindingList {
    fn drop(&mut self) {
        for (index, id) in self.shared.subscriptions.borrow_mut().drain(..) {
            self.shared.functions[index].unsubscribe_values(id);
        }
    }
}
