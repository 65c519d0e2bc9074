//! # Functions: Variable Graphs
//!
//! A [`Function`] composes independent *argument* variables (axes) with
//! dependent *component* variables (values indexed by the axes) into one
//! N-dimensional tabular function. The function owns the structural coupling
//! the variables cannot express alone: when axis `d` gains a value at
//! position `i`, every component array gains a slice along dimension `d` at
//! `i`, so component shapes always equal `[len(arg_0), …, len(arg_{n-1})]`.
//!
//! All value mutations flow through the function's methods, which apply the
//! variable policies (uniqueness, auto-sort, unique-default synthesis) and
//! emit one [`FunctionEvent`] per logical mutation. The binding layer
//! consumes that stream.
//!
//! ```rust
//! use std::rc::Rc;
//! use functab::function::Function;
//! use functab::variable::Variable;
//! use functab::value::Value;
//!
//! let function = Function::new("h(x)");
//! function.add_argument(Rc::new(Variable::<i32>::new("x"))).unwrap();
//! function.add_component(Rc::new(Variable::<f64>::new("h"))).unwrap();
//!
//! function.add_argument_value(0, Value::Int(10)).unwrap();
//! function.set_component_value(0, &[0], Value::Double(1.5)).unwrap();
//! assert_eq!(function.component_value(0, &[0]).unwrap(), Value::Double(1.5));
//! ```

pub mod events;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::debug;
use thiserror::Error;

use crate::array::{ChangeAction, Shape, SubscriptionId};
use crate::cell::CellType;
use crate::value::{Value, ValueKind};
use crate::variable::{Variable, VariableError};

pub use events::{FunctionEvent, FunctionStructureEvent, Listeners, VariableRole};

/// Errors raised by function operations.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error("argument {index} out of range; function has {count} arguments")]
    ArgumentOutOfRange { index: usize, count: usize },

    #[error("component {index} out of range; function has {count} components")]
    ComponentOutOfRange { index: usize, count: usize },

    #[error(transparent)]
    Array(#[from] crate::array::ArrayError),

    #[error("an edit transaction is already open")]
    AlreadyEditing,
}

/// Object-safe facade over a typed [`Variable`], exposing values as dynamic
/// cells so a [`Function`] can hold heterogeneous columns.
pub trait FunctionVariable {
    fn name(&self) -> String;
    fn display_name(&self) -> String;
    fn value_kind(&self) -> ValueKind;
    fn shape(&self) -> Vec<usize>;
    fn value_count(&self) -> usize;
    fn cell(&self, linear: usize) -> Result<Value, VariableError>;
    fn cells(&self) -> Vec<Value>;
    fn set_cell(&self, linear: usize, value: Value) -> Result<(), VariableError>;
    /// Adds one value with the full independent-variable policy; returns the
    /// position it landed at and the cell actually stored (which differs
    /// from the input when a unique default was synthesized).
    fn add_cell(&self, value: Value) -> Result<(usize, Value), VariableError>;
    /// Replaces a value; returns the new position when auto-sort moved it.
    fn replace_cell(&self, index: usize, value: Value)
        -> Result<(Option<usize>, Value), VariableError>;
    fn remove_cell(&self, index: usize) -> Result<Value, VariableError>;
    fn insert_slice(&self, dimension: usize, index: usize) -> Result<(), VariableError>;
    fn remove_slice(&self, dimension: usize, index: usize) -> Result<(), VariableError>;
    fn move_slice(
        &self,
        dimension: usize,
        index: usize,
        new_index: usize,
    ) -> Result<(), VariableError>;
    fn resize(&self, dims: &[usize]) -> Result<(), VariableError>;
    fn is_auto_sorted(&self) -> bool;
    fn generates_unique_value_for_default(&self) -> bool;
    fn set_generate_unique_value_for_default(&self, enabled: bool) -> Result<(), VariableError>;
    fn default_cell(&self) -> Value;
    fn is_read_only(&self) -> bool;
    fn mark_dependent(&self);
    fn begin_edit(&self);
    fn end_edit(&self);
    fn cancel_edit(&self);
}

impl<T: CellType> FunctionVariable for Variable<T> {
    fn name(&self) -> String {
        Variable::name(self)
    }

    fn display_name(&self) -> String {
        Variable::display_name(self)
    }

    fn value_kind(&self) -> ValueKind {
        T::KIND
    }

    fn shape(&self) -> Vec<usize> {
        self.store().read().shape().to_vec()
    }

    fn value_count(&self) -> usize {
        Variable::value_count(self)
    }

    fn cell(&self, linear: usize) -> Result<Value, VariableError> {
        if self.is_filtered() {
            let values = self.get_values();
            return values
                .get(linear)
                .map(CellType::to_value)
                .ok_or_else(|| VariableError::ValueIndexOutOfRange {
                    name: self.name(),
                    index: linear,
                    count: values.len(),
                });
        }
        Ok(self.store().read().linear_value(linear)?.to_value())
    }

    fn cells(&self) -> Vec<Value> {
        self.get_values().iter().map(CellType::to_value).collect()
    }

    fn set_cell(&self, linear: usize, value: Value) -> Result<(), VariableError> {
        let typed = convert::<T>(value)?;
        Ok(self.store().write().set_linear_value(linear, typed)?)
    }

    fn add_cell(&self, value: Value) -> Result<(usize, Value), VariableError> {
        let typed = match value {
            Value::Empty => self.default_value().unwrap_or_else(T::empty_value),
            other => convert::<T>(other)?,
        };
        let position = self.add_value(typed)?;
        let stored = FunctionVariable::cell(self, position)?;
        Ok((position, stored))
    }

    fn replace_cell(
        &self,
        index: usize,
        value: Value,
    ) -> Result<(Option<usize>, Value), VariableError> {
        let typed = convert::<T>(value)?;
        let stored = typed.to_value();
        let moved = self.replace_value(index, typed)?;
        Ok((moved, stored))
    }

    fn remove_cell(&self, index: usize) -> Result<Value, VariableError> {
        Ok(self.remove_value(index)?.to_value())
    }

    fn insert_slice(&self, dimension: usize, index: usize) -> Result<(), VariableError> {
        self.reject_filtered()?;
        Ok(self.store().write().insert_at(dimension, index, 1)?)
    }

    fn remove_slice(&self, dimension: usize, index: usize) -> Result<(), VariableError> {
        self.reject_filtered()?;
        Ok(self.store().write().remove_at(dimension, index, 1).map(|_| ())?)
    }

    fn move_slice(
        &self,
        dimension: usize,
        index: usize,
        new_index: usize,
    ) -> Result<(), VariableError> {
        self.reject_filtered()?;
        Ok(self.store().write().move_block(dimension, index, 1, new_index)?)
    }

    fn resize(&self, dims: &[usize]) -> Result<(), VariableError> {
        self.reject_filtered()?;
        Ok(self.store().write().resize(dims)?)
    }

    fn is_auto_sorted(&self) -> bool {
        Variable::is_auto_sorted(self)
    }

    fn generates_unique_value_for_default(&self) -> bool {
        Variable::generates_unique_value_for_default(self)
    }

    fn set_generate_unique_value_for_default(&self, enabled: bool) -> Result<(), VariableError> {
        Variable::set_generate_unique_value_for_default(self, enabled)
    }

    fn default_cell(&self) -> Value {
        self.default_value()
            .map(|value| value.to_value())
            .unwrap_or(Value::Empty)
    }

    fn is_read_only(&self) -> bool {
        self.is_filtered() || self.store().read().is_read_only()
    }

    fn mark_dependent(&self) {
        Variable::mark_dependent(self)
    }

    fn begin_edit(&self) {
        Variable::begin_edit(self)
    }

    fn end_edit(&self) {
        Variable::end_edit(self)
    }

    fn cancel_edit(&self) {
        Variable::cancel_edit(self)
    }
}

fn convert<T: CellType>(value: Value) -> Result<T, VariableError> {
    T::from_value(value).map_err(|e| VariableError::Array(e.into()))
}

/// An N-dimensional tabular function over argument and component variables.
pub struct Function {
    name: String,
    arguments: RefCell<Vec<Rc<dyn FunctionVariable>>>,
    components: RefCell<Vec<Rc<dyn FunctionVariable>>>,
    values_changed: RefCell<Listeners<FunctionEvent>>,
    structure_changed: RefCell<Listeners<FunctionStructureEvent>>,
    editing: Cell<bool>,
}

impl Function {
    pub fn new(name: &str) -> Rc<Function> {
        Rc::new(Function {
            name: name.to_string(),
            arguments: RefCell::new(Vec::new()),
            components: RefCell::new(Vec::new()),
            values_changed: RefCell::new(Listeners::new()),
            structure_changed: RefCell::new(Listeners::new()),
            editing: Cell::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ---- structure ----

    /// Appends an argument (axis) variable and reshapes all components to
    /// include the new dimension.
    pub fn add_argument(&self, variable: Rc<dyn FunctionVariable>) -> Result<(), FunctionError> {
        self.arguments.borrow_mut().push(variable);
        let shape = self.argument_shape();
        for component in self.components.borrow().iter() {
            component.resize(&shape)?;
        }
        let index = self.argument_count() - 1;
        self.raise_structure(FunctionStructureEvent {
            role: VariableRole::Argument,
            index,
            action: ChangeAction::Add,
        });
        Ok(())
    }

    /// Appends a component (value) variable, marks it dependent, and shapes
    /// its array to the current argument sizes.
    pub fn add_component(&self, variable: Rc<dyn FunctionVariable>) -> Result<(), FunctionError> {
        variable.mark_dependent();
        variable.resize(&self.argument_shape())?;
        self.components.borrow_mut().push(variable);
        let index = self.component_count() - 1;
        self.raise_structure(FunctionStructureEvent {
            role: VariableRole::Component,
            index,
            action: ChangeAction::Add,
        });
        Ok(())
    }

    pub fn argument_count(&self) -> usize {
        self.arguments.borrow().len()
    }

    pub fn component_count(&self) -> usize {
        self.components.borrow().len()
    }

    pub fn arguments(&self) -> Vec<Rc<dyn FunctionVariable>> {
        self.arguments.borrow().clone()
    }

    pub fn components(&self) -> Vec<Rc<dyn FunctionVariable>> {
        self.components.borrow().clone()
    }

    pub fn argument(&self, index: usize) -> Result<Rc<dyn FunctionVariable>, FunctionError> {
        self.arguments
            .borrow()
            .get(index)
            .cloned()
            .ok_or(FunctionError::ArgumentOutOfRange {
                index,
                count: self.argument_count(),
            })
    }

    pub fn component(&self, index: usize) -> Result<Rc<dyn FunctionVariable>, FunctionError> {
        self.components
            .borrow()
            .get(index)
            .cloned()
            .ok_or(FunctionError::ComponentOutOfRange {
                index,
                count: self.component_count(),
            })
    }

    /// The shape component arrays must have: one size per argument.
    pub fn argument_shape(&self) -> Vec<usize> {
        let arguments = self.arguments.borrow();
        if arguments.is_empty() {
            vec![0]
        } else {
            arguments.iter().map(|a| a.value_count()).collect()
        }
    }

    /// Element count of the tabular projection: the first component's value
    /// count, or the first argument's when no component exists yet.
    pub fn row_count(&self) -> usize {
        if let Some(component) = self.components.borrow().first() {
            component.value_count()
        } else if let Some(argument) = self.arguments.borrow().first() {
            argument.value_count()
        } else {
            0
        }
    }

    // ---- values ----

    /// Adds a value to an argument axis, inserting a matching slice into
    /// every component. `Value::Empty` requests the variable's default,
    /// which triggers unique-key synthesis when enabled.
    pub fn add_argument_value(&self, axis: usize, value: Value) -> Result<usize, FunctionError> {
        let argument = self.argument(axis)?;
        let (position, stored) = argument.add_cell(value)?;
        for component in self.components.borrow().iter() {
            component.insert_slice(axis, position)?;
        }
        debug!(
            "function '{}': argument '{}' gained {} at {}",
            self.name,
            argument.name(),
            stored,
            position
        );
        self.raise_values(FunctionEvent {
            action: ChangeAction::Add,
            variable: argument.name(),
            role: VariableRole::Argument,
            axis: Some(axis),
            index: position,
            cells: vec![stored],
        });
        Ok(position)
    }

    /// Removes an argument value and the matching slice of every component.
    pub fn remove_argument_value(&self, axis: usize, index: usize) -> Result<Value, FunctionError> {
        let argument = self.argument(axis)?;
        let removed = argument.remove_cell(index)?;
        for component in self.components.borrow().iter() {
            component.remove_slice(axis, index)?;
        }
        self.raise_values(FunctionEvent {
            action: ChangeAction::Remove,
            variable: argument.name(),
            role: VariableRole::Argument,
            axis: Some(axis),
            index,
            cells: vec![removed.clone()],
        });
        Ok(removed)
    }

    /// Replaces an argument value. When auto-sort relocates it, component
    /// slices move along; the returned position is the final one.
    pub fn set_argument_value(
        &self,
        axis: usize,
        index: usize,
        value: Value,
    ) -> Result<Option<usize>, FunctionError> {
        let argument = self.argument(axis)?;
        let (moved, stored) = argument.replace_cell(index, value)?;
        if let Some(target) = moved {
            for component in self.components.borrow().iter() {
                component.move_slice(axis, index, target)?;
            }
        }
        self.raise_values(FunctionEvent {
            action: ChangeAction::Replace,
            variable: argument.name(),
            role: VariableRole::Argument,
            axis: Some(axis),
            index: moved.unwrap_or(index),
            cells: vec![stored],
        });
        Ok(moved)
    }

    pub fn argument_value(&self, axis: usize, index: usize) -> Result<Value, FunctionError> {
        Ok(self.argument(axis)?.cell(index)?)
    }

    /// Writes a component value at a multi-index.
    pub fn set_component_value(
        &self,
        component: usize,
        indices: &[usize],
        value: Value,
    ) -> Result<(), FunctionError> {
        let target = self.component(component)?;
        let linear = Shape::new(&target.shape()).linear_index(indices)?;
        self.set_component_value_linear(component, linear, value)
    }

    /// Writes a component value at a linear row offset.
    pub fn set_component_value_linear(
        &self,
        component: usize,
        linear: usize,
        value: Value,
    ) -> Result<(), FunctionError> {
        let target = self.component(component)?;
        target.set_cell(linear, value.clone())?;
        self.raise_values(FunctionEvent {
            action: ChangeAction::Replace,
            variable: target.name(),
            role: VariableRole::Component,
            axis: None,
            index: linear,
            cells: vec![value],
        });
        Ok(())
    }

    pub fn component_value(&self, component: usize, indices: &[usize]) -> Result<Value, FunctionError> {
        let target = self.component(component)?;
        let linear = Shape::new(&target.shape()).linear_index(indices)?;
        Ok(target.cell(linear)?)
    }

    pub fn component_values(&self, component: usize) -> Result<Vec<Value>, FunctionError> {
        Ok(self.component(component)?.cells())
    }

    // ---- edit transaction ----

    pub fn is_editing(&self) -> bool {
        self.editing.get()
    }

    /// Opens an edit transaction: every variable snapshots its store.
    pub fn begin_edit(&self) -> Result<(), FunctionError> {
        if self.editing.get() {
            return Err(FunctionError::AlreadyEditing);
        }
        self.editing.set(true);
        for variable in self.all_variables() {
            variable.begin_edit();
        }
        Ok(())
    }

    /// Commits the open transaction, discarding the snapshots.
    pub fn end_edit(&self) {
        if !self.editing.replace(false) {
            return;
        }
        for variable in self.all_variables() {
            variable.end_edit();
        }
    }

    /// Cancels the open transaction: every variable restores its snapshot,
    /// then a single `Reset` is raised.
    pub fn cancel_edit(&self) {
        if !self.editing.replace(false) {
            return;
        }
        for variable in self.all_variables() {
            variable.cancel_edit();
        }
        self.raise_values(FunctionEvent {
            action: ChangeAction::Reset,
            variable: self.name.clone(),
            role: VariableRole::Component,
            axis: None,
            index: 0,
            cells: Vec::new(),
        });
    }

    fn all_variables(&self) -> Vec<Rc<dyn FunctionVariable>> {
        self.arguments
            .borrow()
            .iter()
            .chain(self.components.borrow().iter())
            .cloned()
            .collect()
    }

    // ---- events ----

    pub fn subscribe_values(&self, listener: impl Fn(&FunctionEvent) + 'static) -> SubscriptionId {
        self.values_changed.borrow_mut().subscribe(listener)
    }

    pub fn unsubscribe_values(&self, id: SubscriptionId) {
        self.values_changed.borrow_mut().unsubscribe(id);
    }

    pub fn subscribe_structure(
        &self,
        listener: impl Fn(&FunctionStructureEvent) + 'static,
    ) -> SubscriptionId {
        self.structure_changed.borrow_mut().subscribe(listener)
    }

    pub fn unsubscribe_structure(&self, id: SubscriptionId) {
        self.structure_changed.borrow_mut().unsubscribe(id);
    }

    fn raise_values(&self, event: FunctionEvent) {
        let listeners = self.values_changed.borrow().snapshot();
        for listener in listeners {
            listener(&event);
        }
    }

    fn raise_structure(&self, event: FunctionStructureEvent) {
        let listeners = self.structure_changed.borrow().snapshot();
        for listener in listeners {
            listener(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_d_function() -> Rc<Function> {
        let function = Function::new("y(x)");
        let x = Rc::new(Variable::<i32>::new("x"));
        x.set_auto_sorted(true).unwrap();
        function.add_argument(x).unwrap();
        function
            .add_component(Rc::new(Variable::<i32>::new("y")))
            .unwrap();
        function
    }

    mod structure_tests {
        use super::*;

        #[test]
        fn test_component_tracks_argument_shape() {
            let function = one_d_function();
            function.add_argument_value(0, Value::Int(1)).unwrap();
            function.add_argument_value(0, Value::Int(2)).unwrap();
            assert_eq!(function.component(0).unwrap().shape(), vec![2]);
        }

        #[test]
        fn test_two_argument_component_shape() {
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
            function.add_argument_value(0, Value::Int(2)).unwrap();
            function.add_argument_value(1, Value::Int(10)).unwrap();
            function.add_argument_value(1, Value::Int(20)).unwrap();
            function.add_argument_value(1, Value::Int(30)).unwrap();

            assert_eq!(function.component(0).unwrap().shape(), vec![2, 3]);
            assert_eq!(function.row_count(), 6);
        }

        #[test]
        fn test_remove_argument_value_removes_component_slice() {
            let function = one_d_function();
            for x in [1, 5, 10] {
                function.add_argument_value(0, Value::Int(x)).unwrap();
            }
            function
                .set_component_value(0, &[1], Value::Int(50))
                .unwrap();
            function.remove_argument_value(0, 1).unwrap();
            assert_eq!(function.row_count(), 2);
            assert_eq!(
                function.argument(0).unwrap().cells(),
                vec![Value::Int(1), Value::Int(10)]
            );
        }
    }

    mod value_tests {
        use super::*;

        #[test]
        fn test_sorted_argument_add_repositions_component_slices() {
            let function = one_d_function();
            for x in [1, 5, 10, 15] {
                function.add_argument_value(0, Value::Int(x)).unwrap();
            }
            for (i, y) in [1, 5, 10, 15].iter().enumerate() {
                function
                    .set_component_value(0, &[i], Value::Int(*y))
                    .unwrap();
            }
            let position = function.add_argument_value(0, Value::Int(3)).unwrap();
            assert_eq!(position, 1);
            assert_eq!(
                function.argument(0).unwrap().cells(),
                vec![
                    Value::Int(1),
                    Value::Int(3),
                    Value::Int(5),
                    Value::Int(10),
                    Value::Int(15)
                ]
            );
            // Existing component values follow their argument positions.
            assert_eq!(
                function.component_value(0, &[2]).unwrap(),
                Value::Int(5)
            );
        }

        #[test]
        fn test_replace_argument_value_moves_component_slice() {
            let function = one_d_function();
            for x in [1, 5, 10] {
                function.add_argument_value(0, Value::Int(x)).unwrap();
            }
            for (i, y) in [100, 500, 1000].iter().enumerate() {
                function
                    .set_component_value(0, &[i], Value::Int(*y))
                    .unwrap();
            }
            let moved = function
                .set_argument_value(0, 0, Value::Int(7))
                .unwrap();
            assert_eq!(moved, Some(1));
            assert_eq!(
                function.argument(0).unwrap().cells(),
                vec![Value::Int(5), Value::Int(7), Value::Int(10)]
            );
            assert_eq!(
                function.component(0).unwrap().cells(),
                vec![Value::Int(500), Value::Int(100), Value::Int(1000)]
            );
        }
    }

    mod event_tests {
        use super::*;
        use std::cell::RefCell as StdRefCell;

        #[test]
        fn test_events_fire_in_mutation_order() {
            let function = one_d_function();
            let seen: Rc<StdRefCell<Vec<(ChangeAction, VariableRole, usize)>>> =
                Rc::new(StdRefCell::new(Vec::new()));
            let sink = Rc::clone(&seen);
            function.subscribe_values(move |event| {
                sink.borrow_mut()
                    .push((event.action, event.role, event.index));
            });

            function.add_argument_value(0, Value::Int(1)).unwrap();
            function
                .set_component_value(0, &[0], Value::Int(9))
                .unwrap();
            function.remove_argument_value(0, 0).unwrap();

            assert_eq!(
                *seen.borrow(),
                vec![
                    (ChangeAction::Add, VariableRole::Argument, 0),
                    (ChangeAction::Replace, VariableRole::Component, 0),
                    (ChangeAction::Remove, VariableRole::Argument, 0),
                ]
            );
        }
    }

    mod edit_transaction_tests {
        use super::*;

        #[test]
        fn test_cancel_edit_restores_all_variables() {
            let function = one_d_function();
            function.add_argument_value(0, Value::Int(1)).unwrap();
            function.begin_edit().unwrap();
            function.add_argument_value(0, Value::Int(2)).unwrap();
            function
                .set_component_value(0, &[0], Value::Int(5))
                .unwrap();
            function.cancel_edit();
            assert_eq!(function.row_count(), 1);
            assert_eq!(function.component_value(0, &[0]).unwrap(), Value::Int(0));
        }

        #[test]
        fn test_nested_begin_edit_fails() {
            let function = one_d_function();
            function.begin_edit().unwrap();
            assert!(matches!(
                function.begin_edit(),
                Err(FunctionError::AlreadyEditing)
            ));
        }
    }
}
