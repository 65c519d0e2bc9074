//! # Typed Variables
//!
//! A [`Variable`] is a typed facet over one [`MdArray`], acting as a single
//! axis (argument) or value column (component) of a function. It carries the
//! per-column metadata — unit, default value and step, no-data sentinels,
//! valid-value bounds, interpolation and extrapolation behaviour — and the
//! mutation policies the raw array does not know about: uniqueness
//! enforcement for independent axes, auto-sorted insertion, and synthesis of
//! unique key values when a new row arrives with only the default.
//!
//! A variable is either a *source* (it owns metadata and storage) or
//! *filtered* (it references a parent source and a set of filters). Filtered
//! variables delegate shared metadata reads to the parent and reject writes
//! to parent-owned fields; their visible values are recomputed from the
//! parent's store on every read, never cached across parent mutations.

pub mod filters;

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use log::debug;
use thiserror::Error;

use crate::array::{ArrayError, MdArray, SharedArray};
use crate::cell::CellType;
use crate::value::ValueKind;

pub use filters::VariableFilter;

/// How values between two axis points are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationType {
    Constant,
    #[default]
    Linear,
    None,
}

/// How values outside the axis range are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtrapolationType {
    #[default]
    Constant,
    Linear,
    Periodic,
    None,
}

/// Errors raised by variable operations.
#[derive(Debug, Error)]
pub enum VariableError {
    #[error(transparent)]
    Array(#[from] ArrayError),

    /// Uniqueness violation on an independent variable.
    #[error("value {value} is already present in unique variable '{name}'")]
    DuplicateValue { name: String, value: String },

    /// Direct value mutation attempted on a dependent variable.
    #[error("variable '{name}' is dependent; its values are written through the owning function")]
    DependentMutation { name: String },

    /// Write to parent-owned metadata on a filtered variable.
    #[error("'{property}' is defined on the unfiltered parent of '{name}'")]
    FilteredMetadataWrite { property: &'static str, name: String },

    /// Value mutation attempted through a filtered variable.
    #[error("variable '{name}' is filtered and read-only")]
    FilteredWrite { name: String },

    /// Auto-sort enabled on an element type without a usable ordering.
    #[error("element type {kind} has no ordering; auto-sort is unsupported")]
    UnorderedType { kind: ValueKind },

    /// Unique-default generation requested for a type with no stepping rule.
    #[error("no next-value rule for element type {kind}; install a next-value generator")]
    NoNextValue { kind: ValueKind },

    /// A value index outside the variable's current value count.
    #[error("index {index} out of range for variable '{name}' with {count} values")]
    ValueIndexOutOfRange {
        name: String,
        index: usize,
        count: usize,
    },
}

/// Scalar metadata of a source variable.
pub struct VariableMeta<T: CellType> {
    pub name: String,
    pub unit: String,
    pub default_value: Option<T>,
    pub default_step: Option<T::Step>,
    pub no_data_values: Vec<T>,
    pub min_valid_value: Option<T>,
    pub max_valid_value: Option<T>,
    pub interpolation: InterpolationType,
    pub extrapolation: ExtrapolationType,
    pub auto_sorted: bool,
    pub generate_unique_value_for_default: bool,
    pub unique_values: bool,
    pub independent: bool,
    pub next_value_generator: Option<Rc<dyn Fn(&T) -> T>>,
}

impl<T: CellType> VariableMeta<T> {
    fn new(name: &str) -> Self {
        VariableMeta {
            name: name.to_string(),
            unit: String::new(),
            default_value: None,
            default_step: None,
            no_data_values: Vec::new(),
            min_valid_value: T::default_min(),
            max_valid_value: T::default_max(),
            interpolation: InterpolationType::default(),
            extrapolation: ExtrapolationType::default(),
            auto_sorted: false,
            generate_unique_value_for_default: false,
            unique_values: true,
            independent: true,
            next_value_generator: None,
        }
    }
}

enum VariableKind<T: CellType> {
    Source {
        meta: RefCell<VariableMeta<T>>,
        store: SharedArray<T>,
    },
    Filtered {
        parent: Rc<Variable<T>>,
        filters: Vec<VariableFilter<T>>,
    },
}

/// One typed axis or value column.
pub struct Variable<T: CellType> {
    kind: VariableKind<T>,
    snapshot: RefCell<Option<MdArray<T>>>,
}

impl<T: CellType> Variable<T> {
    /// Creates a source variable with an empty one-dimensional store.
    pub fn new(name: &str) -> Self {
        Variable {
            kind: VariableKind::Source {
                meta: RefCell::new(VariableMeta::new(name)),
                store: SharedArray::new(MdArray::new()),
            },
            snapshot: RefCell::new(None),
        }
    }

    /// Creates a source variable with a unit.
    pub fn with_unit(name: &str, unit: &str) -> Self {
        let variable = Variable::new(name);
        if let VariableKind::Source { meta, .. } = &variable.kind {
            meta.borrow_mut().unit = unit.to_string();
        }
        variable
    }

    /// Creates a source variable pre-populated with values.
    pub fn with_values(name: &str, values: Vec<T>) -> Self {
        Variable {
            kind: VariableKind::Source {
                meta: RefCell::new(VariableMeta::new(name)),
                store: SharedArray::new(MdArray::from_values(values)),
            },
            snapshot: RefCell::new(None),
        }
    }

    /// Returns a filtered child of this variable.
    ///
    /// The child shares the parent's metadata by delegation and exposes only
    /// the values matching the filters; reads are recomputed on every call.
    pub fn filter(parent: &Rc<Variable<T>>, filters: Vec<VariableFilter<T>>) -> Rc<Variable<T>> {
        Rc::new(Variable {
            kind: VariableKind::Filtered {
                parent: Rc::clone(parent),
                filters,
            },
            snapshot: RefCell::new(None),
        })
    }

    pub fn is_filtered(&self) -> bool {
        matches!(self.kind, VariableKind::Filtered { .. })
    }

    pub fn value_kind(&self) -> ValueKind {
        T::KIND
    }

    fn source(&self) -> &Variable<T> {
        match &self.kind {
            VariableKind::Source { .. } => self,
            VariableKind::Filtered { parent, .. } => parent.source(),
        }
    }

    fn source_parts(&self) -> (&RefCell<VariableMeta<T>>, &SharedArray<T>) {
        match &self.source().kind {
            VariableKind::Source { meta, store } => (meta, store),
            VariableKind::Filtered { .. } => unreachable!("source() resolves to a source variable"),
        }
    }

    fn require_source(
        &self,
        property: &'static str,
    ) -> Result<(&RefCell<VariableMeta<T>>, &SharedArray<T>), VariableError> {
        match &self.kind {
            VariableKind::Source { meta, store } => Ok((meta, store)),
            VariableKind::Filtered { .. } => Err(VariableError::FilteredMetadataWrite {
                property,
                name: self.name(),
            }),
        }
    }

    // ---- metadata, delegated to the source for filtered children ----

    pub fn name(&self) -> String {
        self.source_parts().0.borrow().name.clone()
    }

    pub fn set_name(&self, name: &str) -> Result<(), VariableError> {
        let (meta, _) = self.require_source("name")?;
        meta.borrow_mut().name = name.to_string();
        Ok(())
    }

    pub fn unit(&self) -> String {
        self.source_parts().0.borrow().unit.clone()
    }

    pub fn set_unit(&self, unit: &str) -> Result<(), VariableError> {
        let (meta, _) = self.require_source("unit")?;
        meta.borrow_mut().unit = unit.to_string();
        Ok(())
    }

    /// Column label: the name, suffixed with the unit when one is set.
    pub fn display_name(&self) -> String {
        let meta = self.source_parts().0.borrow();
        if meta.unit.is_empty() {
            meta.name.clone()
        } else {
            format!("{} [{}]", meta.name, meta.unit)
        }
    }

    pub fn interpolation(&self) -> InterpolationType {
        self.source_parts().0.borrow().interpolation
    }

    pub fn set_interpolation(&self, interpolation: InterpolationType) -> Result<(), VariableError> {
        let (meta, _) = self.require_source("interpolation")?;
        meta.borrow_mut().interpolation = interpolation;
        Ok(())
    }

    pub fn extrapolation(&self) -> ExtrapolationType {
        self.source_parts().0.borrow().extrapolation
    }

    pub fn set_extrapolation(&self, extrapolation: ExtrapolationType) -> Result<(), VariableError> {
        let (meta, _) = self.require_source("extrapolation")?;
        meta.borrow_mut().extrapolation = extrapolation;
        Ok(())
    }

    pub fn no_data_values(&self) -> Vec<T> {
        self.source_parts().0.borrow().no_data_values.clone()
    }

    pub fn set_no_data_values(&self, values: Vec<T>) -> Result<(), VariableError> {
        let (meta, _) = self.require_source("no-data values")?;
        meta.borrow_mut().no_data_values = values;
        Ok(())
    }

    pub fn default_value(&self) -> Option<T> {
        self.source_parts().0.borrow().default_value.clone()
    }

    pub fn set_default_value(&self, value: Option<T>) -> Result<(), VariableError> {
        let (meta, store) = self.require_source("default value")?;
        meta.borrow_mut().default_value = value.clone();
        store.write().set_default_value(value);
        Ok(())
    }

    pub fn default_step(&self) -> Option<T::Step> {
        self.source_parts().0.borrow().default_step.clone()
    }

    pub fn set_default_step(&self, step: Option<T::Step>) -> Result<(), VariableError> {
        let (meta, _) = self.require_source("default step")?;
        meta.borrow_mut().default_step = step;
        Ok(())
    }

    pub fn min_valid_value(&self) -> Option<T> {
        self.source_parts().0.borrow().min_valid_value.clone()
    }

    pub fn max_valid_value(&self) -> Option<T> {
        self.source_parts().0.borrow().max_valid_value.clone()
    }

    pub fn is_auto_sorted(&self) -> bool {
        self.source_parts().0.borrow().auto_sorted
    }

    /// Enables or disables sorted insertion.
    ///
    /// # Errors
    /// [`VariableError::UnorderedType`] when the element type cannot order
    /// its values.
    pub fn set_auto_sorted(&self, auto_sorted: bool) -> Result<(), VariableError> {
        let (meta, _) = self.require_source("auto-sort")?;
        if auto_sorted && T::empty_value().compare(&T::empty_value()).is_none() {
            return Err(VariableError::UnorderedType { kind: T::KIND });
        }
        meta.borrow_mut().auto_sorted = auto_sorted;
        Ok(())
    }

    pub fn generates_unique_value_for_default(&self) -> bool {
        self.source_parts().0.borrow().generate_unique_value_for_default
    }

    pub fn set_generate_unique_value_for_default(
        &self,
        enabled: bool,
    ) -> Result<(), VariableError> {
        let (meta, _) = self.require_source("unique default generation")?;
        meta.borrow_mut().generate_unique_value_for_default = enabled;
        Ok(())
    }

    pub fn unique_values_enabled(&self) -> bool {
        self.source_parts().0.borrow().unique_values
    }

    pub fn set_unique_values_enabled(&self, enabled: bool) -> Result<(), VariableError> {
        let (meta, _) = self.require_source("uniqueness checking")?;
        meta.borrow_mut().unique_values = enabled;
        Ok(())
    }

    pub fn is_independent(&self) -> bool {
        self.source_parts().0.borrow().independent
    }

    pub(crate) fn mark_dependent(&self) {
        self.source_parts().0.borrow_mut().independent = false;
    }

    /// Installs a custom next-value generator; it takes precedence over the
    /// built-in per-type stepping rule.
    pub fn set_next_value_generator(
        &self,
        generator: Option<Rc<dyn Fn(&T) -> T>>,
    ) -> Result<(), VariableError> {
        let (meta, _) = self.require_source("next-value generator")?;
        meta.borrow_mut().next_value_generator = generator;
        Ok(())
    }

    /// Copies scalar metadata from another variable of the same element
    /// type; value data is never copied.
    pub fn copy_from(&self, other: &Variable<T>) -> Result<(), VariableError> {
        let (meta, store) = self.require_source("metadata")?;
        let (other_meta, _) = other.source_parts();
        let source = other_meta.borrow();
        let mut target = meta.borrow_mut();
        target.unit = source.unit.clone();
        target.default_value = source.default_value.clone();
        target.default_step = source.default_step.clone();
        target.no_data_values = source.no_data_values.clone();
        target.min_valid_value = source.min_valid_value.clone();
        target.max_valid_value = source.max_valid_value.clone();
        target.interpolation = source.interpolation;
        target.extrapolation = source.extrapolation;
        target.auto_sorted = source.auto_sorted;
        target.generate_unique_value_for_default = source.generate_unique_value_for_default;
        target.unique_values = source.unique_values;
        store
            .write()
            .set_default_value(target.default_value.clone());
        Ok(())
    }

    // ---- values ----

    /// The backing store. For a filtered variable this is the parent's
    /// store; prefer [`Variable::get_values`] which applies the filters.
    pub fn store(&self) -> SharedArray<T> {
        self.source_parts().1.clone()
    }

    /// The visible values of this variable.
    ///
    /// Filtered variables re-query the parent's store with their filter set
    /// on every call; nothing is cached across parent mutations.
    pub fn get_values(&self) -> Vec<T> {
        match &self.kind {
            VariableKind::Source { store, .. } => store.read().values(),
            VariableKind::Filtered { parent, filters } => parent
                .get_values()
                .into_iter()
                .enumerate()
                .filter(|(index, value)| filters.iter().all(|f| f.accepts(*index, value)))
                .map(|(_, value)| value)
                .collect(),
        }
    }

    pub fn value_count(&self) -> usize {
        match &self.kind {
            VariableKind::Source { store, .. } => store.read().element_count(),
            VariableKind::Filtered { .. } => self.get_values().len(),
        }
    }

    /// Structural mutations through the function layer must also bounce off
    /// filtered children.
    pub(crate) fn reject_filtered(&self) -> Result<(), VariableError> {
        self.check_writable()
    }

    fn check_writable(&self) -> Result<(), VariableError> {
        match &self.kind {
            VariableKind::Source { .. } => Ok(()),
            VariableKind::Filtered { .. } => Err(VariableError::FilteredWrite {
                name: self.name(),
            }),
        }
    }

    /// Appends or insert-sorts one value, applying the independent-variable
    /// policies: unique-default synthesis, uniqueness enforcement, sorted
    /// placement. Returns the position the value landed at.
    pub fn add_value(&self, value: T) -> Result<usize, VariableError> {
        self.check_writable()?;
        let (meta_cell, store) = self.source_parts();
        let (value, position) = {
            let meta = meta_cell.borrow();
            if !meta.independent {
                return Err(VariableError::DependentMutation {
                    name: meta.name.clone(),
                });
            }
            let mut value = value;
            if meta.generate_unique_value_for_default && self.is_default_value(&meta, &value) {
                value = self.synthesize_next(&meta, store)?;
            }
            if meta.unique_values && store.read().position_of(&value).is_some() {
                return Err(VariableError::DuplicateValue {
                    name: meta.name.clone(),
                    value: format!("{:?}", value),
                });
            }
            let position = if meta.auto_sorted {
                self.sorted_position(store, &value, None)
            } else {
                store.read().element_count()
            };
            (value, position)
        };
        store.write().insert_values(position, &[value])?;
        Ok(position)
    }

    /// Appends several values in order; fails fast on the first rejection.
    pub fn add_values(&self, values: &[T]) -> Result<(), VariableError> {
        for value in values {
            self.add_value(value.clone())?;
        }
        Ok(())
    }

    /// Replaces the value at a position, keeping sort order by relocating
    /// the value if needed. Returns the new position when a move occurred.
    pub fn replace_value(&self, index: usize, value: T) -> Result<Option<usize>, VariableError> {
        self.check_writable()?;
        let (meta_cell, store) = self.source_parts();
        let count = store.read().element_count();
        if index >= count {
            return Err(VariableError::ValueIndexOutOfRange {
                name: self.name(),
                index,
                count,
            });
        }
        {
            let meta = meta_cell.borrow();
            if meta.independent && meta.unique_values {
                if let Some(existing) = store.read().position_of(&value) {
                    if existing != index {
                        return Err(VariableError::DuplicateValue {
                            name: meta.name.clone(),
                            value: format!("{:?}", value),
                        });
                    }
                }
            }
        }
        store.write().set_linear_value(index, value.clone())?;
        let auto_sorted = meta_cell.borrow().auto_sorted;
        if auto_sorted {
            let target = self.sorted_position(store, &value, Some(index));
            if target != index {
                debug!(
                    "variable '{}': re-sorting value at {} to {}",
                    self.name(),
                    index,
                    target
                );
                store.write().move_block(0, index, 1, target)?;
                return Ok(Some(target));
            }
        }
        Ok(None)
    }

    /// Removes and returns the value at a position.
    pub fn remove_value(&self, index: usize) -> Result<T, VariableError> {
        self.check_writable()?;
        let (_, store) = self.source_parts();
        let count = store.read().element_count();
        if index >= count {
            return Err(VariableError::ValueIndexOutOfRange {
                name: self.name(),
                index,
                count,
            });
        }
        let mut removed = store.write().remove_at(0, index, 1)?;
        Ok(removed.remove(0))
    }

    /// Synthesizes the next unique value for this variable.
    ///
    /// A custom generator always wins; otherwise the element type's stepping
    /// rule advances the last stored value by the default step.
    pub fn next_unique_value(&self) -> Result<T, VariableError> {
        let (meta_cell, store) = self.source_parts();
        let meta = meta_cell.borrow();
        self.synthesize_next(&meta, store)
    }

    fn synthesize_next(
        &self,
        meta: &VariableMeta<T>,
        store: &SharedArray<T>,
    ) -> Result<T, VariableError> {
        let values = store.read().values();
        let previous = match values.last() {
            Some(last) => last.clone(),
            None => {
                // No preceding element: the default itself is trivially
                // unique in an empty variable.
                return Ok(meta
                    .default_value
                    .clone()
                    .unwrap_or_else(T::empty_value));
            }
        };
        if let Some(generator) = &meta.next_value_generator {
            let mut candidate = generator(&previous);
            while values.contains(&candidate) {
                candidate = generator(&candidate);
            }
            return Ok(candidate);
        }
        let step = meta
            .default_step
            .clone()
            .or_else(T::default_step)
            .ok_or(VariableError::NoNextValue { kind: T::KIND })?;
        let mut candidate = previous
            .next(&step)
            .ok_or(VariableError::NoNextValue { kind: T::KIND })?;
        while values.contains(&candidate) {
            candidate = candidate
                .next(&step)
                .ok_or(VariableError::NoNextValue { kind: T::KIND })?;
        }
        Ok(candidate)
    }

    fn is_default_value(&self, meta: &VariableMeta<T>, value: &T) -> bool {
        match &meta.default_value {
            Some(default) => default == value,
            None => *value == T::empty_value(),
        }
    }

    /// Position `value` would occupy to keep the store sorted, ignoring the
    /// element at `exclude` (the slot being replaced).
    fn sorted_position(&self, store: &SharedArray<T>, value: &T, exclude: Option<usize>) -> usize {
        store
            .read()
            .values()
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != exclude)
            .filter(|(_, existing)| {
                matches!(existing.compare(value), Some(Ordering::Less))
            })
            .count()
    }

    /// Clones this variable's metadata into a fresh source variable,
    /// optionally including the values.
    pub fn clone_variable(&self, with_values: bool) -> Variable<T> {
        let clone = Variable::new(&self.name());
        clone
            .copy_from(self)
            .expect("freshly created variable is a source");
        if with_values {
            let (_, store) = self.source_parts();
            let (_, target_store) = clone.source_parts();
            let copy = store.read().clone();
            target_store.write().restore_from(copy);
        }
        clone
    }

    // ---- edit transaction participation ----

    pub(crate) fn begin_edit(&self) {
        let (_, store) = self.source_parts();
        *self.source().snapshot.borrow_mut() = Some(store.read().clone());
    }

    pub(crate) fn end_edit(&self) {
        *self.source().snapshot.borrow_mut() = None;
    }

    pub(crate) fn cancel_edit(&self) {
        let snapshot = self.source().snapshot.borrow_mut().take();
        if let Some(snapshot) = snapshot {
            let (_, store) = self.source_parts();
            store.write().restore_from(snapshot);
        }
    }
}
