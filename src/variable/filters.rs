//! Filters restricting the visible values of a child variable.

use crate::cell::CellType;

/// A single restriction on a variable's visible index range.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableFilter<T: CellType> {
    /// Keep only positions in the half-open range `start..end`.
    IndexRange { start: usize, end: usize },
    /// Keep only positions holding exactly this value.
    ValueEquals(T),
}

impl<T: CellType> VariableFilter<T> {
    /// Whether the value at `index` passes this filter.
    pub fn accepts(&self, index: usize, value: &T) -> bool {
        match self {
            VariableFilter::IndexRange { start, end } => index >= *start && index < *end,
            VariableFilter::ValueEquals(expected) => value == expected,
        }
    }
}
