//! # functab
//!
//! N-dimensional function tables with editable tabular bindings.
//!
//! The crate is layered bottom-up:
//!
//! - [`array`]: row-major N-dimensional storage with two-phase change
//!   events and revalidating views.
//! - [`variable`]: a named array plus metadata and value policies
//!   (uniqueness, auto-sort, unique-default synthesis) and read-only
//!   filtered projections.
//! - [`function`]: argument (axis) and component (value) variables coupled
//!   into one tabular function, with a single change-event stream.
//! - [`binding`]: flat editable row/column views over functions, suitable
//!   for driving a grid control.

pub mod array;
pub mod binding;
pub mod cell;
pub mod value;
pub mod variable;

pub mod function;

pub use crate::array::{MdArray, SharedArray, Shape};
pub use crate::binding::{FunctionBindingList, MultipleFunctionBindingList};
pub use crate::cell::CellType;
pub use crate::function::Function;
pub use crate::value::{Value, ValueKind};
pub use crate::variable::Variable;
