//! # N-Dimensional Resizable Arrays
//!
//! [`MdArray`] is a generic, resizable N-dimensional array over row-major
//! linear storage. Beyond plain indexed access it supports insertion and
//! removal of whole slices along an arbitrary dimension, reshaping that
//! preserves the overlap between the old and new shapes, block moves used to
//! maintain sort order cheaply, and a two-phase change-notification protocol
//! in which a listener can veto a mutation before storage is touched.
//!
//! [`SharedArray`] is the shared-ownership handle variables and views hold;
//! [`view::ArrayView`] is a non-owning selection that forwards reads and
//! writes to its parent with index translation.
//!
//! ```rust
//! use functab::array::MdArray;
//!
//! let mut array: MdArray<i32> = MdArray::with_shape(&[2, 3]);
//! array.set_value(&[1, 2], 42).unwrap();
//! assert_eq!(array.value(&[1, 2]).unwrap(), 42);
//!
//! array.insert_at(0, 1, 1).unwrap();
//! assert_eq!(array.shape(), &[3, 3]);
//! assert_eq!(array.value(&[2, 2]).unwrap(), 42);
//! ```

pub mod events;
pub mod shape;
pub mod view;

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use thiserror::Error;

use crate::cell::CellType;
use crate::value::{ConversionError, Value};

pub use events::{ArrayChange, ArrayEvents, ChangeAction, ChangeRejected, SubscriptionId};
pub use shape::{Shape, Stride};
pub use view::{ArraySelection, ArrayView, DimensionSelection};

/// Errors raised by array operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArrayError {
    /// A multi-index component fell outside the current shape.
    #[error("index {index:?} out of range for shape {shape:?}")]
    IndexOutOfRange { index: Vec<usize>, shape: Vec<usize> },

    /// A multi-index had the wrong number of components.
    #[error("got {got} index components for an array of rank {rank}")]
    RankMismatch { got: usize, rank: usize },

    /// A linear offset fell outside the element count.
    #[error("linear index {index} out of range for {element_count} elements")]
    LinearIndexOutOfRange { index: usize, element_count: usize },

    /// A dimension number fell outside the rank.
    #[error("dimension {dimension} out of range for rank {rank}")]
    DimensionOutOfRange { dimension: usize, rank: usize },

    /// A slice range along one dimension exceeded that dimension's size.
    #[error("slice of {length} at {start} exceeds size {size} of dimension {dimension}")]
    SliceOutOfRange {
        dimension: usize,
        start: usize,
        length: usize,
        size: usize,
    },

    /// A structural mutation was attempted on a read-only array.
    #[error("array is read-only")]
    ReadOnly,

    /// A shape-changing mutation was attempted on a fixed-size array.
    #[error("array has a fixed size")]
    FixedSize,

    /// A selection did not match the parent array's rank.
    #[error("selection has {got} dimensions, parent array has rank {rank}")]
    SelectionRankMismatch { got: usize, rank: usize },

    /// A changing-phase listener vetoed the mutation.
    #[error(transparent)]
    Rejected(#[from] ChangeRejected),

    /// A dynamic value could not be converted to the element type.
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// A generic, resizable N-dimensional array with change notification.
pub struct MdArray<T: CellType> {
    shape: Shape,
    stride: Stride,
    slots: Vec<Option<T>>,
    default_value: Option<T>,
    read_only: bool,
    fixed_size: bool,
    events: ArrayEvents<T>,
}

impl<T: CellType> MdArray<T> {
    /// Creates an empty one-dimensional array with shape `[0]`.
    pub fn new() -> Self {
        Self::with_shape(&[0])
    }

    /// Creates an array of the given shape with every slot unset.
    pub fn with_shape(dims: &[usize]) -> Self {
        let shape = Shape::new(dims);
        let stride = shape.stride();
        let slots = vec![None; shape.element_count()];
        MdArray {
            shape,
            stride,
            slots,
            default_value: None,
            read_only: false,
            fixed_size: false,
            events: ArrayEvents::new(),
        }
    }

    /// Creates a one-dimensional array from explicit values.
    pub fn from_values(values: Vec<T>) -> Self {
        let shape = Shape::new(&[values.len()]);
        let stride = shape.stride();
        MdArray {
            shape,
            stride,
            slots: values.into_iter().map(Some).collect(),
            default_value: None,
            read_only: false,
            fixed_size: false,
            events: ArrayEvents::new(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn shape(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn stride(&self) -> &[usize] {
        self.stride.values()
    }

    pub fn element_count(&self) -> usize {
        self.shape.element_count()
    }

    pub fn default_value(&self) -> Option<&T> {
        self.default_value.as_ref()
    }

    pub fn set_default_value(&mut self, value: Option<T>) {
        self.default_value = value;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn is_fixed_size(&self) -> bool {
        self.fixed_size
    }

    pub fn set_fixed_size(&mut self, fixed_size: bool) {
        self.fixed_size = fixed_size;
    }

    /// Listener registry; see [`events`] for the two-phase protocol.
    pub fn events_mut(&mut self) -> &mut ArrayEvents<T> {
        &mut self.events
    }

    /// Reads the value at a multi-index.
    ///
    /// Unset slots read as the element type's empty value; a valid in-range
    /// index never fails.
    pub fn value(&self, indices: &[usize]) -> Result<T, ArrayError> {
        let linear = self.shape.linear_index(indices)?;
        Ok(self.slot_value(linear))
    }

    /// Reads the value at a linear offset.
    pub fn linear_value(&self, index: usize) -> Result<T, ArrayError> {
        if index >= self.slots.len() {
            return Err(ArrayError::LinearIndexOutOfRange {
                index,
                element_count: self.slots.len(),
            });
        }
        Ok(self.slot_value(index))
    }

    fn slot_value(&self, linear: usize) -> T {
        self.slots[linear].clone().unwrap_or_else(T::empty_value)
    }

    /// Writes a value at a multi-index, running the two-phase protocol.
    pub fn set_value(&mut self, indices: &[usize], value: T) -> Result<(), ArrayError> {
        let linear = self.shape.linear_index(indices)?;
        self.set_linear_value(linear, value)
    }

    /// Writes a value at a linear offset, running the two-phase protocol.
    pub fn set_linear_value(&mut self, index: usize, value: T) -> Result<(), ArrayError> {
        if self.read_only {
            return Err(ArrayError::ReadOnly);
        }
        if index >= self.slots.len() {
            return Err(ArrayError::LinearIndexOutOfRange {
                index,
                element_count: self.slots.len(),
            });
        }
        let change = ArrayChange {
            action: ChangeAction::Replace,
            index,
            items: vec![value.clone()],
        };
        self.events.raise_changing(&change)?;
        self.slots[index] = Some(value);
        self.events.raise_changed(&change);
        Ok(())
    }

    /// Writes a dynamic value, converting it to the element type first.
    ///
    /// A value the conversion cannot repair fails with the conversion error;
    /// storage is untouched.
    pub fn set_cell(&mut self, indices: &[usize], value: Value) -> Result<(), ArrayError> {
        let typed = T::from_value(value)?;
        self.set_value(indices, typed)
    }

    /// Inserts `length` slices along `dimension`, starting at `index`.
    ///
    /// Slices at or after `index` shift up by `length`; new slots are filled
    /// with the default value. `index` may equal the current size (append).
    pub fn insert_at(
        &mut self,
        dimension: usize,
        index: usize,
        length: usize,
    ) -> Result<(), ArrayError> {
        self.check_structural()?;
        let size = self.shape.dim(dimension)?;
        if index > size {
            return Err(ArrayError::SliceOutOfRange {
                dimension,
                start: index,
                length,
                size,
            });
        }

        let mut new_dims = self.shape.dims().to_vec();
        new_dims[dimension] += length;
        let new_shape = Shape::new(&new_dims);
        let new_stride = new_shape.stride();

        let slice_size: usize = new_shape.element_count() / new_dims[dimension].max(1);
        let change = ArrayChange {
            action: ChangeAction::Add,
            index: index * new_stride.values()[dimension],
            items: vec![
                self.default_value.clone().unwrap_or_else(T::empty_value);
                slice_size * length
            ],
        };
        self.events.raise_changing(&change)?;

        let old_shape = self.shape.clone();
        let old_slots = std::mem::take(&mut self.slots);
        let mut new_slots: Vec<Option<T>> = Vec::with_capacity(new_shape.element_count());
        for indices in new_shape.iter_indices() {
            let position = indices[dimension];
            if position >= index && position < index + length {
                new_slots.push(self.default_value.clone());
            } else {
                let mut old_indices = indices.clone();
                if position >= index + length {
                    old_indices[dimension] -= length;
                }
                let old_linear = old_shape
                    .linear_index(&old_indices)
                    .expect("translated index within old shape");
                new_slots.push(old_slots[old_linear].clone());
            }
        }

        self.shape = new_shape;
        self.stride = new_stride;
        self.slots = new_slots;
        self.events.raise_changed(&change);
        Ok(())
    }

    /// Inserts explicit values into a one-dimensional array at `index`.
    ///
    /// Unlike [`MdArray::insert_at`], the new slots carry the given values
    /// and the `Add` event reports them, so listeners see the real insertion
    /// rather than a default fill followed by replacements.
    pub fn insert_values(&mut self, index: usize, values: &[T]) -> Result<(), ArrayError> {
        self.check_structural()?;
        if self.rank() != 1 {
            return Err(ArrayError::RankMismatch {
                got: 1,
                rank: self.rank(),
            });
        }
        let size = self.shape.dim(0)?;
        if index > size {
            return Err(ArrayError::SliceOutOfRange {
                dimension: 0,
                start: index,
                length: values.len(),
                size,
            });
        }
        let change = ArrayChange {
            action: ChangeAction::Add,
            index,
            items: values.to_vec(),
        };
        self.events.raise_changing(&change)?;
        let tail: Vec<Option<T>> = self.slots.split_off(index);
        self.slots.extend(values.iter().cloned().map(Some));
        self.slots.extend(tail);
        self.shape = Shape::new(&[size + values.len()]);
        self.stride = self.shape.stride();
        self.events.raise_changed(&change);
        Ok(())
    }

    /// Removes `length` slices along `dimension`, starting at `index`.
    pub fn remove_at(
        &mut self,
        dimension: usize,
        index: usize,
        length: usize,
    ) -> Result<Vec<T>, ArrayError> {
        self.check_structural()?;
        let size = self.shape.dim(dimension)?;
        if index + length > size {
            return Err(ArrayError::SliceOutOfRange {
                dimension,
                start: index,
                length,
                size,
            });
        }

        let removed: Vec<T> = self
            .shape
            .iter_indices()
            .filter(|indices| {
                indices[dimension] >= index && indices[dimension] < index + length
            })
            .map(|indices| {
                let linear = self
                    .shape
                    .linear_index(&indices)
                    .expect("iterated index within shape");
                self.slot_value(linear)
            })
            .collect();

        let change = ArrayChange {
            action: ChangeAction::Remove,
            index: index * self.stride.values()[dimension],
            items: removed.clone(),
        };
        self.events.raise_changing(&change)?;

        let mut new_dims = self.shape.dims().to_vec();
        new_dims[dimension] -= length;
        let new_shape = Shape::new(&new_dims);
        let new_stride = new_shape.stride();

        let old_shape = self.shape.clone();
        let old_slots = std::mem::take(&mut self.slots);
        let mut new_slots: Vec<Option<T>> = Vec::with_capacity(new_shape.element_count());
        for indices in new_shape.iter_indices() {
            let mut old_indices = indices.clone();
            if old_indices[dimension] >= index {
                old_indices[dimension] += length;
            }
            let old_linear = old_shape
                .linear_index(&old_indices)
                .expect("translated index within old shape");
            new_slots.push(old_slots[old_linear].clone());
        }

        self.shape = new_shape;
        self.stride = new_stride;
        self.slots = new_slots;
        self.events.raise_changed(&change);
        Ok(removed)
    }

    /// Reshapes the array, preserving values at matching multi-indices.
    ///
    /// Slots outside the old shape are filled with the default value. Raises
    /// a single `Reset`.
    pub fn resize(&mut self, new_dims: &[usize]) -> Result<(), ArrayError> {
        self.check_structural()?;
        let new_shape = Shape::new(new_dims);
        let change = ArrayChange {
            action: ChangeAction::Reset,
            index: 0,
            items: Vec::new(),
        };
        self.events.raise_changing(&change)?;

        let old_shape = self.shape.clone();
        let old_slots = std::mem::take(&mut self.slots);
        let mut new_slots: Vec<Option<T>> = Vec::with_capacity(new_shape.element_count());
        for indices in new_shape.iter_indices() {
            if indices.len() == old_shape.rank()
                && indices
                    .iter()
                    .zip(old_shape.dims())
                    .all(|(component, size)| component < size)
            {
                let old_linear = old_shape
                    .linear_index(&indices)
                    .expect("intersection index within old shape");
                new_slots.push(old_slots[old_linear].clone());
            } else {
                new_slots.push(self.default_value.clone());
            }
        }

        self.stride = new_shape.stride();
        self.shape = new_shape;
        self.slots = new_slots;
        self.events.raise_changed(&change);
        Ok(())
    }

    /// Relocates a contiguous block of slices along one dimension.
    ///
    /// `new_index` is the block's position after the move, within the
    /// unchanged dimension size. Cheaper bookkeeping than remove + insert,
    /// and the auto-sort fast path in the variable layer.
    pub fn move_block(
        &mut self,
        dimension: usize,
        index: usize,
        length: usize,
        new_index: usize,
    ) -> Result<(), ArrayError> {
        if self.read_only {
            return Err(ArrayError::ReadOnly);
        }
        let size = self.shape.dim(dimension)?;
        if index + length > size || new_index + length > size {
            return Err(ArrayError::SliceOutOfRange {
                dimension,
                start: index.max(new_index),
                length,
                size,
            });
        }
        if index == new_index || length == 0 {
            return Ok(());
        }

        let moved: Vec<T> = self
            .shape
            .iter_indices()
            .filter(|indices| {
                indices[dimension] >= index && indices[dimension] < index + length
            })
            .map(|indices| {
                let linear = self
                    .shape
                    .linear_index(&indices)
                    .expect("iterated index within shape");
                self.slot_value(linear)
            })
            .collect();
        let change = ArrayChange {
            action: ChangeAction::Replace,
            index: index.min(new_index) * self.stride.values()[dimension],
            items: moved,
        };
        self.events.raise_changing(&change)?;

        // Permutation of positions along the dimension: cut the block out,
        // then splice it back at the target position.
        let mut order: Vec<usize> = (0..size).collect();
        let block: Vec<usize> = order.drain(index..index + length).collect();
        order.splice(new_index..new_index, block);

        let old_slots = std::mem::take(&mut self.slots);
        let shape = self.shape.clone();
        let mut new_slots: Vec<Option<T>> = Vec::with_capacity(shape.element_count());
        for indices in shape.iter_indices() {
            let mut old_indices = indices.clone();
            old_indices[dimension] = order[indices[dimension]];
            let old_linear = shape
                .linear_index(&old_indices)
                .expect("permuted index within shape");
            new_slots.push(old_slots[old_linear].clone());
        }
        self.slots = new_slots;
        self.events.raise_changed(&change);
        Ok(())
    }

    /// Resets the array to the empty shape `[0]`.
    pub fn clear(&mut self) -> Result<(), ArrayError> {
        self.check_structural()?;
        let change = ArrayChange {
            action: ChangeAction::Reset,
            index: 0,
            items: Vec::new(),
        };
        self.events.raise_changing(&change)?;
        self.shape = Shape::empty();
        self.stride = self.shape.stride();
        self.slots.clear();
        self.events.raise_changed(&change);
        Ok(())
    }

    /// Materializes all values in row-major order, unset slots reading as
    /// the element type's empty value.
    pub fn values(&self) -> Vec<T> {
        (0..self.slots.len()).map(|i| self.slot_value(i)).collect()
    }

    /// Linear position of the first occurrence of `value`, if present.
    pub fn position_of(&self, value: &T) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref() == Some(value))
    }

    /// Restores shape, values and flags from another array, keeping this
    /// array's listener registry. Used by edit-transaction rollback.
    pub(crate) fn restore_from(&mut self, other: MdArray<T>) {
        self.shape = other.shape;
        self.stride = other.stride;
        self.slots = other.slots;
        self.default_value = other.default_value;
        self.read_only = other.read_only;
        self.fixed_size = other.fixed_size;
        let change = ArrayChange {
            action: ChangeAction::Reset,
            index: 0,
            items: Vec::new(),
        };
        self.events.raise_changed(&change);
    }

    fn check_structural(&self) -> Result<(), ArrayError> {
        if self.read_only {
            return Err(ArrayError::ReadOnly);
        }
        if self.fixed_size {
            return Err(ArrayError::FixedSize);
        }
        Ok(())
    }
}

impl<T: CellType> Default for MdArray<T> {
    fn default() -> Self {
        MdArray::new()
    }
}

impl<T: CellType> Clone for MdArray<T> {
    /// Cloning yields an independent copy with identical shape and values.
    /// Listeners are not carried over.
    fn clone(&self) -> Self {
        MdArray {
            shape: self.shape.clone(),
            stride: self.stride.clone(),
            slots: self.slots.clone(),
            default_value: self.default_value.clone(),
            read_only: self.read_only,
            fixed_size: self.fixed_size,
            events: ArrayEvents::new(),
        }
    }
}

impl<T: CellType> std::fmt::Debug for MdArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdArray")
            .field("shape", &self.shape)
            .field("default_value", &self.default_value)
            .field("read_only", &self.read_only)
            .field("fixed_size", &self.fixed_size)
            .finish()
    }
}

/// Shared-ownership handle over an [`MdArray`].
///
/// Variables own their array through this handle; views hold a second handle
/// to the same storage and translate indices on every access.
#[derive(Debug)]
pub struct SharedArray<T: CellType>(Rc<RefCell<MdArray<T>>>);

impl<T: CellType> SharedArray<T> {
    pub fn new(array: MdArray<T>) -> Self {
        SharedArray(Rc::new(RefCell::new(array)))
    }

    /// Immutable access to the underlying array.
    pub fn read(&self) -> Ref<'_, MdArray<T>> {
        self.0.borrow()
    }

    /// Mutable access to the underlying array.
    pub fn write(&self) -> RefMut<'_, MdArray<T>> {
        self.0.borrow_mut()
    }

    /// Constructs a view selecting explicit indices along one dimension.
    pub fn select(&self, dimension: usize, indices: &[usize]) -> Result<ArrayView<T>, ArrayError> {
        ArrayView::select(self.clone(), dimension, indices)
    }

    /// Constructs a view selecting an index range per dimension.
    pub fn select_range(&self, starts: &[usize], ends: &[usize]) -> Result<ArrayView<T>, ArrayError> {
        ArrayView::select_range(self.clone(), starts, ends)
    }
}

impl<T: CellType> Clone for SharedArray<T> {
    fn clone(&self) -> Self {
        SharedArray(Rc::clone(&self.0))
    }
}
