//! Non-owning views (slices) over a shared parent array.
//!
//! A view holds a handle to its parent plus a per-dimension selection; it
//! owns no storage. Reads and writes translate the view index into a parent
//! index and forward through the handle, so writes through a view are visible
//! through the parent and vice versa.
//!
//! Translated indices are never cached: every access re-validates against the
//! parent's *current* shape, so a view that outlives a parent shrink fails
//! with an out-of-range error instead of touching stale positions.

use super::{ArrayError, SharedArray};
use crate::cell::CellType;

/// Selection along a single dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimensionSelection {
    /// Every index of the dimension.
    All,
    /// The half-open index range `start..end`.
    Range { start: usize, end: usize },
    /// An explicit list of parent indices, in view order.
    Indices(Vec<usize>),
}

impl DimensionSelection {
    /// Number of view positions this selection exposes.
    fn len(&self, parent_size: usize) -> usize {
        match self {
            DimensionSelection::All => parent_size,
            DimensionSelection::Range { start, end } => end.saturating_sub(*start),
            DimensionSelection::Indices(indices) => indices.len(),
        }
    }

    /// Maps a view position to a parent index. The result may still be out
    /// of the parent's current range; the caller validates it.
    fn translate(&self, position: usize) -> Option<usize> {
        match self {
            DimensionSelection::All => Some(position),
            DimensionSelection::Range { start, end } => {
                let parent = start + position;
                (parent < *end).then_some(parent)
            }
            DimensionSelection::Indices(indices) => indices.get(position).copied(),
        }
    }
}

/// Per-dimension selection of a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArraySelection(Vec<DimensionSelection>);

impl ArraySelection {
    pub fn new(dimensions: Vec<DimensionSelection>) -> Self {
        ArraySelection(dimensions)
    }

    pub fn dimensions(&self) -> &[DimensionSelection] {
        &self.0
    }
}

/// A non-owning, shape-restricted projection of a parent array.
#[derive(Debug, Clone)]
pub struct ArrayView<T: CellType> {
    parent: SharedArray<T>,
    selection: ArraySelection,
}

impl<T: CellType> ArrayView<T> {
    /// View selecting explicit indices along one dimension, all of the rest.
    pub fn select(
        parent: SharedArray<T>,
        dimension: usize,
        indices: &[usize],
    ) -> Result<Self, ArrayError> {
        let rank = parent.read().rank();
        if dimension >= rank {
            return Err(ArrayError::DimensionOutOfRange { dimension, rank });
        }
        let mut dimensions = vec![DimensionSelection::All; rank];
        dimensions[dimension] = DimensionSelection::Indices(indices.to_vec());
        Ok(ArrayView {
            parent,
            selection: ArraySelection::new(dimensions),
        })
    }

    /// View selecting `starts[d]..ends[d]` along every dimension.
    pub fn select_range(
        parent: SharedArray<T>,
        starts: &[usize],
        ends: &[usize],
    ) -> Result<Self, ArrayError> {
        let rank = parent.read().rank();
        if starts.len() != rank || ends.len() != rank {
            return Err(ArrayError::SelectionRankMismatch {
                got: starts.len().min(ends.len()),
                rank,
            });
        }
        let dimensions = starts
            .iter()
            .zip(ends.iter())
            .map(|(&start, &end)| DimensionSelection::Range { start, end })
            .collect();
        Ok(ArrayView {
            parent,
            selection: ArraySelection::new(dimensions),
        })
    }

    /// The view's shape, derived from the selection and the parent's
    /// current shape. Recomputed on every call.
    pub fn shape(&self) -> Vec<usize> {
        let parent = self.parent.read();
        self.selection
            .dimensions()
            .iter()
            .enumerate()
            .map(|(d, selection)| selection.len(parent.shape().get(d).copied().unwrap_or(0)))
            .collect()
    }

    pub fn element_count(&self) -> usize {
        self.shape().iter().product()
    }

    /// Reads through the view; the index is translated and validated against
    /// the parent's current shape.
    pub fn value(&self, indices: &[usize]) -> Result<T, ArrayError> {
        let translated = self.translate(indices)?;
        self.parent.read().value(&translated)
    }

    /// Writes through the view into the parent.
    pub fn set_value(&self, indices: &[usize], value: T) -> Result<(), ArrayError> {
        let translated = self.translate(indices)?;
        self.parent.write().set_value(&translated, value)
    }

    /// Materializes the selected values in row-major view order.
    pub fn values(&self) -> Result<Vec<T>, ArrayError> {
        let shape = super::Shape::new(&self.shape());
        shape
            .iter_indices()
            .map(|indices| self.value(&indices))
            .collect()
    }

    fn translate(&self, indices: &[usize]) -> Result<Vec<usize>, ArrayError> {
        let rank = self.selection.dimensions().len();
        if indices.len() != rank {
            return Err(ArrayError::RankMismatch {
                got: indices.len(),
                rank,
            });
        }
        let view_shape = self.shape();
        let mut translated = Vec::with_capacity(rank);
        for (d, (&position, selection)) in indices
            .iter()
            .zip(self.selection.dimensions())
            .enumerate()
        {
            if position >= view_shape[d] {
                return Err(ArrayError::IndexOutOfRange {
                    index: indices.to_vec(),
                    shape: view_shape,
                });
            }
            match selection.translate(position) {
                Some(parent_index) => translated.push(parent_index),
                None => {
                    return Err(ArrayError::IndexOutOfRange {
                        index: indices.to_vec(),
                        shape: view_shape,
                    });
                }
            }
        }
        // Bounds against the parent's current shape are enforced by the
        // parent access itself, so a stale selection surfaces as
        // IndexOutOfRange there.
        Ok(translated)
    }
}
