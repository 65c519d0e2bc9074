//! Shape and stride bookkeeping for row-major N-dimensional storage.
//!
//! A [`Shape`] is the ordered list of per-dimension sizes; its [`Stride`] is
//! the derived list of row-major linear-index multipliers, with
//! `stride[i] == product(shape[i+1..])`. Both are rebuilt together whenever a
//! structural operation changes the shape, so the invariant can never be
//! observed broken from outside the module.

use itertools::Itertools;

use super::ArrayError;

/// Ordered per-dimension sizes of an array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Creates a shape from explicit per-dimension sizes.
    ///
    /// An empty dimension list is normalized to the canonical empty shape
    /// `[0]`; rank zero never occurs.
    pub fn new(dims: &[usize]) -> Self {
        if dims.is_empty() {
            Shape::empty()
        } else {
            Shape(dims.to_vec())
        }
    }

    /// The canonical empty shape, `[0]`.
    pub fn empty() -> Self {
        Shape(vec![0])
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// The per-dimension sizes.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Size along one dimension.
    pub fn dim(&self, dimension: usize) -> Result<usize, ArrayError> {
        self.0
            .get(dimension)
            .copied()
            .ok_or(ArrayError::DimensionOutOfRange {
                dimension,
                rank: self.rank(),
            })
    }

    /// Total number of elements, `product(shape)`.
    pub fn element_count(&self) -> usize {
        self.0.iter().product()
    }

    /// Derives the row-major stride for this shape.
    pub fn stride(&self) -> Stride {
        Stride::from_shape(self)
    }

    /// Validates a multi-index and translates it to a linear offset.
    ///
    /// # Errors
    /// - [`ArrayError::RankMismatch`] when the index length differs from the
    ///   rank.
    /// - [`ArrayError::IndexOutOfRange`] when any component falls outside
    ///   `[0, shape[d])`. Indices are never clamped.
    pub fn linear_index(&self, indices: &[usize]) -> Result<usize, ArrayError> {
        if indices.len() != self.rank() {
            return Err(ArrayError::RankMismatch {
                got: indices.len(),
                rank: self.rank(),
            });
        }
        for (component, size) in indices.iter().zip(self.0.iter()) {
            if component >= size {
                return Err(ArrayError::IndexOutOfRange {
                    index: indices.to_vec(),
                    shape: self.0.clone(),
                });
            }
        }
        let stride = self.stride();
        Ok(indices
            .iter()
            .zip(stride.values())
            .map(|(component, multiplier)| component * multiplier)
            .sum())
    }

    /// Translates a linear offset back into a multi-index.
    pub fn multi_index(&self, linear: usize) -> Result<Vec<usize>, ArrayError> {
        if linear >= self.element_count() {
            return Err(ArrayError::LinearIndexOutOfRange {
                index: linear,
                element_count: self.element_count(),
            });
        }
        let stride = self.stride();
        let mut remainder = linear;
        let mut indices = Vec::with_capacity(self.rank());
        for multiplier in stride.values() {
            indices.push(remainder / multiplier);
            remainder %= multiplier;
        }
        Ok(indices)
    }

    /// Iterates every multi-index of this shape in row-major order.
    pub fn iter_indices(&self) -> impl Iterator<Item = Vec<usize>> + use<> {
        self.0
            .clone()
            .into_iter()
            .map(|size| 0..size)
            .multi_cartesian_product()
    }

    /// Human-readable form used by error messages, e.g. `3x4x5`.
    pub fn describe(&self) -> String {
        self.0.iter().map(|size| size.to_string()).join("x")
    }
}

/// Row-major linear-index multipliers derived from a [`Shape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stride(Vec<usize>);

impl Stride {
    /// Derives the stride of a shape: `stride[i] = product(shape[i+1..])`.
    pub fn from_shape(shape: &Shape) -> Self {
        let dims = shape.dims();
        let mut values = vec![1; dims.len()];
        for i in (0..dims.len().saturating_sub(1)).rev() {
            values[i] = values[i + 1] * dims[i + 1];
        }
        Stride(values)
    }

    /// The per-dimension multipliers.
    pub fn values(&self) -> &[usize] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod stride_tests {
        use super::*;

        #[test]
        fn test_stride_of_3d_shape() {
            let shape = Shape::new(&[3, 4, 5]);
            assert_eq!(shape.stride().values(), &[20, 5, 1]);
        }

        #[test]
        fn test_stride_of_1d_shape() {
            assert_eq!(Shape::new(&[7]).stride().values(), &[1]);
        }

        #[test]
        fn test_stride_invariant() {
            let shape = Shape::new(&[2, 3, 4, 5]);
            let stride = shape.stride();
            for i in 0..shape.rank() {
                let expected: usize = shape.dims()[i + 1..].iter().product();
                assert_eq!(stride.values()[i], expected);
            }
        }
    }

    mod index_tests {
        use super::*;

        #[test]
        fn test_linear_and_multi_round_trip() {
            let shape = Shape::new(&[3, 4, 5]);
            for indices in shape.iter_indices() {
                let linear = shape.linear_index(&indices).unwrap();
                assert_eq!(shape.multi_index(linear).unwrap(), indices);
            }
        }

        #[test]
        fn test_out_of_range_is_an_error() {
            let shape = Shape::new(&[3, 4]);
            assert!(matches!(
                shape.linear_index(&[3, 0]),
                Err(ArrayError::IndexOutOfRange { .. })
            ));
            assert!(matches!(
                shape.linear_index(&[0]),
                Err(ArrayError::RankMismatch { .. })
            ));
            assert!(matches!(
                shape.multi_index(12),
                Err(ArrayError::LinearIndexOutOfRange { .. })
            ));
        }

        #[test]
        fn test_empty_shape() {
            let shape = Shape::empty();
            assert_eq!(shape.rank(), 1);
            assert_eq!(shape.element_count(), 0);
            assert_eq!(shape.iter_indices().count(), 0);
        }
    }
}
