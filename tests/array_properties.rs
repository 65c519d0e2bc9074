use proptest::prelude::*;

use functab::array::{MdArray, Shape};

proptest! {
    /// Stride stays consistent with shape through the index round trip:
    /// translating any valid multi-index to a linear offset and back is the
    /// identity.
    #[test]
    fn prop_linear_and_multi_index_round_trip(
        dims in proptest::collection::vec(1usize..6, 1..4)
    ) {
        let shape = Shape::new(&dims);
        for indices in shape.iter_indices() {
            let linear = shape.linear_index(&indices).unwrap();
            prop_assert_eq!(shape.multi_index(linear).unwrap(), indices);
        }
    }

    /// stride[i] == product(shape[i+1..]) for every dimension.
    #[test]
    fn prop_stride_invariant(
        dims in proptest::collection::vec(0usize..7, 1..5)
    ) {
        let shape = Shape::new(&dims);
        let stride = shape.stride();
        for i in 0..shape.rank() {
            let expected: usize = shape.dims()[i + 1..].iter().product();
            prop_assert_eq!(stride.values()[i], expected);
        }
    }

    /// Structural edits along dimension zero preserve the invariant and the
    /// element count implied by the shape.
    #[test]
    fn prop_insert_remove_keep_shape_consistent(
        initial in 1usize..6,
        width in 1usize..5,
        at in 0usize..6,
    ) {
        let mut array: MdArray<i32> = MdArray::with_shape(&[initial, width]);
        let at = at.min(initial);
        array.insert_at(0, at, 1).unwrap();
        prop_assert_eq!(array.shape(), &[initial + 1, width]);
        prop_assert_eq!(array.element_count(), (initial + 1) * width);

        array.remove_at(0, at, 1).unwrap();
        prop_assert_eq!(array.shape(), &[initial, width]);
        prop_assert_eq!(array.element_count(), initial * width);
    }

    /// Values survive a round trip through set/get at every position.
    #[test]
    fn prop_values_read_back(
        rows in 1usize..5,
        cols in 1usize..5,
    ) {
        let mut array: MdArray<i64> = MdArray::with_shape(&[rows, cols]);
        let shape = Shape::new(&[rows, cols]);
        for indices in shape.iter_indices() {
            let marker = (indices[0] * 100 + indices[1]) as i64;
            array.set_value(&indices, marker).unwrap();
        }
        for indices in shape.iter_indices() {
            let marker = (indices[0] * 100 + indices[1]) as i64;
            prop_assert_eq!(array.value(&indices).unwrap(), marker);
        }
    }
}
