//! Tensor shapes and descriptors.

use std::fmt;

use crate::{DataType, IrError};

/// Maximum number of dimensions a [`Shape`] may have.
pub const MAX_DIMS: usize = 8;

/// An ordered list of dimension sizes.
///
/// The empty shape `[]` describes a scalar and has one element.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct Shape {
    dims: Vec<u64>,
}

impl Shape {
    /// Creates a shape, rejecting ranks above [`MAX_DIMS`].
    pub fn new(dims: impl Into<Vec<u64>>) -> Result<Self, IrError> {
        let dims = dims.into();
        if dims.len() > MAX_DIMS {
            return Err(IrError::TooManyDims {
                rank: dims.len(),
                max: MAX_DIMS,
            });
        }
        Ok(Self { dims })
    }

    /// The scalar shape `[]`.
    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    /// A one-dimensional shape `[len]`.
    pub fn vector(len: u64) -> Self {
        Self { dims: vec![len] }
    }

    /// The dimension sizes.
    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Product of the dimensions.
    pub fn element_count(&self) -> Result<u64, IrError> {
        self.dims
            .iter()
            .try_fold(1u64, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| IrError::ElementCountOverflow(self.dims.clone()))
    }

    /// Whether a tensor of this shape can be stretched to `target`.
    ///
    /// Dimensions are matched from the trailing end. Each one must equal the
    /// target's or be 1, and this shape may not have more dimensions than
    /// `target`.
    pub fn broadcasts_to(&self, target: &Shape) -> bool {
        self.rank() <= target.rank()
            && self
                .dims
                .iter()
                .rev()
                .zip(target.dims.iter().rev())
                .all(|(&d, &t)| d == t || d == 1)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("]")
    }
}

/// One input or output tensor of an operator invocation.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct TensorDescriptor {
    shape: Shape,
    dtype: DataType,
    element_count: u64,
}

impl TensorDescriptor {
    /// Binds a shape to an element type, computing the element count.
    pub fn new(shape: Shape, dtype: DataType) -> Result<Self, IrError> {
        let element_count = shape.element_count()?;
        Ok(Self {
            shape,
            dtype,
            element_count,
        })
    }

    /// Shorthand for a one-dimensional tensor.
    pub fn vector(len: u64, dtype: DataType) -> Self {
        Self {
            shape: Shape::vector(len),
            dtype,
            element_count: len,
        }
    }

    /// The tensor shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The element type.
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Total number of elements.
    pub fn element_count(&self) -> u64 {
        self.element_count
    }

    /// Total size in bytes, or `None` on overflow.
    pub fn size_in_bytes(&self) -> Option<u64> {
        self.element_count.checked_mul(self.dtype.size_in_bytes())
    }

    /// Returns a descriptor with the same shape and a different element type.
    pub fn with_dtype(&self, dtype: DataType) -> Self {
        Self {
            shape: self.shape.clone(),
            dtype,
            element_count: self.element_count,
        }
    }
}

impl fmt::Display for TensorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor<{}, {}>", self.shape, self.dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_count_is_product() {
        let shape = Shape::new(vec![2, 3, 4]).unwrap();
        assert_eq!(shape.element_count().unwrap(), 24);
        assert_eq!(shape.rank(), 3);
    }

    #[test]
    fn scalar_has_one_element() {
        assert_eq!(Shape::scalar().element_count().unwrap(), 1);
    }

    #[test]
    fn zero_dim_has_no_elements() {
        let shape = Shape::new(vec![4, 0, 2]).unwrap();
        assert_eq!(shape.element_count().unwrap(), 0);
    }

    #[test]
    fn rank_is_bounded() {
        assert!(Shape::new(vec![1; MAX_DIMS]).is_ok());
        let err = Shape::new(vec![1; MAX_DIMS + 1]).unwrap_err();
        assert_eq!(
            err,
            IrError::TooManyDims {
                rank: MAX_DIMS + 1,
                max: MAX_DIMS
            }
        );
    }

    #[test]
    fn overflowing_shape_rejected() {
        let shape = Shape::new(vec![u64::MAX, 2]).unwrap();
        assert!(matches!(
            TensorDescriptor::new(shape, DataType::F32),
            Err(IrError::ElementCountOverflow(_))
        ));
    }

    #[test]
    fn broadcast_compatibility() {
        let target = Shape::new(vec![2, 3]).unwrap();
        for ok in [vec![3], vec![1, 3], vec![2, 1], vec![2, 3], vec![1], vec![]] {
            assert!(Shape::new(ok.clone()).unwrap().broadcasts_to(&target), "{ok:?}");
        }
        for bad in [vec![2], vec![3, 2], vec![1, 2, 3], vec![4]] {
            assert!(!Shape::new(bad.clone()).unwrap().broadcasts_to(&target), "{bad:?}");
        }
    }

    #[test]
    fn descriptor_sizes() {
        let t = TensorDescriptor::new(Shape::new(vec![10, 10]).unwrap(), DataType::BF16).unwrap();
        assert_eq!(t.element_count(), 100);
        assert_eq!(t.size_in_bytes(), Some(200));
        assert_eq!(t.with_dtype(DataType::F32).size_in_bytes(), Some(400));
    }

    #[test]
    fn display() {
        let t = TensorDescriptor::vector(7, DataType::F16);
        assert_eq!(format!("{t}"), "tensor<[7], float16>");
        assert_eq!(format!("{}", Shape::scalar()), "[]");
    }
}
