//! Tensor and memory descriptor types
//!
//! These are the typed values the lowering rules consume: a shape, an
//! encoding and an element type. Memory descriptors additionally carry the
//! allocation shape of the buffer they view.

use crate::dtype::DType;
use crate::encoding::Encoding;
use crate::error::{Error, Result};
use smallvec::SmallVec;

/// Tensor shape (stack-allocated up to rank 4)
pub type Shape = SmallVec<[i64; 4]>;

/// A register-resident tensor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TensorType {
    /// Logical shape
    pub shape: Shape,
    /// Distribution over the execution hierarchy
    pub encoding: Encoding,
    /// Element type
    pub dtype: DType,
}

impl TensorType {
    /// Create a tensor type. The encoding must be distributed and have the
    /// shape's rank.
    pub fn new(shape: &[i64], encoding: impl Into<Encoding>, dtype: DType) -> Result<Self> {
        let encoding = encoding.into();
        if encoding.is_shared() {
            return Err(Error::invalid_encoding(format!(
                "tensor cannot have a {} encoding",
                encoding.kind()
            )));
        }
        check_rank(shape, &encoding)?;
        Ok(Self {
            shape: SmallVec::from_slice(shape),
            encoding,
            dtype,
        })
    }

    /// Number of axes
    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements
    #[inline]
    pub fn numel(&self) -> i64 {
        self.shape.iter().product()
    }

    /// Same encoding and element type with a different shape.
    pub fn with_shape(&self, shape: &[i64]) -> Result<Self> {
        Self::new(shape, self.encoding.clone(), self.dtype)
    }
}

/// A view of a tensor resident in shared (or tensor) memory.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemDescType {
    /// Logical shape of the view
    pub shape: Shape,
    /// Shape of the underlying allocation; at least as large as `shape`
    /// along its trailing axes
    pub alloc_shape: Shape,
    /// Memory encoding
    pub encoding: Encoding,
    /// Element type
    pub dtype: DType,
}

impl MemDescType {
    /// Create a memory descriptor whose allocation is exactly `shape`.
    pub fn new(shape: &[i64], encoding: impl Into<Encoding>, dtype: DType) -> Result<Self> {
        Self::with_alloc_shape(shape, shape, encoding, dtype)
    }

    /// Create a memory descriptor viewing part of a larger allocation.
    pub fn with_alloc_shape(
        shape: &[i64],
        alloc_shape: &[i64],
        encoding: impl Into<Encoding>,
        dtype: DType,
    ) -> Result<Self> {
        let encoding = encoding.into();
        if !encoding.is_shared() {
            return Err(Error::invalid_encoding(format!(
                "memory descriptor cannot have a {} encoding",
                encoding.kind()
            )));
        }
        check_rank(shape, &encoding)?;
        Ok(Self {
            shape: SmallVec::from_slice(shape),
            alloc_shape: SmallVec::from_slice(alloc_shape),
            encoding,
            dtype,
        })
    }

    /// Number of axes
    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Trailing `rank` entries of the allocation shape.
    pub fn alloc_shape_for_rank(&self) -> &[i64] {
        let skip = self.alloc_shape.len().saturating_sub(self.rank());
        &self.alloc_shape[skip..]
    }
}

fn check_rank(shape: &[i64], encoding: &Encoding) -> Result<()> {
    if encoding.rank() != shape.len() {
        return Err(Error::InvalidArgument {
            arg: "shape",
            reason: format!(
                "{} encoding has rank {} but shape {shape:?} has rank {}",
                encoding.kind(),
                encoding.rank(),
                shape.len()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{BlockedEncoding, CtaLayout, SwizzledSharedEncoding};

    fn blocked() -> BlockedEncoding {
        BlockedEncoding::new(&[1, 1], &[4, 8], &[4, 1], &[1, 0], CtaLayout::single(2)).unwrap()
    }

    fn swizzled() -> SwizzledSharedEncoding {
        SwizzledSharedEncoding::new(4, 1, 8, &[1, 0], CtaLayout::single(2)).unwrap()
    }

    #[test]
    fn test_tensor_type() {
        let ty = TensorType::new(&[16, 32], blocked(), DType::F16).unwrap();
        assert_eq!(ty.rank(), 2);
        assert_eq!(ty.numel(), 512);
        assert!(TensorType::new(&[16], blocked(), DType::F16).is_err());
        assert!(TensorType::new(&[16, 32], swizzled(), DType::F16).is_err());
    }

    #[test]
    fn test_memdesc_alloc_shape() {
        let ty = MemDescType::with_alloc_shape(&[16, 32], &[3, 16, 32], swizzled(), DType::F32)
            .unwrap();
        assert_eq!(ty.alloc_shape_for_rank(), &[16, 32]);
        assert!(MemDescType::new(&[16, 32], blocked(), DType::F32).is_err());
    }
}
