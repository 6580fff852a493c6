//! Memory descriptor views
//!
//! A memory-resident tensor is passed around as a base address plus one
//! logical offset per axis. View operations never touch the data; they only
//! move the base or rewrite the offsets.

use crate::context::LayoutContext;
use crate::dtype::DType;
use crate::encoding::Encoding;
use crate::error::{Error, Result};
use crate::types::MemDescType;
use smallvec::{smallvec, SmallVec};

/// Base address and logical offsets of a shared-memory view.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SharedMemoryObject {
    /// Byte address of the view's allocation
    pub base: u64,
    /// Element type addressed through `base`
    pub dtype: DType,
    /// Logical offset of the view along each axis
    pub offsets: SmallVec<[i64; 4]>,
}

impl SharedMemoryObject {
    /// A view of a whole allocation at `base`.
    pub fn new(base: u64, dtype: DType, rank: usize) -> Self {
        Self {
            base,
            dtype,
            offsets: smallvec![0; rank],
        }
    }

    /// Number of axes
    #[inline]
    pub fn rank(&self) -> usize {
        self.offsets.len()
    }

    /// Select `index` along the leading axis of the source.
    ///
    /// The base moves by `index` times the size of one `dst` slice; the
    /// trailing `dst.rank()` offsets are kept.
    pub fn index(&self, ctx: &LayoutContext, dst: &MemDescType, index: i64) -> Result<Self> {
        if dst.rank() > self.rank() {
            return Err(Error::InvalidArgument {
                arg: "dst",
                reason: format!("cannot index a rank {} view into rank {}", self.rank(), dst.rank()),
            });
        }
        // Make sure the destination layout is well formed before using it.
        ctx.memdesc_layout(dst)?;

        let stride: i64 = alloc_shape_per_cta(&dst.encoding, &dst.shape).iter().product();
        let mut offset = index * stride;
        if let Encoding::PaddedShared(padded) = &dst.encoding {
            offset = padded.padded_offset(offset);
        }
        let bits = offset * i64::from(self.dtype.bit_width());
        if bits % 8 != 0 || bits < 0 {
            return Err(Error::InvalidArgument {
                arg: "index",
                reason: format!("index {index} lands inside a byte of {} elements", self.dtype),
            });
        }
        tracing::trace!("memdesc index {} advances the base by {} bytes", index, bits / 8);
        Ok(Self {
            base: self.base + (bits / 8) as u64,
            dtype: self.dtype,
            offsets: self.offsets[self.rank() - dst.rank()..].iter().copied().collect(),
        })
    }

    /// Sub-view starting at `offsets` within the current view.
    pub fn subslice(&self, offsets: &[i64]) -> Result<Self> {
        if offsets.len() != self.rank() {
            return Err(Error::InvalidArgument {
                arg: "offsets",
                reason: format!("{} offsets for a rank {} view", offsets.len(), self.rank()),
            });
        }
        Ok(Self {
            base: self.base,
            dtype: self.dtype,
            offsets: self.offsets.iter().zip(offsets).map(|(a, b)| a + b).collect(),
        })
    }

    /// Reinterpret the allocation as `dst`: same base, new element type,
    /// offsets reset.
    pub fn reinterpret(&self, dst: &MemDescType) -> Self {
        Self::new(self.base, dst.dtype, dst.rank())
    }

    /// Permute the axes: axis `i` of the result is axis `order[i]` here.
    pub fn trans(&self, order: &[u32]) -> Result<Self> {
        let mut seen = vec![false; self.rank()];
        let offsets = order
            .iter()
            .map(|&o| match seen.get_mut(o as usize) {
                Some(s) if !*s => {
                    *s = true;
                    Ok(self.offsets[o as usize])
                }
                _ => Err(Error::InvalidArgument {
                    arg: "order",
                    reason: format!("{order:?} is not a permutation of 0..{}", self.rank()),
                }),
            })
            .collect::<Result<SmallVec<[i64; 4]>>>()?;
        if offsets.len() != self.rank() {
            return Err(Error::InvalidArgument {
                arg: "order",
                reason: format!("{order:?} is not a permutation of 0..{}", self.rank()),
            });
        }
        Ok(Self {
            base: self.base,
            dtype: self.dtype,
            offsets,
        })
    }

    /// Reshape from `src_shape` to `dst_shape`, carrying the offsets over
    /// through their row-major linear position.
    pub fn reshape(&self, src_shape: &[i64], dst_shape: &[i64]) -> Result<Self> {
        if src_shape.len() != self.rank() {
            return Err(Error::InvalidArgument {
                arg: "src_shape",
                reason: format!("shape {src_shape:?} for a rank {} view", self.rank()),
            });
        }
        let numel = |s: &[i64]| s.iter().product::<i64>();
        if numel(src_shape) != numel(dst_shape) || dst_shape.iter().any(|&d| d <= 0) {
            return Err(Error::shape_mismatch(src_shape, dst_shape));
        }
        let linear = self
            .offsets
            .iter()
            .zip(src_shape)
            .fold(0, |acc, (&off, &size)| acc * size + off);

        let mut offsets: SmallVec<[i64; 4]> = smallvec![0; dst_shape.len()];
        let mut rest = linear;
        for (off, &size) in offsets.iter_mut().zip(dst_shape).rev() {
            *off = rest % size;
            rest /= size;
        }
        Ok(Self {
            base: self.base,
            dtype: self.dtype,
            offsets,
        })
    }
}

/// Per-CTA extent of an allocation of `shape`, in elements.
///
/// FP4 data padded for `mma` takes two slots per packed element along its
/// contiguous axis.
pub fn alloc_shape_per_cta(encoding: &Encoding, shape: &[i64]) -> Vec<i64> {
    let mut shape = shape.to_vec();
    if let Encoding::NvmmaShared(nvmma) = encoding {
        let rank = shape.len();
        if nvmma.fp4_padded && rank >= 2 {
            let packed = if nvmma.transposed { rank - 2 } else { rank - 1 };
            shape[packed] *= 2;
        }
    }
    encoding.cta_layout().shape_per_cta(&shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use crate::encoding::{CtaLayout, NvmmaSharedEncoding, PaddedSharedEncoding, SwizzledSharedEncoding};

    fn ctx() -> LayoutContext {
        LayoutContext::new(TargetConfig::NVIDIA).unwrap()
    }

    fn swizzled(rank: usize) -> SwizzledSharedEncoding {
        let order: Vec<u32> = (0..rank as u32).rev().collect();
        SwizzledSharedEncoding::new(1, 1, 1, &order, CtaLayout::single(rank)).unwrap()
    }

    #[test]
    fn test_index_moves_base_by_slice() {
        let obj = SharedMemoryObject::new(0x1000, DType::F16, 3).subslice(&[0, 16, 8]).unwrap();
        let dst = MemDescType::with_alloc_shape(&[32, 64], &[4, 32, 64], swizzled(2), DType::F16)
            .unwrap();
        let view = obj.index(&ctx(), &dst, 2).unwrap();
        assert_eq!(view.base, 0x1000 + 2 * 32 * 64 * 2);
        assert_eq!(view.offsets.as_slice(), &[16, 8]);
    }

    #[test]
    fn test_index_applies_padding() {
        let padded = PaddedSharedEncoding::new(&[64], &[4], &[1, 0], CtaLayout::single(2)).unwrap();
        let dst = MemDescType::new(&[16, 64], padded, DType::F32).unwrap();
        let obj = SharedMemoryObject::new(0, DType::F32, 3);
        let view = obj.index(&ctx(), &dst, 1).unwrap();
        // 1024 elements plus 4 padding elements every 64
        assert_eq!(view.base, (1024 + 64) * 4);
    }

    #[test]
    fn test_index_of_padded_fp4() {
        let nvmma = NvmmaSharedEncoding::new(128, false, 8, true, CtaLayout::single(2)).unwrap();
        assert_eq!(alloc_shape_per_cta(&nvmma.clone().into(), &[64, 64]), vec![64, 128]);
        let transposed = NvmmaSharedEncoding::new(128, true, 8, true, CtaLayout::single(2)).unwrap();
        assert_eq!(alloc_shape_per_cta(&transposed.into(), &[64, 64]), vec![128, 64]);
    }

    #[test]
    fn test_subslice_reinterpret_trans() {
        let obj = SharedMemoryObject::new(256, DType::F32, 2);
        let obj = obj.subslice(&[4, 8]).unwrap().subslice(&[1, 2]).unwrap();
        assert_eq!(obj.offsets.as_slice(), &[5, 10]);
        assert_eq!(obj.trans(&[1, 0]).unwrap().offsets.as_slice(), &[10, 5]);
        assert!(obj.trans(&[0, 0]).is_err());
        assert!(obj.subslice(&[1]).is_err());

        let dst = MemDescType::new(&[32, 64], swizzled(2), DType::BF16).unwrap();
        let re = obj.reinterpret(&dst);
        assert_eq!((re.base, re.dtype), (256, DType::BF16));
        assert_eq!(re.offsets.as_slice(), &[0, 0]);
    }

    #[test]
    fn test_reshape_is_row_major() {
        let obj = SharedMemoryObject::new(0, DType::F16, 2).subslice(&[3, 5]).unwrap();
        // linear offset 3 * 16 + 5 = 53 = 1 * 32 + 2 * 8 + 5
        let view = obj.reshape(&[8, 16], &[4, 4, 8]).unwrap();
        assert_eq!(view.offsets.as_slice(), &[1, 2, 5]);
        assert!(obj.reshape(&[8, 16], &[4, 4]).is_err());
    }
}
