//! Tensor encodings and their linear layouts
//!
//! An [`Encoding`] describes how a tensor is spread over the execution
//! hierarchy (distributed encodings) or laid out in shared memory (shared
//! encodings). Every variant has exactly one constructor turning it into a
//! [`LinearLayout`] for a given shape.
//!
//! Distributed layouts have input dimensions `register`, `lane`, `warp` and
//! `block`; shared layouts have `offset` and `block`. Output dimensions are
//! always `dim0..dim{rank-1}`.

mod amd;
mod blocked;
mod cta;
mod dot_operand;
mod nvidia;
mod shared;
mod slice;
pub mod tmem;

pub use amd::{
    choose_ds_read_b64_tr_layout, choose_mfma_like_store_layout, choose_scaled_mfma_scale_layout,
    AmdMfmaEncoding, AmdWmmaEncoding,
};
pub use blocked::BlockedEncoding;
pub use cta::{combine_cta_cga_with_shape, CtaLayout};
pub use dot_operand::DotOperandEncoding;
pub use nvidia::{nvidia_mma_tile, NvidiaMmaEncoding, NvidiaMmaVersion};
pub use shared::{
    choose_shared_layout_for_reg_to_reg_conversion, nvmma_shared_to_linear_layout, tma_block_shape,
    AmdRotatingSharedEncoding, NvmmaSharedEncoding, PaddedSharedEncoding, SwizzledSharedEncoding,
};
pub use slice::SliceEncoding;

use crate::error::{Error, Result};
use crate::layout::{Dim, LinearLayout};
use smallvec::SmallVec;

/// Stack allocation threshold for per-axis parameters
pub(crate) const STACK_DIMS: usize = 4;

/// Per-axis encoding parameters (sizes, counts, orders).
pub type Dims = SmallVec<[u32; STACK_DIMS]>;

/// Builds the linear layout of one encoding variant.
pub trait ToLinearLayout {
    /// The layout of a tensor of `shape`.
    ///
    /// For shared encodings `shape` is the allocation shape.
    fn to_linear_layout(&self, shape: &[i64]) -> Result<LinearLayout>;
}

/// A tensor encoding.
///
/// Encodings are immutable values compared and hashed structurally, so two
/// separately built but equal encodings share a cache entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Encoding {
    /// Plain tiling over registers, lanes and warps
    Blocked(BlockedEncoding),
    /// Accumulator of an NVIDIA `mma` / `wgmma` instruction
    NvidiaMma(NvidiaMmaEncoding),
    /// Accumulator of an AMD `mfma` instruction
    AmdMfma(AmdMfmaEncoding),
    /// Accumulator of an AMD `wmma` instruction
    AmdWmma(AmdWmmaEncoding),
    /// Operand A or B of a dot whose result has the parent encoding
    DotOperand(DotOperandEncoding),
    /// Parent encoding with one axis reduced away
    Slice(SliceEncoding),
    /// Shared memory with XOR swizzling of vectors
    SwizzledShared(SwizzledSharedEncoding),
    /// Shared memory in the NVIDIA TMA / `wgmma` swizzle format
    NvmmaShared(NvmmaSharedEncoding),
    /// Shared memory with AMD rotating swizzling
    AmdRotatingShared(AmdRotatingSharedEncoding),
    /// Unswizzled shared memory with padding inserted at fixed intervals
    PaddedShared(PaddedSharedEncoding),
}

impl Encoding {
    /// Whether the encoding describes memory rather than registers.
    pub fn is_shared(&self) -> bool {
        matches!(
            self,
            Self::SwizzledShared(_)
                | Self::NvmmaShared(_)
                | Self::AmdRotatingShared(_)
                | Self::PaddedShared(_)
        )
    }

    /// Whether the encoding distributes the tensor over threads.
    pub fn is_distributed(&self) -> bool {
        !self.is_shared()
    }

    /// Short variant name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Blocked(_) => "blocked",
            Self::NvidiaMma(_) => "nvidia_mma",
            Self::AmdMfma(_) => "amd_mfma",
            Self::AmdWmma(_) => "amd_wmma",
            Self::DotOperand(_) => "dot_operand",
            Self::Slice(_) => "slice",
            Self::SwizzledShared(_) => "swizzled_shared",
            Self::NvmmaShared(_) => "nvmma_shared",
            Self::AmdRotatingShared(_) => "amd_rotating_shared",
            Self::PaddedShared(_) => "padded_shared",
        }
    }

    /// Number of tensor axes the encoding describes.
    pub fn rank(&self) -> usize {
        match self {
            Self::Slice(s) => s.parent.rank().saturating_sub(1),
            Self::DotOperand(d) => d.parent.rank(),
            other => other.own_cta_layout().map_or(0, CtaLayout::rank),
        }
    }

    fn own_cta_layout(&self) -> Option<&CtaLayout> {
        match self {
            Self::Blocked(e) => Some(&e.cta_layout),
            Self::NvidiaMma(e) => Some(&e.cta_layout),
            Self::AmdMfma(e) => Some(&e.cta_layout),
            Self::AmdWmma(e) => Some(&e.cta_layout),
            Self::SwizzledShared(e) => Some(&e.cta_layout),
            Self::NvmmaShared(e) => Some(&e.cta_layout),
            Self::AmdRotatingShared(e) => Some(&e.cta_layout),
            Self::PaddedShared(e) => Some(&e.cta_layout),
            Self::DotOperand(_) | Self::Slice(_) => None,
        }
    }

    /// Distribution over the CTAs of a cluster.
    ///
    /// Dot operands never split the K axis; slices drop the sliced axis.
    pub fn cta_layout(&self) -> CtaLayout {
        match self {
            Self::DotOperand(d) => d.cta_layout(),
            Self::Slice(s) => s.cta_layout(),
            other => other
                .own_cta_layout()
                .cloned()
                .unwrap_or_else(|| CtaLayout::single(0)),
        }
    }

    /// Check structural consistency, recursing into parents.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Blocked(e) => e.validate(),
            Self::NvidiaMma(e) => e.validate(),
            Self::AmdMfma(e) => e.validate(),
            Self::AmdWmma(e) => e.validate(),
            Self::DotOperand(e) => e.validate(),
            Self::Slice(e) => e.validate(),
            Self::SwizzledShared(e) => e.validate(),
            Self::NvmmaShared(e) => e.validate(),
            Self::AmdRotatingShared(e) => e.validate(),
            Self::PaddedShared(e) => e.validate(),
        }
    }

    /// Build the layout of a tensor of `shape`.
    ///
    /// Distributed encodings take an empty `alloc_shape`. Shared encodings
    /// need one whose trailing `shape.len()` entries are powers of two at
    /// least as large as `shape`; the layout is built over those entries.
    pub fn to_linear_layout(&self, shape: &[i64], alloc_shape: &[i64]) -> Result<LinearLayout> {
        if self.is_distributed() {
            if !alloc_shape.is_empty() {
                return Err(Error::InvalidArgument {
                    arg: "alloc_shape",
                    reason: format!("allocation shape not supported for {} layout", self.kind()),
                });
            }
            return self.build(shape);
        }

        if alloc_shape.len() < shape.len() {
            return Err(Error::InvalidArgument {
                arg: "alloc_shape",
                reason: format!(
                    "allocation shape {alloc_shape:?} has fewer axes than shape {shape:?}"
                ),
            });
        }
        let alloc = &alloc_shape[alloc_shape.len() - shape.len()..];
        if let Some(&bad) = alloc.iter().find(|&&d| d < 1 || !(d as u64).is_power_of_two()) {
            return Err(Error::not_power_of_two("allocation shape dimension", bad));
        }
        if alloc.iter().zip(shape).any(|(a, s)| a < s) {
            return Err(Error::InvalidArgument {
                arg: "alloc_shape",
                reason: format!(
                    "allocationShape must be at least as large as shape ({alloc:?} < {shape:?})"
                ),
            });
        }
        self.build(alloc)
    }

    /// Dispatch to the variant constructor.
    pub(crate) fn build(&self, shape: &[i64]) -> Result<LinearLayout> {
        let rank = self.rank();
        if rank != shape.len() {
            return Err(Error::InvalidArgument {
                arg: "shape",
                reason: format!(
                    "{} encoding has rank {rank} but shape {shape:?} has rank {}",
                    self.kind(),
                    shape.len()
                ),
            });
        }
        match self {
            Self::Blocked(e) => e.to_linear_layout(shape),
            Self::NvidiaMma(e) => e.to_linear_layout(shape),
            Self::AmdMfma(e) => e.to_linear_layout(shape),
            Self::AmdWmma(e) => e.to_linear_layout(shape),
            Self::DotOperand(e) => e.to_linear_layout(shape),
            Self::Slice(e) => e.to_linear_layout(shape),
            Self::SwizzledShared(e) => e.to_linear_layout(shape),
            Self::NvmmaShared(e) => e.to_linear_layout(shape),
            Self::AmdRotatingShared(e) => e.to_linear_layout(shape),
            Self::PaddedShared(e) => e.to_linear_layout(shape),
        }
    }

    /// Elements one thread owns for a tensor of `shape`.
    pub fn elems_per_thread(&self, shape: &[i64]) -> Result<usize> {
        if self.is_shared() {
            return Err(Error::invalid_encoding(format!(
                "{} layout is not distributed over threads",
                self.kind()
            )));
        }
        Ok(self.build(shape)?.in_dim_size(&Dim::REGISTER) as usize)
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Encoding {
                fn from(e: $ty) -> Self {
                    Self::$variant(e)
                }
            }
        )*
    };
}

impl_from_variant!(
    Blocked(BlockedEncoding),
    NvidiaMma(NvidiaMmaEncoding),
    AmdMfma(AmdMfmaEncoding),
    AmdWmma(AmdWmmaEncoding),
    DotOperand(DotOperandEncoding),
    Slice(SliceEncoding),
    SwizzledShared(SwizzledSharedEncoding),
    NvmmaShared(NvmmaSharedEncoding),
    AmdRotatingShared(AmdRotatingSharedEncoding),
    PaddedShared(PaddedSharedEncoding),
);

// ============================================================================
// Parameter validation
// ============================================================================

pub(crate) fn check_powers_of_two(values: &[u32], what: &'static str) -> Result<()> {
    match values.iter().find(|v| !v.is_power_of_two()) {
        Some(&v) => Err(Error::not_power_of_two(what, v)),
        None => Ok(()),
    }
}

pub(crate) fn check_order(order: &[u32], rank: usize, what: &'static str) -> Result<()> {
    let mut seen = vec![false; rank];
    if order.len() != rank {
        return Err(Error::invalid_encoding(format!(
            "{what} {order:?} is not a permutation of 0..{rank}"
        )));
    }
    for &o in order {
        match seen.get_mut(o as usize) {
            Some(s) if !*s => *s = true,
            _ => {
                return Err(Error::invalid_encoding(format!(
                    "{what} {order:?} is not a permutation of 0..{rank}"
                )))
            }
        }
    }
    Ok(())
}

pub(crate) fn check_rank(values: &[u32], rank: usize, what: &'static str) -> Result<()> {
    if values.len() != rank {
        return Err(Error::invalid_encoding(format!(
            "{what} {values:?} has rank {}, expected {rank}",
            values.len()
        )));
    }
    Ok(())
}
