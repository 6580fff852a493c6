//! Dot operand encodings
//!
//! A dot operand layout is derived from the layout of the dot's result: the
//! operand shares the result's distribution along M (operand A) or N
//! (operand B) and spreads K according to the instruction that consumes it.

use super::amd::{mfma_dot_to_linear_layout, wmma_dot_to_linear_layout};
use super::nvidia::nvidia_dot_to_linear_layout;
use super::{combine_cta_cga_with_shape, BlockedEncoding, CtaLayout, Encoding, ToLinearLayout};
use crate::error::{Error, Result};
use crate::layout::{identity_standard_nd, standard_out_dim_names, Dim, LinearLayout};

/// Operand `op_idx` (0 = A, 1 = B) of a dot whose result has `parent`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DotOperandEncoding {
    /// 0 for the A operand, 1 for B
    pub op_idx: u32,
    /// Encoding of the dot result
    pub parent: Box<Encoding>,
    /// Consecutive K elements per thread; ignored for blocked parents
    pub k_width: u32,
}

impl DotOperandEncoding {
    /// Create a dot operand encoding, validating its parameters.
    pub fn new(op_idx: u32, parent: impl Into<Encoding>, k_width: u32) -> Result<Self> {
        let enc = Self {
            op_idx,
            parent: Box::new(parent.into()),
            k_width,
        };
        enc.validate()?;
        Ok(enc)
    }

    /// Number of tensor axes
    pub fn rank(&self) -> usize {
        self.parent.rank()
    }

    /// The K axis of this operand.
    pub fn k_dim(&self) -> usize {
        let rank = self.rank();
        if self.op_idx == 0 {
            rank.saturating_sub(1)
        } else {
            rank.saturating_sub(2)
        }
    }

    /// The parent's cluster distribution with K left unsplit.
    pub fn cta_layout(&self) -> CtaLayout {
        self.parent.cta_layout().unsplit_along(self.k_dim())
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<()> {
        if self.op_idx > 1 {
            return Err(Error::invalid_encoding(format!(
                "dot operand index must be 0 or 1, got {}",
                self.op_idx
            )));
        }
        self.parent.validate()?;
        if self.rank() < 2 {
            return Err(Error::invalid_encoding("dot operands have rank 2 or 3"));
        }
        match &*self.parent {
            Encoding::Blocked(_) => Ok(()),
            Encoding::NvidiaMma(_) | Encoding::AmdMfma(_) | Encoding::AmdWmma(_) => {
                if !self.k_width.is_power_of_two() {
                    return Err(Error::not_power_of_two("k_width", self.k_width));
                }
                Ok(())
            }
            other => Err(Error::invalid_encoding(format!(
                "{} layout cannot be the parent of a dot operand",
                other.kind()
            ))),
        }
    }
}

impl ToLinearLayout for DotOperandEncoding {
    fn to_linear_layout(&self, shape: &[i64]) -> Result<LinearLayout> {
        match &*self.parent {
            Encoding::Blocked(blocked) => fma_dot_to_linear_layout(blocked, self, shape),
            Encoding::NvidiaMma(mma) => {
                nvidia_dot_to_linear_layout(mma, self.op_idx, self.k_width, &self.cta_layout(), shape)
            }
            Encoding::AmdMfma(mfma) => mfma_dot_to_linear_layout(mfma, self.op_idx, self.k_width, shape),
            Encoding::AmdWmma(wmma) => wmma_dot_to_linear_layout(wmma, self.op_idx, self.k_width, shape),
            other => Err(Error::invalid_encoding(format!(
                "no dot operand layout for a {} parent",
                other.kind()
            ))),
        }
    }
}

/// Identity over `shape` in `order`, except that the K axis is broadcast:
/// its inputs all map to coordinate 0.
pub(crate) fn broadcasted_dot_operand_layout(
    shape: &[u32],
    order: &[u32],
    k_dim: usize,
    in_dim: Dim,
) -> Result<LinearLayout> {
    let names = standard_out_dim_names(shape.len());
    let mut ret = LinearLayout::empty();
    for &d in order {
        let d = d as usize;
        let size = *shape.get(d).ok_or_else(|| Error::InvalidArgument {
            arg: "order",
            reason: format!("axis {d} out of range for rank {}", shape.len()),
        })? as i32;
        let piece = if d == k_dim {
            LinearLayout::zeros_1d(size, in_dim.clone(), names[d].clone())?
        } else {
            LinearLayout::identity_1d(size, in_dim.clone(), names[d].clone())?
        };
        ret = ret.try_mul(&piece)?;
    }
    Ok(ret)
}

/// Operand layout for the FMA (no tensor core) dot: every thread holds the
/// whole K extent of its rows, lanes and warps are broadcast along K.
fn fma_dot_to_linear_layout(
    blocked: &BlockedEncoding,
    dot: &DotOperandEncoding,
    shape: &[i64],
) -> Result<LinearLayout> {
    let k_dim = dot.k_dim();
    let k_size = u32::try_from(shape[k_dim]).map_err(|_| Error::InvalidArgument {
        arg: "shape",
        reason: format!("K extent {} out of range", shape[k_dim]),
    })?;
    let mut thread_size = blocked.size_per_thread.to_vec();
    thread_size[k_dim] = k_size;

    let order = blocked.rep_order();
    let rep: Vec<Dim> = order.iter().map(|&d| Dim::out(d as usize)).collect();
    let regs = identity_standard_nd(Dim::REGISTER, &thread_size, order)?;
    let lanes = broadcasted_dot_operand_layout(&blocked.threads_per_warp, order, k_dim, Dim::LANE)?;
    let warps = broadcasted_dot_operand_layout(&blocked.warps_per_cta, order, k_dim, Dim::WARP)?;

    let cta = regs
        .transpose_outs(&rep)?
        .try_mul(&lanes.transpose_outs(&rep)?)?
        .try_mul(&warps.transpose_outs(&rep)?)?;
    combine_cta_cga_with_shape(cta, &dot.cta_layout(), shape)
}
