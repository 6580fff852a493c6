//! Logical coordinates of the values a thread owns

use crate::context::LayoutContext;
use crate::error::Result;
use crate::layout::{Dim, LinearLayout};
use crate::types::TensorType;
use smallvec::{smallvec, SmallVec};

/// Logical coordinate of one value, one entry per tensor axis
pub type Offset = SmallVec<[i32; 4]>;

/// Coordinate of every register of thread 0 (lane, warp and block all 0).
///
/// Other threads hold the same list XOR-ed with their own thread offset,
/// so these are the offsets every lowering rule reasons about.
pub fn emit_offset_for_layout(layout: &LinearLayout) -> Result<Vec<Offset>> {
    if !layout.has_in_dim(&Dim::REGISTER) {
        return Ok(vec![smallvec![0; layout.num_out_dims()]]);
    }
    (0..layout.in_dim_size(&Dim::REGISTER))
        .map(|reg| layout.apply_raw([(&Dim::REGISTER, reg)]))
        .collect()
}

/// [`emit_offset_for_layout`] of a tensor's cached layout
pub fn emit_offsets(ctx: &LayoutContext, ty: &TensorType) -> Result<Vec<Offset>> {
    emit_offset_for_layout(&*ctx.tensor_layout(ty)?)
}
