//! Linear layout algebra
//!
//! [`LinearLayout`] describes where every element of a tensor lives in the
//! execution hierarchy (register, lane, warp, block) or in memory (offset).
//! The helpers in [`utils`] adapt layouts to tensor shapes and reorder them.

mod dim;
mod linear;
pub(crate) mod solve;
pub mod utils;

pub use dim::{standard_out_dim_names, Dim};
pub use linear::{supremum, Basis, InDimBases, LinearLayout};
pub use utils::{
    ensure_layout_not_larger_than, ensure_layout_not_smaller_than, identity_standard_nd,
    layout_within_block, matrix_order, order_for_dot_operand, reshape_layout,
    transpose_linear_layout,
};
