//! Lowering rules for tensor shape operations
//!
//! Each rule takes the per-thread values of its operands, ordered by the
//! `register` index of the operand's layout, and returns the per-thread
//! values of the result in the result's register order. No rule moves data
//! between threads: the operations handled here keep the `lane`, `warp` and
//! `block` assignment of every element and only regroup registers.
//!
//! Memory-resident tensors are not unpacked at all; [`memdesc`] rewrites
//! the base address and logical offsets of a [`SharedMemoryObject`].
//!
//! Failures split the same way as everywhere else in the crate (see
//! [`Error::is_fatal`](crate::error::Error::is_fatal)): a value that could not
//! have come from a valid operand is an internal error, an operation this
//! crate cannot lower without cross-thread movement is recoverable.

pub mod memdesc;
mod offsets;
pub mod register;

pub use memdesc::{alloc_shape_per_cta, SharedMemoryObject};
pub use offsets::{emit_offset_for_layout, emit_offsets, Offset};
pub use register::{
    broadcast, cat, constant_array, expand_dims, is_expensive_view, join, reshape, splat, split,
    trans, unsplat,
};
