//! Register-resident view operations
//!
//! Broadcast, splat, constants, concatenation, join/split, reshape,
//! expand-dims and transpose, expressed as permutations of a thread's
//! value sequence.

use super::offsets::{emit_offset_for_layout, Offset};
use crate::context::LayoutContext;
use crate::encoding::Encoding;
use crate::error::{Error, Result};
use crate::layout::{transpose_linear_layout, Dim, LinearLayout};
use crate::types::TensorType;
use std::collections::HashMap;

fn check_len<T>(vals: &[T], expected: usize, what: &str) -> Result<()> {
    if vals.len() != expected {
        return Err(Error::Internal(format!(
            "{what} has {} values but its layout gives each thread {expected}",
            vals.len()
        )));
    }
    Ok(())
}

fn value_map<'a, T>(offsets: Vec<Offset>, vals: &'a [T]) -> HashMap<Offset, &'a T> {
    offsets.into_iter().zip(vals).collect()
}

fn lookup<T: Clone>(map: &HashMap<Offset, &T>, offset: &Offset, op: &str) -> Result<T> {
    map.get(offset)
        .map(|&v| v.clone())
        .ok_or_else(|| Error::Internal(format!("{op}: no source value at offset {offset:?}")))
}

// ============================================================================
// Splat and constants
// ============================================================================

/// Every value of the result is `value`.
pub fn splat<T: Clone>(ctx: &LayoutContext, dst: &TensorType, value: T) -> Result<Vec<T>> {
    let n = ctx.elems_per_thread(dst)?;
    Ok(vec![value; n])
}

/// The single value of a one-element tensor.
pub fn unsplat<T: Clone>(vals: &[T]) -> Result<T> {
    vals.first()
        .cloned()
        .ok_or_else(|| Error::Internal("unsplat of a thread with no values".into()))
}

/// Use `values` as the per-thread values of `dst` directly.
///
/// Only arrays with exactly one value per owned element are supported.
pub fn constant_array<T>(ctx: &LayoutContext, dst: &TensorType, values: Vec<T>) -> Result<Vec<T>> {
    let expected = ctx.elems_per_thread(dst)?;
    if values.len() != expected {
        tracing::warn!(
            "constant array of {} values for a {} tensor owning {} per thread",
            values.len(),
            dst.encoding.kind(),
            expected
        );
        return Err(Error::ConstantSizeMismatch {
            expected,
            got: values.len(),
        });
    }
    Ok(values)
}

// ============================================================================
// Broadcast and expand_dims
// ============================================================================

/// Broadcast size-1 axes of `src` to the shape of `dst`.
pub fn broadcast<T: Clone>(
    ctx: &LayoutContext,
    src: &TensorType,
    dst: &TensorType,
    vals: &[T],
) -> Result<Vec<T>> {
    if src.rank() != dst.rank() {
        return Err(Error::InvalidArgument {
            arg: "dst",
            reason: format!("broadcast from rank {} to rank {}", src.rank(), dst.rank()),
        });
    }
    let src_offsets = emit_offset_for_layout(&*ctx.tensor_layout(src)?)?;
    check_len(vals, src_offsets.len(), "broadcast source")?;
    let map = value_map(src_offsets, vals);

    let broadcast_axes: Vec<usize> = (0..src.rank()).filter(|&i| src.shape[i] == 1).collect();
    let ret = emit_offset_for_layout(&*ctx.tensor_layout(dst)?)?
        .into_iter()
        .map(|mut offset| {
            for &axis in &broadcast_axes {
                offset[axis] = 0;
            }
            lookup(&map, &offset, "broadcast")
        })
        .collect::<Result<Vec<T>>>()?;
    tracing::trace!(
        "broadcast {:?} -> {:?}: {} -> {} values",
        src.shape,
        dst.shape,
        vals.len(),
        ret.len()
    );
    Ok(ret)
}

/// Insert a size-1 axis into a tensor whose encoding is a slice along it.
pub fn expand_dims<T: Clone>(
    ctx: &LayoutContext,
    src: &TensorType,
    dst: &TensorType,
    vals: &[T],
) -> Result<Vec<T>> {
    let Encoding::Slice(slice) = &src.encoding else {
        tracing::warn!("expand_dims of a {} tensor", src.encoding.kind());
        return Err(Error::unsupported(
            "expand_dims",
            format!("source must have a slice encoding, got {}", src.encoding.kind()),
        ));
    };
    let axis = slice.dim as usize;
    if dst.rank() != src.rank() + 1 || dst.shape.get(axis) != Some(&1) {
        return Err(Error::InvalidArgument {
            arg: "dst",
            reason: format!(
                "expand_dims of {:?} along {axis} cannot produce {:?}",
                src.shape, dst.shape
            ),
        });
    }
    let src_offsets = emit_offset_for_layout(&*ctx.tensor_layout(src)?)?;
    check_len(vals, src_offsets.len(), "expand_dims source")?;
    let map = value_map(src_offsets, vals);

    emit_offset_for_layout(&*ctx.tensor_layout(dst)?)?
        .into_iter()
        .map(|mut offset| {
            offset.remove(axis);
            lookup(&map, &offset, "expand_dims")
        })
        .collect()
}

// ============================================================================
// Cat, join and split
// ============================================================================

/// Concatenate two operands: all of `lhs`'s values, then all of `rhs`'s.
pub fn cat<T: Clone>(lhs: &[T], rhs: &[T]) -> Vec<T> {
    let mut ret = Vec::with_capacity(lhs.len() + rhs.len());
    ret.extend_from_slice(lhs);
    ret.extend_from_slice(rhs);
    ret
}

/// Number of consecutive registers before the last axis of `layout` steps
/// by one.
fn contiguous_run(layout: &LinearLayout, op: &str) -> Result<usize> {
    let rank = layout.num_out_dims();
    let axis = layout.out_dim_index(&Dim::out(rank.saturating_sub(1)))?;
    let regs = layout.in_dim_bases(&Dim::REGISTER)?;
    regs.iter()
        .position(|basis| basis[axis] == 1)
        .map(|bit| 1 << bit)
        .ok_or_else(|| {
            Error::Internal(format!("{op}: last axis is not distributed along registers"))
        })
}

/// Join `lhs` and `rhs` along a new trailing axis of size 2.
///
/// The trailing axis of `dst` is held in registers: runs of `r` registers
/// of `lhs` alternate with runs of `r` registers of `rhs`, where `r` is the
/// number of registers before the register bit that selects the half.
pub fn join<T: Clone>(ctx: &LayoutContext, dst: &TensorType, lhs: &[T], rhs: &[T]) -> Result<Vec<T>> {
    let layout = ctx.tensor_layout(dst)?;
    let run = contiguous_run(&layout, "join")?;
    if lhs.len() != rhs.len() || lhs.len() % run != 0 {
        return Err(Error::Internal(format!(
            "join of {} and {} values in runs of {run}",
            lhs.len(),
            rhs.len()
        )));
    }
    check_len(lhs, layout.in_dim_size(&Dim::REGISTER) as usize / 2, "join operand")?;
    tracing::trace!("join {} + {} values in runs of {}", lhs.len(), rhs.len(), run);

    let mut ret = Vec::with_capacity(lhs.len() * 2);
    for (l, r) in lhs.chunks(run).zip(rhs.chunks(run)) {
        ret.extend_from_slice(l);
        ret.extend_from_slice(r);
    }
    Ok(ret)
}

/// Split `src` along its trailing axis of size 2; inverse of [`join`].
pub fn split<T: Clone>(ctx: &LayoutContext, src: &TensorType, vals: &[T]) -> Result<(Vec<T>, Vec<T>)> {
    let layout = ctx.tensor_layout(src)?;
    let run = contiguous_run(&layout, "split")?;
    check_len(vals, layout.in_dim_size(&Dim::REGISTER) as usize, "split source")?;
    if vals.len() % (2 * run) != 0 {
        return Err(Error::Internal(format!(
            "split of {} values in runs of {run}",
            vals.len()
        )));
    }
    tracing::trace!("split {} values in runs of {}", vals.len(), run);

    let mut lhs = Vec::with_capacity(vals.len() / 2);
    let mut rhs = Vec::with_capacity(vals.len() / 2);
    for chunk in vals.chunks(2 * run) {
        let (l, r) = chunk.split_at(run);
        lhs.extend_from_slice(l);
        rhs.extend_from_slice(r);
    }
    Ok((lhs, rhs))
}

// ============================================================================
// Views: reshape and trans
// ============================================================================

/// Whether reinterpreting `src` as `dst` needs data movement between or
/// within threads.
///
/// The view is cheap when both layouts replicate along the same input bits
/// and give every thread the same number of values.
pub fn is_expensive_view(ctx: &LayoutContext, src: &TensorType, dst: &TensorType) -> Result<bool> {
    let src_layout = ctx.tensor_layout(src)?;
    let dst_layout = ctx.tensor_layout(dst)?;
    let dst_masks = dst_layout.free_variable_masks()?;
    for (dim, mask) in src_layout.free_variable_masks()? {
        let other = dst_masks
            .iter()
            .find(|(d, _)| *d == dim)
            .map_or(0, |(_, m)| *m);
        if mask != other {
            return Ok(true);
        }
    }
    Ok(src_layout.in_dim_size(&Dim::REGISTER) != dst_layout.in_dim_size(&Dim::REGISTER))
}

/// Reshape without moving data; the values keep their register order.
pub fn reshape<T>(ctx: &LayoutContext, src: &TensorType, dst: &TensorType, vals: Vec<T>) -> Result<Vec<T>> {
    if src.numel() != dst.numel() {
        return Err(Error::shape_mismatch(&src.shape, &dst.shape));
    }
    if is_expensive_view(ctx, src, dst)? {
        tracing::warn!(
            "rejecting reshape {:?} ({}) -> {:?} ({})",
            src.shape,
            src.encoding.kind(),
            dst.shape,
            dst.encoding.kind()
        );
        return Err(Error::ExpensiveView { op: "reshape" });
    }
    check_len(&vals, ctx.elems_per_thread(dst)?, "reshape source")?;
    Ok(vals)
}

/// Permute axes without moving data.
///
/// `dst`'s layout must be `src`'s with its outputs permuted by `order`
/// (`dst` axis `j` is `src` axis `order[j]`).
pub fn trans<T>(
    ctx: &LayoutContext,
    src: &TensorType,
    dst: &TensorType,
    order: &[u32],
    vals: Vec<T>,
) -> Result<Vec<T>> {
    let src_layout = ctx.tensor_layout(src)?;
    let expected = transpose_linear_layout(&src_layout, order)?;
    let dst_layout = ctx.tensor_layout(dst)?;
    if !expected.equivalent(&dst_layout) {
        tracing::warn!(
            "rejecting trans {:?} of a {} tensor: result layout differs",
            order,
            src.encoding.kind()
        );
        return Err(Error::ExpensiveView { op: "trans" });
    }
    check_len(&vals, src_layout.in_dim_size(&Dim::REGISTER) as usize, "trans source")?;
    Ok(vals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use crate::dtype::DType;
    use crate::encoding::{BlockedEncoding, CtaLayout, SliceEncoding};

    fn ctx() -> LayoutContext {
        LayoutContext::new(TargetConfig::NVIDIA).unwrap()
    }

    fn blocked(spt: &[u32], tpw: &[u32], wpc: &[u32], order: &[u32]) -> BlockedEncoding {
        BlockedEncoding::new(spt, tpw, wpc, order, CtaLayout::single(spt.len())).unwrap()
    }

    fn tensor(shape: &[i64], enc: impl Into<Encoding>) -> TensorType {
        TensorType::new(shape, enc, DType::F32).unwrap()
    }

    #[test]
    fn test_splat_and_unsplat() {
        let ty = tensor(&[32, 32], blocked(&[2, 2], &[4, 8], &[4, 1], &[1, 0]));
        let vals = splat(&ctx(), &ty, 7u8).unwrap();
        assert_eq!(vals, vec![7u8; 8]);
        assert_eq!(unsplat(&vals).unwrap(), 7);
        assert!(unsplat::<u8>(&[]).is_err());
    }

    #[test]
    fn test_constant_array_size() {
        let ty = tensor(&[32, 32], blocked(&[2, 2], &[4, 8], &[4, 1], &[1, 0]));
        assert_eq!(constant_array(&ctx(), &ty, (0..8).collect()).unwrap().len(), 8);
        let err = constant_array(&ctx(), &ty, vec![0; 4]).unwrap_err();
        assert_eq!(err, Error::ConstantSizeMismatch { expected: 8, got: 4 });
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_broadcast_columns() {
        let ctx = ctx();
        // [16, 1] -> [16, 32]: the one value of a row fills the row's registers
        let src = tensor(&[16, 1], blocked(&[1, 1], &[4, 8], &[4, 1], &[1, 0]));
        let dst = tensor(&[16, 32], blocked(&[1, 4], &[4, 8], &[4, 1], &[1, 0]));
        assert_eq!(ctx.elems_per_thread(&src).unwrap(), 1);
        let out = broadcast(&ctx, &src, &dst, &[42]).unwrap();
        assert_eq!(out, vec![42; 4]);
    }

    #[test]
    fn test_cat_keeps_operand_order() {
        assert_eq!(cat(&[1, 2], &[3, 4, 5]), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_join_interleaves_runs() {
        // register bit 0 walks the joined axis
        let dst = tensor(&[16, 16, 2], blocked(&[1, 2, 2], &[4, 8, 1], &[4, 1, 1], &[2, 1, 0]));
        let ctx = ctx();
        let lhs = [0, 1];
        let rhs = [10, 11];
        let joined = join(&ctx, &dst, &lhs, &rhs).unwrap();
        assert_eq!(joined, vec![0, 10, 1, 11]);
        let (l, r) = split(&ctx, &dst, &joined).unwrap();
        assert_eq!((l, r), (lhs.to_vec(), rhs.to_vec()));
    }

    #[test]
    fn test_join_with_longer_run() {
        // order [1, 2, 0]: register bits walk dim1 first, then the joined axis
        let dst = tensor(&[16, 32, 2], blocked(&[1, 2, 2], &[4, 8, 1], &[4, 1, 1], &[1, 2, 0]));
        let ctx = ctx();
        let lhs = [0, 1, 2, 3];
        let rhs = [10, 11, 12, 13];
        let joined = join(&ctx, &dst, &lhs, &rhs).unwrap();
        assert_eq!(joined, vec![0, 1, 10, 11, 2, 3, 12, 13]);
    }

    #[test]
    fn test_expand_dims_requires_slice() {
        let ctx = ctx();
        let parent = blocked(&[1, 4], &[4, 8], &[4, 1], &[1, 0]);
        let sliced = SliceEncoding::new(0, parent.clone()).unwrap();
        let src = tensor(&[32], sliced);
        let dst = tensor(&[1, 32], parent.clone());
        let vals = [1, 2, 3, 4];
        assert_eq!(expand_dims(&ctx, &src, &dst, &vals).unwrap(), vals.to_vec());

        let plain = tensor(&[32], blocked(&[4], &[32], &[4], &[0]));
        let err = expand_dims(&ctx, &plain, &dst, &vals).unwrap_err();
        assert!(matches!(err, Error::Unsupported { op: "expand_dims", .. }));
    }

    #[test]
    fn test_reshape_within_thread_is_free() {
        let ctx = ctx();
        let src = tensor(&[32, 32], blocked(&[1, 4], &[4, 8], &[4, 1], &[1, 0]));
        let dst = tensor(&[1024], blocked(&[4], &[32], &[4], &[0]));
        assert!(!is_expensive_view(&ctx, &src, &dst).unwrap());
        let vals: Vec<i32> = (0..8).collect();
        assert_eq!(reshape(&ctx, &src, &dst, vals.clone()).unwrap(), vals);
    }

    #[test]
    fn test_reshape_with_different_replication_is_expensive() {
        let ctx = ctx();
        // 4 warps over 16 rows, 8 of which exist: warp bit 1 replicates
        let src = tensor(&[8, 32], blocked(&[1, 1], &[4, 8], &[4, 1], &[1, 0]));
        let dst = tensor(&[256], blocked(&[1], &[32], &[4], &[0]));
        assert!(is_expensive_view(&ctx, &src, &dst).unwrap());
        let err = reshape(&ctx, &src, &dst, vec![0; 1]).unwrap_err();
        assert_eq!(err, Error::ExpensiveView { op: "reshape" });
    }

    #[test]
    fn test_trans_of_matching_layout() {
        let ctx = ctx();
        let src = tensor(&[32, 16], blocked(&[4, 1], &[8, 4], &[1, 4], &[0, 1]));
        let dst = tensor(&[16, 32], blocked(&[1, 4], &[4, 8], &[4, 1], &[1, 0]));
        let vals: Vec<i32> = (0..4).collect();
        assert_eq!(trans(&ctx, &src, &dst, &[1, 0], vals.clone()).unwrap(), vals);

        let other = tensor(&[16, 32], blocked(&[4, 1], &[8, 4], &[1, 4], &[0, 1]));
        assert!(matches!(
            trans(&ctx, &src, &other, &[1, 0], vals),
            Err(Error::ExpensiveView { op: "trans" })
        ));
    }
}
