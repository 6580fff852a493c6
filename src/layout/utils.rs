//! Helpers shared by the layout constructors and lowering rules

use super::dim::{standard_out_dim_names, Dim};
use super::linear::LinearLayout;
use crate::error::{Error, Result};
use std::collections::BTreeSet;

fn desired_size(shape: &[(Dim, i32)], dim: &Dim) -> Result<i32> {
    shape
        .iter()
        .find(|(d, _)| d == dim)
        .map(|(_, s)| *s)
        .ok_or_else(|| Error::UnknownDim {
            kind: "output",
            dim: dim.clone(),
        })
}

fn check_labeled_shape(layout: &LinearLayout, shape: &[(Dim, i32)]) -> Result<()> {
    if shape.len() != layout.num_out_dims() {
        let names: Vec<Dim> = layout.out_dim_names().cloned().collect();
        let got: Vec<Dim> = shape.iter().map(|(d, _)| d.clone()).collect();
        return Err(Error::dim_mismatch("labeled shape", &names, &got));
    }
    Ok(())
}

/// Grow every output dimension to at least the size in `shape` by appending
/// identity bases along the layout's first input dimension.
pub fn ensure_layout_not_smaller_than(layout: &LinearLayout, shape: &[(Dim, i32)]) -> Result<LinearLayout> {
    let Some(first) = layout.in_dim_names().next().cloned() else {
        return Ok(layout.clone());
    };
    ensure_layout_not_smaller_than_along(layout, shape, first)
}

/// Like [`ensure_layout_not_smaller_than`], appending the identity bases to
/// `in_dim` instead of the first input dimension.
pub fn ensure_layout_not_smaller_than_along(
    layout: &LinearLayout,
    shape: &[(Dim, i32)],
    in_dim: Dim,
) -> Result<LinearLayout> {
    check_labeled_shape(layout, shape)?;
    let mut ret = layout.clone();
    for out_dim in layout.out_dim_names() {
        let actual = layout.out_dim_size(out_dim);
        let desired = desired_size(shape, out_dim)?;
        if desired <= actual {
            continue;
        }
        if desired % actual != 0 {
            return Err(Error::InvalidArgument {
                arg: "shape",
                reason: format!("'{out_dim}' of size {actual} does not divide {desired}"),
            });
        }
        ret = ret.try_mul(&LinearLayout::identity_1d(
            desired / actual,
            in_dim.clone(),
            out_dim.clone(),
        )?)?;
    }
    Ok(ret)
}

/// Shrink every output dimension to at most the size in `shape`.
///
/// Bases whose value along an oversized dimension reaches the requested size
/// are zeroed, so the data they addressed becomes replicated. With
/// `broadcast_registers == false`, such `register` bases are removed instead.
pub fn ensure_layout_not_larger_than(
    layout: &LinearLayout,
    shape: &[(Dim, i32)],
    broadcast_registers: bool,
) -> Result<LinearLayout> {
    check_labeled_shape(layout, shape)?;
    if shape.is_empty() {
        return Ok(layout.clone());
    }
    let (mut bases, _) = layout.clone().into_parts();
    let mut removed_registers = BTreeSet::new();

    for (o, out_dim) in layout.out_dim_names().enumerate() {
        let actual = layout.out_dim_size(out_dim);
        let desired = desired_size(shape, out_dim)?;
        if actual <= desired {
            continue;
        }
        // (in dim index, basis index, value), largest value first
        let mut sorted: Vec<(usize, usize, i32)> = Vec::new();
        for (i, (_, in_bases)) in bases.iter().enumerate() {
            for (b, basis) in in_bases.iter().enumerate() {
                if basis[o] != 0 {
                    sorted.push((i, b, basis[o]));
                }
            }
        }
        sorted.sort_by(|x, y| y.2.cmp(&x.2));
        for (i, b, value) in sorted {
            if value < desired {
                break;
            }
            if !broadcast_registers && bases[i].0 == Dim::REGISTER {
                removed_registers.insert(b);
            } else {
                bases[i].1[b][o] = 0;
            }
        }
    }

    if !removed_registers.is_empty() {
        if let Some((_, regs)) = bases.iter_mut().find(|(d, _)| *d == Dim::REGISTER) {
            let kept = regs
                .drain(..)
                .enumerate()
                .filter(|(b, _)| !removed_registers.contains(b))
                .map(|(_, basis)| basis)
                .collect();
            *regs = kept;
        }
    }
    LinearLayout::with_inferred_sizes(bases, layout.out_dim_names().cloned().collect())
}

/// Identity over `shape`, with `order[0]` the fastest-varying axis.
///
/// Output dimensions are registered in `order`, not transposed back to the
/// standard order.
pub fn identity_standard_nd(in_dim: Dim, shape: &[u32], order: &[u32]) -> Result<LinearLayout> {
    if shape.len() != order.len() {
        return Err(Error::InvalidArgument {
            arg: "order",
            reason: format!("rank {} differs from shape rank {}", order.len(), shape.len()),
        });
    }
    let names = standard_out_dim_names(shape.len());
    let mut ret = LinearLayout::empty();
    for &dim in order {
        let dim = dim as usize;
        let size = *shape.get(dim).ok_or_else(|| Error::InvalidArgument {
            arg: "order",
            reason: format!("axis {dim} out of range for rank {}", shape.len()),
        })?;
        ret = ret.try_mul(&LinearLayout::identity_1d(
            size as i32,
            in_dim.clone(),
            names[dim].clone(),
        )?)?;
    }
    Ok(ret)
}

/// `[rank-1, ..., 1, 0]`, with the two innermost axes swapped when not row-major.
pub fn matrix_order(rank: usize, row_major: bool) -> Vec<u32> {
    let mut order: Vec<u32> = (0..rank as u32).rev().collect();
    if !row_major && rank >= 2 {
        order.swap(0, 1);
    }
    order
}

/// Order of a dot operand; `k_contig` means the K axis is fastest.
pub fn order_for_dot_operand(op_idx: u32, rank: usize, k_contig: bool) -> Vec<u32> {
    matrix_order(rank, (op_idx == 0) == k_contig)
}

/// The standard `(dim_i, size_i)` pairs of a tensor shape.
pub fn labeled_shape(shape: &[i64]) -> Result<Vec<(Dim, i32)>> {
    shape
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            i32::try_from(s)
                .map(|s| (Dim::out(i), s))
                .map_err(|_| Error::InvalidArgument {
                    arg: "shape",
                    reason: format!("dimension {i} of size {s} does not fit in 32 bits"),
                })
        })
        .collect()
}

/// Reinterpret a layout's outputs as a row-major tensor of `shape`.
pub fn reshape_layout(layout: &LinearLayout, shape: &[i64]) -> Result<LinearLayout> {
    let mut reversed: Vec<Dim> = layout.out_dim_names().cloned().collect();
    reversed.reverse();
    let mut new_dims = labeled_shape(shape)?;
    new_dims.reverse();
    layout
        .transpose_outs(&reversed)?
        .reshape_outs(&new_dims)?
        .transpose_outs(&standard_out_dim_names(shape.len()))
}

/// Permute each basis so that output `dim_j` reads old axis `order[j]`.
pub fn transpose_linear_layout(layout: &LinearLayout, order: &[u32]) -> Result<LinearLayout> {
    if order.len() != layout.num_out_dims() {
        return Err(Error::InvalidArgument {
            arg: "order",
            reason: format!("rank {} differs from layout rank {}", order.len(), layout.num_out_dims()),
        });
    }
    let outs: Vec<Dim> = layout.out_dim_names().cloned().collect();
    let (bases, _) = layout.clone().into_parts();
    let bases = bases
        .into_iter()
        .map(|(d, b)| {
            let permuted = b
                .into_iter()
                .map(|basis| order.iter().map(|&i| basis[i as usize]).collect())
                .collect();
            (d, permuted)
        })
        .collect();
    LinearLayout::with_inferred_sizes(bases, outs)
}

/// The same layout with the `block` bases removed.
pub fn layout_within_block(layout: &LinearLayout) -> Result<LinearLayout> {
    layout.in_dim_index(&Dim::BLOCK)?;
    let outs: Vec<Dim> = layout.out_dim_names().cloned().collect();
    let (mut bases, _) = layout.clone().into_parts();
    for (d, b) in bases.iter_mut() {
        if *d == Dim::BLOCK {
            b.clear();
        }
    }
    LinearLayout::with_inferred_sizes(bases, outs)
}

/// Rebuild a layout, shrinking each output dimension to the size its bases need.
pub fn infer_sizes(layout: &LinearLayout) -> Result<LinearLayout> {
    let outs: Vec<Dim> = layout.out_dim_names().cloned().collect();
    let (bases, _) = layout.clone().into_parts();
    LinearLayout::with_inferred_sizes(bases, outs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(i: usize) -> Dim {
        Dim::out(i)
    }

    #[test]
    fn test_matrix_order() {
        assert_eq!(matrix_order(3, true), vec![2, 1, 0]);
        assert_eq!(matrix_order(3, false), vec![1, 2, 0]);
        assert_eq!(order_for_dot_operand(0, 2, true), vec![1, 0]);
        assert_eq!(order_for_dot_operand(1, 2, true), vec![0, 1]);
    }

    #[test]
    fn test_not_smaller_appends_register_bases() {
        let l = LinearLayout::identity_1d(2, Dim::REGISTER, d(0)).unwrap();
        let grown = ensure_layout_not_smaller_than(&l, &[(d(0), 8)]).unwrap();
        assert_eq!(grown.in_dim_size(&Dim::REGISTER), 8);
        assert_eq!(grown.out_dim_size(&d(0)), 8);
        // already large enough: unchanged
        assert_eq!(ensure_layout_not_smaller_than(&l, &[(d(0), 1)]).unwrap(), l);
    }

    #[test]
    fn test_not_larger_broadcasts() {
        let l = LinearLayout::identity_1d(4, Dim::LANE, d(0)).unwrap();
        let shrunk = ensure_layout_not_larger_than(&l, &[(d(0), 2)], true).unwrap();
        assert_eq!(shrunk.out_dim_size(&d(0)), 2);
        assert_eq!(shrunk.in_dim_size(&Dim::LANE), 4);
        assert_eq!(shrunk.basis(&Dim::LANE, 1, &d(0)).unwrap(), 0);
    }

    #[test]
    fn test_not_larger_removes_registers() {
        let l = LinearLayout::identity_1d(4, Dim::REGISTER, d(0)).unwrap();
        let shrunk = ensure_layout_not_larger_than(&l, &[(d(0), 2)], false).unwrap();
        assert_eq!(shrunk.in_dim_size(&Dim::REGISTER), 2);
        assert_eq!(shrunk.out_dim_size(&d(0)), 2);
    }

    #[test]
    fn test_identity_standard_nd_keeps_order() {
        let l = identity_standard_nd(Dim::REGISTER, &[2, 4], &[1, 0]).unwrap();
        let outs: Vec<Dim> = l.out_dim_names().cloned().collect();
        assert_eq!(outs, vec![d(1), d(0)]);
        assert_eq!(l.basis(&Dim::REGISTER, 0, &d(1)).unwrap(), 1);
        assert_eq!(l.basis(&Dim::REGISTER, 2, &d(0)).unwrap(), 1);
    }

    #[test]
    fn test_reshape_layout_row_major() {
        let l = identity_standard_nd(Dim::REGISTER, &[2, 4], &[1, 0])
            .unwrap()
            .transpose_outs(&[d(0), d(1)])
            .unwrap();
        let flat = reshape_layout(&l, &[8]).unwrap();
        // register bit 2 walks dim0, which is the slow axis of a [2, 4] tensor
        assert_eq!(flat.basis(&Dim::REGISTER, 2, &d(0)).unwrap(), 4);
        assert_eq!(flat.basis(&Dim::REGISTER, 0, &d(0)).unwrap(), 1);
    }

    #[test]
    fn test_transpose_linear_layout() {
        let l = LinearLayout::new(
            vec![(Dim::REGISTER, vec![vec![1, 0], vec![0, 1], vec![0, 2]])],
            vec![d(0), d(1)],
        )
        .unwrap();
        let t = transpose_linear_layout(&l, &[1, 0]).unwrap();
        assert_eq!(t.out_shape(), vec![4, 2]);
        assert_eq!(t.basis(&Dim::REGISTER, 0, &d(1)).unwrap(), 1);
    }
}
