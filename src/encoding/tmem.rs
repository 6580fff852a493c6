//! Register layouts for Blackwell tensor-memory (TMEM) loads and stores
//!
//! TMEM is addressed by (lane, column). A warp can only reach the 32 TMEM
//! lanes of its quarter, so warps 0-3 of a warp group own rows 0-127 and a
//! second warp group, when present, splits either rows or columns.

use super::{combine_cta_cga_with_shape, nvidia_mma_tile, CtaLayout};
use crate::error::{Error, Result};
use crate::layout::{Dim, LinearLayout};

fn check_warps(num_warps: u32) -> Result<()> {
    if num_warps != 4 && num_warps != 8 {
        return Err(Error::InvalidArgument {
            arg: "num_warps",
            reason: format!("TMEM accesses use 4 or 8 warps, got {num_warps}"),
        });
    }
    Ok(())
}

fn check_matrix(shape: &[i64]) -> Result<()> {
    if shape.len() != 2 {
        return Err(Error::InvalidArgument {
            arg: "shape",
            reason: format!("TMEM tensors are rank 2, got {shape:?}"),
        });
    }
    Ok(())
}

fn powers_of_two_below(start: i64, end: i64) -> impl Iterator<Item = i32> {
    std::iter::successors(Some(start), |&i| Some(i * 2))
        .take_while(move |&i| i < end)
        .map(|i| i as i32)
}

/// Layout used to store a scale tensor `[M, N]` into TMEM.
///
/// Each thread holds up to 4 consecutive scales along N, the 32 lanes walk
/// M. With 8 warps the last register basis moves to the second warp group.
pub fn scale_store_layout(shape: &[i64], num_warps: u32, cta_layout: &CtaLayout) -> Result<LinearLayout> {
    check_warps(num_warps)?;
    check_matrix(shape)?;
    let (m, n) = (shape[0], shape[1]);

    let mut regs: Vec<Vec<i32>> = [1, 2]
        .iter()
        .map(|&i| if i64::from(i) >= n { vec![0, 0] } else { vec![0, i] })
        .collect();
    let lanes = vec![vec![1, 0], vec![2, 0], vec![4, 0], vec![8, 0], vec![16, 0]];
    let mut warps = vec![vec![0, 0], vec![0, 0]];
    regs.extend(powers_of_two_below(32, m).map(|i| vec![i, 0]));
    regs.extend(powers_of_two_below(4, n).map(|i| vec![0, i]));
    if num_warps == 8 {
        if let Some(last) = regs.pop() {
            warps.push(last);
        }
    }

    let cta = LinearLayout::new(
        vec![(Dim::REGISTER, regs), (Dim::LANE, lanes), (Dim::WARP, warps)],
        vec![Dim::out(0), Dim::out(1)],
    )?;
    combine_cta_cga_with_shape(cta, cta_layout, shape)
}

/// Layout of a `tcgen05.ld/st.16x256b` access of an `m_dim x n_dim` block.
///
/// Returns `None` for the 8-warp, 64-row, narrow sub-32-bit case, which the
/// instruction cannot express.
pub fn layout_16x256(
    m_dim: u32,
    n_dim: u32,
    shape: &[i64],
    elem_bit_width: u32,
    num_warps: u32,
    cta_layout: &CtaLayout,
) -> Result<Option<LinearLayout>> {
    check_warps(num_warps)?;
    check_matrix(shape)?;
    if !matches!(elem_bit_width, 8 | 16 | 32) {
        return Err(Error::InvalidArgument {
            arg: "elem_bit_width",
            reason: format!("16x256b accesses move 8, 16 or 32 bit elements, got {elem_bit_width}"),
        });
    }
    let (m, n) = (i64::from(m_dim), i64::from(n_dim));
    if num_warps == 8 && m == 64 && n <= 16 && elem_bit_width < 32 {
        return Ok(None);
    }
    let spc = cta_layout.shape_per_cta(shape);
    let elems = 256 / elem_bit_width;
    let k_width = 64 / elem_bit_width;
    let id = LinearLayout::identity_1d;
    let (row, col) = (Dim::out(0), Dim::out(1));

    // One 16x256b tile: the mma-style 8-row pattern, repeated twice along M.
    let mut layout = nvidia_mma_tile(&[8, elems], k_width, &[1, 0], &[0, 1])?
        .try_mul(&id(2, Dim::REGISTER, row.clone())?)?;

    let (split_m, split_n) = if num_warps == 8 {
        (spc[0] > 128, spc[0] <= 128)
    } else {
        (false, false)
    };
    let max_reg_n = n.min(if split_n { spc[1] / 2 } else { spc[1] });
    let reps_n = max_reg_n / i64::from(elems);
    if reps_n > 1 {
        layout = layout.try_mul(&id(reps_n as i32, Dim::REGISTER, col.clone())?)?;
    }
    if m != 64 {
        layout = layout.try_mul(&id(2, Dim::REGISTER, row.clone())?)?;
    }
    layout = layout.try_mul(&id(4, Dim::WARP, row.clone())?)?;

    let reps_m = spc[0].min(128) / m;
    if reps_m > 1 {
        layout = layout.try_mul(&id(reps_m as i32, Dim::REGISTER, row.clone())?)?;
    }
    let mut covered_m = 128;
    if split_m {
        layout = layout.try_mul(&id(2, Dim::WARP, row.clone())?)?;
        covered_m = 256;
    }
    let reps_m = spc[0] / covered_m;
    if reps_m > 1 {
        layout = layout.try_mul(&id(reps_m as i32, Dim::REGISTER, row)?)?;
    }

    let max_n = if split_n { spc[1] / 2 } else { spc[1] };
    let reps_n = max_n / max_reg_n.max(1);
    if reps_n > 1 {
        layout = layout.try_mul(&id(reps_n as i32, Dim::REGISTER, col.clone())?)?;
    }
    if split_n {
        layout = layout.try_mul(&id(2, Dim::WARP, col)?)?;
    }
    combine_cta_cga_with_shape(layout, cta_layout, shape).map(Some)
}

/// Layout of a 32x32b TMEM load of a 128-row block with 8 warps, where the
/// second warp group takes the upper half of N through the last lane bit.
///
/// Returns `None` unless `num_warps == 8` and `m_dim == 128`.
pub fn split_long_m_layout(
    m_dim: u32,
    n_dim: u32,
    shape: &[i64],
    num_warps: u32,
    cta_layout: &CtaLayout,
) -> Result<Option<LinearLayout>> {
    check_warps(num_warps)?;
    check_matrix(shape)?;
    if num_warps != 8 || m_dim != 128 {
        return Ok(None);
    }
    let spc = cta_layout.shape_per_cta(shape);
    let (m, n) = (i64::from(m_dim), i64::from(n_dim));

    let mut lanes: Vec<Vec<i32>> = powers_of_two_below(1, 16).map(|i| vec![i, 0]).collect();
    let mut regs: Vec<Vec<i32>> = powers_of_two_below(1, n / 2).map(|i| vec![0, i]).collect();
    lanes.push(vec![0, (n / 2) as i32]);
    regs.extend(powers_of_two_below(n, spc[1]).map(|i| vec![0, i]));
    regs.extend(powers_of_two_below(m, spc[0]).map(|i| vec![i, 0]));
    let warps = vec![vec![32, 0], vec![64, 0], vec![16, 0]];

    let cta = LinearLayout::new(
        vec![(Dim::REGISTER, regs), (Dim::LANE, lanes), (Dim::WARP, warps)],
        vec![Dim::out(0), Dim::out(1)],
    )?;
    combine_cta_cga_with_shape(cta, cta_layout, shape).map(Some)
}
