//! Shared memory encodings
//!
//! Shared layouts map an `offset` (in elements) and a `block` to tensor
//! coordinates. Swizzled variants permute the column of each row by XOR-ing
//! it with a row-dependent phase so that threads reading a column hit
//! different banks.

use super::{check_order, check_powers_of_two, combine_cta_cga_with_shape};
use super::{CtaLayout, Dims, ToLinearLayout};
use crate::error::{Error, Result};
use crate::layout::{
    ensure_layout_not_smaller_than, identity_standard_nd, reshape_layout, standard_out_dim_names,
    transpose_linear_layout, utils::labeled_shape, Dim, LinearLayout,
};

fn check_shared_params(vec: u32, per_phase: u32, max_phase: u32) -> Result<()> {
    check_powers_of_two(&[vec], "vec")?;
    check_powers_of_two(&[per_phase], "per_phase")?;
    check_powers_of_two(&[max_phase], "max_phase")
}

fn dim_size(shape: &[i64], dim: usize) -> Result<i32> {
    i32::try_from(shape[dim]).map_err(|_| Error::InvalidArgument {
        arg: "shape",
        reason: format!("dimension {dim} of size {} does not fit in 32 bits", shape[dim]),
    })
}

/// Shared layout whose rows (axis `order[1]`) swizzle the columns (axis
/// `order[0]`) with `phase(row)`; higher axes are stacked unswizzled.
fn swizzled_layout(
    shape: &[i64],
    order: &[u32],
    cta_layout: &CtaLayout,
    phase: impl Fn(i32) -> i32,
) -> Result<LinearLayout> {
    let spc = cta_layout.shape_per_cta(shape);
    let rank = spc.len();
    let names = standard_out_dim_names(rank);
    if rank == 1 {
        let cta = LinearLayout::identity_1d(dim_size(&spc, 0)?, Dim::OFFSET, names[0].clone())?;
        return combine_cta_cga_with_shape(cta, cta_layout, shape);
    }

    let col_dim = order[0] as usize;
    let row_dim = order[1] as usize;
    let num_cols = dim_size(&spc, col_dim)?;
    let num_rows = dim_size(&spc, row_dim)?;

    // (row, col) pairs
    let mut bases: Vec<Vec<i32>> = Vec::new();
    let mut col = 1;
    while col < num_cols {
        bases.push(vec![0, col]);
        col *= 2;
    }
    let mut row = 1;
    while row < num_rows {
        bases.push(vec![row, phase(row) % num_cols]);
        row *= 2;
    }
    let mut cta = LinearLayout::new(
        vec![(Dim::OFFSET, bases)],
        vec![names[row_dim].clone(), names[col_dim].clone()],
    )?;
    for &dim in &order[2..] {
        let dim = dim as usize;
        cta = cta.try_mul(&LinearLayout::identity_1d(
            dim_size(&spc, dim)?,
            Dim::OFFSET,
            names[dim].clone(),
        )?)?;
    }
    combine_cta_cga_with_shape(cta, cta_layout, shape)
}

// ============================================================================
// Swizzled shared
// ============================================================================

/// Shared memory where row `r` XORs its column index with
/// `vec * ((r / per_phase) % max_phase)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SwizzledSharedEncoding {
    /// Elements per swizzled vector
    pub vec: u32,
    /// Consecutive rows sharing a phase
    pub per_phase: u32,
    /// Number of distinct phases
    pub max_phase: u32,
    /// Axes from fastest to slowest varying
    pub order: Dims,
    /// Distribution over the cluster
    pub cta_layout: CtaLayout,
}

impl SwizzledSharedEncoding {
    /// Create an encoding, validating its parameters.
    pub fn new(vec: u32, per_phase: u32, max_phase: u32, order: &[u32], cta_layout: CtaLayout) -> Result<Self> {
        let enc = Self {
            vec,
            per_phase,
            max_phase,
            order: Dims::from_slice(order),
            cta_layout,
        };
        enc.validate()?;
        Ok(enc)
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<()> {
        check_shared_params(self.vec, self.per_phase, self.max_phase)?;
        self.cta_layout.validate()?;
        check_order(&self.order, self.cta_layout.rank(), "order")
    }
}

impl ToLinearLayout for SwizzledSharedEncoding {
    fn to_linear_layout(&self, shape: &[i64]) -> Result<LinearLayout> {
        let (vec, per_phase, max_phase) = (self.vec as i32, self.per_phase as i32, self.max_phase as i32);
        swizzled_layout(shape, &self.order, &self.cta_layout, |row| {
            vec * ((row / per_phase) % max_phase)
        })
    }
}

// ============================================================================
// AMD rotating shared
// ============================================================================

/// Swizzled shared memory whose phase pattern additionally rotates every
/// `per_phase * max_phase` rows, spreading column reads over more LDS banks.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AmdRotatingSharedEncoding {
    /// Elements per swizzled vector
    pub vec: u32,
    /// Consecutive rows sharing a phase
    pub per_phase: u32,
    /// Number of distinct phases
    pub max_phase: u32,
    /// Axes from fastest to slowest varying
    pub order: Dims,
    /// Distribution over the cluster
    pub cta_layout: CtaLayout,
}

impl AmdRotatingSharedEncoding {
    /// Create an encoding, validating its parameters.
    pub fn new(vec: u32, per_phase: u32, max_phase: u32, order: &[u32], cta_layout: CtaLayout) -> Result<Self> {
        let enc = Self {
            vec,
            per_phase,
            max_phase,
            order: Dims::from_slice(order),
            cta_layout,
        };
        enc.validate()?;
        Ok(enc)
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<()> {
        check_shared_params(self.vec, self.per_phase, self.max_phase)?;
        self.cta_layout.validate()?;
        check_order(&self.order, self.cta_layout.rank(), "order")
    }
}

impl ToLinearLayout for AmdRotatingSharedEncoding {
    fn to_linear_layout(&self, shape: &[i64]) -> Result<LinearLayout> {
        let (vec, per_phase, max_phase) = (self.vec as i32, self.per_phase as i32, self.max_phase as i32);
        swizzled_layout(shape, &self.order, &self.cta_layout, |row| {
            let phase = (row / per_phase) % max_phase;
            let block = (row / max_phase / per_phase) % max_phase;
            vec * (phase ^ block)
        })
    }
}

// ============================================================================
// NVMMA shared
// ============================================================================

/// Shared memory in the format read by TMA and `wgmma`: 8-row core matrices
/// of `swizzle_bytes` bytes, each 16-byte chunk of row `r` XOR-ed with `r`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NvmmaSharedEncoding {
    /// Swizzle width: 0 (none), 32, 64 or 128 bytes
    pub swizzle_bytes: u32,
    /// Whether the contiguous axis is axis 0 instead of the last one
    pub transposed: bool,
    /// Bits per stored element
    pub element_bit_width: u32,
    /// fp4 values stored one per byte, padded to 8 bits
    pub fp4_padded: bool,
    /// Distribution over the cluster
    pub cta_layout: CtaLayout,
}

impl NvmmaSharedEncoding {
    /// Create an encoding, validating its parameters.
    pub fn new(
        swizzle_bytes: u32,
        transposed: bool,
        element_bit_width: u32,
        fp4_padded: bool,
        cta_layout: CtaLayout,
    ) -> Result<Self> {
        let enc = Self {
            swizzle_bytes,
            transposed,
            element_bit_width,
            fp4_padded,
            cta_layout,
        };
        enc.validate()?;
        Ok(enc)
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.swizzle_bytes, 0 | 32 | 64 | 128) {
            return Err(Error::invalid_encoding(format!(
                "swizzle width must be 0, 32, 64 or 128 bytes, got {}",
                self.swizzle_bytes
            )));
        }
        if !matches!(self.element_bit_width, 8 | 16 | 32 | 64) {
            return Err(Error::invalid_encoding(format!(
                "unsupported element width {} bits",
                self.element_bit_width
            )));
        }
        if self.fp4_padded && self.element_bit_width != 8 {
            return Err(Error::invalid_encoding("padded fp4 is stored in bytes"));
        }
        self.cta_layout.validate()
    }

    /// Elements per 16-byte swizzle unit
    pub fn vec(&self) -> i32 {
        (128 / self.element_bit_width) as i32
    }

    /// Consecutive rows sharing a phase
    pub fn per_phase(&self) -> i32 {
        (128 / self.swizzle_bytes.max(1)) as i32
    }

    /// Number of distinct phases
    pub fn max_phase(&self) -> i32 {
        (self.swizzle_bytes / 16).max(1) as i32
    }

    /// One 8-row core matrix.
    ///
    /// With `fp4_padded`, each 16-byte group holds 8 real and 8 padding
    /// bytes; padding offsets alias the coordinates of the real ones so that
    /// inverting the layout picks the real ones.
    fn core_matrix(&self, disable_swizzle: bool) -> Result<LinearLayout> {
        const TILE_ROWS: i32 = 8;
        let tile_cols = (8 * self.swizzle_bytes / self.element_bit_width) as i32;
        let (vec, per_phase, max_phase) = (self.vec(), self.per_phase(), self.max_phase());
        let pack = |col: i32| if self.fp4_padded { col / 16 * 8 + col % 8 } else { col };

        let mut bases: Vec<Vec<i32>> = Vec::new();
        let mut col = 1;
        while col < tile_cols {
            bases.push(vec![0, pack(col)]);
            col *= 2;
        }
        let mut row = 1;
        while row < TILE_ROWS {
            let swizzled = if disable_swizzle {
                0
            } else {
                pack(vec * ((row / per_phase) % max_phase))
            };
            bases.push(vec![row, swizzled]);
            row *= 2;
        }
        LinearLayout::new(vec![(Dim::OFFSET, bases)], standard_out_dim_names(2))
    }
}

/// Shape of the block one TMA copy moves for a tensor whose per-CTA shape is
/// `shape_per_cta`.
///
/// Every axis is capped at 256 elements and, when swizzling, the contiguous
/// axis is exactly one swizzle row. With `packed`, padded fp4 sizes are
/// given in fp4 elements rather than bytes.
pub fn tma_block_shape(
    shape_per_cta: &[i64],
    element_bit_width: u32,
    swizzle_bytes: u32,
    fp4_padded: bool,
    transposed: bool,
    packed: bool,
) -> Result<Vec<i64>> {
    let mut block = shape_per_cta.to_vec();
    if block.is_empty() {
        return Ok(block);
    }
    let contig = if transposed { 0 } else { block.len() - 1 };
    if fp4_padded {
        block[contig] *= 2;
    }
    for size in &mut block {
        *size = (*size).min(256);
    }
    if swizzle_bytes != 0 {
        let contig_size = i64::from(8 * swizzle_bytes / element_bit_width);
        if block[contig] < contig_size {
            return Err(Error::InvalidArgument {
                arg: "shape",
                reason: format!(
                    "block shape {block:?} is too small for a {swizzle_bytes} byte swizzle"
                ),
            });
        }
        block[contig] = contig_size;
    }
    if fp4_padded && packed {
        block[contig] /= 2;
    }
    Ok(block)
}

/// Layout of an NVMMA shared tensor, optionally with swizzling disabled.
///
/// The outer axes of a TMA block are collapsed into rows, the block is tiled
/// with core matrices, reshaped back and finally repeated over the per-CTA
/// shape.
pub fn nvmma_shared_to_linear_layout(
    shape: &[i64],
    enc: &NvmmaSharedEncoding,
    disable_swizzle: bool,
) -> Result<LinearLayout> {
    let rank = shape.len();
    let spc = enc.cta_layout.shape_per_cta(shape);
    let tma = tma_block_shape(
        &spc,
        enc.element_bit_width,
        enc.swizzle_bytes,
        enc.fp4_padded,
        enc.transposed,
        true,
    )?;
    let names = standard_out_dim_names(rank);
    let spc_labeled = labeled_shape(&spc)?;

    if enc.swizzle_bytes == 0 {
        let mut layout = LinearLayout::empty();
        for i in (0..rank).rev() {
            layout = layout.try_mul(&LinearLayout::identity_1d(
                dim_size(&tma, i)?,
                Dim::OFFSET,
                names[i].clone(),
            )?)?;
        }
        let layout = ensure_layout_not_smaller_than(&layout, &spc_labeled)?;
        return combine_cta_cga_with_shape(layout, &enc.cta_layout, shape);
    }

    if rank < 2 {
        return Err(Error::InvalidArgument {
            arg: "shape",
            reason: format!("swizzled NVMMA layouts need rank 2 or more, got {shape:?}"),
        });
    }
    let mut collapsed = [tma[..rank - 1].iter().product::<i64>(), tma[rank - 1]];
    if enc.transposed {
        collapsed.swap(0, 1);
    }

    let tile = enc.core_matrix(disable_swizzle)?;
    let tile_rows = i64::from(tile.out_dim_size(&names[0]));
    let tile_cols = i64::from(tile.out_dim_size(&names[1]));
    let packing = if enc.fp4_padded { 2 } else { 1 };
    if collapsed[1] * packing < tile_cols || collapsed[0] < tile_rows {
        return Err(Error::InvalidArgument {
            arg: "shape",
            reason: format!(
                "collapsed shape per CTA {collapsed:?} is smaller than the {tile_rows}x{tile_cols} core matrix"
            ),
        });
    }
    let layout = ensure_layout_not_smaller_than(&tile, &labeled_shape(&collapsed)?)?;

    let mut block_shape = tma;
    if enc.transposed {
        block_shape.rotate_left(1);
    }
    let mut layout = reshape_layout(&layout, &block_shape)?;
    if enc.transposed {
        let order: Vec<u32> = std::iter::once(rank as u32 - 1)
            .chain(0..rank as u32 - 1)
            .collect();
        layout = transpose_linear_layout(&layout, &order)?;
    }
    let layout = ensure_layout_not_smaller_than(&layout, &spc_labeled)?;
    combine_cta_cga_with_shape(layout, &enc.cta_layout, shape)
}

impl ToLinearLayout for NvmmaSharedEncoding {
    fn to_linear_layout(&self, shape: &[i64]) -> Result<LinearLayout> {
        nvmma_shared_to_linear_layout(shape, self, false)
    }
}

// ============================================================================
// Padded shared
// ============================================================================

/// Unswizzled shared memory with `paddings[i]` elements inserted after every
/// `intervals[i]` elements.
///
/// The linear layout describes logical offsets only; the padding is added
/// when turning an offset into an address (see
/// [`padded_offset`](Self::padded_offset)).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PaddedSharedEncoding {
    /// Padding intervals, in elements
    pub intervals: Dims,
    /// Padding inserted after each interval, in elements
    pub paddings: Dims,
    /// Axes from fastest to slowest varying
    pub order: Dims,
    /// Distribution over the cluster
    pub cta_layout: CtaLayout,
}

impl PaddedSharedEncoding {
    /// Create an encoding, validating its parameters.
    pub fn new(intervals: &[u32], paddings: &[u32], order: &[u32], cta_layout: CtaLayout) -> Result<Self> {
        let enc = Self {
            intervals: Dims::from_slice(intervals),
            paddings: Dims::from_slice(paddings),
            order: Dims::from_slice(order),
            cta_layout,
        };
        enc.validate()?;
        Ok(enc)
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<()> {
        if self.intervals.is_empty() || self.intervals.len() != self.paddings.len() {
            return Err(Error::invalid_encoding(format!(
                "need one padding per interval, got intervals {:?} and paddings {:?}",
                self.intervals, self.paddings
            )));
        }
        check_powers_of_two(&self.intervals, "intervals")?;
        check_powers_of_two(&self.paddings, "paddings")?;
        self.cta_layout.validate()?;
        check_order(&self.order, self.cta_layout.rank(), "order")
    }

    /// Padding elements inserted before logical `offset`.
    pub fn padding_before(&self, offset: i64) -> i64 {
        self.intervals
            .iter()
            .zip(&self.paddings)
            .map(|(&interval, &padding)| (offset >> interval.trailing_zeros()) << padding.trailing_zeros())
            .sum()
    }

    /// Physical offset of logical `offset`.
    pub fn padded_offset(&self, offset: i64) -> i64 {
        offset + self.padding_before(offset)
    }
}

impl ToLinearLayout for PaddedSharedEncoding {
    fn to_linear_layout(&self, shape: &[i64]) -> Result<LinearLayout> {
        let spc: Vec<u32> = self
            .cta_layout
            .shape_per_cta(shape)
            .iter()
            .map(|&s| u32::try_from(s).map_err(|_| Error::not_power_of_two("tensor dimension", s)))
            .collect::<Result<_>>()?;
        let cta = identity_standard_nd(Dim::OFFSET, &spc, &self.order)?;
        combine_cta_cga_with_shape(cta, &self.cta_layout, shape)
    }
}

// ============================================================================
// Register-to-register conversion scratch
// ============================================================================

/// Scratch layout for a register-to-register conversion staged through
/// shared memory.
///
/// The tensor is moved in `tensor_shape / rep_shape` iterations of one
/// `rep_shape` tile each. Inputs are `offset` within the tile (fastest axis
/// `order[0]`), `iteration` and a trivial `block`.
pub fn choose_shared_layout_for_reg_to_reg_conversion(
    tensor_shape: &[u32],
    rep_shape: &[u32],
    order: &[u32],
) -> Result<LinearLayout> {
    let rank = tensor_shape.len();
    if rep_shape.len() != rank {
        return Err(Error::InvalidArgument {
            arg: "rep_shape",
            reason: format!("{rep_shape:?} does not match tensor shape {tensor_shape:?}"),
        });
    }
    check_order(order, rank, "order")?;
    let names = standard_out_dim_names(rank);
    let offset_dim = |d: u32| Dim::new(format!("offset{d}"));
    let iteration_dim = |d: u32| Dim::new(format!("iteration{d}"));

    let mut layout = LinearLayout::empty();
    for &dim in order {
        let d = dim as usize;
        let (tensor, rep) = (tensor_shape[d], rep_shape[d]);
        if rep == 0 || tensor % rep != 0 {
            return Err(Error::InvalidArgument {
                arg: "rep_shape",
                reason: format!("tile {rep} does not divide axis {d} of size {tensor}"),
            });
        }
        layout = layout
            .try_mul(&LinearLayout::identity_1d(rep as i32, offset_dim(dim), names[d].clone())?)?
            .try_mul(&LinearLayout::identity_1d(
                (tensor / rep) as i32,
                iteration_dim(dim),
                names[d].clone(),
            )?)?;
    }

    let in_order: Vec<Dim> = order
        .iter()
        .map(|&d| offset_dim(d))
        .chain(order.iter().map(|&d| iteration_dim(d)))
        .collect();
    let total_offsets: u32 = rep_shape.iter().product();
    let total_iterations: u32 = tensor_shape.iter().zip(rep_shape).map(|(t, r)| t / r).product();
    layout
        .transpose_ins(&in_order)?
        .transpose_outs(&names)?
        .reshape_ins(&[
            (Dim::OFFSET, total_offsets as i32),
            (Dim::ITERATION, total_iterations as i32),
            (Dim::BLOCK, 1),
        ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(l: &LinearLayout) -> Vec<Vec<i32>> {
        l.in_dim_bases(&Dim::OFFSET)
            .unwrap()
            .iter()
            .map(|b| b.to_vec())
            .collect()
    }

    #[test]
    fn test_swizzled_bases() {
        let enc = SwizzledSharedEncoding::new(2, 1, 4, &[1, 0], CtaLayout::single(2)).unwrap();
        let l = enc.to_linear_layout(&[4, 8]).unwrap();
        assert_eq!(
            offsets(&l),
            vec![vec![0, 1], vec![0, 2], vec![0, 4], vec![1, 2], vec![2, 4]]
        );
        // row 3 starts at column 2 ^ 4
        let out = l.apply(&[(Dim::OFFSET, 24), (Dim::BLOCK, 0)]).unwrap();
        assert_eq!(out, vec![(Dim::out(0), 3), (Dim::out(1), 6)]);
    }

    #[test]
    fn test_unswizzled_is_row_major() {
        let enc = SwizzledSharedEncoding::new(1, 1, 1, &[1, 0], CtaLayout::single(2)).unwrap();
        let l = enc.to_linear_layout(&[4, 8]).unwrap();
        for offset in 0..32 {
            let out = l.apply(&[(Dim::OFFSET, offset), (Dim::BLOCK, 0)]).unwrap();
            assert_eq!(out, vec![(Dim::out(0), offset / 8), (Dim::out(1), offset % 8)]);
        }
    }

    #[test]
    fn test_swizzled_3d_stacks_outer_axis() {
        let enc = SwizzledSharedEncoding::new(1, 1, 1, &[2, 1, 0], CtaLayout::single(3)).unwrap();
        let l = enc.to_linear_layout(&[2, 4, 8]).unwrap();
        assert_eq!(l.out_shape(), vec![2, 4, 8]);
        assert_eq!(offsets(&l).last().unwrap(), &vec![1, 0, 0]);
    }

    #[test]
    fn test_rotating_bases() {
        let enc = AmdRotatingSharedEncoding::new(1, 1, 2, &[1, 0], CtaLayout::single(2)).unwrap();
        let l = enc.to_linear_layout(&[8, 4]).unwrap();
        assert_eq!(
            offsets(&l),
            vec![vec![0, 1], vec![0, 2], vec![1, 1], vec![2, 1], vec![4, 0]]
        );
    }

    #[test]
    fn test_nvmma_128b_core_matrix() {
        let enc = NvmmaSharedEncoding::new(128, false, 16, false, CtaLayout::single(2)).unwrap();
        let l = enc.to_linear_layout(&[8, 64]).unwrap();
        assert_eq!(
            offsets(&l),
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 4],
                vec![0, 8],
                vec![0, 16],
                vec![0, 32],
                vec![1, 8],
                vec![2, 16],
                vec![4, 32],
            ]
        );
    }

    #[test]
    fn test_nvmma_repeats_core_matrices() {
        let enc = NvmmaSharedEncoding::new(128, false, 16, false, CtaLayout::single(2)).unwrap();
        let l = enc.to_linear_layout(&[16, 128]).unwrap();
        let bases = offsets(&l);
        assert_eq!(bases.len(), 11);
        assert_eq!(bases[9], vec![8, 0]);
        assert_eq!(bases[10], vec![0, 64]);
        assert!(l.is_invertible());
    }

    #[test]
    fn test_nvmma_disable_swizzle() {
        let enc = NvmmaSharedEncoding::new(128, false, 16, false, CtaLayout::single(2)).unwrap();
        let l = nvmma_shared_to_linear_layout(&[8, 64], &enc, true).unwrap();
        assert_eq!(offsets(&l)[6..], [vec![1, 0], vec![2, 0], vec![4, 0]]);
    }

    #[test]
    fn test_nvmma_unswizzled_is_row_major() {
        let enc = NvmmaSharedEncoding::new(0, false, 16, false, CtaLayout::single(2)).unwrap();
        let l = enc.to_linear_layout(&[4, 8]).unwrap();
        assert_eq!(
            offsets(&l),
            vec![vec![0, 1], vec![0, 2], vec![0, 4], vec![1, 0], vec![2, 0]]
        );
    }

    #[test]
    fn test_nvmma_rejects_narrow_block() {
        let enc = NvmmaSharedEncoding::new(128, false, 16, false, CtaLayout::single(2)).unwrap();
        assert!(enc.to_linear_layout(&[8, 32]).is_err());
    }

    #[test]
    fn test_tma_block_shape() {
        assert_eq!(
            tma_block_shape(&[512, 128], 16, 128, false, false, true).unwrap(),
            vec![256, 64]
        );
        assert_eq!(
            tma_block_shape(&[128, 64], 8, 128, true, false, true).unwrap(),
            vec![128, 64]
        );
        assert_eq!(
            tma_block_shape(&[128, 64], 8, 128, true, false, false).unwrap(),
            vec![128, 128]
        );
        assert!(tma_block_shape(&[64, 16], 16, 64, false, false, true).is_err());
    }

    #[test]
    fn test_padded_offsets() {
        let enc = PaddedSharedEncoding::new(&[32], &[4], &[1, 0], CtaLayout::single(2)).unwrap();
        assert_eq!(enc.padding_before(31), 0);
        assert_eq!(enc.padded_offset(64), 72);
        let l = enc.to_linear_layout(&[4, 16]).unwrap();
        let out = l.apply(&[(Dim::OFFSET, 17), (Dim::BLOCK, 0)]).unwrap();
        assert_eq!(out, vec![(Dim::out(0), 1), (Dim::out(1), 1)]);
    }

    #[test]
    fn test_reg_to_reg_scratch() {
        let l = choose_shared_layout_for_reg_to_reg_conversion(&[16, 8], &[4, 8], &[1, 0]).unwrap();
        assert_eq!(
            offsets(&l),
            vec![vec![0, 1], vec![0, 2], vec![0, 4], vec![1, 0], vec![2, 0]]
        );
        let iterations: Vec<Vec<i32>> = l
            .in_dim_bases(&Dim::ITERATION)
            .unwrap()
            .iter()
            .map(|b| b.to_vec())
            .collect();
        assert_eq!(iterations, vec![vec![4, 0], vec![8, 0]]);
        assert_eq!(l.in_dim_size(&Dim::BLOCK), 1);
    }
}
