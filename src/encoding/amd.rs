//! AMD `mfma` (CDNA) and `wmma` (RDNA) layouts
//!
//! Besides the accumulator and operand layouts, this module picks the
//! special layouts used by AMD-specific lowerings: transposed LDS reads
//! (`ds_read_b64_tr`), scale tensors of scaled MFMA and the vectorised
//! store of an MFMA accumulator.

use super::dot_operand::broadcasted_dot_operand_layout;
use super::{check_powers_of_two, check_rank, combine_cta_cga_with_shape};
use super::{CtaLayout, Dims, DotOperandEncoding, Encoding, ToLinearLayout};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::layout::{
    identity_standard_nd, matrix_order, order_for_dot_operand, standard_out_dim_names, Basis, Dim,
    LinearLayout,
};
use smallvec::smallvec;

/// Lanes of a CDNA wavefront; MFMA layouts are defined for this size only.
const MFMA_WARP_SIZE: i32 = 64;

// ============================================================================
// MFMA
// ============================================================================

/// Accumulator layout of an AMD `mfma` instruction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AmdMfmaEncoding {
    /// CDNA generation of the instruction set (1 to 4)
    pub version: u32,
    /// Warps along each axis
    pub warps_per_cta: Dims,
    /// MFMA tiles each warp computes along each axis
    pub tiles_per_warp: Dims,
    /// M extent of one instruction
    pub m_dim: u32,
    /// N extent of one instruction
    pub n_dim: u32,
    /// Whether each thread holds values along N instead of M
    pub is_transposed: bool,
    /// Accumulator element type, when known; f64 tiles are one value high
    pub element_type: Option<DType>,
    /// Distribution over the cluster
    pub cta_layout: CtaLayout,
}

impl AmdMfmaEncoding {
    /// Create an encoding with one tile per warp and unknown element type.
    pub fn new(
        version: u32,
        warps_per_cta: &[u32],
        m_dim: u32,
        n_dim: u32,
        is_transposed: bool,
        cta_layout: CtaLayout,
    ) -> Result<Self> {
        let enc = Self {
            version,
            warps_per_cta: Dims::from_slice(warps_per_cta),
            tiles_per_warp: smallvec![1; warps_per_cta.len()],
            m_dim,
            n_dim,
            is_transposed,
            element_type: None,
            cta_layout,
        };
        enc.validate()?;
        Ok(enc)
    }

    /// Copy with several tiles per warp.
    pub fn with_tiles_per_warp(mut self, tiles_per_warp: &[u32]) -> Result<Self> {
        self.tiles_per_warp = Dims::from_slice(tiles_per_warp);
        self.validate()?;
        Ok(self)
    }

    /// Copy with a known accumulator element type.
    pub fn with_element_type(mut self, element_type: DType) -> Self {
        self.element_type = Some(element_type);
        self
    }

    /// Number of tensor axes
    pub fn rank(&self) -> usize {
        self.warps_per_cta.len()
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<()> {
        let rank = self.rank();
        if !(2..=3).contains(&rank) {
            return Err(Error::invalid_encoding(format!(
                "mfma layouts have rank 2 or 3, got {rank}"
            )));
        }
        if !(1..=4).contains(&self.version) {
            return Err(Error::invalid_encoding(format!(
                "unknown mfma version {}",
                self.version
            )));
        }
        match (self.m_dim, self.n_dim) {
            (32, 32) | (16, 16) => {}
            (64, 4) if self.is_transposed => {}
            (4, 64) if !self.is_transposed => {}
            (m, n) => {
                return Err(Error::invalid_encoding(format!(
                    "unsupported mfma instruction {m}x{n} (transposed: {})",
                    self.is_transposed
                )))
            }
        }
        check_powers_of_two(&self.warps_per_cta, "warps_per_cta")?;
        check_rank(&self.tiles_per_warp, rank, "tiles_per_warp")?;
        check_powers_of_two(&self.tiles_per_warp, "tiles_per_warp")?;
        self.cta_layout.validate()?;
        check_rank(&self.cta_layout.cta_order, rank, "cta_order")
    }

    /// Order in which repeated tiles are enumerated.
    pub fn rep_order(&self) -> Vec<u32> {
        matrix_order(self.rank(), true)
    }

    /// Order in which repeated tiles of operand `op_idx` are enumerated.
    pub fn rep_order_for_operand(&self, op_idx: u32) -> Vec<u32> {
        order_for_dot_operand(op_idx, self.rank(), true)
    }
}

impl ToLinearLayout for AmdMfmaEncoding {
    fn to_linear_layout(&self, shape: &[i64]) -> Result<LinearLayout> {
        let rank = self.rank();
        let names = standard_out_dim_names(rank);
        let order = matrix_order(rank, true);
        let dim_m = names[order[1] as usize].clone();
        let dim_n = names[order[0] as usize].clone();
        let (m, n) = (self.m_dim as i32, self.n_dim as i32);

        let height = if self.element_type == Some(DType::F64) { 1 } else { 4 };
        let tiles = (m * n) / (MFMA_WARP_SIZE * height);
        let id = LinearLayout::identity_1d;

        // Threads hold `height` consecutive values along M; lanes walk N
        // first. Transposed layouts swap the roles of M and N.
        let (held, across) = if self.is_transposed {
            (dim_n.clone(), dim_m.clone())
        } else {
            (dim_m.clone(), dim_n.clone())
        };
        let across_size = if self.is_transposed { m } else { n };
        let mut tile = id(height, Dim::REGISTER, held.clone())?
            .try_mul(&id(across_size, Dim::LANE, across)?)?
            .try_mul(&id(MFMA_WARP_SIZE / across_size, Dim::LANE, held.clone())?)?;
        if tiles > 0 {
            tile = tile.try_mul(&id(tiles, Dim::REGISTER, held)?)?;
        }
        let tile = tile.transpose_outs(&[dim_n.clone(), dim_m.clone()])?;

        // Tiles are laid out N-contiguous over the whole tensor.
        let has_batch = rank == 3;
        let m_idx = usize::from(has_batch);
        let n_idx = 1 + m_idx;
        let tpw_n = self.tiles_per_warp[n_idx] as i32;
        let warps_n = self.warps_per_cta[n_idx] as i32;
        let n_reps = (shape[n_idx] / i64::from(n * warps_n * tpw_n)) as i32;

        let mut cta = tile
            .try_mul(&id(tpw_n, Dim::REGISTER, dim_n.clone())?)?
            .try_mul(&id(warps_n, Dim::WARP, dim_n.clone())?)?
            .try_mul(&id(n_reps, Dim::REGISTER, dim_n)?)?
            .try_mul(&id(self.tiles_per_warp[m_idx] as i32, Dim::REGISTER, dim_m.clone())?)?
            .try_mul(&id(self.warps_per_cta[m_idx] as i32, Dim::WARP, dim_m)?)?;
        if has_batch {
            let batch = names[order[2] as usize].clone();
            cta = cta
                .try_mul(&id(1, Dim::REGISTER, batch.clone())?)?
                .try_mul(&id(1, Dim::LANE, batch.clone())?)?
                .try_mul(&id(self.warps_per_cta[0] as i32, Dim::WARP, batch)?)?;
        }
        combine_cta_cga_with_shape(cta, &self.cta_layout, shape)
    }
}

/// Layout of operand `op_idx` of a dot whose accumulator is `mfma`.
pub(crate) fn mfma_dot_to_linear_layout(
    mfma: &AmdMfmaEncoding,
    op_idx: u32,
    k_width: u32,
    shape: &[i64],
) -> Result<LinearLayout> {
    let rank = shape.len();
    let names = standard_out_dim_names(rank);
    let k_dim_idx = if op_idx == 0 { rank - 1 } else { rank - 2 };
    let tiles_non_k = mfma.tiles_per_warp[k_dim_idx] as i32;
    let non_k_dim = (if op_idx == 0 { mfma.m_dim } else { mfma.n_dim }) as i32;
    let k_width = k_width as i32;

    let order = order_for_dot_operand(op_idx, rank, true);
    let dim_k = names[order[0] as usize].clone();
    let dim_non_k = names[order[1] as usize].clone();
    let id = LinearLayout::identity_1d;

    let mut tile = id(k_width, Dim::REGISTER, dim_k.clone())?
        .try_mul(&id(non_k_dim, Dim::LANE, dim_non_k.clone())?)?
        .try_mul(&id(MFMA_WARP_SIZE / non_k_dim, Dim::LANE, dim_k.clone())?)?;
    let mut k_tile = (MFMA_WARP_SIZE / non_k_dim) * k_width;

    // The 4x64 broadcast instruction consumes 16 K-blocks of its narrow operand.
    let broadcast_operand = matches!(
        (mfma.m_dim, mfma.n_dim, op_idx),
        (64, 4, 0) | (4, 64, 1)
    );
    if broadcast_operand {
        tile = tile.try_mul(&id(16, Dim::REGISTER, dim_k.clone())?)?;
        k_tile *= 16;
    }
    let k_size = shape[k_dim_idx];
    if k_size > i64::from(k_tile) {
        tile = tile.try_mul(&id((k_size / i64::from(k_tile)) as i32, Dim::REGISTER, dim_k.clone())?)?;
    }
    tile = tile
        .try_mul(&id(tiles_non_k, Dim::REGISTER, dim_non_k.clone())?)?
        .transpose_outs(&[dim_k, dim_non_k])?;
    if rank == 3 {
        tile = tile
            .try_mul(&id(1, Dim::REGISTER, names[0].clone())?)?
            .try_mul(&id(1, Dim::LANE, names[0].clone())?)?;
    }

    let rep: Vec<Dim> = mfma
        .rep_order_for_operand(op_idx)
        .iter()
        .map(|&d| names[d as usize].clone())
        .collect();
    let warps = identity_standard_nd(Dim::WARP, &mfma.warps_per_cta, &matrix_order(rank, true))?;
    let cta = tile.transpose_outs(&rep)?.try_mul(&warps.transpose_outs(&rep)?)?;
    combine_cta_cga_with_shape(cta, &mfma.cta_layout, shape)
}

// ============================================================================
// WMMA
// ============================================================================

/// Accumulator layout of an AMD `wmma` instruction (16x16 tiles).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AmdWmmaEncoding {
    /// RDNA generation: 1 for RDNA3, 2 for RDNA4
    pub version: u32,
    /// Whether the accumulator is stored transposed
    pub is_transposed: bool,
    /// Warps along each axis
    pub warps_per_cta: Dims,
    /// Distribution over the cluster
    pub cta_layout: CtaLayout,
}

impl AmdWmmaEncoding {
    /// Create an encoding, validating its parameters.
    pub fn new(version: u32, is_transposed: bool, warps_per_cta: &[u32], cta_layout: CtaLayout) -> Result<Self> {
        let enc = Self {
            version,
            is_transposed,
            warps_per_cta: Dims::from_slice(warps_per_cta),
            cta_layout,
        };
        enc.validate()?;
        Ok(enc)
    }

    /// Number of tensor axes
    pub fn rank(&self) -> usize {
        self.warps_per_cta.len()
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<()> {
        let rank = self.rank();
        if !(2..=3).contains(&rank) {
            return Err(Error::invalid_encoding(format!(
                "wmma layouts have rank 2 or 3, got {rank}"
            )));
        }
        if !(1..=2).contains(&self.version) {
            return Err(Error::invalid_encoding(format!(
                "unknown wmma version {}",
                self.version
            )));
        }
        check_powers_of_two(&self.warps_per_cta, "warps_per_cta")?;
        self.cta_layout.validate()?;
        check_rank(&self.cta_layout.cta_order, rank, "cta_order")
    }

    /// Order in which repeated tiles are enumerated.
    pub fn rep_order(&self) -> Vec<u32> {
        matrix_order(self.rank(), true)
    }
}

fn dims_in_order(names: &[Dim], order: &[u32]) -> Vec<Dim> {
    order.iter().map(|&d| names[d as usize].clone()).collect()
}

impl ToLinearLayout for AmdWmmaEncoding {
    fn to_linear_layout(&self, shape: &[i64]) -> Result<LinearLayout> {
        let rank = self.rank();
        let names = standard_out_dim_names(rank);
        let thread_order = matrix_order(rank, !self.is_transposed);

        // (fast, slow) coordinates in thread order
        let (regs, lanes): (Vec<Vec<i32>>, Vec<Vec<i32>>) = if self.version == 1 {
            (
                vec![vec![0, 2], vec![0, 4], vec![0, 8]],
                vec![vec![1, 0], vec![2, 0], vec![4, 0], vec![8, 0], vec![0, 1]],
            )
        } else {
            (
                vec![vec![0, 1], vec![0, 2], vec![0, 4]],
                vec![vec![1, 0], vec![2, 0], vec![4, 0], vec![8, 0], vec![0, 8]],
            )
        };
        let mut tile = LinearLayout::new(
            vec![(Dim::REGISTER, regs), (Dim::LANE, lanes)],
            dims_in_order(&names, &thread_order[..2]),
        )?;
        if rank == 3 {
            tile = tile
                .try_mul(&LinearLayout::identity_1d(1, Dim::REGISTER, names[0].clone())?)?
                .try_mul(&LinearLayout::identity_1d(1, Dim::LANE, names[0].clone())?)?;
        }

        let warps = identity_standard_nd(Dim::WARP, &self.warps_per_cta, &matrix_order(rank, true))?;
        let rep = dims_in_order(&names, &self.rep_order());
        let cta = tile.transpose_outs(&rep)?.try_mul(&warps.transpose_outs(&rep)?)?;
        combine_cta_cga_with_shape(cta, &self.cta_layout, shape)
    }
}

/// Layout of operand `op_idx` of a dot whose accumulator is `wmma`.
pub(crate) fn wmma_dot_to_linear_layout(
    wmma: &AmdWmmaEncoding,
    op_idx: u32,
    k_width: u32,
    shape: &[i64],
) -> Result<LinearLayout> {
    let rank = shape.len();
    let names = standard_out_dim_names(rank);
    let lane_order = order_for_dot_operand(op_idx, rank, true);
    let k_width = k_width as i32;

    let regs: Vec<Vec<i32>> = std::iter::successors(Some(1), |&i| Some(i * 2))
        .take_while(|&i| i < k_width)
        .map(|i| vec![i, 0])
        .collect();
    let mut lanes = vec![vec![0, 1], vec![0, 2], vec![0, 4], vec![0, 8]];
    // RDNA3 duplicates the operand in both half-waves.
    lanes.push(if wmma.version == 1 { vec![0, 0] } else { vec![k_width, 0] });

    let mut tile = LinearLayout::new(
        vec![(Dim::REGISTER, regs), (Dim::LANE, lanes)],
        dims_in_order(&names, &lane_order[..2]),
    )?;
    if rank == 3 {
        tile = tile
            .try_mul(&LinearLayout::identity_1d(1, Dim::REGISTER, names[0].clone())?)?
            .try_mul(&LinearLayout::identity_1d(1, Dim::LANE, names[0].clone())?)?;
    }

    let k_dim = if op_idx == 0 { rank - 1 } else { rank - 2 };
    let warps = broadcasted_dot_operand_layout(&wmma.warps_per_cta, &matrix_order(rank, true), k_dim, Dim::WARP)?;
    let rep = dims_in_order(&names, &order_for_dot_operand(op_idx, rank, true));
    let cta = tile.transpose_outs(&rep)?.try_mul(&warps.transpose_outs(&rep)?)?;
    combine_cta_cga_with_shape(cta, &wmma.cta_layout, shape)
}

// ============================================================================
// Special-purpose layouts
// ============================================================================

fn powers_of_two_from(start: i32, end: i64) -> impl Iterator<Item = i32> {
    std::iter::successors(Some(start), |&i| i.checked_mul(2)).take_while(move |&i| i64::from(i) < end)
}

/// Register layout of a dot operand read from LDS with `ds_read_b64_tr`.
///
/// The instruction lets 16 lanes each load 64 bits and transposes them, so
/// every thread ends up with consecutive K elements although memory is
/// contiguous along M/N. `elem_bit_width` is the width of the stored
/// element; 4-bit types use the packed FP4 variant.
pub fn choose_ds_read_b64_tr_layout(
    dot: &DotOperandEncoding,
    shape: &[i64],
    elem_bit_width: u32,
) -> Result<LinearLayout> {
    let Encoding::AmdMfma(mfma) = &*dot.parent else {
        return Err(Error::InvalidArgument {
            arg: "dot",
            reason: format!("ds_read_b64_tr needs an mfma parent, got {}", dot.parent.kind()),
        });
    };
    let rank = shape.len();
    if rank != mfma.rank() {
        return Err(Error::InvalidArgument {
            arg: "shape",
            reason: format!("rank {rank} differs from the encoding rank {}", mfma.rank()),
        });
    }
    let m_dim = mfma.m_dim as i32;
    if m_dim != 16 && m_dim != 32 {
        return Err(Error::InvalidArgument {
            arg: "dot",
            reason: format!("ds_read_b64_tr needs a 16 or 32 wide mfma, got {m_dim}"),
        });
    }
    let is_fp4 = elem_bit_width == 4;
    let elem_bits = if is_fp4 { 8 } else { elem_bit_width as i32 };
    if elem_bits != 8 && elem_bits != 16 {
        return Err(Error::InvalidArgument {
            arg: "elem_bit_width",
            reason: format!("ds_read_b64_tr reads 4, 8 or 16 bit elements, got {elem_bit_width}"),
        });
    }

    let names = standard_out_dim_names(rank);
    let order = order_for_dot_operand(dot.op_idx, rank, false);
    let k_dim_idx = if dot.op_idx == 0 { rank - 1 } else { rank - 2 };
    let k_size = shape[k_dim_idx];
    let is_mfma32 = m_dim == 32;
    let k_width = dot.k_width as i32;

    // Bases are (non-K, K) pairs.
    let mut regs: Vec<Vec<i32>> = Vec::new();
    let mut lanes: Vec<Vec<i32>> = Vec::new();
    if is_fp4 {
        regs.extend([vec![1, 0], vec![2, 0], vec![4, 0], vec![0, 16]]);
        let k_tile = if is_mfma32 { 64 } else { 128 };
        regs.extend(powers_of_two_from(k_tile, k_size).map(|k| vec![0, k]));
        lanes.extend([vec![0, 1], vec![0, 2], vec![0, 4], vec![0, 8]]);
        if is_mfma32 {
            lanes.extend([vec![8, 0], vec![0, 32]]);
        } else {
            lanes.extend([vec![0, 32], vec![0, 64]]);
        }
    } else {
        let k_per_read = 64 / elem_bits;
        regs.extend(powers_of_two_from(1, i64::from(k_per_read)).map(|i| vec![i, 0]));
        let threads_non_k = 16 / k_per_read;
        lanes.extend(powers_of_two_from(1, i64::from(threads_non_k)).map(|i| vec![i * k_per_read, 0]));
        lanes.extend(powers_of_two_from(1, i64::from(k_per_read)).map(|i| vec![0, i]));

        let elem_bytes = elem_bits / 8;
        let k_double = if is_mfma32 { 32 / elem_bytes } else { 64 / elem_bytes };
        let k_tile = k_width * MFMA_WARP_SIZE / m_dim;
        let num_subtiles = if k_tile == k_double { 2 } else { 1 };
        if num_subtiles == 2 {
            regs.push(vec![0, k_per_read]);
        }
        let regs_per_tile = i64::from(k_per_read * num_subtiles);
        let total_regs = (k_size / i64::from(k_tile.max(1))) * regs_per_tile;
        let mut reg = regs_per_tile;
        while reg < total_regs {
            regs.push(vec![0, ((reg / regs_per_tile) * i64::from(k_tile)) as i32]);
            reg *= 2;
        }

        let step = num_subtiles * k_per_read;
        if is_mfma32 {
            lanes.extend([vec![16, 0], vec![0, step]]);
        } else {
            lanes.extend([vec![0, step], vec![0, 2 * step]]);
        }
    }

    let mut tile = LinearLayout::new(
        vec![(Dim::REGISTER, regs), (Dim::LANE, lanes)],
        dims_in_order(&names, &order[..2]),
    )?;
    if rank == 3 {
        tile = tile
            .try_mul(&LinearLayout::identity_1d(1, Dim::REGISTER, names[0].clone())?)?
            .try_mul(&LinearLayout::identity_1d(1, Dim::LANE, names[0].clone())?)?;
    }
    let warps = identity_standard_nd(Dim::WARP, &mfma.warps_per_cta, &matrix_order(rank, true))?;
    let cta = tile.transpose_outs(&names)?.try_mul(&warps.transpose_outs(&names)?)?;
    combine_cta_cga_with_shape(cta, &mfma.cta_layout, shape)
}

/// Layout of the scale tensor of a scaled MFMA.
///
/// `shape` is the scale tensor shape `[MN, K / 32]`; each lane holds the
/// scales of its M/N row for the K blocks it consumes.
pub fn choose_scaled_mfma_scale_layout(
    op_idx: u32,
    shape: &[i64],
    m_dim: u32,
    tiles_per_warp: &[u32],
    warps_per_cta: &[u32],
) -> Result<LinearLayout> {
    if shape.len() != 2 || tiles_per_warp.len() != 2 || warps_per_cta.len() != 2 {
        return Err(Error::InvalidArgument {
            arg: "shape",
            reason: format!("scale layouts are rank 2, got shape {shape:?}"),
        });
    }
    if m_dim != 16 && m_dim != 32 {
        return Err(Error::InvalidArgument {
            arg: "m_dim",
            reason: format!("scaled mfma is 16 or 32 wide, got {m_dim}"),
        });
    }
    let rank = 2;
    let names = standard_out_dim_names(rank);
    let order = matrix_order(rank, true);
    let mn_dim = if op_idx == 0 { rank - 2 } else { rank - 1 };
    let tiles_mn = tiles_per_warp[mn_dim] as i64;
    let m = m_dim as i32;
    let k_size = shape[1];
    let threads_in_k = if m == 32 { 2 } else { 4 };

    // Bases are (K, MN) pairs.
    let mut regs: Vec<Vec<i32>> = powers_of_two_from(threads_in_k, k_size)
        .map(|k| vec![k, 0])
        .collect();
    regs.extend(powers_of_two_from(m, tiles_mn * i64::from(m)).map(|mn| vec![0, mn]));
    let lanes: Vec<Vec<i32>> = if m == 32 {
        vec![vec![0, 1], vec![0, 2], vec![0, 4], vec![0, 8], vec![0, 16], vec![1, 0]]
    } else {
        vec![vec![0, 1], vec![0, 2], vec![0, 4], vec![0, 8], vec![1, 0], vec![2, 0]]
    };
    let tile = LinearLayout::new(
        vec![(Dim::REGISTER, regs), (Dim::LANE, lanes)],
        dims_in_order(&names, &order),
    )?;

    let (warps, warp_order) = if op_idx == 1 {
        ([warps_per_cta[1], warps_per_cta[0]], [0, 1])
    } else {
        ([warps_per_cta[0], warps_per_cta[1]], [1, 0])
    };
    let warps = identity_standard_nd(Dim::WARP, &warps, &warp_order)?;
    let cta = tile.transpose_outs(&names)?.try_mul(&warps.transpose_outs(&names)?)?;
    combine_cta_cga_with_shape(cta, &CtaLayout::single(rank), shape)
}

/// A store layout for an MFMA accumulator that gives each thread 128-bit
/// contiguous chunks, when one exists.
///
/// Applies to transposed CDNA4 f16/bf16 accumulators that are 32x32, or
/// 16x16 with a single warp along N and at least 32 columns. The layout
/// permutes column bits of the accumulator so that the register bits come
/// before the lane bits along N. Returns `None` when the accumulator does
/// not qualify.
pub fn choose_mfma_like_store_layout(
    encoding: &Encoding,
    shape: &[i64],
    dtype: DType,
) -> Result<Option<LinearLayout>> {
    let Encoding::AmdMfma(mfma) = encoding else {
        return Ok(None);
    };
    if shape.len() != 2 || !matches!(dtype, DType::F16 | DType::BF16) || mfma.version != 4 || !mfma.is_transposed {
        return Ok(None);
    }
    let is_mfma32 = mfma.m_dim == 32 && mfma.n_dim == 32;
    let is_mfma16 = mfma.m_dim == 16 && mfma.n_dim == 16 && shape[1] >= 32 && mfma.warps_per_cta[1] == 1;
    if !is_mfma32 && !is_mfma16 {
        return Ok(None);
    }

    let n = shape[1];
    if n <= 0 || !(n as u64).is_power_of_two() {
        return Err(Error::not_power_of_two("tensor dimension", n));
    }
    let swap_with = if is_mfma32 { 3 } else { 4 };
    let mut dim1_bases: Vec<Basis> = (0..n.trailing_zeros()).map(|i| smallvec![1 << i]).collect();
    if dim1_bases.len() <= swap_with {
        return Ok(None);
    }
    dim1_bases.swap(2, swap_with);

    let mfma_layout = mfma.to_linear_layout(shape)?;
    let swap = LinearLayout::identity_1d(shape[0] as i32, Dim::out(0), Dim::out(0))?
        .try_mul(&LinearLayout::new(vec![(Dim::out(1), dim1_bases)], vec![Dim::out(1)])?)?;
    Ok(Some(mfma_layout.compose(&swap)?))
}
