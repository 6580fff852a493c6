//! NVIDIA `mma` (Ampere) and `wgmma` (Hopper) accumulator layouts

use super::dot_operand::broadcasted_dot_operand_layout;
use super::{check_powers_of_two, check_rank, combine_cta_cga_with_shape};
use super::{CtaLayout, Dims, ToLinearLayout};
use crate::error::{Error, Result};
use crate::layout::{
    identity_standard_nd, matrix_order, order_for_dot_operand, standard_out_dim_names, Dim,
    LinearLayout,
};

/// Generation of the NVIDIA matrix instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NvidiaMmaVersion {
    /// `mma.sync` (sm_80+), version 2
    Ampere,
    /// `wgmma` (sm_90), version 3
    Hopper,
}

/// Accumulator layout of an NVIDIA matrix instruction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NvidiaMmaEncoding {
    /// Instruction generation
    pub version: NvidiaMmaVersion,
    /// Warps along each axis
    pub warps_per_cta: Dims,
    /// Ampere: the output tile per axis (`[16, 8]`). Hopper: `[M, N, K]`.
    pub instr_shape: Dims,
    /// Distribution over the cluster
    pub cta_layout: CtaLayout,
}

impl NvidiaMmaEncoding {
    /// Create an encoding, validating its parameters.
    pub fn new(
        version: NvidiaMmaVersion,
        warps_per_cta: &[u32],
        instr_shape: &[u32],
        cta_layout: CtaLayout,
    ) -> Result<Self> {
        let enc = Self {
            version,
            warps_per_cta: Dims::from_slice(warps_per_cta),
            instr_shape: Dims::from_slice(instr_shape),
            cta_layout,
        };
        enc.validate()?;
        Ok(enc)
    }

    /// Ampere `mma.sync.m16n8` accumulator with the given warps.
    pub fn ampere(warps_per_cta: &[u32]) -> Result<Self> {
        let rank = warps_per_cta.len();
        let mut instr: Dims = smallvec::smallvec![1; rank];
        if rank >= 2 {
            instr[rank - 2] = 16;
            instr[rank - 1] = 8;
        }
        Self::new(
            NvidiaMmaVersion::Ampere,
            warps_per_cta,
            &instr,
            CtaLayout::single(rank),
        )
    }

    /// Number of tensor axes
    pub fn rank(&self) -> usize {
        self.warps_per_cta.len()
    }

    /// Whether this is an Ampere (`mma.sync`) layout
    pub fn is_ampere(&self) -> bool {
        self.version == NvidiaMmaVersion::Ampere
    }

    /// Whether this is a Hopper (`wgmma`) layout
    pub fn is_hopper(&self) -> bool {
        self.version == NvidiaMmaVersion::Hopper
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<()> {
        let rank = self.rank();
        if rank < 2 {
            return Err(Error::invalid_encoding(format!(
                "mma layouts need rank 2 or 3, got {rank}"
            )));
        }
        check_powers_of_two(&self.warps_per_cta, "warps_per_cta")?;
        match self.version {
            NvidiaMmaVersion::Ampere => check_rank(&self.instr_shape, rank, "instr_shape")?,
            NvidiaMmaVersion::Hopper => {
                check_rank(&self.instr_shape, 3, "instr_shape")?;
                if rank != 2 {
                    return Err(Error::invalid_encoding("wgmma layouts are rank 2"));
                }
            }
        }
        self.cta_layout.validate()?;
        check_rank(&self.cta_layout.cta_order, rank, "cta_order")
    }

    /// Output tile of one instruction, per axis.
    pub fn tile_shape(&self) -> Dims {
        match self.version {
            NvidiaMmaVersion::Ampere => self.instr_shape.clone(),
            NvidiaMmaVersion::Hopper => Dims::from_slice(&self.instr_shape[..2]),
        }
    }

    /// Order in which repeated tiles are enumerated.
    pub fn rep_order(&self) -> Vec<u32> {
        matrix_order(self.rank(), true)
    }

    /// Order in which repeated tiles of operand `op_idx` are enumerated.
    pub fn rep_order_for_operand(&self, op_idx: u32) -> Vec<u32> {
        order_for_dot_operand(op_idx, self.rank(), true)
    }

    /// Order in which warps are assigned.
    pub fn warp_order(&self) -> Vec<u32> {
        matrix_order(self.rank(), !self.is_hopper())
    }
}

/// Register and lane layout of one `mma`-style tile.
///
/// Along the `order[0]` axis each thread holds `k_width` consecutive
/// values, 4 lanes cover `4 * k_width` columns, then 8 lanes walk the
/// `order[1]` axis; registers repeat the pattern over the rest of the tile,
/// outer axis first. Output dimensions are registered in `rep_order`.
pub fn nvidia_mma_tile(tile_shape: &[u32], k_width: u32, order: &[u32], rep_order: &[u32]) -> Result<LinearLayout> {
    let rank = rep_order.len();
    if rank < 2 || tile_shape.len() != rank || order.len() < 2 {
        return Err(Error::InvalidArgument {
            arg: "tile_shape",
            reason: format!("tile {tile_shape:?} with order {order:?} is not a matrix tile"),
        });
    }
    let names = standard_out_dim_names(rank);
    let trivial = vec![1u32; rank];
    let cta = identity_standard_nd(Dim::REGISTER, &trivial, rep_order)?;

    let inner = order[0] as usize;
    let outer = order[1] as usize;
    let m = tile_shape[outer];
    let n = tile_shape[inner];
    if m % 8 != 0 || n % (k_width * 4) != 0 {
        return Err(Error::invalid_encoding(format!(
            "tile {m}x{n} is not a multiple of 8x{}",
            k_width * 4
        )));
    }

    let id = |size: u32, in_dim: Dim, axis: usize| LinearLayout::identity_1d(size as i32, in_dim, names[axis].clone());
    cta.try_mul(&id(k_width, Dim::REGISTER, inner)?)?
        .try_mul(&id(4, Dim::LANE, inner)?)?
        .try_mul(&id(8, Dim::LANE, outer)?)?
        .try_mul(&id(m / 8, Dim::REGISTER, outer)?)?
        .try_mul(&id(n / (k_width * 4), Dim::REGISTER, inner)?)
}

impl ToLinearLayout for NvidiaMmaEncoding {
    fn to_linear_layout(&self, shape: &[i64]) -> Result<LinearLayout> {
        // The accumulator always packs two values per thread along N.
        const K_WIDTH: u32 = 2;
        let rank = self.rank();
        let order = matrix_order(rank, true);
        let cta = nvidia_mma_tile(&self.tile_shape(), K_WIDTH, &order, &self.rep_order())?;
        let outs: Vec<Dim> = cta.out_dim_names().cloned().collect();
        let warps = identity_standard_nd(Dim::WARP, &self.warps_per_cta, &self.warp_order())?
            .transpose_outs(&outs)?;
        combine_cta_cga_with_shape(cta.try_mul(&warps)?, &self.cta_layout, shape)
    }
}

/// Layout of operand `op_idx` of an NVIDIA dot whose accumulator is `mma`.
pub(crate) fn nvidia_dot_to_linear_layout(
    mma: &NvidiaMmaEncoding,
    op_idx: u32,
    k_width: u32,
    cta_layout: &CtaLayout,
    shape: &[i64],
) -> Result<LinearLayout> {
    let rank = shape.len();
    let is_a = op_idx == 0;
    let mut tile: Vec<u32> = vec![1; rank];
    if is_a {
        tile[rank - 2] = 16;
        tile[rank - 1] = k_width * 8;
    } else {
        if !mma.is_ampere() {
            return Err(Error::invalid_encoding(
                "wgmma reads operand B from shared memory",
            ));
        }
        tile[rank - 2] = k_width * 8;
        tile[rank - 1] = 8;
    }
    let order = order_for_dot_operand(op_idx, rank, true);
    let cta = nvidia_mma_tile(&tile, k_width, &order, &mma.rep_order_for_operand(op_idx))?;
    let k_dim = if is_a { rank - 1 } else { rank - 2 };
    let outs: Vec<Dim> = cta.out_dim_names().cloned().collect();
    let warps = broadcasted_dot_operand_layout(&mma.warps_per_cta, &mma.warp_order(), k_dim, Dim::WARP)?
        .transpose_outs(&outs)?;
    combine_cta_cga_with_shape(cta.try_mul(&warps)?, cta_layout, shape)
}
