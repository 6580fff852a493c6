//! Blocked encoding

use super::{check_order, check_powers_of_two, check_rank, combine_cta_cga_with_shape};
use super::{CtaLayout, Dims, ToLinearLayout};
use crate::config::TargetConfig;
use crate::error::{Error, Result};
use crate::layout::{identity_standard_nd, Dim, LinearLayout};

/// Each thread owns a `size_per_thread` tile; lanes and warps tile those
/// tiles, all walking the axes in `order` (fastest first).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockedEncoding {
    /// Contiguous elements per thread along each axis
    pub size_per_thread: Dims,
    /// Lanes along each axis
    pub threads_per_warp: Dims,
    /// Warps along each axis
    pub warps_per_cta: Dims,
    /// Axes from fastest to slowest varying
    pub order: Dims,
    /// Distribution over the cluster
    pub cta_layout: CtaLayout,
}

impl BlockedEncoding {
    /// Create a blocked encoding, validating its parameters.
    pub fn new(
        size_per_thread: &[u32],
        threads_per_warp: &[u32],
        warps_per_cta: &[u32],
        order: &[u32],
        cta_layout: CtaLayout,
    ) -> Result<Self> {
        let enc = Self {
            size_per_thread: Dims::from_slice(size_per_thread),
            threads_per_warp: Dims::from_slice(threads_per_warp),
            warps_per_cta: Dims::from_slice(warps_per_cta),
            order: Dims::from_slice(order),
            cta_layout,
        };
        enc.validate()?;
        Ok(enc)
    }

    /// The default blocked encoding of a target for `shape`.
    ///
    /// Lanes are assigned to the fastest axis first, then warps, each axis
    /// taking as many as it can hold before moving to the next one.
    pub fn default_for(shape: &[i64], size_per_thread: &[u32], config: &TargetConfig) -> Result<Self> {
        let rank = shape.len();
        if rank == 0 || size_per_thread.len() != rank {
            return Err(Error::InvalidArgument {
                arg: "size_per_thread",
                reason: format!("{size_per_thread:?} does not match shape {shape:?}"),
            });
        }
        let order: Dims = (0..rank as u32).rev().collect();
        let cta_layout = CtaLayout::single(rank);

        let mut threads_per_warp: Dims = smallvec::smallvec![1; rank];
        let mut warps_per_cta: Dims = smallvec::smallvec![1; rank];
        let mut remaining_lanes = config.warp_size;
        let mut remaining_warps = config.num_warps;
        let mut covered: Vec<i64> = shape
            .iter()
            .zip(size_per_thread)
            .map(|(&s, &spt)| (s / spt.max(1) as i64).max(1))
            .collect();

        for &dim in &order {
            let d = dim as usize;
            let lanes = (covered[d].min(remaining_lanes as i64) as u32).max(1);
            let lanes = prev_power_of_two(lanes);
            threads_per_warp[d] = lanes;
            remaining_lanes /= lanes;
            covered[d] = (covered[d] / lanes as i64).max(1);
        }
        // Leftover lanes go to the slowest axis, replicating data.
        threads_per_warp[order[rank - 1] as usize] *= remaining_lanes;

        for &dim in &order {
            let d = dim as usize;
            let warps = prev_power_of_two((covered[d].min(remaining_warps as i64) as u32).max(1));
            warps_per_cta[d] = warps;
            remaining_warps /= warps;
            covered[d] = (covered[d] / warps as i64).max(1);
        }
        warps_per_cta[order[rank - 1] as usize] *= remaining_warps;

        Self::new(
            size_per_thread,
            &threads_per_warp,
            &warps_per_cta,
            &order,
            cta_layout,
        )
    }

    /// Number of tensor axes
    pub fn rank(&self) -> usize {
        self.order.len()
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<()> {
        let rank = self.rank();
        check_rank(&self.size_per_thread, rank, "size_per_thread")?;
        check_rank(&self.threads_per_warp, rank, "threads_per_warp")?;
        check_rank(&self.warps_per_cta, rank, "warps_per_cta")?;
        check_powers_of_two(&self.size_per_thread, "size_per_thread")?;
        check_powers_of_two(&self.threads_per_warp, "threads_per_warp")?;
        check_powers_of_two(&self.warps_per_cta, "warps_per_cta")?;
        check_order(&self.order, rank, "order")?;
        self.cta_layout.validate()?;
        check_rank(&self.cta_layout.cta_order, rank, "cta_order")
    }

    /// The order in which repeated tiles are enumerated.
    pub fn rep_order(&self) -> &[u32] {
        &self.order
    }
}

fn prev_power_of_two(x: u32) -> u32 {
    if x == 0 {
        1
    } else {
        1 << (31 - x.leading_zeros())
    }
}

impl ToLinearLayout for BlockedEncoding {
    fn to_linear_layout(&self, shape: &[i64]) -> Result<LinearLayout> {
        let cta = identity_standard_nd(Dim::REGISTER, &self.size_per_thread, &self.order)?
            .try_mul(&identity_standard_nd(Dim::LANE, &self.threads_per_warp, &self.order)?)?
            .try_mul(&identity_standard_nd(Dim::WARP, &self.warps_per_cta, &self.order)?)?;
        combine_cta_cga_with_shape(cta, &self.cta_layout, shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_for_fills_fast_axis() {
        let enc = BlockedEncoding::default_for(&[64, 64], &[1, 4], &TargetConfig::NVIDIA).unwrap();
        assert_eq!(enc.threads_per_warp.as_slice(), &[2, 16]);
        assert_eq!(enc.warps_per_cta.as_slice(), &[4, 1]);

        let enc = BlockedEncoding::default_for(&[16], &[1], &TargetConfig::NVIDIA).unwrap();
        assert_eq!(enc.threads_per_warp.as_slice(), &[32]);
        assert_eq!(enc.warps_per_cta.as_slice(), &[4]);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(BlockedEncoding::new(&[3], &[32], &[4], &[0], CtaLayout::single(1)).is_err());
        assert!(BlockedEncoding::new(&[1, 1], &[32], &[4], &[0], CtaLayout::single(1)).is_err());
    }

    #[test]
    fn test_prev_power_of_two() {
        assert_eq!(prev_power_of_two(1), 1);
        assert_eq!(prev_power_of_two(6), 4);
        assert_eq!(prev_power_of_two(32), 32);
    }
}
