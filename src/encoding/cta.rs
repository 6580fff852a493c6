//! Distribution of a tensor over the CTAs of a cluster

use super::{check_order, check_powers_of_two, Dims};
use crate::error::{Error, Result};
use crate::layout::{
    ensure_layout_not_larger_than, ensure_layout_not_smaller_than, standard_out_dim_names,
    utils::labeled_shape, Dim, LinearLayout,
};
use smallvec::smallvec;

/// How the CTAs of a CGA (cluster) split a tensor.
///
/// Along axis `i`, the tensor is cut into `cta_split_num[i]` pieces owned by
/// distinct CTAs; the remaining `ctas_per_cga[i] / cta_split_num[i]` CTAs
/// hold replicas.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CtaLayout {
    /// CTAs along each axis
    pub ctas_per_cga: Dims,
    /// Distinct pieces along each axis
    pub cta_split_num: Dims,
    /// Axes from fastest to slowest varying block id
    pub cta_order: Dims,
}

impl CtaLayout {
    /// Create a CTA layout, validating its parameters.
    pub fn new(ctas_per_cga: &[u32], cta_split_num: &[u32], cta_order: &[u32]) -> Result<Self> {
        let layout = Self {
            ctas_per_cga: Dims::from_slice(ctas_per_cga),
            cta_split_num: Dims::from_slice(cta_split_num),
            cta_order: Dims::from_slice(cta_order),
        };
        layout.validate()?;
        Ok(layout)
    }

    /// A single CTA with row-major block order.
    pub fn single(rank: usize) -> Self {
        Self {
            ctas_per_cga: smallvec![1; rank],
            cta_split_num: smallvec![1; rank],
            cta_order: (0..rank as u32).rev().collect(),
        }
    }

    /// Number of tensor axes
    pub fn rank(&self) -> usize {
        self.cta_order.len()
    }

    /// Total number of CTAs
    pub fn num_ctas(&self) -> u32 {
        self.ctas_per_cga.iter().product()
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<()> {
        let rank = self.rank();
        if self.ctas_per_cga.len() != rank || self.cta_split_num.len() != rank {
            return Err(Error::invalid_encoding(format!(
                "CTA layout ranks differ: ctas_per_cga {:?}, cta_split_num {:?}, cta_order {:?}",
                self.ctas_per_cga, self.cta_split_num, self.cta_order
            )));
        }
        check_powers_of_two(&self.ctas_per_cga, "ctas_per_cga")?;
        check_powers_of_two(&self.cta_split_num, "cta_split_num")?;
        check_order(&self.cta_order, rank, "cta_order")?;
        for (ctas, split) in self.ctas_per_cga.iter().zip(&self.cta_split_num) {
            if ctas % split != 0 {
                return Err(Error::invalid_encoding(format!(
                    "{split} CTA splits do not divide {ctas} CTAs"
                )));
            }
        }
        Ok(())
    }

    /// The part of `shape` owned by one CTA.
    pub fn shape_per_cta(&self, shape: &[i64]) -> Vec<i64> {
        shape
            .iter()
            .zip(&self.cta_split_num)
            .map(|(&s, &split)| s / s.min(split as i64).max(1))
            .collect()
    }

    /// The same layout with axis `dim` left unsplit.
    pub fn unsplit_along(&self, dim: usize) -> Self {
        let mut ret = self.clone();
        if let Some(split) = ret.cta_split_num.get_mut(dim) {
            *split = 1;
        }
        ret
    }

    /// Map from block id to tensor coordinates.
    ///
    /// Along each axis the first `cta_split_num` blocks walk the tensor and
    /// the rest are replicas.
    pub fn to_linear_layout(&self) -> Result<LinearLayout> {
        let names = standard_out_dim_names(self.rank());
        let mut ret = LinearLayout::empty();
        for &dim in &self.cta_order {
            let dim = dim as usize;
            let split = self.cta_split_num[dim] as i32;
            let ctas = self.ctas_per_cga[dim] as i32;
            let piece = LinearLayout::identity_1d(split, Dim::BLOCK, names[dim].clone())?
                .try_mul(&LinearLayout::zeros_1d(ctas / split, Dim::BLOCK, names[dim].clone())?)?;
            ret = ret.try_mul(&piece)?;
        }
        ret.transpose_outs(&names)
    }
}

/// Stitch a per-CTA layout (`register`/`lane`/`warp` or `offset` inputs)
/// together with the cluster distribution and fit it to `shape`.
///
/// The CTA layout is replicated along its first input dimension where it is
/// smaller than the per-CTA shape, and broadcast where it is larger. The
/// result has standard output order and exactly `shape` as its output sizes.
pub fn combine_cta_cga_with_shape(cta: LinearLayout, cga: &CtaLayout, shape: &[i64]) -> Result<LinearLayout> {
    let rank = shape.len();
    if cta.num_out_dims() != rank || cga.rank() != rank {
        return Err(Error::InvalidArgument {
            arg: "shape",
            reason: format!(
                "rank {rank} differs from the CTA layout rank {} or the cluster rank {}",
                cta.num_out_dims(),
                cga.rank()
            ),
        });
    }
    for &size in shape {
        if size <= 0 || !(size as u64).is_power_of_two() {
            return Err(Error::not_power_of_two("tensor dimension", size));
        }
    }
    let names = standard_out_dim_names(rank);
    let labeled = labeled_shape(shape)?;
    let cta_outs: Vec<Dim> = cta.out_dim_names().cloned().collect();

    let cga_layout = ensure_layout_not_larger_than(&cga.to_linear_layout()?, &labeled, true)?
        .transpose_outs(&cta_outs)?;

    let cta_shape: Vec<(Dim, i32)> = cta_outs
        .iter()
        .map(|d| {
            let wanted = labeled
                .iter()
                .find(|(n, _)| n == d)
                .map_or(1, |(_, s)| *s);
            (d.clone(), (wanted / cga_layout.out_dim_size(d)).max(1))
        })
        .collect();
    let cta = ensure_layout_not_smaller_than(&cta, &cta_shape)?;
    let cta = ensure_layout_not_larger_than(&cta, &cta_shape, true)?;

    let ret = cta.try_mul(&cga_layout)?.transpose_outs(&names)?;
    let got = ret.out_shape();
    if got != shape {
        return Err(Error::shape_mismatch(shape, &got));
    }
    Ok(ret)
}
