//! Slice encoding: a parent layout with one axis reduced away

use super::{CtaLayout, Dims, Encoding, ToLinearLayout};
use crate::error::{Error, Result};
use crate::layout::{standard_out_dim_names, Dim, LinearLayout};

/// The layout of `parent` restricted to the hyperplane `dim == 0`.
///
/// Threads that held different coordinates along `dim` end up holding the
/// same element, which is how reductions produce their results.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SliceEncoding {
    /// The removed axis of the parent
    pub dim: u32,
    /// Encoding of the unsliced tensor
    pub parent: Box<Encoding>,
}

impl SliceEncoding {
    /// Create a slice encoding, validating its parameters.
    pub fn new(dim: u32, parent: impl Into<Encoding>) -> Result<Self> {
        let enc = Self {
            dim,
            parent: Box::new(parent.into()),
        };
        enc.validate()?;
        Ok(enc)
    }

    /// Number of tensor axes
    pub fn rank(&self) -> usize {
        self.parent.rank().saturating_sub(1)
    }

    /// The parent's cluster distribution without the sliced axis.
    pub fn cta_layout(&self) -> CtaLayout {
        let parent = self.parent.cta_layout();
        let dim = self.dim as usize;
        let drop_dim = |v: &Dims| -> Dims {
            v.iter()
                .enumerate()
                .filter(|&(i, _)| i != dim)
                .map(|(_, &x)| x)
                .collect()
        };
        CtaLayout {
            ctas_per_cga: drop_dim(&parent.ctas_per_cga),
            cta_split_num: drop_dim(&parent.cta_split_num),
            cta_order: parent
                .cta_order
                .iter()
                .filter(|&&o| o != self.dim)
                .map(|&o| if o > self.dim { o - 1 } else { o })
                .collect(),
        }
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<()> {
        if self.parent.is_shared() {
            return Err(Error::invalid_encoding(format!(
                "cannot slice a {} layout",
                self.parent.kind()
            )));
        }
        self.parent.validate()?;
        let parent_rank = self.parent.rank();
        if parent_rank < 2 || self.dim as usize >= parent_rank {
            return Err(Error::invalid_encoding(format!(
                "slice dim {} out of range for a rank {parent_rank} parent",
                self.dim
            )));
        }
        Ok(())
    }
}

impl ToLinearLayout for SliceEncoding {
    fn to_linear_layout(&self, shape: &[i64]) -> Result<LinearLayout> {
        let dim = self.dim as usize;
        let mut parent_shape = shape.to_vec();
        parent_shape.insert(dim, 1);
        let parent = self.parent.build(&parent_shape)?;

        // Project the parent's outputs onto the sliced axes; the removed axis
        // has size 1, so it maps onto a trivial dimension.
        let names = standard_out_dim_names(shape.len());
        let mut transform = LinearLayout::empty();
        for (idx, out_dim) in parent.out_dim_names().enumerate() {
            let size = parent.out_dim_size(out_dim);
            let piece = if idx == dim {
                LinearLayout::zeros_1d(size, out_dim.clone(), names[0].clone())?
            } else {
                let target = if idx < dim { idx } else { idx - 1 };
                LinearLayout::identity_1d(size, out_dim.clone(), names[target].clone())?
            };
            transform = transform.try_mul(&piece)?;
        }

        let ret = parent
            .compose(&transform)?
            .transpose_outs(&names)?
            .remove_zero_bases_along(&Dim::REGISTER)?;
        let got = ret.out_shape();
        if got != shape {
            return Err(Error::shape_mismatch(shape, &got));
        }
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::BlockedEncoding;

    fn blocked() -> BlockedEncoding {
        BlockedEncoding::new(&[1, 4], &[4, 8], &[2, 2], &[1, 0], CtaLayout::single(2)).unwrap()
    }

    #[test]
    fn test_slice_of_blocked() {
        let slice = SliceEncoding::new(0, blocked()).unwrap();
        let l = slice.to_linear_layout(&[64]).unwrap();
        assert_eq!(l.out_shape(), vec![64]);
        // registers along the removed axis vanish, lanes and warps broadcast
        assert_eq!(l.in_dim_size(&Dim::REGISTER), 4);
        assert_eq!(l.basis(&Dim::LANE, 3, &Dim::out(0)).unwrap(), 0);
        assert_eq!(l.basis(&Dim::WARP, 1, &Dim::out(0)).unwrap(), 0);
        assert_eq!(l.basis(&Dim::WARP, 0, &Dim::out(0)).unwrap(), 32);
    }

    #[test]
    fn test_slice_cta_layout_drops_axis() {
        let parent = BlockedEncoding::new(
            &[1, 1, 1],
            &[1, 4, 8],
            &[1, 2, 2],
            &[2, 1, 0],
            CtaLayout::new(&[2, 1, 2], &[2, 1, 1], &[2, 1, 0]).unwrap(),
        )
        .unwrap();
        let slice = SliceEncoding::new(1, parent).unwrap();
        let cta = slice.cta_layout();
        assert_eq!(cta.ctas_per_cga.as_slice(), &[2, 2]);
        assert_eq!(cta.cta_split_num.as_slice(), &[2, 1]);
        assert_eq!(cta.cta_order.as_slice(), &[1, 0]);
    }

    #[test]
    fn test_rejects_out_of_range_dim() {
        assert!(SliceEncoding::new(2, blocked()).is_err());
    }
}
