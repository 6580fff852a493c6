//! Layout context: target configuration plus the layout cache
//!
//! One [`LayoutContext`] lives as long as the compilation it serves. It is
//! `Send + Sync`, so a driver compiling several functions in parallel may
//! share it behind an `Arc`.

use crate::cache::{CacheStats, LayoutCache};
use crate::config::TargetConfig;
use crate::encoding::Encoding;
use crate::error::{Error, Result};
use crate::layout::{Dim, LinearLayout};
use crate::types::{MemDescType, TensorType};
use std::sync::Arc;

/// Owns the layout cache of one compilation.
#[derive(Debug)]
pub struct LayoutContext {
    config: TargetConfig,
    cache: LayoutCache,
}

impl LayoutContext {
    /// Create a context for `config`
    pub fn new(config: TargetConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cache: LayoutCache::new(),
        })
    }

    /// Target configuration
    #[inline]
    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    /// Cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Layout of `encoding` at `shape`, memoized.
    ///
    /// `alloc_shape` must be empty for distributed encodings (see
    /// [`Encoding::to_linear_layout`]).
    pub fn to_linear_layout(
        &self,
        shape: &[i64],
        encoding: &Encoding,
        alloc_shape: &[i64],
    ) -> Result<Arc<LinearLayout>> {
        if !self.config.verify_layouts {
            return self.cache.get_or_build(shape, encoding, alloc_shape);
        }
        let expected = if encoding.is_shared() {
            &alloc_shape[alloc_shape.len().saturating_sub(shape.len())..]
        } else {
            shape
        };
        self.cache
            .get_or_build_with(shape, encoding, alloc_shape, |layout| {
                self.verify(encoding, expected, layout)
            })
    }

    /// Layout of a register-resident tensor
    pub fn tensor_layout(&self, ty: &TensorType) -> Result<Arc<LinearLayout>> {
        self.to_linear_layout(&ty.shape, &ty.encoding, &[])
    }

    /// Layout of a memory descriptor, built over its allocation shape
    pub fn memdesc_layout(&self, ty: &MemDescType) -> Result<Arc<LinearLayout>> {
        self.to_linear_layout(&ty.shape, &ty.encoding, &ty.alloc_shape)
    }

    /// Number of elements each thread owns
    pub fn elems_per_thread(&self, ty: &TensorType) -> Result<usize> {
        Ok(self.tensor_layout(ty)?.in_dim_size(&Dim::REGISTER) as usize)
    }

    fn verify(&self, encoding: &Encoding, expected: &[i64], layout: LinearLayout) -> Result<LinearLayout> {
        let got = layout.out_shape();
        if got != expected {
            return Err(Error::shape_mismatch(expected, &got));
        }
        if !layout.is_surjective() {
            return Err(Error::Internal(format!(
                "{} layout does not cover its shape {expected:?}",
                encoding.kind()
            )));
        }
        if encoding.is_distributed() {
            for (dim, want) in [
                (Dim::LANE, self.config.warp_size),
                (Dim::WARP, self.config.num_warps),
            ] {
                let have = layout.in_dim_size(&dim);
                if layout.has_in_dim(&dim) && have as u32 != want {
                    return Err(Error::InvalidArgument {
                        arg: "encoding",
                        reason: format!(
                            "{} layout has {have} {dim} values but the target has {want}",
                            encoding.kind()
                        ),
                    });
                }
            }
        }
        Ok(layout)
    }
}
