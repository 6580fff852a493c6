//! Target configuration
//!
//! A [`TargetConfig`] describes the execution hierarchy of the GPU a kernel
//! is compiled for. Encodings carry their own structural parameters; the
//! config supplies the defaults used when building an encoding from scratch
//! (see [`BlockedEncoding::default_for`](crate::encoding::BlockedEncoding::default_for))
//! and toggles the post-construction checks of a
//! [`LayoutContext`](crate::context::LayoutContext).

use crate::error::{Error, Result};

/// GPU architecture family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Arch {
    /// NVIDIA sm_80 / sm_86 / sm_89
    Ampere,
    /// NVIDIA sm_90
    Hopper,
    /// AMD gfx942
    Cdna3,
    /// AMD gfx950
    Cdna4,
    /// AMD gfx11
    Rdna3,
    /// AMD gfx12
    Rdna4,
}

impl Arch {
    /// Whether this is an NVIDIA architecture
    pub const fn is_nvidia(self) -> bool {
        matches!(self, Self::Ampere | Self::Hopper)
    }

    /// Natural warp (wavefront) size
    pub const fn warp_size(self) -> u32 {
        match self {
            Self::Cdna3 | Self::Cdna4 => 64,
            _ => 32,
        }
    }
}

/// Execution hierarchy of a compilation target.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetConfig {
    /// Architecture family
    pub arch: Arch,
    /// Threads per warp
    pub warp_size: u32,
    /// Warps per CTA
    pub num_warps: u32,
    /// CTAs per CGA (cluster)
    pub num_ctas: u32,
    /// Check every freshly built layout against its shape before caching it
    pub verify_layouts: bool,
}

impl TargetConfig {
    /// NVIDIA Ampere, 4 warps, no clusters
    pub const NVIDIA: Self = Self {
        arch: Arch::Ampere,
        warp_size: 32,
        num_warps: 4,
        num_ctas: 1,
        verify_layouts: true,
    };

    /// AMD CDNA3 (MI300), 64-wide wavefronts, 4 warps
    pub const AMD_CDNA: Self = Self {
        arch: Arch::Cdna3,
        warp_size: 64,
        num_warps: 4,
        num_ctas: 1,
        verify_layouts: true,
    };

    /// AMD RDNA3, 32-wide wavefronts, 4 warps
    pub const AMD_RDNA: Self = Self {
        arch: Arch::Rdna3,
        warp_size: 32,
        num_warps: 4,
        num_ctas: 1,
        verify_layouts: true,
    };

    /// Copy with a different warp count.
    pub const fn with_num_warps(mut self, num_warps: u32) -> Self {
        self.num_warps = num_warps;
        self
    }

    /// Copy with a different CTA count.
    pub const fn with_num_ctas(mut self, num_ctas: u32) -> Self {
        self.num_ctas = num_ctas;
        self
    }

    /// Total threads in a CTA
    #[inline]
    pub const fn threads_per_cta(&self) -> u32 {
        self.warp_size * self.num_warps
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<()> {
        for (what, value) in [
            ("warp_size", self.warp_size),
            ("num_warps", self.num_warps),
            ("num_ctas", self.num_ctas),
        ] {
            if !value.is_power_of_two() {
                return Err(Error::not_power_of_two(what, value));
            }
        }
        if self.warp_size != self.arch.warp_size() && self.arch.is_nvidia() {
            return Err(Error::InvalidArgument {
                arg: "warp_size",
                reason: format!("NVIDIA targets use 32-thread warps, got {}", self.warp_size),
            });
        }
        Ok(())
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self::NVIDIA
    }
}
