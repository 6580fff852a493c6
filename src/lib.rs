//! # linlayout
//!
//! **Linear layouts over GF(2) for GPU tensor code generation.**
//!
//! A GPU kernel spreads every tensor over registers, lanes, warps and
//! blocks, or lays it out in shared memory. linlayout describes each such
//! distribution as a [`LinearLayout`](layout::LinearLayout): a bit-linear
//! map from hardware indices to tensor coordinates. With layouts in hand,
//! shape operations that keep data in place (reshape, broadcast, join,
//! split, expand-dims, transpose, memory sub-views) lower to a pure
//! reindexing of each thread's values.
//!
//! ## Components
//!
//! - [`layout`]: the layout algebra (product, composition, inversion,
//!   reshaping, transposition) and shape-fitting helpers
//! - [`encoding`]: tensor encodings (blocked, NVIDIA MMA, AMD MFMA/WMMA,
//!   dot operands, slices, shared-memory swizzles) and their layouts
//! - [`cache`] / [`context`]: memoized layout construction for a target
//! - [`lowering`]: register permutations and memory-descriptor arithmetic
//!   for view operations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use linlayout::prelude::*;
//!
//! let ctx = LayoutContext::new(TargetConfig::NVIDIA)?;
//! let enc = BlockedEncoding::default_for(&[64, 64], &[1, 4], ctx.config())?;
//! let ty = TensorType::new(&[64, 64], enc, DType::F16)?;
//!
//! let layout = ctx.tensor_layout(&ty)?;
//! println!("{layout}");
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: `Serialize`/`Deserialize` for encodings, element types and
//!   target configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod context;
pub mod dtype;
pub mod encoding;
pub mod error;
pub mod layout;
pub mod lowering;
pub mod types;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Arch, TargetConfig};
    pub use crate::context::LayoutContext;
    pub use crate::dtype::DType;
    pub use crate::encoding::{
        AmdMfmaEncoding, AmdRotatingSharedEncoding, AmdWmmaEncoding, BlockedEncoding, CtaLayout,
        DotOperandEncoding, Encoding, NvidiaMmaEncoding, NvmmaSharedEncoding, PaddedSharedEncoding,
        SliceEncoding, SwizzledSharedEncoding,
    };
    pub use crate::error::{Error, Result};
    pub use crate::layout::{Dim, LinearLayout};
    pub use crate::lowering::SharedMemoryObject;
    pub use crate::types::{MemDescType, TensorType};
}
