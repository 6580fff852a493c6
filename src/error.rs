//! Error types for linlayout
//!
//! Errors fall into two tiers:
//!
//! - **Fatal** invariant violations raised by the layout algebra and the
//!   layout constructors (non-power-of-two sizes, mismatched dimension sets,
//!   a combined layout that does not cover the requested shape). These mean
//!   the caller handed over an inconsistent encoding/shape pair; the
//!   compilation of the current function must stop.
//! - **Recoverable** failures raised by the lowering rules when an input is
//!   valid but not supported without cross-thread data movement. The driver
//!   may pick another lowering or report a diagnostic for that operation.
//!
//! Use [`Error::is_fatal`] to tell the two apart.

use crate::layout::Dim;
use thiserror::Error;

/// Result type alias using linlayout's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or using layouts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A dimension size that must be a power of two is not
    #[error("{what} must be a power of two, got {value}")]
    NotPowerOfTwo {
        /// What was being sized
        what: &'static str,
        /// The offending value
        value: i64,
    },

    /// Two dimension lists that must agree (as sets or exactly) do not
    #[error("Dimension mismatch in {op}: expected {expected:?}, got {got:?}")]
    DimMismatch {
        /// Operation that found the mismatch
        op: &'static str,
        /// Expected dimension names
        expected: Vec<Dim>,
        /// Actual dimension names
        got: Vec<Dim>,
    },

    /// A dimension was looked up but is not part of the layout
    #[error("Unknown {kind} dimension '{dim}'")]
    UnknownDim {
        /// "input" or "output"
        kind: &'static str,
        /// The missing dimension
        dim: Dim,
    },

    /// The bases of a layout that must be surjective do not span its outputs
    #[error("Layout is not surjective: bases span {rank} of {out_bits} output bits")]
    NotSurjective {
        /// GF(2) rank of the basis matrix
        rank: u32,
        /// Total number of output bits
        out_bits: u32,
    },

    /// A basis vector points outside its output dimension
    #[error("Basis {index} of '{in_dim}' has value {value} along '{out_dim}' of size {size}")]
    BasisOutOfRange {
        /// Input dimension owning the basis
        in_dim: Dim,
        /// Bit index of the basis
        index: usize,
        /// Output dimension
        out_dim: Dim,
        /// Offending value
        value: i32,
        /// Size of the output dimension
        size: i32,
    },

    /// A constructed layout does not match the requested tensor shape
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Requested shape
        expected: Vec<i64>,
        /// Shape covered by the layout
        got: Vec<i64>,
    },

    /// An encoding's structural parameters are inconsistent
    #[error("Invalid encoding: {reason}")]
    InvalidEncoding {
        /// Description of the violated invariant
        reason: String,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// A view operation would need cross-thread data movement
    #[error("expensive view not supported on {op}")]
    ExpensiveView {
        /// Operation being lowered
        op: &'static str,
    },

    /// The operation is valid but this lowering does not handle it
    #[error("{op} not supported: {reason}")]
    Unsupported {
        /// Operation being lowered
        op: &'static str,
        /// Description of the limitation
        reason: String,
    },

    /// A constant array does not have one value per owned element
    #[error("constant array has {got} values but each thread owns {expected} elements")]
    ConstantSizeMismatch {
        /// Elements per thread
        expected: usize,
        /// Values provided
        got: usize,
    },

    /// Internal consistency error (a bug in linlayout or its caller)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a power-of-two error
    pub fn not_power_of_two(what: &'static str, value: impl Into<i64>) -> Self {
        Self::NotPowerOfTwo {
            what,
            value: value.into(),
        }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &[i64], got: &[i64]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create a dimension mismatch error
    pub fn dim_mismatch(op: &'static str, expected: &[Dim], got: &[Dim]) -> Self {
        Self::DimMismatch {
            op,
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create an invalid encoding error
    pub fn invalid_encoding(reason: impl Into<String>) -> Self {
        Self::InvalidEncoding {
            reason: reason.into(),
        }
    }

    /// Create an unsupported-lowering error
    pub fn unsupported(op: &'static str, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            op,
            reason: reason.into(),
        }
    }

    /// Whether this error is an invariant violation that must abort compilation
    /// of the current function.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ExpensiveView { .. } | Self::Unsupported { .. } | Self::ConstantSizeMismatch { .. }
        )
    }
}
