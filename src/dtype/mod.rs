//! Element types of tensors and memory descriptors
//!
//! Layout construction only cares about an element's bit width: it decides
//! vector widths of swizzled shared layouts, the tile height of f64 MFMA and
//! the packing of sub-byte types in memory.

use std::fmt;

/// Element type.
///
/// # Discriminant Values (Serialization Stability)
///
/// - Floats: 0-9 (F64=0, F32=1, F16=2, BF16=3, FP8E4M3=4, FP8E5M2=5, FP4E2M1=6)
/// - Signed ints: 10-19 (I64=10, I32=11, I16=12, I8=13)
/// - Unsigned ints: 20-29 (U64=20, U32=21, U16=22, U8=23)
/// - Bool: 30
///
/// Existing values are never changed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
#[repr(u8)]
pub enum DType {
    // Floating point types (0-9)
    /// 64-bit floating point
    F64 = 0,
    /// 32-bit floating point
    F32 = 1,
    /// 16-bit floating point (IEEE 754)
    F16 = 2,
    /// 16-bit brain floating point
    BF16 = 3,
    /// 8-bit floating point (1 sign + 4 exp + 3 mant)
    FP8E4M3 = 4,
    /// 8-bit floating point (1 sign + 5 exp + 2 mant)
    FP8E5M2 = 5,
    /// 4-bit floating point (1 sign + 2 exp + 1 mant), packed two per byte
    FP4E2M1 = 6,

    // Integer types
    /// 64-bit signed integer
    I64 = 10,
    /// 32-bit signed integer
    I32 = 11,
    /// 16-bit signed integer
    I16 = 12,
    /// 8-bit signed integer
    I8 = 13,

    // Unsigned integer types
    /// 64-bit unsigned integer
    U64 = 20,
    /// 32-bit unsigned integer
    U32 = 21,
    /// 16-bit unsigned integer
    U16 = 22,
    /// 8-bit unsigned integer
    U8 = 23,

    /// Boolean type (one byte in memory)
    Bool = 30,
}

impl DType {
    /// Width of one element in bits
    #[inline]
    pub const fn bit_width(self) -> u32 {
        match self {
            Self::F64 | Self::I64 | Self::U64 => 64,
            Self::F32 | Self::I32 | Self::U32 => 32,
            Self::F16 | Self::BF16 | Self::I16 | Self::U16 => 16,
            Self::FP8E4M3 | Self::FP8E5M2 | Self::I8 | Self::U8 | Self::Bool => 8,
            Self::FP4E2M1 => 4,
        }
    }

    /// Size of one element in bytes, rounding sub-byte types up
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        (self.bit_width() as usize).div_ceil(8)
    }

    /// Returns true if elements are packed several per byte
    #[inline]
    pub const fn is_sub_byte(self) -> bool {
        self.bit_width() < 8
    }

    /// Returns true if this is a floating point type
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(
            self,
            Self::F64
                | Self::F32
                | Self::F16
                | Self::BF16
                | Self::FP8E4M3
                | Self::FP8E5M2
                | Self::FP4E2M1
        )
    }

    /// Returns true if this is any integer type (signed or unsigned)
    #[inline]
    pub const fn is_int(self) -> bool {
        matches!(
            self,
            Self::I64 | Self::I32 | Self::I16 | Self::I8 | Self::U64 | Self::U32 | Self::U16 | Self::U8
        )
    }

    /// Short name for display (e.g., "f32", "i64")
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::FP8E4M3 => "fp8e4m3",
            Self::FP8E5M2 => "fp8e5m2",
            Self::FP4E2M1 => "fp4e2m1",
            Self::I64 => "i64",
            Self::I32 => "i32",
            Self::I16 => "i16",
            Self::I8 => "i8",
            Self::U64 => "u64",
            Self::U32 => "u32",
            Self::U16 => "u16",
            Self::U8 => "u8",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_widths() {
        assert_eq!(DType::F64.bit_width(), 64);
        assert_eq!(DType::BF16.bit_width(), 16);
        assert_eq!(DType::FP4E2M1.bit_width(), 4);
        assert_eq!(DType::FP4E2M1.size_in_bytes(), 1);
        assert!(DType::FP4E2M1.is_sub_byte());
        assert!(!DType::Bool.is_sub_byte());
    }

    #[test]
    fn test_display() {
        assert_eq!(DType::FP8E5M2.to_string(), "fp8e5m2");
        assert!(DType::U16.is_int());
        assert!(!DType::Bool.is_float());
    }
}
