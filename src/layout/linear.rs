//! The `LinearLayout` value type
//!
//! A linear layout is a function from named input dimensions (`register`,
//! `lane`, `warp`, `block`, ...) to named output dimensions (`dim0`, `dim1`,
//! ...). Every dimension has a power-of-two size, and the function is linear
//! over GF(2): the image of an input is the XOR of the basis vectors selected
//! by the input's set bits.
//!
//! ```
//! use linlayout::layout::{Dim, LinearLayout};
//!
//! # fn main() -> linlayout::error::Result<()> {
//! let l = LinearLayout::identity_1d(4, Dim::LANE, Dim::out(0))?;
//! let out = l.apply(&[(Dim::LANE, 3)])?;
//! assert_eq!(out, vec![(Dim::out(0), 3)]);
//! # Ok(())
//! # }
//! ```

use super::dim::Dim;
use super::solve::BitMatrix;
use crate::error::{Error, Result};
use smallvec::{smallvec, SmallVec};
use std::fmt;
use std::ops::{Mul, MulAssign};

/// One basis vector: one value per output dimension.
pub type Basis = SmallVec<[i32; 4]>;

/// Basis vectors of one input dimension, indexed by bit position.
pub type InDimBases = (Dim, Vec<Basis>);

/// A GF(2)-linear map between named power-of-two dimensions.
///
/// Input dimensions are stored in insertion order, each with one basis per
/// bit. Output dimensions are stored with their log2 size. Equality is
/// order-sensitive; use [`LinearLayout::equivalent`] to ignore dimension
/// order.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LinearLayout {
    bases: Vec<InDimBases>,
    out_dims: Vec<(Dim, u32)>,
    surjective: bool,
}

impl Default for LinearLayout {
    fn default() -> Self {
        Self::empty()
    }
}

// ============================================================================
// Construction
// ============================================================================

impl LinearLayout {
    /// The layout with no dimensions.
    pub fn empty() -> Self {
        Self {
            bases: Vec::new(),
            out_dims: Vec::new(),
            surjective: true,
        }
    }

    /// Build a layout from bases, inferring each output size as the smallest
    /// power of two strictly greater than every value along it.
    ///
    /// The result must be surjective.
    pub fn new<B: Into<Basis>>(bases: Vec<(Dim, Vec<B>)>, out_dim_names: Vec<Dim>) -> Result<Self> {
        let bases = convert_bases(bases);
        let sizes = infer_out_sizes(&bases, out_dim_names.len())?;
        Self::from_parts(bases, out_dim_names.into_iter().zip(sizes).collect(), true)
    }

    /// Build a layout from bases and explicit output sizes.
    pub fn with_out_dims<B: Into<Basis>>(
        bases: Vec<(Dim, Vec<B>)>,
        out_dims: Vec<(Dim, i32)>,
        require_surjective: bool,
    ) -> Result<Self> {
        Self::from_parts(convert_bases(bases), out_dims, require_surjective)
    }

    /// Build a layout from bases, inferring output sizes, without requiring
    /// surjectivity.
    pub fn with_inferred_sizes(bases: Vec<InDimBases>, out_dim_names: Vec<Dim>) -> Result<Self> {
        let sizes = infer_out_sizes(&bases, out_dim_names.len())?;
        Self::from_parts(bases, out_dim_names.into_iter().zip(sizes).collect(), false)
    }

    pub(crate) fn from_parts(
        bases: Vec<InDimBases>,
        out_dims: Vec<(Dim, i32)>,
        require_surjective: bool,
    ) -> Result<Self> {
        let mut log2_dims = Vec::with_capacity(out_dims.len());
        for (dim, size) in out_dims {
            if size <= 0 || !(size as u32).is_power_of_two() {
                return Err(Error::not_power_of_two("output dimension size", size));
            }
            log2_dims.push((dim, size.trailing_zeros()));
        }
        let mut layout = Self {
            bases,
            out_dims: log2_dims,
            surjective: false,
        };
        layout.check_invariants()?;
        layout.surjective = layout.rank()? == layout.total_out_bits();
        if require_surjective && !layout.surjective {
            return Err(Error::NotSurjective {
                rank: layout.rank()?,
                out_bits: layout.total_out_bits(),
            });
        }
        Ok(layout)
    }

    fn check_invariants(&self) -> Result<()> {
        for (i, (dim, _)) in self.bases.iter().enumerate() {
            if self.bases[..i].iter().any(|(d, _)| d == dim) {
                return Err(Error::InvalidArgument {
                    arg: "bases",
                    reason: format!("duplicate input dimension '{dim}'"),
                });
            }
        }
        for (i, (dim, _)) in self.out_dims.iter().enumerate() {
            if self.out_dims[..i].iter().any(|(d, _)| d == dim) {
                return Err(Error::InvalidArgument {
                    arg: "out_dims",
                    reason: format!("duplicate output dimension '{dim}'"),
                });
            }
        }
        if self.total_out_bits() > 62 {
            return Err(Error::Internal(format!(
                "layout has {} output bits, at most 62 are supported",
                self.total_out_bits()
            )));
        }
        for (in_dim, in_bases) in &self.bases {
            for (index, basis) in in_bases.iter().enumerate() {
                if basis.len() != self.out_dims.len() {
                    return Err(Error::InvalidArgument {
                        arg: "bases",
                        reason: format!(
                            "basis {index} of '{in_dim}' has {} values, expected {}",
                            basis.len(),
                            self.out_dims.len()
                        ),
                    });
                }
                for (&value, (out_dim, log2)) in basis.iter().zip(&self.out_dims) {
                    if value < 0 || (value as i64) >= (1i64 << log2) {
                        return Err(Error::BasisOutOfRange {
                            in_dim: in_dim.clone(),
                            index,
                            out_dim: out_dim.clone(),
                            value,
                            size: 1 << log2,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// `size` inputs mapped one-to-one onto `size` outputs.
    ///
    /// A size of 0 yields the empty layout; a size of 1 registers both
    /// dimensions with no bases.
    pub fn identity_1d(size: i32, in_dim: Dim, out_dim: Dim) -> Result<Self> {
        if size == 0 {
            return Ok(Self::empty());
        }
        if size < 0 || !(size as u32).is_power_of_two() {
            return Err(Error::not_power_of_two("identity_1d size", size));
        }
        let log2 = size.trailing_zeros();
        let bases = (0..log2).map(|i| smallvec![1 << i]).collect();
        Ok(Self {
            bases: vec![(in_dim, bases)],
            out_dims: vec![(out_dim, log2)],
            surjective: true,
        })
    }

    /// `size` inputs all mapped to output 0 of a size-1 output dimension.
    pub fn zeros_1d(size: i32, in_dim: Dim, out_dim: Dim) -> Result<Self> {
        Self::zeros_1d_with_out_size(size, in_dim, out_dim, 1)
    }

    /// `size` inputs all mapped to output 0 of a size-`out_size` output dimension.
    pub fn zeros_1d_with_out_size(size: i32, in_dim: Dim, out_dim: Dim, out_size: i32) -> Result<Self> {
        if size == 0 {
            return Ok(Self::empty());
        }
        if size < 0 || !(size as u32).is_power_of_two() {
            return Err(Error::not_power_of_two("zeros_1d size", size));
        }
        if out_size <= 0 || !(out_size as u32).is_power_of_two() {
            return Err(Error::not_power_of_two("zeros_1d output size", out_size));
        }
        let log2 = size.trailing_zeros();
        let bases = (0..log2).map(|_| smallvec![0]).collect();
        Ok(Self {
            bases: vec![(in_dim, bases)],
            out_dims: vec![(out_dim, out_size.trailing_zeros())],
            surjective: out_size == 1,
        })
    }

    /// Split into bases and `(name, size)` output dimensions.
    pub fn into_parts(self) -> (Vec<InDimBases>, Vec<(Dim, i32)>) {
        let outs = self.out_dims.into_iter().map(|(d, l)| (d, 1 << l)).collect();
        (self.bases, outs)
    }
}

fn convert_bases<B: Into<Basis>>(bases: Vec<(Dim, Vec<B>)>) -> Vec<InDimBases> {
    bases
        .into_iter()
        .map(|(dim, v)| (dim, v.into_iter().map(Into::into).collect()))
        .collect()
}

fn infer_out_sizes(bases: &[InDimBases], num_outs: usize) -> Result<Vec<i32>> {
    let mut sizes = vec![1i32; num_outs];
    for (in_dim, in_bases) in bases {
        for (index, basis) in in_bases.iter().enumerate() {
            if basis.len() != num_outs {
                return Err(Error::InvalidArgument {
                    arg: "bases",
                    reason: format!(
                        "basis {index} of '{in_dim}' has {} values, expected {num_outs}",
                        basis.len()
                    ),
                });
            }
            for (size, &value) in sizes.iter_mut().zip(basis.iter()) {
                if value >= 0 {
                    let above = (value as u32 + 1).next_power_of_two() as i32;
                    *size = (*size).max(above);
                }
            }
        }
    }
    Ok(sizes)
}

// ============================================================================
// Queries
// ============================================================================

impl LinearLayout {
    /// Input dimensions with their bases, in order.
    pub fn bases(&self) -> &[InDimBases] {
        &self.bases
    }

    /// Input dimension names, in order.
    pub fn in_dim_names(&self) -> impl Iterator<Item = &Dim> + '_ {
        self.bases.iter().map(|(d, _)| d)
    }

    /// Output dimension names, in order.
    pub fn out_dim_names(&self) -> impl Iterator<Item = &Dim> + '_ {
        self.out_dims.iter().map(|(d, _)| d)
    }

    /// `(name, size)` of every input dimension.
    pub fn in_dims(&self) -> Vec<(Dim, i32)> {
        self.bases
            .iter()
            .map(|(d, b)| (d.clone(), 1 << b.len()))
            .collect()
    }

    /// `(name, size)` of every output dimension.
    pub fn out_dims(&self) -> Vec<(Dim, i32)> {
        self.out_dims
            .iter()
            .map(|(d, l)| (d.clone(), 1 << l))
            .collect()
    }

    /// Output sizes in order, as a tensor shape.
    pub fn out_shape(&self) -> Vec<i64> {
        self.out_dims.iter().map(|(_, l)| 1i64 << l).collect()
    }

    /// Number of input dimensions
    pub fn num_in_dims(&self) -> usize {
        self.bases.len()
    }

    /// Number of output dimensions
    pub fn num_out_dims(&self) -> usize {
        self.out_dims.len()
    }

    /// Whether `dim` is an input dimension
    pub fn has_in_dim(&self, dim: &Dim) -> bool {
        self.bases.iter().any(|(d, _)| d == dim)
    }

    /// Whether `dim` is an output dimension
    pub fn has_out_dim(&self, dim: &Dim) -> bool {
        self.out_dims.iter().any(|(d, _)| d == dim)
    }

    /// Position of an input dimension
    pub fn in_dim_index(&self, dim: &Dim) -> Result<usize> {
        self.bases
            .iter()
            .position(|(d, _)| d == dim)
            .ok_or_else(|| Error::UnknownDim {
                kind: "input",
                dim: dim.clone(),
            })
    }

    /// Position of an output dimension
    pub fn out_dim_index(&self, dim: &Dim) -> Result<usize> {
        self.out_dims
            .iter()
            .position(|(d, _)| d == dim)
            .ok_or_else(|| Error::UnknownDim {
                kind: "output",
                dim: dim.clone(),
            })
    }

    /// Bases of one input dimension.
    pub fn in_dim_bases(&self, dim: &Dim) -> Result<&[Basis]> {
        let i = self.in_dim_index(dim)?;
        Ok(&self.bases[i].1)
    }

    /// A single basis value.
    pub fn basis(&self, in_dim: &Dim, bit: usize, out_dim: &Dim) -> Result<i32> {
        let bases = self.in_dim_bases(in_dim)?;
        let o = self.out_dim_index(out_dim)?;
        bases
            .get(bit)
            .map(|b| b[o])
            .ok_or_else(|| Error::InvalidArgument {
                arg: "bit",
                reason: format!("'{in_dim}' has {} bases, asked for {bit}", bases.len()),
            })
    }

    /// log2 of an input dimension's size; 0 for absent dimensions.
    pub fn in_dim_size_log2(&self, dim: &Dim) -> u32 {
        self.bases
            .iter()
            .find(|(d, _)| d == dim)
            .map_or(0, |(_, b)| b.len() as u32)
    }

    /// Size of an input dimension; 1 for absent dimensions.
    pub fn in_dim_size(&self, dim: &Dim) -> i32 {
        1 << self.in_dim_size_log2(dim)
    }

    /// log2 of an output dimension's size; 0 for absent dimensions.
    pub fn out_dim_size_log2(&self, dim: &Dim) -> u32 {
        self.out_dims
            .iter()
            .find(|(d, _)| d == dim)
            .map_or(0, |(_, l)| *l)
    }

    /// Size of an output dimension; 1 for absent dimensions.
    pub fn out_dim_size(&self, dim: &Dim) -> i32 {
        1 << self.out_dim_size_log2(dim)
    }

    /// Total number of input bits
    pub fn total_in_bits(&self) -> u32 {
        self.bases.iter().map(|(_, b)| b.len() as u32).sum()
    }

    /// Total number of output bits
    pub fn total_out_bits(&self) -> u32 {
        self.out_dims.iter().map(|(_, l)| *l).sum()
    }

    /// Product of all input dimension sizes
    pub fn total_in_size(&self) -> i64 {
        1i64 << self.total_in_bits()
    }

    /// Product of all output dimension sizes
    pub fn total_out_size(&self) -> i64 {
        1i64 << self.total_out_bits()
    }

    /// Whether every output is the image of some input.
    pub fn is_surjective(&self) -> bool {
        self.surjective
    }

    /// Whether distinct inputs always map to distinct outputs.
    pub fn is_injective(&self) -> bool {
        self.rank().map_or(false, |r| r == self.total_in_bits())
    }

    /// Whether the layout is a bijection.
    pub fn is_invertible(&self) -> bool {
        self.surjective && self.total_in_bits() == self.total_out_bits()
    }

    /// GF(2) rank of the flattened basis matrix.
    pub fn rank(&self) -> Result<u32> {
        Ok(self.bit_matrix()?.rank())
    }

    /// Columns of the basis matrix, one per input bit, as flattened outputs.
    pub(crate) fn bit_matrix(&self) -> Result<BitMatrix> {
        let columns = self
            .bases
            .iter()
            .flat_map(|(_, b)| b.iter())
            .map(|basis| self.flatten_out(basis))
            .collect();
        BitMatrix::new(columns, self.total_out_bits())
    }

    /// Pack an output coordinate into one integer, first out dim least significant.
    fn flatten_out(&self, basis: &[i32]) -> u64 {
        let mut flat = 0u64;
        let mut shift = 0;
        for (&v, (_, log2)) in basis.iter().zip(&self.out_dims) {
            flat |= (v as u64) << shift;
            shift += log2;
        }
        flat
    }

    fn unflatten_out(flat: u64, out_log2: &[u32]) -> Basis {
        let mut shift = 0;
        out_log2
            .iter()
            .map(|&log2| {
                let v = ((flat >> shift) & ((1u64 << log2) - 1)) as i32;
                shift += log2;
                v
            })
            .collect()
    }

    /// Whether `self` and `other` are the same function, ignoring dimension order.
    pub fn equivalent(&self, other: &Self) -> bool {
        if self.num_in_dims() != other.num_in_dims() || self.num_out_dims() != other.num_out_dims() {
            return false;
        }
        let ins: Vec<Dim> = self.in_dim_names().cloned().collect();
        let outs: Vec<Dim> = self.out_dim_names().cloned().collect();
        other
            .transpose_ins(&ins)
            .and_then(|l| l.transpose_outs(&outs))
            .map_or(false, |l| &l == self)
    }
}

// ============================================================================
// Evaluation
// ============================================================================

impl LinearLayout {
    /// Evaluate the layout. Unlisted input dimensions are taken as 0.
    pub fn apply(&self, ins: &[(Dim, i32)]) -> Result<Vec<(Dim, i32)>> {
        let out = self.apply_raw(ins.iter().map(|(d, v)| (d, *v)))?;
        Ok(self
            .out_dims
            .iter()
            .zip(out)
            .map(|((d, _), v)| (d.clone(), v))
            .collect())
    }

    pub(crate) fn apply_raw<'a>(&self, ins: impl IntoIterator<Item = (&'a Dim, i32)>) -> Result<Basis> {
        let mut out: Basis = smallvec![0; self.out_dims.len()];
        for (dim, value) in ins {
            let bases = self.in_dim_bases(dim)?;
            if value < 0 || (value as i64) >= (1i64 << bases.len()) {
                return Err(Error::InvalidArgument {
                    arg: "ins",
                    reason: format!("{value} is out of range for '{dim}' of size {}", 1i64 << bases.len()),
                });
            }
            for (bit, basis) in bases.iter().enumerate() {
                if (value >> bit) & 1 == 1 {
                    for (o, b) in out.iter_mut().zip(basis.iter()) {
                        *o ^= b;
                    }
                }
            }
        }
        Ok(out)
    }

    /// For each input dimension, the mask of input bits that never change
    /// the output given the bits before them.
    ///
    /// A layout is injective iff every mask is 0.
    pub fn free_variable_masks(&self) -> Result<Vec<(Dim, i32)>> {
        let free = self.bit_matrix()?.dependent_columns();
        let mut cursor = 0;
        Ok(self
            .bases
            .iter()
            .map(|(dim, b)| {
                let mut mask = 0;
                for bit in 0..b.len() {
                    if free[cursor] {
                        mask |= 1 << bit;
                    }
                    cursor += 1;
                }
                (dim.clone(), mask)
            })
            .collect())
    }

    /// Number of consecutive inputs of the first input dimension that map to
    /// consecutive outputs of the first output dimension.
    pub fn num_consecutive_in_out(&self) -> i32 {
        let Some((first_dim, first_bases)) = self.bases.first() else {
            return 1;
        };
        if self.out_dims.is_empty() {
            return 1;
        }
        let consec = first_bases
            .iter()
            .enumerate()
            .take_while(|(i, b)| b[0] == 1 << *i && b[1..].iter().all(|&x| x == 0))
            .count();
        let mut other_bits = 0;
        for (dim, bases) in &self.bases {
            for (i, basis) in bases.iter().enumerate() {
                if dim != first_dim || i >= consec {
                    other_bits |= basis[0];
                }
            }
        }
        let trailing = if other_bits != 0 {
            other_bits.trailing_zeros()
        } else {
            31
        };
        1 << (consec as u32).min(trailing)
    }
}

// ============================================================================
// Algebra
// ============================================================================

/// Merge two dimension orders, keeping the relative order of each.
///
/// Fails if a pair of common dimensions appears in opposite orders.
pub fn supremum(x: &[Dim], y: &[Dim]) -> Result<Vec<Dim>> {
    let mut result = Vec::with_capacity(x.len() + y.len());
    let (mut i, mut j) = (0, 0);
    while i < x.len() || j < y.len() {
        if i < x.len() && j < y.len() && x[i] == y[j] {
            result.push(x[i].clone());
            i += 1;
            j += 1;
        } else if i < x.len() && !y[j..].contains(&x[i]) {
            result.push(x[i].clone());
            i += 1;
        } else if j < y.len() && !x[i..].contains(&y[j]) {
            result.push(y[j].clone());
            j += 1;
        } else {
            return Err(Error::dim_mismatch("supremum", x, y));
        }
    }
    Ok(result)
}

impl LinearLayout {
    /// Direct sum of two layouts.
    ///
    /// Dimension orders are the [`supremum`] of the operands' orders. Bases
    /// of `outer` are shifted above `self`'s output bits, so for a shared
    /// output dimension `self` supplies the low bits.
    pub fn try_mul(&self, outer: &Self) -> Result<Self> {
        let self_ins: Vec<Dim> = self.in_dim_names().cloned().collect();
        let outer_ins: Vec<Dim> = outer.in_dim_names().cloned().collect();
        let self_outs: Vec<Dim> = self.out_dim_names().cloned().collect();
        let outer_outs: Vec<Dim> = outer.out_dim_names().cloned().collect();
        let in_order = supremum(&self_ins, &outer_ins)?;
        let out_order = supremum(&self_outs, &outer_outs)?;

        let out_dims: Vec<(Dim, u32)> = out_order
            .iter()
            .map(|d| {
                let l = self.out_dim_size_log2(d) + outer.out_dim_size_log2(d);
                (d.clone(), l)
            })
            .collect();

        let remap = |layout: &Self, basis: &Basis, shift_by_self: bool| -> Basis {
            out_order
                .iter()
                .map(|d| match layout.out_dims.iter().position(|(o, _)| o == d) {
                    Some(k) if shift_by_self => basis[k] << self.out_dim_size_log2(d),
                    Some(k) => basis[k],
                    None => 0,
                })
                .collect()
        };

        let mut bases = Vec::with_capacity(in_order.len());
        for dim in &in_order {
            let mut in_bases = Vec::new();
            if let Ok(b) = self.in_dim_bases(dim) {
                in_bases.extend(b.iter().map(|basis| remap(self, basis, false)));
            }
            if let Ok(b) = outer.in_dim_bases(dim) {
                in_bases.extend(b.iter().map(|basis| remap(outer, basis, true)));
            }
            bases.push((dim.clone(), in_bases));
        }

        let result = Self {
            bases,
            out_dims,
            surjective: self.surjective && outer.surjective,
        };
        if result.total_out_bits() > 62 {
            return Err(Error::Internal(format!(
                "product has {} output bits, at most 62 are supported",
                result.total_out_bits()
            )));
        }
        Ok(result)
    }

    /// `outer ∘ self`.
    ///
    /// `outer`'s input dimensions must be `self`'s output dimensions (as a
    /// set), each at least as large.
    pub fn compose(&self, outer: &Self) -> Result<Self> {
        let mut mine: Vec<Dim> = self.out_dim_names().cloned().collect();
        let mut theirs: Vec<Dim> = outer.in_dim_names().cloned().collect();
        mine.sort();
        theirs.sort();
        if mine != theirs {
            return Err(Error::dim_mismatch("compose", &theirs, &mine));
        }
        for (dim, log2) in &self.out_dims {
            if *log2 > outer.in_dim_size_log2(dim) {
                return Err(Error::InvalidArgument {
                    arg: "outer",
                    reason: format!(
                        "'{dim}' has size {} but the outer layout accepts {}",
                        1 << log2,
                        outer.in_dim_size(dim)
                    ),
                });
            }
        }

        let mut bases = Vec::with_capacity(self.bases.len());
        for (dim, in_bases) in &self.bases {
            let mapped = in_bases
                .iter()
                .map(|basis| {
                    outer.apply_raw(
                        self.out_dims
                            .iter()
                            .zip(basis.iter())
                            .map(|((d, _), v)| (d, *v)),
                    )
                })
                .collect::<Result<Vec<_>>>()?;
            bases.push((dim.clone(), mapped));
        }
        let mut result = Self {
            bases,
            out_dims: outer.out_dims.clone(),
            surjective: false,
        };
        result.surjective = result.rank()? == result.total_out_bits();
        Ok(result)
    }

    /// The inverse of a bijective layout.
    pub fn invert(&self) -> Result<Self> {
        if !self.is_invertible() {
            return Err(Error::InvalidArgument {
                arg: "self",
                reason: format!("layout is not invertible:\n{self}"),
            });
        }
        let preimages = self.bit_matrix()?.preimages_of_unit_vectors()?;
        let in_log2: Vec<u32> = self.bases.iter().map(|(_, b)| b.len() as u32).collect();

        let mut bases = Vec::with_capacity(self.out_dims.len());
        let mut cursor = 0;
        for (dim, log2) in &self.out_dims {
            let dim_bases = (0..*log2)
                .map(|_| {
                    let b = Self::unflatten_out(preimages[cursor], &in_log2);
                    cursor += 1;
                    b
                })
                .collect();
            bases.push((dim.clone(), dim_bases));
        }
        let out_dims = self
            .bases
            .iter()
            .map(|(d, b)| (d.clone(), b.len() as u32))
            .collect();
        Ok(Self {
            bases,
            out_dims,
            surjective: true,
        })
    }

    /// A layout `c` with `outer(c(x)) == self(x)`; `outer` must be bijective
    /// and share `self`'s output dimensions.
    pub fn invert_and_compose(&self, outer: &Self) -> Result<Self> {
        self.compose(&outer.invert()?)
    }

    /// Reorder input dimensions; `order` must be a permutation of them.
    pub fn transpose_ins(&self, order: &[Dim]) -> Result<Self> {
        let names: Vec<Dim> = self.in_dim_names().cloned().collect();
        let perm = permutation_of(&names, order, "transpose_ins")?;
        Ok(Self {
            bases: perm.iter().map(|&i| self.bases[i].clone()).collect(),
            out_dims: self.out_dims.clone(),
            surjective: self.surjective,
        })
    }

    /// Reorder output dimensions; `order` must be a permutation of them.
    pub fn transpose_outs(&self, order: &[Dim]) -> Result<Self> {
        let names: Vec<Dim> = self.out_dim_names().cloned().collect();
        let perm = permutation_of(&names, order, "transpose_outs")?;
        let bases = self
            .bases
            .iter()
            .map(|(d, b)| {
                let permuted = b
                    .iter()
                    .map(|basis| perm.iter().map(|&i| basis[i]).collect())
                    .collect();
                (d.clone(), permuted)
            })
            .collect();
        Ok(Self {
            bases,
            out_dims: perm.iter().map(|&i| self.out_dims[i].clone()).collect(),
            surjective: self.surjective,
        })
    }

    /// Regroup the input bits into new dimensions.
    ///
    /// Bits are flattened with the first input dimension least significant
    /// and split again in the order of `new_in_dims`.
    pub fn reshape_ins(&self, new_in_dims: &[(Dim, i32)]) -> Result<Self> {
        let log2s = checked_log2s(new_in_dims, "reshape_ins size")?;
        let total: u32 = log2s.iter().sum();
        if total != self.total_in_bits() {
            return Err(Error::InvalidArgument {
                arg: "new_in_dims",
                reason: format!(
                    "total size {} differs from the layout's input size {}",
                    1i64 << total,
                    self.total_in_size()
                ),
            });
        }
        let mut flat = self.bases.iter().flat_map(|(_, b)| b.iter().cloned());
        let bases = new_in_dims
            .iter()
            .zip(&log2s)
            .map(|((d, _), &l)| (d.clone(), flat.by_ref().take(l as usize).collect()))
            .collect();
        Ok(Self {
            bases,
            out_dims: self.out_dims.clone(),
            surjective: self.surjective,
        })
    }

    /// Regroup the output bits into new dimensions.
    pub fn reshape_outs(&self, new_out_dims: &[(Dim, i32)]) -> Result<Self> {
        let log2s = checked_log2s(new_out_dims, "reshape_outs size")?;
        let total: u32 = log2s.iter().sum();
        if total != self.total_out_bits() {
            return Err(Error::InvalidArgument {
                arg: "new_out_dims",
                reason: format!(
                    "total size {} differs from the layout's output size {}",
                    1i64 << total,
                    self.total_out_size()
                ),
            });
        }
        let bases = self
            .bases
            .iter()
            .map(|(d, b)| {
                let reshaped = b
                    .iter()
                    .map(|basis| Self::unflatten_out(self.flatten_out(basis), &log2s))
                    .collect();
                (d.clone(), reshaped)
            })
            .collect();
        Ok(Self {
            bases,
            out_dims: new_out_dims
                .iter()
                .zip(log2s)
                .map(|((d, _), l)| (d.clone(), l))
                .collect(),
            surjective: self.surjective,
        })
    }

    /// Merge all input dimensions into the first one.
    pub fn flatten_ins(&self) -> Result<Self> {
        match self.bases.first() {
            Some((dim, _)) => self.reshape_ins(&[(dim.clone(), self.total_in_size() as i32)]),
            None => Ok(self.clone()),
        }
    }

    /// Merge all output dimensions into the first one.
    pub fn flatten_outs(&self) -> Result<Self> {
        match self.out_dims.first() {
            Some((dim, _)) => self.reshape_outs(&[(dim.clone(), self.total_out_size() as i32)]),
            None => Ok(self.clone()),
        }
    }

    /// Restrict to a subset of input and output dimensions.
    ///
    /// Dimensions keep the layout's order; the result need not be surjective.
    pub fn sublayout(&self, in_dims: &[Dim], out_dims: &[Dim]) -> Result<Self> {
        for d in in_dims {
            self.in_dim_index(d)?;
        }
        let out_idx: Vec<usize> = out_dims
            .iter()
            .map(|d| self.out_dim_index(d))
            .collect::<Result<Vec<_>>>()?;
        let mut kept_outs: Vec<usize> = out_idx;
        kept_outs.sort_unstable();
        kept_outs.dedup();

        let bases = self
            .bases
            .iter()
            .filter(|(d, _)| in_dims.contains(d))
            .map(|(d, b)| {
                let projected = b
                    .iter()
                    .map(|basis| kept_outs.iter().map(|&i| basis[i]).collect())
                    .collect();
                (d.clone(), projected)
            })
            .collect();
        let mut result = Self {
            bases,
            out_dims: kept_outs.iter().map(|&i| self.out_dims[i].clone()).collect(),
            surjective: false,
        };
        result.surjective = result.rank()? == result.total_out_bits();
        Ok(result)
    }

    /// Whether every basis of `in_dims` is zero along `out_dims`.
    pub fn sublayout_is_zero(&self, in_dims: &[Dim], out_dims: &[Dim]) -> Result<bool> {
        let sub = self.sublayout(in_dims, out_dims)?;
        Ok(sub
            .bases
            .iter()
            .all(|(_, b)| b.iter().all(|basis| basis.iter().all(|&v| v == 0))))
    }

    /// Drop the all-zero bases of one input dimension, keeping output sizes.
    pub fn remove_zero_bases_along(&self, dim: &Dim) -> Result<Self> {
        let i = self.in_dim_index(dim)?;
        let mut bases = self.bases.clone();
        bases[i].1.retain(|basis| basis.iter().any(|&v| v != 0));
        Ok(Self {
            bases,
            out_dims: self.out_dims.clone(),
            surjective: self.surjective,
        })
    }
}

fn permutation_of(names: &[Dim], order: &[Dim], op: &'static str) -> Result<Vec<usize>> {
    if order.len() != names.len() {
        return Err(Error::dim_mismatch(op, names, order));
    }
    let mut perm = Vec::with_capacity(order.len());
    for d in order {
        match names.iter().position(|n| n == d) {
            Some(i) if !perm.contains(&i) => perm.push(i),
            _ => return Err(Error::dim_mismatch(op, names, order)),
        }
    }
    Ok(perm)
}

fn checked_log2s(dims: &[(Dim, i32)], what: &'static str) -> Result<Vec<u32>> {
    dims.iter()
        .map(|(_, size)| {
            if *size <= 0 || !(*size as u32).is_power_of_two() {
                Err(Error::not_power_of_two(what, *size))
            } else {
                Ok(size.trailing_zeros())
            }
        })
        .collect()
}

// ============================================================================
// Operators
// ============================================================================

impl Mul<&LinearLayout> for &LinearLayout {
    type Output = LinearLayout;

    /// # Panics
    ///
    /// Panics if the operands' dimension orders conflict. Use
    /// [`LinearLayout::try_mul`] to handle that case.
    fn mul(self, rhs: &LinearLayout) -> LinearLayout {
        self.try_mul(rhs)
            .unwrap_or_else(|e| panic!("LinearLayout multiplication failed: {e}"))
    }
}

impl Mul for LinearLayout {
    type Output = LinearLayout;

    fn mul(self, rhs: LinearLayout) -> LinearLayout {
        &self * &rhs
    }
}

impl MulAssign<&LinearLayout> for LinearLayout {
    fn mul_assign(&mut self, rhs: &LinearLayout) {
        *self = &*self * rhs;
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for LinearLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (dim, bases) in &self.bases {
            if bases.is_empty() {
                writeln!(f, " - {dim} is a size 1 dimension")?;
                continue;
            }
            for (i, basis) in bases.iter().enumerate() {
                let marker = if i == 0 { " - " } else { "   " };
                let values: Vec<String> = basis.iter().map(|v| v.to_string()).collect();
                writeln!(f, "{marker}{dim}={} -> ({})", 1 << i, values.join(", "))?;
            }
        }
        let outs: Vec<String> = self
            .out_dims
            .iter()
            .map(|(d, l)| format!("{d} (size {})", 1 << l))
            .collect();
        write!(f, "where out dims are: [{}]", outs.join(", "))
    }
}

impl fmt::Debug for LinearLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "LinearLayout(surjective={})", self.surjective)?;
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(i: usize) -> Dim {
        Dim::out(i)
    }

    #[test]
    fn test_identity_1d_sizes() {
        assert_eq!(
            LinearLayout::identity_1d(0, Dim::REGISTER, d(0)).unwrap(),
            LinearLayout::empty()
        );
        let one = LinearLayout::identity_1d(1, Dim::REGISTER, d(0)).unwrap();
        assert_eq!(one.num_in_dims(), 1);
        assert_eq!(one.in_dim_size(&Dim::REGISTER), 1);
        assert_eq!(one.out_dim_size(&d(0)), 1);
        assert!(matches!(
            LinearLayout::identity_1d(6, Dim::REGISTER, d(0)),
            Err(Error::NotPowerOfTwo { value: 6, .. })
        ));
    }

    #[test]
    fn test_new_infers_sizes() {
        let l = LinearLayout::new(
            vec![(Dim::REGISTER, vec![vec![0, 1], vec![2, 0]])],
            vec![d(0), d(1)],
        )
        .unwrap_err();
        // {(0,1),(2,0)} spans 2 of the 3 inferred output bits
        assert!(matches!(l, Error::NotSurjective { rank: 2, out_bits: 3 }));

        let l = LinearLayout::new(
            vec![(Dim::REGISTER, vec![vec![0, 1], vec![1, 0]])],
            vec![d(0), d(1)],
        )
        .unwrap();
        assert_eq!(l.out_shape(), vec![2, 2]);
    }

    #[test]
    fn test_basis_out_of_range() {
        let err = LinearLayout::with_out_dims(
            vec![(Dim::LANE, vec![vec![4]])],
            vec![(d(0), 4)],
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::BasisOutOfRange { value: 4, size: 4, .. }));
    }

    #[test]
    fn test_mul_shifts_outer() {
        let a = LinearLayout::identity_1d(4, Dim::REGISTER, d(0)).unwrap();
        let b = LinearLayout::identity_1d(2, Dim::LANE, d(0)).unwrap();
        let p = a.try_mul(&b).unwrap();
        assert_eq!(p.out_dim_size(&d(0)), 8);
        assert_eq!(p.basis(&Dim::LANE, 0, &d(0)).unwrap(), 4);
        assert!(p.is_surjective());
    }

    #[test]
    fn test_mul_conflicting_orders() {
        let a = LinearLayout::identity_1d(2, Dim::REGISTER, d(0))
            .unwrap()
            .try_mul(&LinearLayout::identity_1d(2, Dim::REGISTER, d(1)).unwrap())
            .unwrap();
        let b = LinearLayout::identity_1d(2, Dim::REGISTER, d(1))
            .unwrap()
            .try_mul(&LinearLayout::identity_1d(2, Dim::REGISTER, d(0)).unwrap())
            .unwrap();
        assert!(matches!(a.try_mul(&b), Err(Error::DimMismatch { .. })));
    }

    #[test]
    fn test_supremum() {
        let x = [Dim::REGISTER, Dim::WARP];
        let y = [Dim::LANE, Dim::WARP];
        assert_eq!(
            supremum(&x, &y).unwrap(),
            vec![Dim::REGISTER, Dim::LANE, Dim::WARP]
        );
    }

    #[test]
    fn test_free_variable_masks() {
        let l = LinearLayout::with_out_dims(
            vec![(Dim::REGISTER, vec![vec![1], vec![0], vec![1]])],
            vec![(d(0), 2)],
            false,
        )
        .unwrap();
        assert_eq!(
            l.free_variable_masks().unwrap(),
            vec![(Dim::REGISTER, 0b110)]
        );
    }

    #[test]
    fn test_num_consecutive() {
        let l = LinearLayout::new(
            vec![
                (Dim::REGISTER, vec![vec![1], vec![2]]),
                (Dim::LANE, vec![vec![4]]),
            ],
            vec![d(0)],
        )
        .unwrap();
        assert_eq!(l.num_consecutive_in_out(), 4);

        let l = LinearLayout::new(
            vec![
                (Dim::REGISTER, vec![vec![1], vec![4]]),
                (Dim::LANE, vec![vec![2]]),
            ],
            vec![d(0)],
        )
        .unwrap();
        assert_eq!(l.num_consecutive_in_out(), 2);
    }

    #[test]
    fn test_display() {
        let l = LinearLayout::identity_1d(2, Dim::LANE, d(0)).unwrap();
        assert_eq!(
            l.to_string(),
            " - lane=1 -> (1)\nwhere out dims are: [dim0 (size 2)]"
        );
    }
}
