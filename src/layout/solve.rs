//! Gaussian elimination over GF(2)
//!
//! A layout's basis matrix has one column per input bit and one row per
//! output bit. Columns are packed into `u64`s with the first output
//! dimension in the least significant bits.

use crate::error::{Error, Result};

/// A GF(2) matrix stored column-wise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BitMatrix {
    columns: Vec<u64>,
    rows: u32,
}

/// One reduced column: its pivot row and the input combination producing it.
struct Pivot {
    row: u32,
    value: u64,
    combo: u64,
}

impl BitMatrix {
    pub(crate) fn new(columns: Vec<u64>, rows: u32) -> Result<Self> {
        if rows > 62 {
            return Err(Error::Internal(format!("{rows} rows exceed the 62-bit limit")));
        }
        if let Some(c) = columns.iter().find(|&&c| c >> rows != 0) {
            return Err(Error::Internal(format!(
                "column {c:#x} does not fit in {rows} rows"
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Reduce each column against the previous pivots, in order.
    ///
    /// Returns the pivots and, per column, whether it was linearly dependent
    /// on the columns before it. Combination masks are only tracked for the
    /// first 64 columns.
    fn eliminate(&self) -> (Vec<Pivot>, Vec<bool>) {
        let mut pivots: Vec<Pivot> = Vec::new();
        let mut dependent = Vec::with_capacity(self.columns.len());
        for (i, &column) in self.columns.iter().enumerate() {
            let mut value = column;
            let mut combo = if i < 64 { 1u64 << i } else { 0 };
            for p in &pivots {
                if (value >> p.row) & 1 == 1 {
                    value ^= p.value;
                    combo ^= p.combo;
                }
            }
            if value == 0 {
                dependent.push(true);
                continue;
            }
            dependent.push(false);
            let row = value.trailing_zeros();
            // Keep the pivot rows clear in every other pivot.
            for p in pivots.iter_mut() {
                if (p.value >> row) & 1 == 1 {
                    p.value ^= value;
                    p.combo ^= combo;
                }
            }
            pivots.push(Pivot { row, value, combo });
        }
        (pivots, dependent)
    }

    pub(crate) fn rank(&self) -> u32 {
        self.eliminate().0.len() as u32
    }

    /// Per column, whether it lies in the span of the columns before it.
    pub(crate) fn dependent_columns(&self) -> Vec<bool> {
        self.eliminate().1
    }

    /// For each row `r`, the set of columns whose XOR is the unit vector `e_r`.
    ///
    /// The matrix must be square and of full rank.
    pub(crate) fn preimages_of_unit_vectors(&self) -> Result<Vec<u64>> {
        if self.columns.len() != self.rows as usize {
            return Err(Error::Internal(format!(
                "matrix with {} columns and {} rows is not square",
                self.columns.len(),
                self.rows
            )));
        }
        let (pivots, _) = self.eliminate();
        if pivots.len() != self.rows as usize {
            return Err(Error::Internal(format!(
                "matrix has rank {} of {}",
                pivots.len(),
                self.rows
            )));
        }
        let mut preimages = vec![0u64; self.rows as usize];
        for p in pivots {
            // Full reduction leaves exactly the pivot bit set.
            debug_assert_eq!(p.value, 1u64 << p.row);
            preimages[p.row as usize] = p.combo;
        }
        Ok(preimages)
    }
}
