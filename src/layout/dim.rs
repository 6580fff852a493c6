//! Dimension names for linear layouts

use std::borrow::Cow;
use std::fmt;

/// Name of an input or output dimension of a [`LinearLayout`](super::LinearLayout).
///
/// Names are compared structurally, so `Dim::new("lane") == Dim::LANE`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Dim(Cow<'static, str>);

impl Dim {
    /// Values held by one thread
    pub const REGISTER: Dim = Dim(Cow::Borrowed("register"));
    /// Thread index within a warp
    pub const LANE: Dim = Dim(Cow::Borrowed("lane"));
    /// Warp index within a block
    pub const WARP: Dim = Dim(Cow::Borrowed("warp"));
    /// Block index within a cluster
    pub const BLOCK: Dim = Dim(Cow::Borrowed("block"));
    /// Element offset of a memory-resident layout
    pub const OFFSET: Dim = Dim(Cow::Borrowed("offset"));
    /// Iteration of a multi-pass scratch layout
    pub const ITERATION: Dim = Dim(Cow::Borrowed("iteration"));

    /// Create a dimension from any name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// The standard name of logical tensor axis `i` (`dim{i}`).
    pub fn out(i: usize) -> Self {
        const NAMES: [&str; 8] = [
            "dim0", "dim1", "dim2", "dim3", "dim4", "dim5", "dim6", "dim7",
        ];
        match NAMES.get(i) {
            Some(name) => Self(Cow::Borrowed(name)),
            None => Self(Cow::Owned(format!("dim{i}"))),
        }
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&'static str> for Dim {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for Dim {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

/// `[dim0, dim1, ..., dim{rank-1}]`
pub fn standard_out_dim_names(rank: usize) -> Vec<Dim> {
    (0..rank).map(Dim::out).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        assert_eq!(Dim::new("lane"), Dim::LANE);
        assert_eq!(Dim::new(String::from("dim3")), Dim::out(3));
        assert_eq!(Dim::out(12).as_str(), "dim12");
    }

    #[test]
    fn test_standard_names() {
        let names = standard_out_dim_names(3);
        assert_eq!(names, vec![Dim::out(0), Dim::out(1), Dim::out(2)]);
        assert_eq!(format!("{:?}", names[1]), "\"dim1\"");
    }
}
