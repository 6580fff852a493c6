//! Memoized layout construction
//!
//! Building a layout is pure, so the result for a given (shape, encoding,
//! allocation shape) never changes. [`LayoutCache`] keeps every layout it
//! builds for as long as the cache lives; there is no eviction.

use crate::encoding::Encoding;
use crate::error::Result;
use crate::layout::LinearLayout;
use crate::types::Shape;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Key of a cached layout
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Tensor shape
    pub shape: Shape,
    /// Encoding the layout was built from
    pub encoding: Encoding,
    /// Allocation shape; empty for distributed encodings
    pub alloc_shape: Shape,
}

impl CacheKey {
    /// Create a key
    pub fn new(shape: &[i64], encoding: &Encoding, alloc_shape: &[i64]) -> Self {
        Self {
            shape: SmallVec::from_slice(shape),
            encoding: encoding.clone(),
            alloc_shape: SmallVec::from_slice(alloc_shape),
        }
    }
}

/// Hit/miss counters of a [`LayoutCache`]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached layouts
    pub entries: usize,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that built a layout
    pub misses: u64,
}

/// Thread-safe layout cache.
///
/// Lookups take a shared lock; only a miss takes the exclusive lock, and
/// only to insert. The layout itself is built with no lock held, so
/// constructors that recurse into their parent encoding never deadlock.
#[derive(Default)]
pub struct LayoutCache {
    layouts: RwLock<HashMap<CacheKey, Arc<LinearLayout>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for LayoutCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("LayoutCache")
            .field("entries", &stats.entries)
            .field("hits", &stats.hits)
            .field("misses", &stats.misses)
            .finish()
    }
}

impl LayoutCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout of `encoding` at `shape`, building it on first use.
    ///
    /// Errors from the constructor are returned and nothing is cached.
    pub fn get_or_build(
        &self,
        shape: &[i64],
        encoding: &Encoding,
        alloc_shape: &[i64],
    ) -> Result<Arc<LinearLayout>> {
        self.get_or_build_with(shape, encoding, alloc_shape, |layout| Ok(layout))
    }

    /// Like [`get_or_build`](Self::get_or_build), passing a freshly built
    /// layout through `check` before it is cached.
    pub(crate) fn get_or_build_with(
        &self,
        shape: &[i64],
        encoding: &Encoding,
        alloc_shape: &[i64],
        check: impl FnOnce(LinearLayout) -> Result<LinearLayout>,
    ) -> Result<Arc<LinearLayout>> {
        let key = CacheKey::new(shape, encoding, alloc_shape);

        // Fast path: read lock
        if let Some(layout) = self.layouts.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(layout));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let layout = Arc::new(check(encoding.to_linear_layout(shape, alloc_shape)?)?);
        tracing::debug!(
            "built {} layout for shape {:?} (alloc {:?}): {} registers/offsets",
            encoding.kind(),
            shape,
            alloc_shape,
            layout.in_dims().first().map_or(1, |(_, size)| *size)
        );

        // Another thread may have built the same layout meanwhile; keep the first.
        let mut layouts = self.layouts.write();
        Ok(Arc::clone(layouts.entry(key).or_insert(layout)))
    }

    /// Cached layout for a key, without building it.
    pub fn get(&self, shape: &[i64], encoding: &Encoding, alloc_shape: &[i64]) -> Option<Arc<LinearLayout>> {
        let key = CacheKey::new(shape, encoding, alloc_shape);
        self.layouts.read().get(&key).cloned()
    }

    /// Number of cached layouts
    pub fn len(&self) -> usize {
        self.layouts.read().len()
    }

    /// Whether the cache holds no layouts
    pub fn is_empty(&self) -> bool {
        self.layouts.read().is_empty()
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{BlockedEncoding, CtaLayout};

    fn blocked() -> Encoding {
        BlockedEncoding::new(&[1, 4], &[4, 8], &[2, 2], &[1, 0], CtaLayout::single(2))
            .unwrap()
            .into()
    }

    #[test]
    fn test_hit_after_miss() {
        let cache = LayoutCache::new();
        let a = cache.get_or_build(&[32, 64], &blocked(), &[]).unwrap();
        let b = cache.get_or_build(&[32, 64], &blocked(), &[]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 1,
                hits: 1,
                misses: 1
            }
        );
    }

    #[test]
    fn test_distinct_shapes_are_distinct_entries() {
        let cache = LayoutCache::new();
        cache.get_or_build(&[32, 64], &blocked(), &[]).unwrap();
        cache.get_or_build(&[64, 64], &blocked(), &[]).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&[64, 64], &blocked(), &[]).is_some());
        assert!(cache.get(&[128, 64], &blocked(), &[]).is_none());
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = LayoutCache::new();
        assert!(cache.get_or_build(&[32, 64], &blocked(), &[32, 64]).is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 1);
    }
}
