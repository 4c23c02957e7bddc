//! Tree construction and page store parameters.

use crate::page_tree::tree_constants::{
    DEFAULT_CACHE_PAGES, DEFAULT_MIN_FILL_PERCENT, MAX_DEGREE, MAX_POINTS,
};
use crate::page_tree::{PageTreeError, PageTreeResult};

/// Capacity and caching parameters for an index.
///
/// The defaults fill pages to their physical limits. Smaller values are
/// useful to force splits in tests or to trade fan-out for page locality.
///
/// # Examples
///
/// ```rust
/// use velomap_index::TreeConfig;
///
/// let config = TreeConfig::new().with_degree(4).with_point_capacity(8);
/// assert!(config.validate().is_ok());
/// assert!(TreeConfig::new().with_degree(40).validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    degree: usize,
    point_capacity: usize,
    min_fill_percent: usize,
    cache_pages: usize,
}

impl TreeConfig {
    pub fn new() -> TreeConfig {
        TreeConfig {
            degree: MAX_DEGREE,
            point_capacity: MAX_POINTS,
            min_fill_percent: DEFAULT_MIN_FILL_PERCENT,
            cache_pages: DEFAULT_CACHE_PAGES,
        }
    }

    /// Maximum entries per internal node.
    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn with_degree(mut self, degree: usize) -> Self {
        self.degree = degree;
        self
    }

    /// Maximum points per point-leaf.
    pub fn point_capacity(&self) -> usize {
        self.point_capacity
    }

    pub fn with_point_capacity(mut self, point_capacity: usize) -> Self {
        self.point_capacity = point_capacity;
        self
    }

    /// Smallest group a split may produce, as a percentage of the split set.
    pub fn min_fill_percent(&self) -> usize {
        self.min_fill_percent
    }

    pub fn with_min_fill_percent(mut self, percent: usize) -> Self {
        self.min_fill_percent = percent;
        self
    }

    /// Number of decoded pages a page store keeps in memory.
    pub fn cache_pages(&self) -> usize {
        self.cache_pages
    }

    pub fn with_cache_pages(mut self, pages: usize) -> Self {
        self.cache_pages = pages;
        self
    }

    /// Minimum group size when splitting `total` members.
    pub(crate) fn min_fill(&self, total: usize) -> usize {
        (total * self.min_fill_percent / 100).max(1).min(total / 2)
    }

    pub fn validate(&self) -> PageTreeResult<()> {
        if !(2..=MAX_DEGREE).contains(&self.degree) {
            return Err(PageTreeError::InvalidConfig(format!(
                "degree must be within 2..={}, got {}",
                MAX_DEGREE, self.degree
            )));
        }
        if !(2..=MAX_POINTS).contains(&self.point_capacity) {
            return Err(PageTreeError::InvalidConfig(format!(
                "point capacity must be within 2..={}, got {}",
                MAX_POINTS, self.point_capacity
            )));
        }
        if !(10..=50).contains(&self.min_fill_percent) {
            return Err(PageTreeError::InvalidConfig(format!(
                "min fill must be within 10..=50 percent, got {}",
                self.min_fill_percent
            )));
        }
        if self.cache_pages == 0 {
            return Err(PageTreeError::InvalidConfig(
                "cache must hold at least one page".into(),
            ));
        }
        Ok(())
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new()
    }
}
