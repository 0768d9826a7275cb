#![forbid(unsafe_code)]

//! Two-level item addressing for sectioned collections.

use std::collections::BTreeMap;
use std::fmt;

/// Position of a single item inside a sectioned collection.
///
/// Ordering is section-major, so sorting a batch of paths groups them by
/// section and then by item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexPath {
    /// Zero-based section index.
    pub section: usize,
    /// Zero-based item index within the section.
    pub item: usize,
}

impl IndexPath {
    /// Create a new index path.
    #[must_use]
    pub const fn new(section: usize, item: usize) -> Self {
        Self { section, item }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.section, self.item)
    }
}

impl From<(usize, usize)> for IndexPath {
    fn from((section, item): (usize, usize)) -> Self {
        Self::new(section, item)
    }
}

/// Count how many paths fall into each section.
///
/// Sections that no path touches are absent from the map.
#[must_use]
pub fn section_histogram<'a>(paths: impl IntoIterator<Item = &'a IndexPath>) -> BTreeMap<usize, usize> {
    paths.into_iter().fold(BTreeMap::new(), |mut acc, path| {
        *acc.entry(path.section).or_insert(0) += 1;
        acc
    })
}
