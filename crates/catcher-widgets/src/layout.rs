#![forbid(unsafe_code)]

//! Flow layout configuration for display surfaces.
//!
//! A [`FlowLayout`] is owned by exactly one [`DisplaySurface`] at a time and
//! is moved, never cloned, when a surface is rebuilt. Its [`LayoutId`] is
//! fixed at construction, so identity survives every transfer.
//!
//! [`DisplaySurface`]: crate::surface::DisplaySurface

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LAYOUT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a layout object.
///
/// `0` is reserved for the vacant layout held by a surface mid-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayoutId(u64);

impl LayoutId {
    const VACANT: Self = Self(0);

    fn next() -> Self {
        Self(NEXT_LAYOUT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layout#{}", self.0)
    }
}

/// Width and height in layout units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

impl Size {
    #[must_use]
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

/// Grid-style arrangement of items, filled row by row.
#[derive(Debug)]
pub struct FlowLayout {
    id: LayoutId,
    item_size: Size,
    columns: u16,
    item_spacing: u16,
    line_spacing: u16,
    section_inset: u16,
    installations: u32,
}

impl FlowLayout {
    /// Single-column layout with unit-sized items.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: LayoutId::next(),
            item_size: Size::new(1, 1),
            columns: 1,
            item_spacing: 0,
            line_spacing: 0,
            section_inset: 0,
            installations: 0,
        }
    }

    pub(crate) fn vacant() -> Self {
        Self {
            id: LayoutId::VACANT,
            item_size: Size::default(),
            columns: 1,
            item_spacing: 0,
            line_spacing: 0,
            section_inset: 0,
            installations: 0,
        }
    }

    #[must_use]
    pub fn item_size(mut self, size: Size) -> Self {
        self.item_size = size;
        self
    }

    /// Number of columns; zero is treated as one.
    #[must_use]
    pub fn columns(mut self, columns: u16) -> Self {
        self.columns = columns.max(1);
        self
    }

    #[must_use]
    pub fn item_spacing(mut self, spacing: u16) -> Self {
        self.item_spacing = spacing;
        self
    }

    #[must_use]
    pub fn line_spacing(mut self, spacing: u16) -> Self {
        self.line_spacing = spacing;
        self
    }

    #[must_use]
    pub fn section_inset(mut self, inset: u16) -> Self {
        self.section_inset = inset;
        self
    }

    #[must_use]
    pub fn id(&self) -> LayoutId {
        self.id
    }

    #[must_use]
    pub fn current_item_size(&self) -> Size {
        self.item_size
    }

    #[must_use]
    pub fn column_count(&self) -> u16 {
        self.columns
    }

    #[must_use]
    pub fn spacing(&self) -> (u16, u16) {
        (self.item_spacing, self.line_spacing)
    }

    #[must_use]
    pub fn current_section_inset(&self) -> u16 {
        self.section_inset
    }

    /// How many surfaces this layout has been installed into.
    #[must_use]
    pub fn installations(&self) -> u32 {
        self.installations
    }

    pub(crate) fn mark_installed(&mut self) {
        self.installations = self.installations.saturating_add(1);
    }

    /// Column count and square item height for a given width, rounded down.
    #[must_use]
    pub fn column_count_and_item_height(width: u16, columns: u16) -> (u16, u16) {
        let columns = columns.max(1);
        (columns, width / columns)
    }

    /// Resize items so `columns` of them span `available_width`, after
    /// section insets on both sides. Item height is left untouched.
    pub fn fit_to_width(&mut self, available_width: u16) {
        let usable = available_width.saturating_sub(self.section_inset.saturating_mul(2));
        let gaps = self.item_spacing.saturating_mul(self.columns - 1);
        self.item_size.width = usable.saturating_sub(gaps) / self.columns;
    }

    /// Rows needed to lay out `items` items.
    #[must_use]
    pub fn rows_for(&self, items: usize) -> usize {
        items.div_ceil(usize::from(self.columns))
    }
}

impl Default for FlowLayout {
    fn default() -> Self {
        Self::new()
    }
}
