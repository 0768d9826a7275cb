#![forbid(unsafe_code)]

//! Binding contracts between a display surface and the application.

use std::cell::RefCell;

use catcher_core::consistency::{BatchDelta, ItemAndSection};
use catcher_core::index_path::IndexPath;

use crate::surface::SurfaceId;

/// Authoritative source of what a surface should display.
///
/// The surface queries counts and content on demand and treats the answers
/// as ground truth; it never keeps a copy of the source's model.
pub trait SurfaceDataSource: ItemAndSection {
    /// Display content for the item at `path`, or `None` if it does not exist.
    fn content(&self, path: IndexPath) -> Option<String>;
}

/// Optional observer of surface activity. Every method defaults to a no-op.
pub trait SurfaceDelegate {
    fn did_reload(&self, _surface: SurfaceId) {}

    fn did_apply_batch(&self, _surface: SurfaceId, _delta: &BatchDelta) {}
}

/// In-memory sectioned data source with interior mutability.
///
/// Mutations take `&self` so the source can be shared through an `Rc` with
/// the surface that displays it and mutated from a batch-update closure.
#[derive(Debug, Default)]
pub struct SectionedData {
    sections: RefCell<Vec<Vec<String>>>,
}

impl SectionedData {
    #[must_use]
    pub fn new<S, I>(sections: impl IntoIterator<Item = I>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sections: RefCell::new(
                sections
                    .into_iter()
                    .map(|items| items.into_iter().map(Into::into).collect())
                    .collect(),
            ),
        }
    }

    /// Insert `item` at `path`. Returns `false` if the path is out of range.
    pub fn insert(&self, path: IndexPath, item: impl Into<String>) -> bool {
        let mut sections = self.sections.borrow_mut();
        match sections.get_mut(path.section) {
            Some(items) if path.item <= items.len() => {
                items.insert(path.item, item.into());
                true
            }
            _ => false,
        }
    }

    /// Remove and return the item at `path`.
    pub fn remove(&self, path: IndexPath) -> Option<String> {
        let mut sections = self.sections.borrow_mut();
        let items = sections.get_mut(path.section)?;
        (path.item < items.len()).then(|| items.remove(path.item))
    }

    /// Replace the content at `path`, returning the previous content.
    pub fn replace(&self, path: IndexPath, item: impl Into<String>) -> Option<String> {
        let mut sections = self.sections.borrow_mut();
        let slot = sections.get_mut(path.section)?.get_mut(path.item)?;
        Some(std::mem::replace(slot, item.into()))
    }

    /// Insert an empty section at `index`, clamped to the end.
    pub fn insert_section(&self, index: usize) {
        let mut sections = self.sections.borrow_mut();
        let index = index.min(sections.len());
        sections.insert(index, Vec::new());
    }

    /// Remove the section at `index`, returning its items.
    pub fn remove_section(&self, index: usize) -> Option<Vec<String>> {
        let mut sections = self.sections.borrow_mut();
        (index < sections.len()).then(|| sections.remove(index))
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Vec<String>> {
        self.sections.borrow().clone()
    }
}

impl ItemAndSection for SectionedData {
    fn number_of_sections(&self) -> usize {
        self.sections.borrow().len()
    }

    fn number_of_items(&self, section: usize) -> usize {
        self.sections.borrow().get(section).map_or(0, Vec::len)
    }
}

impl SurfaceDataSource for SectionedData {
    fn content(&self, path: IndexPath) -> Option<String> {
        self.sections
            .borrow()
            .get(path.section)?
            .get(path.item)
            .cloned()
    }
}
