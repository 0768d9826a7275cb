#![forbid(unsafe_code)]

//! Parent container that hosts display surfaces by id.

use crate::surface::SurfaceId;

/// Ordered list of mounted surfaces, front to back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceContainer {
    children: Vec<SurfaceId>,
}

impl SurfaceContainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `id` on top. Mounting an already-mounted id is a no-op.
    pub fn mount(&mut self, id: SurfaceId) {
        if !self.children.contains(&id) {
            self.children.push(id);
        }
    }

    /// Unmount `id`. Returns whether it was mounted.
    pub fn unmount(&mut self, id: SurfaceId) -> bool {
        let before = self.children.len();
        self.children.retain(|child| *child != id);
        self.children.len() != before
    }

    /// Swap `old` for `new` in place, keeping its stacking position.
    ///
    /// If `old` is not mounted, `new` is mounted on top instead and `false`
    /// is returned.
    pub fn replace(&mut self, old: SurfaceId, new: SurfaceId) -> bool {
        match self.children.iter().position(|child| *child == old) {
            Some(idx) => {
                self.children[idx] = new;
                true
            }
            None => {
                self.mount(new);
                false
            }
        }
    }

    #[must_use]
    pub fn contains(&self, id: SurfaceId) -> bool {
        self.children.contains(&id)
    }

    #[must_use]
    pub fn children(&self) -> &[SurfaceId] {
        &self.children
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
