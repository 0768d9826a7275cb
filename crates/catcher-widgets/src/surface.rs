#![forbid(unsafe_code)]

//! Display surface: an ordered, sectioned view over a data source.
//!
//! # Model
//!
//! A [`DisplaySurface`] shows a snapshot of its data source taken at the
//! last reload or batch update. Between observations the snapshot and the
//! source must agree on every section's item count.
//!
//! Batch updates enter only through
//! [`CatcherController`](crate::CatcherController). The claimed
//! [`BatchDelta`] is first validated against the displayed snapshot, then
//! checked against the counts the data source reports *now*. A delta that
//! disagrees with the source is reported as [`SurfaceFault::Inconsistent`]
//! and leaves the snapshot untouched.
//!
//! # Completions
//!
//! Completion callbacks for accepted batches are queued and fire on the next
//! [`CatcherController::settle`](crate::CatcherController::settle), which
//! stands in for the event-loop turn after the update animation finishes. A surface torn down with
//! completions still queued fires them with `false`.
//!
//! # Threading
//!
//! Surfaces are `!Send`: data sources and delegates are shared through
//! `Rc`, and all access happens on the thread that owns the surface.

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use catcher_core::consistency::{self, BatchDelta, ConsistencyFailure, ItemAndSection};
use catcher_core::error::EditError;
use catcher_core::index_path::IndexPath;
use thiserror::Error;

use crate::data_source::{SurfaceDataSource, SurfaceDelegate};
use crate::layout::FlowLayout;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one surface instance.
///
/// A rebuilt surface always gets a fresh id. `0` is reserved for the vacant
/// placeholder used while a surface is being swapped out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    const VACANT: Self = Self(0);

    fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Everything known about a structural-consistency fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{surface}: {reason}")]
pub struct FaultInfo {
    /// Surface the batch was attempted on.
    pub surface: SurfaceId,
    /// The mismatch that was detected.
    #[source]
    pub reason: ConsistencyFailure,
    /// The edits the batch claimed.
    pub delta: BatchDelta,
    /// Per-section counts the surface displayed before the batch.
    pub displayed_counts: Vec<usize>,
    /// Per-section counts the data source reported after the batch.
    pub source_counts: Vec<usize>,
}

/// Why a surface refused a batch update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceFault {
    /// The edits are invalid on their own; a caller bug.
    #[error("invalid batch edit: {0}")]
    InvalidEdit(#[from] EditError),
    /// The edits disagree with the data source.
    #[error("inconsistent batch update: {0}")]
    Inconsistent(FaultInfo),
}

type Completion = Box<dyn FnOnce(bool)>;

/// Sectioned display bound to a data source and laid out by a [`FlowLayout`].
pub struct DisplaySurface {
    id: SurfaceId,
    layout: FlowLayout,
    data_source: Option<Rc<dyn SurfaceDataSource>>,
    delegate: Option<Rc<dyn SurfaceDelegate>>,
    sections: Vec<Vec<String>>,
    pending: VecDeque<Completion>,
    batches_applied: u64,
}

impl fmt::Debug for DisplaySurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplaySurface")
            .field("id", &self.id)
            .field("layout", &self.layout.id())
            .field("has_data_source", &self.data_source.is_some())
            .field("has_delegate", &self.delegate.is_some())
            .field("sections", &self.sections.len())
            .field("pending_completions", &self.pending.len())
            .field("batches_applied", &self.batches_applied)
            .finish()
    }
}

impl DisplaySurface {
    /// Create an unbound, empty surface that takes ownership of `layout`.
    #[must_use]
    pub fn new(mut layout: FlowLayout) -> Self {
        layout.mark_installed();
        let id = SurfaceId::next();
        tracing::debug!(
            target: "catcher.surface",
            surface = %id,
            layout = %layout.id(),
            installations = layout.installations(),
            "surface created"
        );
        Self {
            id,
            layout,
            data_source: None,
            delegate: None,
            sections: Vec::new(),
            pending: VecDeque::new(),
            batches_applied: 0,
        }
    }

    pub(crate) fn vacant() -> Self {
        Self {
            id: SurfaceId::VACANT,
            layout: FlowLayout::vacant(),
            data_source: None,
            delegate: None,
            sections: Vec::new(),
            pending: VecDeque::new(),
            batches_applied: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    #[must_use]
    pub fn layout(&self) -> &FlowLayout {
        &self.layout
    }

    pub fn layout_mut(&mut self) -> &mut FlowLayout {
        &mut self.layout
    }

    /// Tear the surface down, handing back its layout.
    ///
    /// Data-source and delegate bindings are dropped. Queued completions
    /// fire with `false`.
    #[must_use]
    pub fn into_layout(mut self) -> FlowLayout {
        let dropped = self.fail_pending();
        tracing::debug!(
            target: "catcher.surface",
            surface = %self.id,
            layout = %self.layout.id(),
            dropped_completions = dropped,
            "surface torn down"
        );
        self.layout
    }

    pub fn set_data_source(&mut self, data_source: Rc<dyn SurfaceDataSource>) {
        self.data_source = Some(data_source);
    }

    #[must_use]
    pub fn data_source(&self) -> Option<&Rc<dyn SurfaceDataSource>> {
        self.data_source.as_ref()
    }

    pub fn set_delegate(&mut self, delegate: Rc<dyn SurfaceDelegate>) {
        self.delegate = Some(delegate);
    }

    #[must_use]
    pub fn delegate(&self) -> Option<&Rc<dyn SurfaceDelegate>> {
        self.delegate.as_ref()
    }

    /// Displayed content at `path`.
    #[must_use]
    pub fn content(&self, path: IndexPath) -> Option<&str> {
        self.sections
            .get(path.section)?
            .get(path.item)
            .map(String::as_str)
    }

    /// Everything currently displayed, section by section.
    #[must_use]
    pub fn displayed(&self) -> &[Vec<String>] {
        &self.sections
    }

    #[must_use]
    pub fn batches_applied(&self) -> u64 {
        self.batches_applied
    }

    /// Discard the snapshot and re-read everything from the data source.
    pub fn reload_data(&mut self) {
        self.sections = self.read_source();
        tracing::debug!(
            target: "catcher.surface",
            surface = %self.id,
            sections = self.sections.len(),
            "surface reloaded"
        );
        if let Some(delegate) = &self.delegate {
            delegate.did_reload(self.id);
        }
    }

    fn read_source(&self) -> Vec<Vec<String>> {
        let Some(source) = &self.data_source else {
            return Vec::new();
        };
        (0..source.number_of_sections())
            .map(|section| {
                (0..source.number_of_items(section))
                    .map(|item| {
                        source
                            .content(IndexPath::new(section, item))
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect()
    }

    /// Per-section counts the data source reports right now.
    pub(crate) fn source_counts(&self) -> Vec<usize> {
        self.data_source
            .as_deref()
            .map(|source| consistency::section_counts(source))
            .unwrap_or_default()
    }

    /// Apply an already-collected delta.
    ///
    /// On success the snapshot matches the data source and the delegate is
    /// told about the batch. Nothing changes on error.
    pub(crate) fn apply_batch(&mut self, delta: &BatchDelta) -> Result<(), SurfaceFault> {
        consistency::validate(&*self, delta)?;

        let displayed_counts = consistency::section_counts(&*self);
        let source_counts = self.source_counts();
        if let Err(reason) = consistency::check(&displayed_counts, &source_counts, delta) {
            tracing::debug!(
                target: "catcher.surface",
                surface = %self.id,
                reason = %reason,
                "batch rejected as inconsistent"
            );
            return Err(SurfaceFault::Inconsistent(FaultInfo {
                surface: self.id,
                reason,
                delta: delta.clone(),
                displayed_counts,
                source_counts,
            }));
        }

        self.sections = self.read_source();
        self.batches_applied += 1;
        tracing::debug!(
            target: "catcher.surface",
            surface = %self.id,
            edits = delta.edit_count(),
            "batch applied"
        );
        if let Some(delegate) = &self.delegate {
            delegate.did_apply_batch(self.id, delta);
        }
        Ok(())
    }

    /// Queue a completion for the next [`settle`](Self::settle).
    pub(crate) fn enqueue_completion(&mut self, completion: impl FnOnce(bool) + 'static) {
        self.pending.push_back(Box::new(completion));
    }

    #[must_use]
    pub fn has_pending_completions(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Fire every queued completion with `true`, in submission order.
    /// Returns how many fired.
    pub(crate) fn settle(&mut self) -> usize {
        let mut fired = 0;
        while let Some(completion) = self.pending.pop_front() {
            completion(true);
            fired += 1;
        }
        fired
    }

    fn fail_pending(&mut self) -> usize {
        let mut fired = 0;
        while let Some(completion) = self.pending.pop_front() {
            completion(false);
            fired += 1;
        }
        fired
    }
}

impl ItemAndSection for DisplaySurface {
    fn number_of_sections(&self) -> usize {
        self.sections.len()
    }

    fn number_of_items(&self, section: usize) -> usize {
        self.sections.get(section).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SectionedData;
    use std::cell::{Cell, RefCell};

    fn run_batch(
        surface: &mut DisplaySurface,
        updates: impl FnOnce(&mut BatchDelta),
        completion: impl FnOnce(bool) + 'static,
    ) -> Result<(), SurfaceFault> {
        let mut delta = BatchDelta::new();
        updates(&mut delta);
        surface.apply_batch(&delta)?;
        surface.enqueue_completion(completion);
        Ok(())
    }

    fn bound_surface(data: &Rc<SectionedData>) -> DisplaySurface {
        let mut surface = DisplaySurface::new(FlowLayout::new());
        surface.set_data_source(Rc::clone(data) as Rc<dyn SurfaceDataSource>);
        surface.reload_data();
        surface
    }

    fn plants() -> Rc<SectionedData> {
        Rc::new(SectionedData::new([
            vec!["fern", "ivy", "moss"],
            vec!["basil", "mint"],
        ]))
    }

    #[test]
    fn reload_reads_source() {
        let data = plants();
        let surface = bound_surface(&data);
        assert_eq!(surface.number_of_sections(), 2);
        assert_eq!(surface.content(IndexPath::new(1, 1)), Some("mint"));
        assert_eq!(surface.displayed(), data.snapshot().as_slice());
    }

    #[test]
    fn unbound_surface_is_empty() {
        let mut surface = DisplaySurface::new(FlowLayout::new());
        surface.reload_data();
        assert_eq!(surface.number_of_sections(), 0);
        assert!(surface.data_source().is_none());
    }

    #[test]
    fn consistent_batch_applies_and_defers_completion() {
        let data = plants();
        let mut surface = bound_surface(&data);
        let done = Rc::new(RefCell::new(Vec::new()));

        let source = Rc::clone(&data);
        let sink = Rc::clone(&done);
        run_batch(
            &mut surface,
            move |delta| {
                source.remove(IndexPath::new(0, 0));
                delta.delete_items([IndexPath::new(0, 0)]);
            },
            move |ok| sink.borrow_mut().push(ok),
        )
        .expect("consistent batch");

        assert!(done.borrow().is_empty(), "completion must wait for settle");
        assert!(surface.has_pending_completions());
        assert_eq!(surface.content(IndexPath::new(0, 0)), Some("ivy"));
        assert_eq!(surface.batches_applied(), 1);

        assert_eq!(surface.settle(), 1);
        assert_eq!(*done.borrow(), vec![true]);
        assert_eq!(surface.settle(), 0);
    }

    #[test]
    fn inconsistent_batch_reports_fault_and_keeps_snapshot() {
        let data = plants();
        let mut surface = bound_surface(&data);
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);

        let err = run_batch(
            &mut surface,
            |delta| {
                delta.delete_items([IndexPath::new(0, 0)]);
            },
            move |_| flag.set(true),
        )
        .expect_err("source did not change");

        let info = match err {
            SurfaceFault::Inconsistent(info) => info,
            other => panic!("expected inconsistency, got {other:?}"),
        };
        assert_eq!(info.surface, surface.id());
        assert_eq!(info.displayed_counts, vec![3, 2]);
        assert_eq!(info.source_counts, vec![3, 2]);
        assert_eq!(
            info.reason,
            ConsistencyFailure::ModifiedSectionMismatch {
                section: 0,
                old_count: 3,
                new_count: 3,
                inserted: 0,
                deleted: 1,
            }
        );
        assert_eq!(surface.content(IndexPath::new(0, 0)), Some("fern"));
        assert_eq!(surface.settle(), 0);
        assert!(!fired.get());
    }

    #[test]
    fn invalid_edit_is_not_an_inconsistency() {
        let data = plants();
        let mut surface = bound_surface(&data);
        let err = run_batch(
            &mut surface,
            |delta| {
                delta.delete_items([IndexPath::new(5, 0)]);
            },
            |_| {},
        )
        .expect_err("bad section");
        assert!(matches!(err, SurfaceFault::InvalidEdit(_)));
    }

    #[test]
    fn teardown_returns_layout_and_fails_pending() {
        let layout = FlowLayout::new().columns(4);
        let layout_id = layout.id();
        let mut surface = DisplaySurface::new(layout);
        let result = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&result);
        surface.enqueue_completion(move |ok| *sink.borrow_mut() = Some(ok));

        let layout = surface.into_layout();
        assert_eq!(layout.id(), layout_id);
        assert_eq!(layout.column_count(), 4);
        assert_eq!(layout.installations(), 1);
        assert_eq!(*result.borrow(), Some(false));
    }

    #[derive(Default)]
    struct RecordingDelegate {
        reloads: Cell<usize>,
        batches: Cell<usize>,
    }

    impl SurfaceDelegate for RecordingDelegate {
        fn did_reload(&self, _surface: SurfaceId) {
            self.reloads.set(self.reloads.get() + 1);
        }

        fn did_apply_batch(&self, _surface: SurfaceId, _delta: &BatchDelta) {
            self.batches.set(self.batches.get() + 1);
        }
    }

    #[test]
    fn delegate_observes_reloads_and_batches() {
        let data = plants();
        let delegate = Rc::new(RecordingDelegate::default());
        let mut surface = bound_surface(&data);
        surface.set_delegate(Rc::clone(&delegate) as Rc<dyn SurfaceDelegate>);
        surface.reload_data();

        let source = Rc::clone(&data);
        run_batch(
            &mut surface,
            move |delta| {
                source.insert(IndexPath::new(1, 2), "sage");
                delta.insert_items([IndexPath::new(1, 2)]);
            },
            |_| {},
        )
        .expect("consistent insert");

        assert_eq!(delegate.reloads.get(), 1);
        assert_eq!(delegate.batches.get(), 1);
    }
}
