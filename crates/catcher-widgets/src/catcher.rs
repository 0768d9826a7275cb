#![forbid(unsafe_code)]

//! Resilient batch-update controller.
//!
//! [`CatcherController`] owns the active [`DisplaySurface`] and runs batch
//! updates against it. When a batch is refused because its claimed edits
//! disagree with the data source, the caller's recovery policy decides
//! between two outcomes:
//!
//! - **recover**: the faulted surface is torn down, its [`FlowLayout`] is
//!   moved into a freshly built surface, the replacement takes the old one's
//!   place in the [`SurfaceContainer`], the configure strategy runs on it,
//!   and it reloads from the data source. The completion fires with `false`.
//! - **decline**: the fault is returned unchanged as
//!   [`BatchUpdateError::Unrecovered`] and nothing is rebuilt.
//!
//! # Invariants
//!
//! - The recovery policy is consulted exactly once per structural fault, and
//!   never for an [`EditError`].
//! - After [`perform_batch_updates`](CatcherController::perform_batch_updates)
//!   returns `Ok`, the active surface displays exactly what its data source
//!   reports.
//! - The layout survives every rebuild: same [`LayoutId`](crate::layout::LayoutId),
//!   one more installation.
//!
//! # Failure Modes
//!
//! - Overlapping batches (a new call before the previous completion fired)
//!   are a caller-contract violation. They are logged at `warn` and then
//!   processed normally.
//! - A declined fault leaves the surface showing its pre-batch snapshot,
//!   which no longer matches the data source.
//!
//! [`FlowLayout`]: crate::layout::FlowLayout

use std::cell::Cell;
use std::rc::Rc;

use catcher_core::config::BatchPolicyConfig;
use catcher_core::consistency::{self, BatchDelta, ConsistencyFailure, PreflightError};
use catcher_core::error::EditError;
use thiserror::Error;
use web_time::Instant;

use crate::container::SurfaceContainer;
use crate::layout::FlowLayout;
use crate::surface::{DisplaySurface, FaultInfo, SurfaceFault, SurfaceId};

/// Sets up a surface from scratch: data source, delegate, visual tweaks.
///
/// Runs once when the controller is built and once on every replacement
/// surface. Nothing set up on a previous surface carries over.
pub trait ConfigureSurface {
    fn configure_surface(&mut self, surface: &mut DisplaySurface);
}

impl<F> ConfigureSurface for F
where
    F: FnMut(&mut DisplaySurface),
{
    fn configure_surface(&mut self, surface: &mut DisplaySurface) {
        self(surface);
    }
}

/// Configure strategy that leaves surfaces unbound.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopConfigure;

impl ConfigureSurface for NoopConfigure {
    fn configure_surface(&mut self, _surface: &mut DisplaySurface) {}
}

/// How a batch update concluded without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The batch was applied. The completion fires with `true` on the next
    /// [`settle`](CatcherController::settle).
    Applied,
    /// The batch faulted and the surface was rebuilt. The completion has
    /// already fired with `false`.
    Recovered {
        retired: SurfaceId,
        replacement: SurfaceId,
        fault: FaultInfo,
    },
    /// The preflight check failed, so the batch was skipped and the surface
    /// reloaded instead. The completion has already fired with `false`.
    Reloaded { reason: ConsistencyFailure },
}

impl BatchOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Recovered { .. } => "recovered",
            Self::Reloaded { .. } => "reloaded",
        }
    }
}

/// Why a batch update failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchUpdateError {
    /// The edits were invalid regardless of the data source.
    #[error("invalid batch edit: {0}")]
    InvalidEdit(#[from] EditError),
    /// A structural fault the recovery policy declined to handle.
    #[error("unrecovered structural-consistency fault: {0}")]
    Unrecovered(FaultInfo),
}

/// Running counters for one controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub batches: u64,
    pub applied: u64,
    pub faults: u64,
    pub recoveries: u64,
    pub declined: u64,
    pub preflight_reloads: u64,
    pub invalid_edits: u64,
}

/// Owner of the active surface and the recovery procedure around it.
pub struct CatcherController<C = NoopConfigure> {
    surface: DisplaySurface,
    container: SurfaceContainer,
    configure: C,
    config: BatchPolicyConfig,
    stats: ExecutorStats,
    in_flight: Rc<Cell<usize>>,
}

impl<C> std::fmt::Debug for CatcherController<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatcherController")
            .field("surface", &self.surface)
            .field("container", &self.container)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .field("in_flight", &self.in_flight.get())
            .finish()
    }
}

impl<C: ConfigureSurface> CatcherController<C> {
    /// Build the first surface around `layout`, mount it, configure it and
    /// load it.
    pub fn new(layout: FlowLayout, configure: C) -> Self {
        Self::with_config(layout, configure, BatchPolicyConfig::default())
    }

    pub fn with_config(layout: FlowLayout, mut configure: C, config: BatchPolicyConfig) -> Self {
        let mut surface = DisplaySurface::new(layout);
        let mut container = SurfaceContainer::new();
        container.mount(surface.id());
        configure.configure_surface(&mut surface);
        surface.reload_data();
        Self {
            surface,
            container,
            configure,
            config,
            stats: ExecutorStats::default(),
            in_flight: Rc::new(Cell::new(0)),
        }
    }

    #[must_use]
    pub fn surface(&self) -> &DisplaySurface {
        &self.surface
    }

    /// Bindings and layout of the active surface. Batches still go through
    /// [`perform_batch_updates`](Self::perform_batch_updates).
    pub fn surface_mut(&mut self) -> &mut DisplaySurface {
        &mut self.surface
    }

    #[must_use]
    pub fn container(&self) -> &SurfaceContainer {
        &self.container
    }

    #[must_use]
    pub fn config(&self) -> &BatchPolicyConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        self.stats
    }

    /// Batches whose completion has not fired yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.get()
    }

    /// Fire queued completions on the active surface. Returns how many fired.
    pub fn settle(&mut self) -> usize {
        self.surface.settle()
    }

    /// Run a batch update, recovering from a structural fault if
    /// `should_recover` agrees.
    ///
    /// `updates` runs exactly once and may mutate the data source's model
    /// while recording the edits it made. `completion` fires at most once:
    /// with `true` on the next [`settle`](Self::settle) after an applied
    /// batch, with `false` immediately after a recovery or preflight reload,
    /// and never when an error is returned.
    pub fn perform_batch_updates(
        &mut self,
        updates: impl FnOnce(&mut BatchDelta),
        completion: impl FnOnce(bool) + 'static,
        should_recover: impl FnOnce(&FaultInfo) -> bool,
    ) -> Result<BatchOutcome, BatchUpdateError> {
        let start = Instant::now();
        let span = tracing::debug_span!(
            "catcher.batch",
            surface = %self.surface.id(),
            outcome = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );
        let _guard = span.enter();

        self.stats.batches += 1;
        let overlapping = self.in_flight.get();
        if overlapping > 0 {
            tracing::warn!(
                target: "catcher.batch",
                surface = %self.surface.id(),
                in_flight = overlapping,
                "batch submitted before the previous completion fired"
            );
        }

        let mut delta = BatchDelta::new();
        updates(&mut delta);

        let result = self.run(&delta, completion, should_recover);

        let duration_us = start.elapsed().as_micros() as u64;
        let outcome = match &result {
            Ok(outcome) => outcome.label(),
            Err(BatchUpdateError::InvalidEdit(_)) => "invalid_edit",
            Err(BatchUpdateError::Unrecovered(_)) => "unrecovered",
        };
        span.record("outcome", outcome);
        span.record("duration_us", duration_us);
        tracing::debug!(
            target: "catcher.batch",
            outcome,
            edits = delta.edit_count(),
            duration_us,
            "batch finished"
        );
        result
    }

    fn run(
        &mut self,
        delta: &BatchDelta,
        completion: impl FnOnce(bool) + 'static,
        should_recover: impl FnOnce(&FaultInfo) -> bool,
    ) -> Result<BatchOutcome, BatchUpdateError> {
        if self.config.preflight_check {
            let verdict = self.preflight(delta).inspect_err(|_| {
                self.stats.invalid_edits += 1;
            });
            if let Some(reason) = verdict? {
                self.surface.reload_data();
                self.stats.preflight_reloads += 1;
                tracing::info!(
                    target: "catcher.batch",
                    surface = %self.surface.id(),
                    reason = %reason,
                    "preflight failed, reloaded instead of applying batch"
                );
                completion(false);
                return Ok(BatchOutcome::Reloaded { reason });
            }
        }

        match self.surface.apply_batch(delta) {
            Ok(()) => {
                self.stats.applied += 1;
                self.enqueue_tracked(completion);
                Ok(BatchOutcome::Applied)
            }
            Err(SurfaceFault::InvalidEdit(err)) => {
                self.stats.invalid_edits += 1;
                Err(BatchUpdateError::InvalidEdit(err))
            }
            Err(SurfaceFault::Inconsistent(fault)) => {
                self.stats.faults += 1;
                tracing::warn!(
                    target: "catcher.batch",
                    surface = %fault.surface,
                    reason = %fault.reason,
                    "structural-consistency fault"
                );
                if !should_recover(&fault) {
                    self.stats.declined += 1;
                    return Err(BatchUpdateError::Unrecovered(fault));
                }
                let (retired, replacement) = self.rebuild();
                self.stats.recoveries += 1;
                completion(false);
                Ok(BatchOutcome::Recovered {
                    retired,
                    replacement,
                    fault,
                })
            }
        }
    }

    /// `Ok(Some(reason))` when the delta would fault against the source.
    fn preflight(&self, delta: &BatchDelta) -> Result<Option<ConsistencyFailure>, EditError> {
        let source_counts = self.surface.source_counts();
        match consistency::preflight(&self.surface, &source_counts, delta) {
            Ok(()) => Ok(None),
            Err(PreflightError::Edit(err)) => Err(err),
            Err(PreflightError::Inconsistent(reason)) => Ok(Some(reason)),
        }
    }

    fn enqueue_tracked(&mut self, completion: impl FnOnce(bool) + 'static) {
        let in_flight = Rc::clone(&self.in_flight);
        in_flight.set(in_flight.get() + 1);
        self.surface.enqueue_completion(move |finished| {
            in_flight.set(in_flight.get().saturating_sub(1));
            completion(finished);
        });
    }

    /// Replace the active surface with a fresh one that inherits its layout.
    fn rebuild(&mut self) -> (SurfaceId, SurfaceId) {
        let retired = std::mem::replace(&mut self.surface, DisplaySurface::vacant());
        let retired_id = retired.id();
        let layout = retired.into_layout();

        self.surface = DisplaySurface::new(layout);
        let replacement = self.surface.id();
        if !self.container.replace(retired_id, replacement) {
            tracing::warn!(
                target: "catcher.batch",
                retired = %retired_id,
                "retired surface was not mounted; replacement mounted on top"
            );
        }
        self.configure.configure_surface(&mut self.surface);
        self.surface.reload_data();

        tracing::info!(
            target: "catcher.batch",
            retired = %retired_id,
            replacement = %replacement,
            layout = %self.surface.layout().id(),
            installations = self.surface.layout().installations(),
            "surface rebuilt after structural fault"
        );
        (retired_id, replacement)
    }
}
