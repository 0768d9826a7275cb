#![forbid(unsafe_code)]

//! Display surfaces and the resilient batch-update controller.
//!
//! # Role in Catcher
//! `catcher-widgets` puts the structural check from `catcher-core` behind a
//! sectioned [`DisplaySurface`], and wraps that surface in a
//! [`CatcherController`] that can rebuild it after a faulted batch update
//! without losing its [`FlowLayout`].
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//!
//! use catcher_core::IndexPath;
//! use catcher_widgets::{
//!     BatchOutcome, CatcherController, DisplaySurface, FlowLayout, SectionedData,
//!     SurfaceDataSource,
//! };
//!
//! let data = Rc::new(SectionedData::new([vec!["a", "b", "c"], vec!["d", "e"]]));
//! let source = Rc::clone(&data);
//! let mut controller = CatcherController::new(
//!     FlowLayout::new().columns(2),
//!     move |surface: &mut DisplaySurface| {
//!         surface.set_data_source(Rc::clone(&source) as Rc<dyn SurfaceDataSource>);
//!     },
//! );
//!
//! // Claims a deletion the data source never saw.
//! let outcome = controller
//!     .perform_batch_updates(
//!         |delta| {
//!             delta.delete_items([IndexPath::new(0, 0)]);
//!         },
//!         |finished| assert!(!finished),
//!         |_fault| true,
//!     )
//!     .unwrap();
//! assert!(matches!(outcome, BatchOutcome::Recovered { .. }));
//! assert_eq!(controller.surface().displayed(), data.snapshot().as_slice());
//! ```

pub mod catcher;
pub mod container;
pub mod data_source;
pub mod layout;
pub mod surface;

pub use catcher::{
    BatchOutcome, BatchUpdateError, CatcherController, ConfigureSurface, ExecutorStats,
    NoopConfigure,
};
pub use container::SurfaceContainer;
pub use data_source::{SectionedData, SurfaceDataSource, SurfaceDelegate};
pub use layout::{FlowLayout, LayoutId, Size};
pub use surface::{DisplaySurface, FaultInfo, SurfaceFault, SurfaceId};
