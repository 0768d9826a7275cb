#![forbid(unsafe_code)]

//! Core: index paths, batch consistency checks, and key-existence probing.
//!
//! # Role in Catcher
//! `catcher-core` holds the pieces that do not depend on any display surface:
//!
//! - **[`consistency`]**: the structural check a sectioned display performs
//!   when a batch update is applied, as a pure function returning a
//!   [`ConsistencyFailure`] instead of aborting.
//! - **[`field_probe`]**: a layered, side-effect-free check of whether a
//!   dynamically named field plausibly exists on a value of unknown type.
//! - **[`config`]**: policy-as-data for both of the above.
//!
//! `catcher-widgets` builds the display surface and the resilient batch
//! update controller on top of these.

pub mod config;
pub mod consistency;
pub mod error;
pub mod field_probe;
pub mod index_path;

pub use config::{BatchPolicyConfig, CatcherConfig, ProbeConfig};
pub use consistency::{BatchDelta, ConsistencyFailure, ItemAndSection, PreflightError};
pub use error::{ConfigError, EditAction, EditError};
pub use field_probe::{FieldKey, FieldProber, Introspect, ProbeRegistry, TypeDescriptor};
pub use index_path::IndexPath;
