//! Dryad data repository backend (read-only).
//!
//! Exposes one data package as a two-level tree: `/<package>/` holds the
//! package's files as `/<package>/<file>`.

pub mod metadata;
pub mod provider;

/// Backend identifier reported in metadata.
pub const DRYAD_BACKEND: &str = "dryad";

pub use provider::{DryadConfig, DryadProvider, DRYAD_META_URL, DRYAD_SYSMETA_URL};
