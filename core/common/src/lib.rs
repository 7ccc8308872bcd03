//! Common utilities and types shared across omnistore modules.
//!
//! This module provides the foundational types every storage backend and
//! caller agrees on: the validated path currency, the error taxonomy, and a
//! secret wrapper for configured credentials.

pub mod error;
pub mod path;
pub mod types;

pub use error::{Error, OperationKind, Result};
pub use path::{PathFormat, PathKind, ProviderPath};
pub use types::Secret;
