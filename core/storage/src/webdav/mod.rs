//! WebDAV backend (read-write).

pub mod metadata;
pub mod provider;

/// Backend identifier reported in metadata.
pub const WEBDAV_BACKEND: &str = "webdav";

pub use provider::{WebDavConfig, WebDavProvider};
