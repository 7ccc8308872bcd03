//! Storage provider abstraction for omnistore.
//!
//! This module provides one polymorphic provider contract over
//! heterogeneous storage backends (Dryad, WebDAV, in-memory), a registry
//! for dynamic provider resolution, and the caller-side copy/move
//! negotiation between providers.
//!
//! # Design Principles
//! - Provider isolation: backends share only the path, metadata and error types
//! - Async operations: all I/O operations are async
//! - Streaming support: downloads are lazy single-pass streams
//! - Unified error semantics: transport outcomes are classified per operation

pub mod config;
pub mod dryad;
pub mod memory;
pub mod metadata;
pub mod options;
pub mod provider;
pub mod registry;
pub mod stream;
pub mod transfer;
pub mod transport;
pub mod validation;
pub mod webdav;

#[cfg(test)]
mod testing;

pub use config::{BackendConfig, Config};
pub use dryad::{DryadConfig, DryadProvider};
pub use memory::MemoryProvider;
pub use metadata::{Entry, EntryKind, Metadata, MetadataRecord, MetadataResponse};
pub use options::{ByteRange, ConflictMode, ProviderOptions};
pub use provider::Provider;
pub use registry::{create_default_registry, BackendKind, ProviderFactory, ProviderRegistry};
pub use stream::{ByteStream, DownloadStream};
pub use transfer::{cancellable, Strategy, Transfer, TransferOutcome};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use validation::{DepthRule, Existence, ValidationState};
pub use webdav::{WebDavConfig, WebDavProvider};
