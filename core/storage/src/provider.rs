//! Provider contract every storage backend implements.

use async_trait::async_trait;
use std::any::Any;

use omnistore_common::{Error, ProviderPath, Result};

use crate::metadata::{Metadata, MetadataResponse};
use crate::options::ProviderOptions;
use crate::stream::DownloadStream;

/// Uniform operation surface over one storage backend.
///
/// Every method is required; a backend that cannot support an operation
/// implements it to fail and answers `false` to the matching capability
/// query. Implementations hold only fixed configuration, so one instance can
/// serve concurrent, independent calls.
///
/// Mutating entry points of a read-only backend fail with
/// [`Error::ReadOnlyProvider`] before any network access; see
/// [`ensure_writable`](Provider::ensure_writable).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Backend identifier (e.g., "dryad", "webdav", "memory").
    fn name(&self) -> &str;

    /// Whether the backend refuses every mutation.
    fn is_read_only(&self) -> bool;

    /// Whether two entries with the same name may coexist in one folder.
    fn can_duplicate_names(&self) -> bool;

    /// Downcasting hook used by capability negotiation between instances.
    fn as_any(&self) -> &dyn Any;

    /// Whether `intra_copy` can move bytes from this provider to `other`
    /// without the caller relaying them.
    fn can_intra_copy(&self, other: &dyn Provider, path: Option<&ProviderPath>) -> bool;

    /// Whether `intra_move` can relocate entries from this provider to `other`.
    fn can_intra_move(&self, other: &dyn Provider, path: Option<&ProviderPath>) -> bool;

    /// Validate a raw path syntactically and against the backend's
    /// namespace shape.
    ///
    /// # Errors
    /// - `EmptyPath` / `InvalidPath` for malformed input
    /// - `NotFound` if the namespace shape rules the path out
    async fn validate_path(&self, raw: &str, options: &ProviderOptions) -> Result<ProviderPath>;

    /// Like [`validate_path`](Provider::validate_path) plus one authoritative
    /// existence check.
    ///
    /// # Errors
    /// - `NotFound` if the backend reports the target absent
    async fn validate_existing_path(
        &self,
        raw: &str,
        options: &ProviderOptions,
    ) -> Result<ProviderPath>;

    /// Metadata for a file, or a folder and its children.
    async fn metadata(&self, path: &ProviderPath, options: &ProviderOptions)
        -> Result<MetadataResponse>;

    /// Open a single-pass download of a file.
    async fn download(&self, path: &ProviderPath, options: &ProviderOptions)
        -> Result<DownloadStream>;

    /// Write `stream` to `path`, returning the stored entry.
    async fn upload(
        &self,
        stream: DownloadStream,
        path: &ProviderPath,
        options: &ProviderOptions,
    ) -> Result<Metadata>;

    /// Remove the entry at `path`.
    async fn delete(&self, path: &ProviderPath, options: &ProviderOptions) -> Result<()>;

    /// Create a folder at `path`.
    async fn create_folder(&self, path: &ProviderPath, options: &ProviderOptions)
        -> Result<Metadata>;

    /// Copy `src_path` of this provider to `dest_path` of `dest`.
    ///
    /// Only called after [`can_intra_copy`](Provider::can_intra_copy)
    /// returned true. Failures are reported, never papered over with a
    /// generic transfer.
    async fn intra_copy(
        &self,
        dest: &dyn Provider,
        src_path: &ProviderPath,
        dest_path: &ProviderPath,
    ) -> Result<Metadata>;

    /// Move `src_path` of this provider to `dest_path` of `dest`.
    async fn intra_move(
        &self,
        dest: &dyn Provider,
        src_path: &ProviderPath,
        dest_path: &ProviderPath,
    ) -> Result<Metadata>;

    /// Fail fast for read-only backends.
    fn ensure_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(Error::ReadOnlyProvider(self.name().to_string()));
        }
        Ok(())
    }
}
