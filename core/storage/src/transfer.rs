//! Copy and move between providers.
//!
//! The source provider is asked first whether it can reach the destination
//! directly (`can_intra_copy` / `can_intra_move`). If it can, the intra
//! operation runs and its errors are final. Otherwise the bytes are relayed
//! through the caller: download, then upload, folder by folder.

use futures::future::BoxFuture;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use omnistore_common::{Error, PathKind, ProviderPath, Result};

use crate::metadata::Metadata;
use crate::options::{ConflictMode, ProviderOptions};
use crate::provider::Provider;

/// Highest suffix tried when keeping both entries.
const MAX_KEEP_ATTEMPTS: u32 = 1000;

/// How a transfer was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The source provider handled it directly.
    Intra,
    /// Relayed through download and upload.
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    pub metadata: Metadata,
    pub strategy: Strategy,
}

/// Race `future` against `token`; cancellation drops the future.
pub async fn cancellable<T>(
    token: &CancellationToken,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        _ = token.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}

/// A copy or move from one provider to another (possibly the same one).
pub struct Transfer<'a> {
    src: &'a dyn Provider,
    dest: &'a dyn Provider,
    conflict: ConflictMode,
    cancel: CancellationToken,
}

impl<'a> Transfer<'a> {
    pub fn new(src: &'a dyn Provider, dest: &'a dyn Provider) -> Self {
        Self {
            src,
            dest,
            conflict: ConflictMode::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn conflict(mut self, mode: ConflictMode) -> Self {
        self.conflict = mode;
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn options(&self) -> ProviderOptions {
        ProviderOptions::new().with_conflict(self.conflict)
    }

    /// Copy `src_path` to `dest_path`. A file copied onto a folder path
    /// lands inside that folder under its own name.
    pub async fn copy(&self, src_path: &ProviderPath, dest_path: &ProviderPath) -> Result<TransferOutcome> {
        cancellable(&self.cancel, async {
            let target = self.target(src_path, dest_path).await?;
            self.copy_to(src_path, &target).await
        })
        .await
    }

    /// Move `src_path` to `dest_path`.
    ///
    /// # Errors
    /// - `ReadOnlyProvider` if the source cannot delete, before any other work
    pub async fn move_to(
        &self,
        src_path: &ProviderPath,
        dest_path: &ProviderPath,
    ) -> Result<TransferOutcome> {
        self.src.ensure_writable()?;
        cancellable(&self.cancel, async {
            let target = self.target(src_path, dest_path).await?;

            if self.src.can_intra_move(self.dest, Some(src_path)) {
                debug!(from = %src_path, to = %target, "Intra move");
                let metadata = self.src.intra_move(self.dest, src_path, &target).await?;
                return Ok(TransferOutcome {
                    metadata,
                    strategy: Strategy::Intra,
                });
            }

            let copied = self.copy_to(src_path, &target).await?;
            self.src.delete(src_path, &self.options()).await?;
            info!(from = %src_path, to = %target, "Moved by copy and delete");
            Ok(TransferOutcome {
                metadata: copied.metadata,
                strategy: Strategy::Fallback,
            })
        })
        .await
    }

    async fn copy_to(&self, src_path: &ProviderPath, target: &ProviderPath) -> Result<TransferOutcome> {
        if self.src.can_intra_copy(self.dest, Some(src_path)) {
            debug!(from = %src_path, to = %target, "Intra copy");
            let metadata = self.src.intra_copy(self.dest, src_path, target).await?;
            return Ok(TransferOutcome {
                metadata,
                strategy: Strategy::Intra,
            });
        }

        let metadata = self.relay(src_path, target).await?;
        info!(from = %src_path, to = %target, "Copied through relay");
        Ok(TransferOutcome {
            metadata,
            strategy: Strategy::Fallback,
        })
    }

    /// Final destination path, after folder expansion and conflict handling.
    async fn target(&self, src_path: &ProviderPath, dest_path: &ProviderPath) -> Result<ProviderPath> {
        let target = match src_path.name() {
            Some(name) if src_path.is_file() && dest_path.is_dir() => {
                dest_path.child(name, PathKind::File)?
            }
            _ => dest_path.clone(),
        };
        if self.conflict == ConflictMode::Keep && !self.dest.can_duplicate_names() {
            return self.free_name(target).await;
        }
        Ok(target)
    }

    /// First of `target`, `name (1).ext`, `name (2).ext`, ... that does not
    /// exist at the destination.
    async fn free_name(&self, target: ProviderPath) -> Result<ProviderPath> {
        let Some(name) = target.name().map(String::from) else {
            return Ok(target);
        };
        let (stem, ext) = split_extension(&name, target.is_file());

        let mut candidate = target.clone();
        for n in 1..=MAX_KEEP_ATTEMPTS {
            match self
                .dest
                .validate_existing_path(candidate.as_str(), &ProviderOptions::new())
                .await
            {
                Err(Error::NotFound(_)) => return Ok(candidate),
                Err(e) => return Err(e),
                Ok(_) => candidate = target.with_name(&format!("{} ({}){}", stem, n, ext))?,
            }
        }
        Err(Error::Conflict(format!(
            "No free name for {} after {} attempts",
            target, MAX_KEEP_ATTEMPTS
        )))
    }

    /// Download and upload a file, or recreate a folder and copy each child.
    fn relay<'b>(&'b self, src_path: &'b ProviderPath, target: &'b ProviderPath) -> BoxFuture<'b, Result<Metadata>> {
        Box::pin(async move {
            if src_path.is_file() {
                let stream = self.src.download(src_path, &ProviderOptions::new()).await?;
                return self.dest.upload(stream, target, &self.options()).await;
            }

            let folder = match self.dest.create_folder(target, &self.options()).await {
                Ok(folder) => folder,
                Err(Error::Conflict(_)) if self.conflict == ConflictMode::Replace => {
                    self.dest
                        .metadata(target, &ProviderOptions::new())
                        .await?
                        .entry()
                        .clone()
                }
                Err(e) => return Err(e),
            };

            let listing = self.src.metadata(src_path, &ProviderOptions::new()).await?;
            for child in listing.children() {
                let Some(name) = child.path.name() else {
                    continue;
                };
                let child_target = target.child(name, child.path.kind())?;
                self.copy_to(&child.path, &child_target).await?;
            }
            Ok(folder)
        })
    }
}

/// Split `report.final.pdf` into `report.final` and `.pdf`. Folders and
/// dotfiles keep their whole name as the stem.
fn split_extension(name: &str, is_file: bool) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if is_file && index > 0 => name.split_at(index),
        _ => (name, ""),
    }
}
