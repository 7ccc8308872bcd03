//! In-memory storage provider.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use omnistore_common::{Error, OperationKind, PathFormat, PathKind, ProviderPath, Result};

use crate::metadata::{Metadata, MetadataResponse};
use crate::options::ProviderOptions;
use crate::provider::Provider;
use crate::stream::DownloadStream;
use crate::validation::{Existence, ValidationState};

/// Backend identifier.
pub const MEMORY_BACKEND: &str = "memory";

/// In-memory storage entry, keyed by canonical path.
#[derive(Debug, Clone)]
enum StoredEntry {
    File {
        data: Bytes,
        content_type: Option<String>,
        etag: String,
        modified: DateTime<Utc>,
    },
    Folder {
        etag: String,
        modified: DateTime<Utc>,
    },
}

impl StoredEntry {
    fn folder() -> Self {
        StoredEntry::Folder {
            etag: Uuid::new_v4().to_string(),
            modified: Utc::now(),
        }
    }

    /// Fresh identity for a copied entry.
    fn duplicate(&self) -> Self {
        match self {
            StoredEntry::File {
                data, content_type, ..
            } => StoredEntry::File {
                data: data.clone(),
                content_type: content_type.clone(),
                etag: Uuid::new_v4().to_string(),
                modified: Utc::now(),
            },
            StoredEntry::Folder { .. } => StoredEntry::folder(),
        }
    }
}

type Store = Arc<RwLock<BTreeMap<String, StoredEntry>>>;

/// Read-write provider that keeps everything in process memory.
///
/// Clones share the same store, so intra copy/move is available between
/// them. Data is lost when the last clone is dropped.
#[derive(Clone)]
pub struct MemoryProvider {
    store: Store,
}

impl MemoryProvider {
    /// Create a new store holding only the root folder.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("/".to_string(), StoredEntry::folder());
        Self {
            store: Arc::new(RwLock::new(entries)),
        }
    }

    fn shares_store_with(&self, other: &dyn Provider) -> bool {
        other
            .as_any()
            .downcast_ref::<MemoryProvider>()
            .is_some_and(|other| Arc::ptr_eq(&self.store, &other.store))
    }

    fn to_metadata(path: &ProviderPath, entry: &StoredEntry) -> Metadata {
        let name = path.name().unwrap_or_default();
        match entry {
            StoredEntry::File {
                data,
                content_type,
                etag,
                modified,
            } => Metadata::file(name, path.clone(), MEMORY_BACKEND, etag.as_str())
                .with_size(Some(data.len() as u64))
                .with_content_type(content_type.clone())
                .with_modified(Some(*modified)),
            StoredEntry::Folder { etag, modified } => {
                Metadata::folder(name, path.clone(), MEMORY_BACKEND, etag.as_str())
                    .with_modified(Some(*modified))
            }
        }
    }

    fn entry_path(key: &str) -> Result<ProviderPath> {
        ProviderPath::parse(key)
    }

    /// Keys of `path` and, for folders, everything below it.
    fn subtree(entries: &BTreeMap<String, StoredEntry>, path: &ProviderPath) -> Vec<String> {
        let prefix = path.as_str();
        if path.is_file() {
            return entries
                .get_key_value(prefix)
                .map(|(key, _)| vec![key.clone()])
                .unwrap_or_default();
        }
        entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn require_parent(entries: &BTreeMap<String, StoredEntry>, path: &ProviderPath) -> Result<()> {
        match path.parent() {
            Some(parent) if !entries.contains_key(parent.as_str()) => {
                Err(Error::NotFound(parent.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Copy the subtree at `from` to `to`; `remove` turns it into a move.
    async fn relocate(&self, from: &ProviderPath, to: &ProviderPath, remove: bool) -> Result<Metadata> {
        let kind = if remove {
            OperationKind::Move
        } else {
            OperationKind::Copy
        };
        if from.kind() != to.kind() {
            return Err(Error::operation(
                kind,
                None,
                format!("Cannot {} {} onto {}", kind, from, to),
            ));
        }
        let nested = to.as_str().starts_with(from.as_str()) || from.as_str().starts_with(to.as_str());
        if from != to && from.is_dir() && nested {
            return Err(Error::operation(
                kind,
                None,
                format!("Cannot {} {} into itself", kind, from),
            ));
        }

        let mut entries = self.store.write().await;
        let Some(existing) = entries.get(from.as_str()) else {
            return Err(Error::NotFound(from.to_string()));
        };
        if from == to {
            return Ok(Self::to_metadata(to, existing));
        }
        Self::require_parent(&entries, to)?;
        if to.is_file() && entries.contains_key(&format!("{}/", to)) {
            return Err(Error::Conflict(format!("{} is a folder", to)));
        }

        let moved: Vec<(String, StoredEntry)> = Self::subtree(&entries, from)
            .into_iter()
            .filter_map(|key| {
                let entry = if remove {
                    entries.remove(&key)
                } else {
                    entries.get(&key).map(StoredEntry::duplicate)
                }?;
                Some((format!("{}{}", to.as_str(), &key[from.as_str().len()..]), entry))
            })
            .collect();

        for key in Self::subtree(&entries, to) {
            entries.remove(&key);
        }
        entries.extend(moved);

        let entry = entries
            .get(to.as_str())
            .ok_or_else(|| Error::operation(kind, None, format!("{} vanished", to)))?;
        info!(from = %from, to = %to, %kind, "Entry relocated");
        Ok(Self::to_metadata(to, entry))
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    fn name(&self) -> &str {
        MEMORY_BACKEND
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn can_duplicate_names(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn can_intra_copy(&self, other: &dyn Provider, _path: Option<&ProviderPath>) -> bool {
        self.shares_store_with(other)
    }

    fn can_intra_move(&self, other: &dyn Provider, _path: Option<&ProviderPath>) -> bool {
        self.shares_store_with(other)
    }

    async fn validate_path(&self, raw: &str, _options: &ProviderOptions) -> Result<ProviderPath> {
        ValidationState::start(raw, PathFormat::default()).into_result()
    }

    async fn validate_existing_path(
        &self,
        raw: &str,
        _options: &ProviderOptions,
    ) -> Result<ProviderPath> {
        ValidationState::start(raw, PathFormat::default())
            .run_lookup(|path| async move {
                let entries = self.store.read().await;
                Ok(if entries.contains_key(path.as_str()) {
                    Existence::Present
                } else {
                    Existence::Absent
                })
            })
            .await
    }

    async fn metadata(
        &self,
        path: &ProviderPath,
        _options: &ProviderOptions,
    ) -> Result<MetadataResponse> {
        let entries = self.store.read().await;
        let entry = entries
            .get(path.as_str())
            .ok_or_else(|| Error::NotFound(path.to_string()))?;

        if path.is_file() {
            return Ok(MetadataResponse::File(Self::to_metadata(path, entry)));
        }

        let folder = Self::to_metadata(path, entry);
        let mut children = Vec::new();
        for key in Self::subtree(&entries, path) {
            let relative = &key[path.as_str().len()..];
            let relative = relative.strip_suffix('/').unwrap_or(relative);
            if relative.is_empty() || relative.contains('/') {
                continue;
            }
            if let Some(child) = entries.get(&key) {
                children.push(Self::to_metadata(&Self::entry_path(&key)?, child));
            }
        }
        Ok(MetadataResponse::Folder { folder, children })
    }

    async fn download(
        &self,
        path: &ProviderPath,
        options: &ProviderOptions,
    ) -> Result<DownloadStream> {
        let entries = self.store.read().await;
        match entries.get(path.as_str()) {
            Some(StoredEntry::File {
                data, content_type, ..
            }) => {
                let data = match options.range() {
                    Some(range) => {
                        let len = data.len() as u64;
                        let start = range.start.min(len) as usize;
                        let end = range.end.map_or(len, |end| end.saturating_add(1).min(len)) as usize;
                        data.slice(start..end)
                    }
                    None => data.clone(),
                };
                Ok(DownloadStream::from_bytes(data)
                    .with_name(path.name().map(String::from))
                    .with_content_type(content_type.clone()))
            }
            Some(StoredEntry::Folder { .. }) => Err(Error::operation(
                OperationKind::Download,
                None,
                format!("Cannot download folder {}", path),
            )),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    async fn upload(
        &self,
        stream: DownloadStream,
        path: &ProviderPath,
        _options: &ProviderOptions,
    ) -> Result<Metadata> {
        self.ensure_writable()?;
        if !path.is_file() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        debug!(path = %path, "Uploading to memory store");

        let content_type = stream.content_type().map(String::from);
        let data = stream.collect_bytes().await?;

        let mut entries = self.store.write().await;
        Self::require_parent(&entries, path)?;
        if let Some(StoredEntry::Folder { .. }) = entries.get(&format!("{}/", path)) {
            return Err(Error::Conflict(format!("{} is a folder", path)));
        }

        let entry = StoredEntry::File {
            data,
            content_type,
            etag: Uuid::new_v4().to_string(),
            modified: Utc::now(),
        };
        let metadata = Self::to_metadata(path, &entry);
        entries.insert(path.to_string(), entry);

        info!(path = %path, size = metadata.size(), "File stored");
        Ok(metadata)
    }

    async fn delete(&self, path: &ProviderPath, _options: &ProviderOptions) -> Result<()> {
        self.ensure_writable()?;
        if path.is_root() {
            return Err(Error::operation(
                OperationKind::Delete,
                None,
                "Cannot delete the root folder",
            ));
        }

        let mut entries = self.store.write().await;
        if !entries.contains_key(path.as_str()) {
            return Err(Error::NotFound(path.to_string()));
        }
        for key in Self::subtree(&entries, path) {
            entries.remove(&key);
        }

        info!(path = %path, "Entry deleted");
        Ok(())
    }

    async fn create_folder(
        &self,
        path: &ProviderPath,
        _options: &ProviderOptions,
    ) -> Result<Metadata> {
        self.ensure_writable()?;
        if !path.is_dir() || path.is_root() {
            return Err(Error::InvalidPath(path.to_string()));
        }

        let mut entries = self.store.write().await;
        Self::require_parent(&entries, path)?;
        let as_file = path.as_str().trim_end_matches('/');
        if entries.contains_key(path.as_str()) || entries.contains_key(as_file) {
            return Err(Error::Conflict(format!("{} already exists", path)));
        }

        let entry = StoredEntry::folder();
        let metadata = Self::to_metadata(path, &entry);
        entries.insert(path.to_string(), entry);

        info!(path = %path, "Folder created");
        Ok(metadata)
    }

    async fn intra_copy(
        &self,
        dest: &dyn Provider,
        src_path: &ProviderPath,
        dest_path: &ProviderPath,
    ) -> Result<Metadata> {
        if !self.shares_store_with(dest) {
            return Err(Error::operation(
                OperationKind::Copy,
                None,
                format!("Cannot copy from memory store into '{}'", dest.name()),
            ));
        }
        self.relocate(src_path, dest_path, false).await
    }

    async fn intra_move(
        &self,
        dest: &dyn Provider,
        src_path: &ProviderPath,
        dest_path: &ProviderPath,
    ) -> Result<Metadata> {
        self.ensure_writable()?;
        if !self.shares_store_with(dest) {
            return Err(Error::operation(
                OperationKind::Move,
                None,
                format!("Cannot move from memory store into '{}'", dest.name()),
            ));
        }
        self.relocate(src_path, dest_path, true).await
    }
}

impl MemoryProvider {
    /// Kind of entry stored at `path`, if any.
    pub async fn kind_of(&self, path: &ProviderPath) -> Option<PathKind> {
        match self.store.read().await.get(path.as_str()) {
            Some(StoredEntry::File { .. }) => Some(PathKind::File),
            Some(StoredEntry::Folder { .. }) => Some(PathKind::Directory),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ByteRange;

    fn path(raw: &str) -> ProviderPath {
        ProviderPath::parse(raw).unwrap()
    }

    async fn put(provider: &MemoryProvider, raw: &str, data: &'static [u8]) -> Metadata {
        provider
            .upload(DownloadStream::from_bytes(data), &path(raw), &ProviderOptions::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_download() {
        let provider = MemoryProvider::new();
        let metadata = put(&provider, "/test.txt", b"Hello, World!").await;
        assert_eq!(metadata.size(), Some(13));
        assert_eq!(metadata.backend, "memory");

        let download = provider
            .download(&path("/test.txt"), &ProviderOptions::new())
            .await
            .unwrap();
        assert_eq!(download.size(), Some(13));
        assert_eq!(download.collect_bytes().await.unwrap().as_ref(), b"Hello, World!");
    }

    #[tokio::test]
    async fn test_ranged_download() {
        let provider = MemoryProvider::new();
        put(&provider, "/r.bin", b"0123456789").await;
        let options = ProviderOptions::new().with_range(ByteRange { start: 2, end: Some(4) });
        let download = provider.download(&path("/r.bin"), &options).await.unwrap();
        assert_eq!(download.collect_bytes().await.unwrap().as_ref(), b"234");
    }

    #[tokio::test]
    async fn test_range_end_past_file_is_clamped() {
        let provider = MemoryProvider::new();
        put(&provider, "/r.bin", b"0123456789").await;
        let options = ProviderOptions::new().with_range(ByteRange {
            start: 2,
            end: Some(u64::MAX),
        });
        let download = provider.download(&path("/r.bin"), &options).await.unwrap();
        assert_eq!(download.collect_bytes().await.unwrap().as_ref(), b"23456789");
    }

    #[tokio::test]
    async fn test_upload_requires_parent() {
        let provider = MemoryProvider::new();
        let err = provider
            .upload(DownloadStream::from_bytes(&b"x"[..]), &path("/missing/x"), &ProviderOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_validate_existing_path() {
        let provider = MemoryProvider::new();
        put(&provider, "/a.txt", b"a").await;
        let options = ProviderOptions::new();

        let valid = provider.validate_existing_path("/a.txt", &options).await.unwrap();
        assert_eq!(valid.as_str(), "/a.txt");
        assert!(matches!(
            provider.validate_existing_path("/b.txt", &options).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            provider.validate_existing_path("/a.txt/", &options).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_root_metadata_lists_children() {
        let provider = MemoryProvider::new();
        let options = ProviderOptions::new();
        provider.create_folder(&path("/dir/"), &options).await.unwrap();
        put(&provider, "/dir/file1.txt", b"1").await;
        put(&provider, "/top.txt", b"2").await;

        let response = provider.metadata(&ProviderPath::root(), &options).await.unwrap();
        assert!(response.entry().is_folder());
        assert_eq!(response.entry().path.as_str(), "/");
        let mut names: Vec<_> = response.children().iter().map(|m| m.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["dir", "top.txt"]);

        let dir = provider.metadata(&path("/dir/"), &options).await.unwrap();
        assert_eq!(dir.children().len(), 1);
        assert_eq!(dir.children()[0].path.as_str(), "/dir/file1.txt");
    }

    #[tokio::test]
    async fn test_create_folder_conflict() {
        let provider = MemoryProvider::new();
        let options = ProviderOptions::new();
        provider.create_folder(&path("/d/"), &options).await.unwrap();
        assert!(matches!(
            provider.create_folder(&path("/d/"), &options).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_folder_recursively() {
        let provider = MemoryProvider::new();
        let options = ProviderOptions::new();
        provider.create_folder(&path("/d/"), &options).await.unwrap();
        put(&provider, "/d/f", b"f").await;

        provider.delete(&path("/d/"), &options).await.unwrap();
        assert_eq!(provider.kind_of(&path("/d/f")).await, None);
        assert_eq!(provider.kind_of(&path("/d/")).await, None);
    }

    #[tokio::test]
    async fn test_intra_copy_and_move_between_clones() {
        let provider = MemoryProvider::new();
        let clone = provider.clone();
        put(&provider, "/original.txt", b"abc").await;

        assert!(provider.can_intra_copy(&clone, None));
        assert!(!provider.can_intra_copy(&MemoryProvider::new(), None));

        provider
            .intra_copy(&clone, &path("/original.txt"), &path("/copy.txt"))
            .await
            .unwrap();
        assert_eq!(provider.kind_of(&path("/original.txt")).await, Some(PathKind::File));

        let moved = provider
            .intra_move(&clone, &path("/copy.txt"), &path("/moved.txt"))
            .await
            .unwrap();
        assert_eq!(moved.name, "moved.txt");
        assert_eq!(provider.kind_of(&path("/copy.txt")).await, None);
    }

    #[tokio::test]
    async fn test_intra_copy_to_foreign_store_fails() {
        let provider = MemoryProvider::new();
        put(&provider, "/a", b"a").await;
        let err = provider
            .intra_copy(&MemoryProvider::new(), &path("/a"), &path("/b"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Copy { .. }));
    }

    #[tokio::test]
    async fn test_relocate_onto_itself_keeps_entry() {
        let provider = MemoryProvider::new();
        let clone = provider.clone();
        put(&provider, "/a.txt", b"abc").await;

        let copied = provider
            .intra_copy(&clone, &path("/a.txt"), &path("/a.txt"))
            .await
            .unwrap();
        assert_eq!(copied.size(), Some(3));
        let moved = provider
            .intra_move(&clone, &path("/a.txt"), &path("/a.txt"))
            .await
            .unwrap();
        assert_eq!(moved.name, "a.txt");

        let download = provider
            .download(&path("/a.txt"), &ProviderOptions::new())
            .await
            .unwrap();
        assert_eq!(download.collect_bytes().await.unwrap().as_ref(), b"abc");
    }

    #[tokio::test]
    async fn test_relocate_file_onto_folder_twin_conflicts() {
        let provider = MemoryProvider::new();
        let clone = provider.clone();
        provider.create_folder(&path("/b/"), &ProviderOptions::new()).await.unwrap();
        put(&provider, "/a", b"a").await;

        let err = provider
            .intra_copy(&clone, &path("/a"), &path("/b"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(provider.kind_of(&path("/a")).await, Some(PathKind::File));
        assert_eq!(provider.kind_of(&path("/b/")).await, Some(PathKind::Directory));
    }
}
