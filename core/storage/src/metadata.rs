//! Typed description of file and folder entries reported by a backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use omnistore_common::{Error, PathKind, ProviderPath};

/// Content type reported for folders when the backend does not supply one.
pub const FOLDER_CONTENT_TYPE: &str = "httpd/unix-directory";

/// Kind-specific part of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    File {
        size: Option<u64>,
        content_type: Option<String>,
    },
    Folder {
        content_type: Option<String>,
    },
}

/// Serialized discriminant of an [`Entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// One file or folder as reported by a backend.
///
/// Built fresh from every backend response and handed to the caller; the
/// core never caches or mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "MetadataRecord", try_from = "MetadataRecord")]
pub struct Metadata {
    pub name: String,
    pub path: ProviderPath,
    pub backend: String,
    pub etag: String,
    pub modified: Option<DateTime<Utc>>,
    pub entry: Entry,
    /// Backend-specific attributes not covered by the common field set.
    pub extra: Option<serde_json::Value>,
}

impl Metadata {
    /// Create file metadata. Size and content type are unset.
    pub fn file(
        name: impl Into<String>,
        path: ProviderPath,
        backend: impl Into<String>,
        etag: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            path,
            backend,
            etag,
            Entry::File {
                size: None,
                content_type: None,
            },
        )
    }

    /// Create folder metadata.
    pub fn folder(
        name: impl Into<String>,
        path: ProviderPath,
        backend: impl Into<String>,
        etag: impl Into<String>,
    ) -> Self {
        Self::new(name, path, backend, etag, Entry::Folder { content_type: None })
    }

    fn new(
        name: impl Into<String>,
        path: ProviderPath,
        backend: impl Into<String>,
        etag: impl Into<String>,
        entry: Entry,
    ) -> Self {
        Self {
            name: name.into(),
            path,
            backend: backend.into(),
            etag: etag.into(),
            modified: None,
            entry,
            extra: None,
        }
    }

    /// Set the size. Ignored for folders, which never carry one.
    pub fn with_size(mut self, value: Option<u64>) -> Self {
        if let Entry::File { size, .. } = &mut self.entry {
            *size = value;
        }
        self
    }

    pub fn with_content_type(mut self, value: Option<String>) -> Self {
        match &mut self.entry {
            Entry::File { content_type, .. } | Entry::Folder { content_type } => {
                *content_type = value
            }
        }
        self
    }

    pub fn with_modified(mut self, modified: Option<DateTime<Utc>>) -> Self {
        self.modified = modified;
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn kind(&self) -> EntryKind {
        match self.entry {
            Entry::File { .. } => EntryKind::File,
            Entry::Folder { .. } => EntryKind::Folder,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind() == EntryKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind() == EntryKind::Folder
    }

    /// Size in bytes; always `None` for folders.
    pub fn size(&self) -> Option<u64> {
        match self.entry {
            Entry::File { size, .. } => size,
            Entry::Folder { .. } => None,
        }
    }

    /// Content type, with folders falling back to [`FOLDER_CONTENT_TYPE`].
    pub fn content_type(&self) -> Option<&str> {
        match &self.entry {
            Entry::File { content_type, .. } => content_type.as_deref(),
            Entry::Folder { content_type } => {
                Some(content_type.as_deref().unwrap_or(FOLDER_CONTENT_TYPE))
            }
        }
    }

    /// The language-agnostic field set handed to callers.
    pub fn to_record(&self) -> MetadataRecord {
        MetadataRecord::from(self.clone())
    }
}

/// Flat representation of [`Metadata`] used on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub modified: Option<DateTime<Utc>>,
    pub etag: String,
    pub backend: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl From<Metadata> for MetadataRecord {
    fn from(metadata: Metadata) -> Self {
        let kind = metadata.kind();
        let size = metadata.size();
        let content_type = metadata.content_type().map(String::from);
        Self {
            name: metadata.name,
            path: metadata.path.to_string(),
            kind,
            size,
            content_type,
            modified: metadata.modified,
            etag: metadata.etag,
            backend: metadata.backend,
            extra: metadata.extra,
        }
    }
}

impl TryFrom<MetadataRecord> for Metadata {
    type Error = Error;

    fn try_from(record: MetadataRecord) -> Result<Self, Error> {
        let path = ProviderPath::parse(&record.path)?;
        let expected = match record.kind {
            EntryKind::File => PathKind::File,
            EntryKind::Folder => PathKind::Directory,
        };
        if path.kind() != expected {
            return Err(Error::Serialization(format!(
                "path '{}' does not match kind {:?}",
                record.path, record.kind
            )));
        }
        let entry = match record.kind {
            EntryKind::File => Entry::File {
                size: record.size,
                content_type: record.content_type,
            },
            EntryKind::Folder => Entry::Folder {
                content_type: record.content_type,
            },
        };
        Ok(Self {
            name: record.name,
            path,
            backend: record.backend,
            etag: record.etag,
            modified: record.modified,
            entry,
            extra: record.extra,
        })
    }
}

/// Result of a metadata lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataResponse {
    /// A file path resolves to exactly one entry.
    File(Metadata),
    /// A folder path resolves to its own entry plus one entry per child.
    Folder {
        folder: Metadata,
        children: Vec<Metadata>,
    },
}

impl MetadataResponse {
    /// The entry describing the requested path itself.
    pub fn entry(&self) -> &Metadata {
        match self {
            MetadataResponse::File(metadata) => metadata,
            MetadataResponse::Folder { folder, .. } => folder,
        }
    }

    /// Children of a folder; empty for files.
    pub fn children(&self) -> &[Metadata] {
        match self {
            MetadataResponse::File(_) => &[],
            MetadataResponse::Folder { children, .. } => children,
        }
    }

    pub fn into_file(self) -> Option<Metadata> {
        match self {
            MetadataResponse::File(metadata) => Some(metadata),
            MetadataResponse::Folder { .. } => None,
        }
    }

    /// Every entry in the response, the requested path first.
    pub fn into_entries(self) -> Vec<Metadata> {
        match self {
            MetadataResponse::File(metadata) => vec![metadata],
            MetadataResponse::Folder { folder, children } => {
                let mut entries = Vec::with_capacity(children.len() + 1);
                entries.push(folder);
                entries.extend(children);
                entries
            }
        }
    }
}
