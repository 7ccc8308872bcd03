//! Canonical, validated paths shared by every storage backend.
//!
//! A [`ProviderPath`] is the only path currency passed between a caller and a
//! provider. It is validated once at construction and never mutated; every
//! derivation (`parent`, `child`, `with_name`) returns a new value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::{Error, Result};

/// Path separator.
pub const SEPARATOR: char = '/';

/// Rendering options fixed at construction.
///
/// These are cosmetic: they change what [`ProviderPath::formatted`] returns,
/// never equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathFormat {
    /// Keep the leading separator when rendering.
    pub prefix: bool,
    /// Keep the trailing separator of non-root directories when rendering.
    pub suffix: bool,
}

impl PathFormat {
    pub const fn new(prefix: bool, suffix: bool) -> Self {
        Self { prefix, suffix }
    }
}

impl Default for PathFormat {
    fn default() -> Self {
        Self::new(true, true)
    }
}

/// Whether a path addresses a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    File,
    Directory,
}

/// A validated, immutable location inside one backend's namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderPath {
    path: String,
    segments: Vec<String>,
    format: PathFormat,
}

impl ProviderPath {
    /// Parse a raw path with the default format (prefix and suffix kept).
    ///
    /// # Errors
    /// - `EmptyPath` if `raw` is empty
    /// - `InvalidPath` if `raw` does not start with `/`, contains `//`, or
    ///   changes under canonicalization (e.g. contains `.` or `..`)
    pub fn parse(raw: &str) -> Result<Self> {
        Self::with_format(raw, PathFormat::default())
    }

    /// Parse a raw path with explicit rendering options.
    pub fn with_format(raw: &str, format: PathFormat) -> Result<Self> {
        validate(raw)?;

        let segments = if raw == "/" {
            Vec::new()
        } else {
            raw.trim_end_matches(SEPARATOR)
                .split(SEPARATOR)
                .skip(1)
                .map(String::from)
                .collect()
        };

        Ok(Self {
            path: raw.to_string(),
            segments,
            format,
        })
    }

    /// The root path, `/`.
    pub fn root() -> Self {
        Self::root_with_format(PathFormat::default())
    }

    fn root_with_format(format: PathFormat) -> Self {
        Self {
            path: "/".to_string(),
            segments: Vec::new(),
            format,
        }
    }

    /// Re-parse a string previously produced by [`formatted`](Self::formatted).
    ///
    /// The stripped separators are restored from `format` and `kind` before
    /// the usual validation runs.
    pub fn from_formatted(rendered: &str, format: PathFormat, kind: PathKind) -> Result<Self> {
        let mut raw = if format.prefix {
            rendered.to_string()
        } else {
            format!("/{}", rendered)
        };
        if !format.suffix && kind == PathKind::Directory && raw != "/" {
            raw.push(SEPARATOR);
        }
        Self::with_format(&raw, format)
    }

    fn from_segments(segments: Vec<String>, kind: PathKind, format: PathFormat) -> Self {
        if segments.is_empty() {
            return Self::root_with_format(format);
        }
        let mut path = format!("/{}", segments.join("/"));
        if kind == PathKind::Directory {
            path.push(SEPARATOR);
        }
        Self {
            path,
            segments,
            format,
        }
    }

    /// Whether this path denotes a directory (root included).
    pub fn is_dir(&self) -> bool {
        self.path.ends_with(SEPARATOR)
    }

    /// Whether this path denotes a file. Root is never a file.
    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn kind(&self) -> PathKind {
        if self.is_dir() {
            PathKind::Directory
        } else {
            PathKind::File
        }
    }

    /// Last segment, `None` for root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments below root.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn format(&self) -> PathFormat {
        self.format
    }

    /// Canonical string form, always with leading separator and, for
    /// directories, trailing separator.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Render according to this path's [`PathFormat`].
    pub fn formatted(&self) -> String {
        let mut rendered = self.path.as_str();
        if !self.format.prefix {
            rendered = rendered.trim_start_matches(SEPARATOR);
        }
        if !rendered.is_empty() && rendered != "/" && !self.format.suffix {
            rendered = rendered.trim_end_matches(SEPARATOR);
        }
        rendered.to_string()
    }

    /// The containing directory, `None` for root.
    ///
    /// The parent is always a directory and keeps this path's format.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let segments = self.segments[..self.segments.len() - 1].to_vec();
        Some(Self::from_segments(segments, PathKind::Directory, self.format))
    }

    /// Derive a child of this directory.
    ///
    /// # Errors
    /// - `InvalidPath` if this path is a file or `name` is not a single segment
    pub fn child(&self, name: &str, kind: PathKind) -> Result<Self> {
        if !self.is_dir() {
            return Err(Error::InvalidPath(format!("{}{}", self.path, name)));
        }
        validate_segment(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self::from_segments(segments, kind, self.format))
    }

    /// Derive a sibling with the same parent, kind and format but a new name.
    ///
    /// # Errors
    /// - `InvalidPath` for root or an invalid segment
    pub fn with_name(&self, name: &str) -> Result<Self> {
        if self.is_root() {
            return Err(Error::InvalidPath(format!("/{}", name)));
        }
        validate_segment(name)?;
        let mut segments = self.segments.clone();
        if let Some(last) = segments.last_mut() {
            *last = name.to_string();
        }
        Ok(Self::from_segments(segments, self.kind(), self.format))
    }
}

/// Resolve `.` and `..` segments the way absolute-path normalization does.
fn resolve_absolute(path: &str) -> String {
    let mut resolved: Vec<&str> = Vec::new();
    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    format!("/{}", resolved.join("/"))
}

fn validate(raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(Error::EmptyPath);
    }
    if !raw.starts_with(SEPARATOR) || raw.contains("//") {
        return Err(Error::InvalidPath(raw.to_string()));
    }

    // Any traversal shortcut changes the canonical form, so comparing the
    // two is the whole traversal check.
    let mut absolute = resolve_absolute(raw);
    if raw != "/" && raw.ends_with(SEPARATOR) {
        absolute.push(SEPARATOR);
    }
    if absolute != raw {
        return Err(Error::InvalidPath(raw.to_string()));
    }
    Ok(())
}

fn validate_segment(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(SEPARATOR) {
        return Err(Error::InvalidPath(name.to_string()));
    }
    Ok(())
}

impl PartialEq for ProviderPath {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for ProviderPath {}

impl Hash for ProviderPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Display for ProviderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl FromStr for ProviderPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProviderPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ProviderPath> for String {
    fn from(path: ProviderPath) -> Self {
        path.path
    }
}

impl AsRef<str> for ProviderPath {
    fn as_ref(&self) -> &str {
        &self.path
    }
}
