//! Optional per-call parameters shared by all providers.
//!
//! Options arrive as a loose JSON object so that backends with differing
//! optional features can share one call surface. Only recognized keys are
//! interpreted; anything else is ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How to treat an existing entry at the destination of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictMode {
    /// Overwrite the existing entry.
    #[default]
    Replace,
    /// Keep the existing entry and write under a fresh name.
    Keep,
}

/// Inclusive byte range for partial downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Value for an HTTP `Range` header.
    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Recognized-key view over caller supplied options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderOptions {
    values: Map<String, Value>,
}

impl ProviderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value. Anything but an object yields empty options.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    /// Set a single option.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn with_conflict(self, mode: ConflictMode) -> Self {
        let value = match mode {
            ConflictMode::Replace => "replace",
            ConflictMode::Keep => "keep",
        };
        self.with("conflict", Value::from(value))
    }

    pub fn with_range(self, range: ByteRange) -> Self {
        let value = match range.end {
            Some(end) => serde_json::json!([range.start, end]),
            None => serde_json::json!([range.start]),
        };
        self.with("range", value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Conflict handling mode; unrecognized values fall back to replace.
    pub fn conflict(&self) -> ConflictMode {
        self.values
            .get("conflict")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Requested byte range, as `[start]` or `[start, end]`.
    pub fn range(&self) -> Option<ByteRange> {
        let bounds = self.values.get("range")?.as_array()?;
        let start = bounds.first()?.as_u64()?;
        let end = match bounds.get(1) {
            Some(value) => Some(value.as_u64()?),
            None => None,
        };
        if bounds.len() > 2 || end.is_some_and(|end| end < start) {
            return None;
        }
        Some(ByteRange { start, end })
    }
}
