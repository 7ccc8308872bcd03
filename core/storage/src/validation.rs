//! Path validation state machine.
//!
//! ```text
//! raw ──parse──► Root ─────────────────────────────► Ok
//!        │
//!        ├─────► Candidate ──structure──► NotFound ─► Err
//!        │           │
//!        │           └──lookup──► Valid ───────────► Ok
//!        │                  └───► NotFound ────────► Err
//!        └─────► Invalid ──────────────────────────► Err
//! ```

use std::future::Future;

use omnistore_common::{Error, PathFormat, PathKind, ProviderPath, Result};

/// Outcome of an authoritative existence lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Present,
    Absent,
}

/// Required entry kind at each depth of a fixed-depth namespace.
///
/// `kinds[0]` applies to one-segment paths, `kinds[1]` to two-segment paths,
/// and so on. Paths deeper than the rule cannot exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthRule {
    kinds: Vec<PathKind>,
}

impl DepthRule {
    pub fn new(kinds: Vec<PathKind>) -> Self {
        Self { kinds }
    }

    pub fn max_depth(&self) -> usize {
        self.kinds.len()
    }

    /// Whether `path` fits the namespace shape. Root always fits.
    pub fn admits(&self, path: &ProviderPath) -> bool {
        if path.is_root() {
            return true;
        }
        self.kinds
            .get(path.depth() - 1)
            .is_some_and(|kind| *kind == path.kind())
    }
}

/// Validation progress for one raw input.
#[derive(Debug)]
pub enum ValidationState {
    /// The input is `/`; valid without any lookup.
    Root(ProviderPath),
    /// Syntactically valid, existence not yet established.
    Candidate(ProviderPath),
    /// Confirmed by the backend.
    Valid(ProviderPath),
    /// Absent, or impossible given the namespace shape.
    NotFound(String),
    /// Malformed input.
    Invalid(Error),
}

impl ValidationState {
    /// Parse `raw` and enter `Root`, `Candidate` or `Invalid`.
    pub fn start(raw: &str, format: PathFormat) -> Self {
        match ProviderPath::with_format(raw, format) {
            Ok(path) if path.is_root() => ValidationState::Root(path),
            Ok(path) => ValidationState::Candidate(path),
            Err(e) => ValidationState::Invalid(e),
        }
    }

    /// Apply a fixed-depth namespace rule to a candidate.
    pub fn check_structure(self, rule: &DepthRule) -> Self {
        match self {
            ValidationState::Candidate(path) if !rule.admits(&path) => {
                ValidationState::NotFound(path.to_string())
            }
            other => other,
        }
    }

    /// Apply a backend-specific predicate to a candidate; a rejected
    /// candidate cannot exist.
    pub fn check_with(self, admits: impl FnOnce(&ProviderPath) -> bool) -> Self {
        match self {
            ValidationState::Candidate(path) if !admits(&path) => {
                ValidationState::NotFound(path.to_string())
            }
            other => other,
        }
    }

    /// Feed the result of an existence lookup to a candidate.
    pub fn resolve(self, existence: Existence) -> Self {
        match (self, existence) {
            (ValidationState::Candidate(path), Existence::Present) => ValidationState::Valid(path),
            (ValidationState::Candidate(path), Existence::Absent) => {
                ValidationState::NotFound(path.to_string())
            }
            (other, _) => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ValidationState::Candidate(_))
    }

    /// Collapse into a result.
    ///
    /// A `Candidate` that was never looked up is accepted: that is the
    /// outcome of a purely local validation.
    pub fn into_result(self) -> Result<ProviderPath> {
        match self {
            ValidationState::Root(path)
            | ValidationState::Candidate(path)
            | ValidationState::Valid(path) => Ok(path),
            ValidationState::NotFound(path) => Err(Error::NotFound(path)),
            ValidationState::Invalid(e) => Err(e),
        }
    }

    /// Run one existence lookup if still a candidate, then collapse.
    pub async fn run_lookup<F, Fut>(self, lookup: F) -> Result<ProviderPath>
    where
        F: FnOnce(ProviderPath) -> Fut,
        Fut: Future<Output = Result<Existence>>,
    {
        match self {
            ValidationState::Candidate(path) => {
                let existence = lookup(path.clone()).await?;
                ValidationState::Candidate(path).resolve(existence).into_result()
            }
            other => other.into_result(),
        }
    }
}
