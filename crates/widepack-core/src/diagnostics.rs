//! Non-fatal findings collected during a run.
//!
//! A failed category scan or an unreadable binary does not stop the run.
//! It is logged when it happens and kept here so the caller can list
//! everything that was skipped once the run is over.

use serde::Serialize;
use widepack_schema::{FileCategory, RelativePath};

/// What a diagnostic is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "lowercase")]
pub enum DiagnosticScope {
    /// A whole category scan.
    Category(FileCategory),
    /// A single file.
    File(RelativePath),
}

impl std::fmt::Display for DiagnosticScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Category(category) => write!(f, "category {category}"),
            Self::File(path) => write!(f, "file {path}"),
        }
    }
}

/// A recorded non-fatal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Category or file affected.
    pub scope: DiagnosticScope,
    /// Human readable reason.
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.scope, self.message)
    }
}

/// Ordered list of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Record a category-level failure and log it.
    pub fn category(&mut self, category: FileCategory, message: impl std::fmt::Display) {
        self.push(DiagnosticScope::Category(category), message.to_string());
    }

    /// Record a file-level failure and log it.
    pub fn file(&mut self, path: &RelativePath, message: impl std::fmt::Display) {
        self.push(DiagnosticScope::File(path.clone()), message.to_string());
    }

    fn push(&mut self, scope: DiagnosticScope, message: String) {
        tracing::warn!("{scope}: {message}");
        self.0.push(Diagnostic { scope, message });
    }

    /// Append another list, keeping order.
    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    /// Iterate in recording order.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// Number of diagnostics.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing went wrong.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
