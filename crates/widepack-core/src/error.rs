//! Fatal errors of a packaging run.
//!
//! Anything that can be isolated (a category scan, one binary) is reported
//! as a [`Diagnostic`](crate::diagnostics::Diagnostic) instead.

use std::path::PathBuf;
use thiserror::Error;

use crate::introspect::IntrospectError;

/// Errors that abort a packaging run.
#[derive(Error, Debug)]
pub enum PackError {
    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The index file could not be parsed or rendered.
    #[error("Malformed index document {}: {source}", path.display())]
    Xml {
        /// Index file involved.
        path: PathBuf,
        /// Underlying parser error.
        #[source]
        source: quick_xml::Error,
    },

    /// The index file's root element is not `WideIndex`.
    #[error(
        "Root element mismatch in {}: expected <WideIndex>, found <{found}> (not a recognized index document)",
        path.display()
    )]
    RootMismatch {
        /// Index file involved.
        path: PathBuf,
        /// Name of the root element actually found.
        found: String,
    },

    /// The index file exists but holds no element at all.
    #[error("Index document {} has no root element", path.display())]
    MissingRoot {
        /// Index file involved.
        path: PathBuf,
    },

    /// The index file ends before its root element is closed.
    #[error("Index document {} is truncated: <WideIndex> is never closed", path.display())]
    UnclosedRoot {
        /// Index file involved.
        path: PathBuf,
    },

    /// Binary introspection failed while running in strict mode.
    #[error("Cannot introspect {}: {source}", path.display())]
    Introspect {
        /// Binary involved.
        path: PathBuf,
        /// Underlying introspection error.
        #[source]
        source: IntrospectError,
    },

    /// Copying a file into the deployment tree failed.
    #[error("Failed to copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        /// Source file.
        from: PathBuf,
        /// Destination file.
        to: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl PackError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for fatal errors.
pub type Result<T> = std::result::Result<T, PackError>;
