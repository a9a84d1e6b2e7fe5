//! Packaging engine for widepack.
//!
//! [`FileClassifier`] splits a distribution tree into categories,
//! [`ManifestBuilder`] turns them into a package record with the help of an
//! [`Introspector`], [`IndexDocument`] appends that record to the index and
//! [`DeploymentPlan`] stages the files. [`Packager`] runs all of it.

pub mod classify;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod index;
pub mod introspect;
pub mod manifest;
pub mod pipeline;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use classify::{Discovery, FileClassifier};
pub use config::{PackagerConfig, PathCase};
pub use deploy::{DeploySummary, DeploymentMapping, DeploymentPlan};
pub use diagnostics::{Diagnostic, DiagnosticScope, Diagnostics};
pub use error::{PackError, Result};
pub use index::{IndexDocument, MergeOutcome};
pub use introspect::{BinaryDescriptor, IntrospectError, Introspector, PeIntrospector};
pub use manifest::{BuiltManifest, ManifestBuilder};
pub use pipeline::{PackRequest, Packager, RunReport};
