//! Turns a [`Discovery`] into a [`PackageManifest`].

use tracing::{debug, info};
use widepack_schema::{Component, FileEntry, PackageManifest, PackageMeta};

use crate::classify::{DiscoveredFile, Discovery};
use crate::config::PackagerConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{PackError, Result};
use crate::introspect::{IntrospectError, Introspector};

/// A manifest plus whatever went wrong while building it.
#[derive(Debug, Clone)]
pub struct BuiltManifest {
    /// The package record.
    pub manifest: PackageManifest,
    /// Per-file introspection failures.
    pub diagnostics: Diagnostics,
}

/// Builds one package record from classified files.
pub struct ManifestBuilder<'a, I: Introspector + ?Sized> {
    meta: PackageMeta,
    introspector: &'a I,
    strict: bool,
}

impl<I: Introspector + ?Sized> std::fmt::Debug for ManifestBuilder<'_, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestBuilder")
            .field("meta", &self.meta)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

impl<'a, I: Introspector + ?Sized> ManifestBuilder<'a, I> {
    /// Create a builder for the given package attributes.
    pub fn new(meta: PackageMeta, introspector: &'a I, config: PackagerConfig) -> Self {
        Self {
            meta,
            introspector,
            strict: config.strict,
        }
    }

    /// Build the record.
    ///
    /// Components follow [`FileCategory::ALL`](widepack_schema::FileCategory::ALL)
    /// order and empty ones are left out.
    ///
    /// # Errors
    ///
    /// Only in strict mode: returns [`PackError::Introspect`] for the first
    /// binary that cannot be introspected.
    pub fn build(self, discovery: &Discovery) -> Result<BuiltManifest> {
        let mut manifest = PackageManifest::new(self.meta.clone());
        let mut diagnostics = Diagnostics::default();

        for (category, files) in discovery.categories() {
            let mut entries = Vec::with_capacity(files.len());
            for file in files {
                entries.push(self.entry(file, &mut diagnostics)?);
            }
            debug!("Component {category}: {} file(s)", entries.len());
            manifest.push_component(Component {
                category,
                files: entries,
            });
        }

        info!(
            "Built package {} with {} component(s), {} file(s)",
            manifest.meta.id,
            manifest.components.len(),
            manifest.file_count()
        );
        Ok(BuiltManifest {
            manifest,
            diagnostics,
        })
    }

    fn entry(&self, file: &DiscoveredFile, diagnostics: &mut Diagnostics) -> Result<FileEntry> {
        let mut entry = FileEntry::path_only(file.path.clone());
        if !file.introspect {
            return Ok(entry);
        }

        match self.introspector.platform(&file.absolute) {
            Ok(platform) => entry.platform = platform,
            Err(e) => self.isolate(file, e, diagnostics)?,
        }
        match self.introspector.version(&file.absolute) {
            Ok(version) => entry.version = Some(version),
            Err(e) => self.isolate(file, e, diagnostics)?,
        }
        Ok(entry)
    }

    fn isolate(
        &self,
        file: &DiscoveredFile,
        error: IntrospectError,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        if self.strict {
            return Err(PackError::Introspect {
                path: file.absolute.clone(),
                source: error,
            });
        }
        diagnostics.file(&file.path, error);
        Ok(())
    }
}
