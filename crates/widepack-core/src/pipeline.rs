//! One packaging run from root folder to staged files.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;
use widepack_schema::{PackageId, PackageMeta};

use crate::classify::FileClassifier;
use crate::config::PackagerConfig;
use crate::deploy::{self, DeploySummary, DeploymentMapping, DeploymentPlan};
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::index::{IndexDocument, MergeOutcome};
use crate::introspect::{Introspector, PeIntrospector};
use crate::manifest::ManifestBuilder;

/// Inputs of a run, as given on the command line.
#[derive(Debug, Clone)]
pub struct PackRequest {
    /// Distribution tree to package.
    pub root: PathBuf,
    /// Index document to create or extend.
    pub index: PathBuf,
    /// Product name.
    pub product: String,
    /// Product version.
    pub version: String,
    /// Package description.
    pub description: String,
    /// Raw unique id, normalized before use.
    pub unique_id: String,
    /// Deployment root, if files should be staged.
    pub destination: Option<PathBuf>,
}

impl PackRequest {
    /// Package attributes with the id normalized.
    pub fn meta(&self) -> PackageMeta {
        PackageMeta {
            id: PackageId::normalize(&self.unique_id),
            name: self.product.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
        }
    }
}

/// Deployment part of a [`RunReport`].
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    /// `<destination>/<packageId>`.
    pub package_root: PathBuf,
    /// Copies performed, or planned on a dry run.
    pub mappings: Vec<DeploymentMapping>,
    /// Totals, absent on a dry run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<DeploySummary>,
    /// Where the index was published, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_index: Option<PathBuf>,
}

/// Summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Normalized package id.
    pub package_id: PackageId,
    /// Whether nothing was written.
    pub dry_run: bool,
    /// Components in the new record.
    pub components: usize,
    /// Files in the new record.
    pub files: usize,
    /// Index merge result.
    pub index: MergeOutcome,
    /// Staging result, if a destination was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeployReport>,
    /// Everything that was skipped.
    pub diagnostics: Diagnostics,
}

/// Runs the packaging stages in order.
#[derive(Debug, Clone, Default)]
pub struct Packager<I = PeIntrospector> {
    config: PackagerConfig,
    introspector: I,
}

impl Packager {
    /// Packager using the PE introspector.
    pub fn new(config: PackagerConfig) -> Self {
        Self::with_introspector(config, PeIntrospector)
    }
}

impl<I: Introspector> Packager<I> {
    /// Packager using a custom metadata source.
    pub fn with_introspector(config: PackagerConfig, introspector: I) -> Self {
        Self {
            config,
            introspector,
        }
    }

    /// Classify, build the record, merge it into the index and stage files.
    ///
    /// The index is loaded and validated first, so a wrong index file fails
    /// the run before anything is scanned or copied. Files are staged only
    /// after the index has been saved.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`PackError`](crate::PackError). Scan and
    /// introspection failures are only fatal in strict mode; otherwise they
    /// end up in [`RunReport::diagnostics`].
    pub fn run(&self, request: &PackRequest) -> Result<RunReport> {
        let document = IndexDocument::load(&request.index)?;

        let discovery = FileClassifier::new(self.config.path_case).discover(&request.root);
        let built = ManifestBuilder::new(request.meta(), &self.introspector, self.config)
            .build(&discovery)?;

        let mut diagnostics = discovery.diagnostics().clone();
        diagnostics.extend(built.diagnostics);
        let manifest = built.manifest;

        let index = if self.config.dry_run {
            let (_, outcome) = document.preview(&manifest)?;
            info!("Dry run: {} not written", request.index.display());
            outcome
        } else {
            document.save(&manifest)?
        };

        let deployment = match &request.destination {
            Some(destination) => Some(self.deploy(&discovery, destination, &manifest.meta.id, &request.index)?),
            None => None,
        };

        Ok(RunReport {
            package_id: manifest.meta.id.clone(),
            dry_run: self.config.dry_run,
            components: manifest.components.len(),
            files: manifest.file_count(),
            index,
            deployment,
            diagnostics,
        })
    }

    fn deploy(
        &self,
        discovery: &crate::classify::Discovery,
        destination: &Path,
        id: &PackageId,
        index: &Path,
    ) -> Result<DeployReport> {
        let plan = DeploymentPlan::build(discovery, destination, id);
        if self.config.dry_run {
            info!(
                "Dry run: {} file(s) would be staged into {}",
                plan.len(),
                plan.package_root().display()
            );
            return Ok(DeployReport {
                package_root: plan.package_root().to_path_buf(),
                mappings: plan.mappings().to_vec(),
                summary: None,
                published_index: None,
            });
        }

        let summary = plan.execute()?;
        let published_index = if self.config.publish_index {
            Some(deploy::publish_index(index, destination)?)
        } else {
            None
        };
        Ok(DeployReport {
            package_root: plan.package_root().to_path_buf(),
            mappings: plan.mappings().to_vec(),
            summary: Some(summary),
            published_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::PeImage;
    use crate::{PackError, index};
    use std::fs;
    use tempfile::TempDir;

    fn request(root: &Path, index: &Path, destination: Option<&Path>) -> PackRequest {
        PackRequest {
            root: root.to_path_buf(),
            index: index.to_path_buf(),
            product: "Foo".to_string(),
            version: "1.2.3".to_string(),
            description: "demo".to_string(),
            unique_id: "Foo App".to_string(),
            destination: destination.map(Path::to_path_buf),
        }
    }

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        PeImage::new(0x8664)
            .product_version("1.2.3")
            .write_to(&dir.path().join("bin/a.dll"))
            .unwrap();
        fs::write(dir.path().join("bin/a.pdb"), b"pdb").unwrap();
        dir
    }

    #[test]
    fn test_run_writes_index_and_stages_files() {
        let root = tree();
        let out = TempDir::new().unwrap();
        let index_path = out.path().join("index.xml");
        let dest = out.path().join("deploy");
        let config = PackagerConfig {
            publish_index: true,
            ..PackagerConfig::default()
        };

        let report = Packager::new(config)
            .run(&request(root.path(), &index_path, Some(&dest)))
            .unwrap();

        assert_eq!(report.package_id.as_str(), "foo-app");
        assert_eq!(report.components, 2);
        assert_eq!(report.files, 2);
        assert!(report.index.created);
        assert!(fs::read(dest.join("foo-app/bin/a.pdb")).is_ok());

        let deployment = report.deployment.unwrap();
        assert_eq!(deployment.summary.unwrap().files, 2);
        assert_eq!(deployment.published_index, Some(dest.join("index.xml")));
        assert_eq!(
            fs::read(dest.join("index.xml")).unwrap(),
            fs::read(&index_path).unwrap()
        );
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let root = tree();
        let out = TempDir::new().unwrap();
        let index_path = out.path().join("index.xml");
        let dest = out.path().join("deploy");
        let config = PackagerConfig {
            dry_run: true,
            ..PackagerConfig::default()
        };

        let report = Packager::new(config)
            .run(&request(root.path(), &index_path, Some(&dest)))
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.index.packages, 1);
        assert_eq!(report.deployment.unwrap().mappings.len(), 2);
        assert!(!index_path.exists());
        assert!(!dest.exists());
    }

    #[test]
    fn test_wrong_index_fails_before_staging() {
        let root = tree();
        let out = TempDir::new().unwrap();
        let index_path = out.path().join("index.xml");
        fs::write(&index_path, b"<Other/>").unwrap();
        let dest = out.path().join("deploy");

        let err = Packager::new(PackagerConfig::default())
            .run(&request(root.path(), &index_path, Some(&dest)))
            .unwrap_err();
        assert!(matches!(err, PackError::RootMismatch { .. }));
        assert!(!dest.exists());
        assert_eq!(fs::read(&index_path).unwrap(), b"<Other/>");
    }

    #[test]
    fn test_scan_diagnostics_are_reported() {
        let root = tree();
        let out = TempDir::new().unwrap();
        let index_path = out.path().join("index.xml");

        let report = Packager::new(PackagerConfig::default())
            .run(&request(root.path(), &index_path, None))
            .unwrap();

        // No admin directory in the tree.
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.deployment.is_none());
        assert_eq!(
            index::count_packages(&fs::read(&index_path).unwrap()).unwrap(),
            1
        );
    }

    #[test]
    fn test_report_serializes_to_json() {
        let root = tree();
        let out = TempDir::new().unwrap();
        let index_path = out.path().join("index.xml");

        let report = Packager::new(PackagerConfig::default())
            .run(&request(root.path(), &index_path, None))
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["package_id"], "foo-app");
        assert_eq!(json["index"]["packages"], 1);
        assert!(json.get("deployment").is_none());
        assert_eq!(json["diagnostics"][0]["scope"]["kind"], "category");
        assert_eq!(json["diagnostics"][0]["scope"]["target"], "Admin");
    }
}
