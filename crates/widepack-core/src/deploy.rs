//! Staging of classified files into a deployment tree.
//!
//! Every file lands at `<destination>/<packageId>/<relativePath>`. Copies
//! overwrite and the first failure stops the run; files already copied stay
//! where they are.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};
use widepack_schema::PackageId;

use crate::classify::Discovery;
use crate::error::{PackError, Result};

/// One file to stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentMapping {
    /// Canonical source file.
    pub source: PathBuf,
    /// Target path in the deployment tree.
    pub target: PathBuf,
}

/// Ordered list of copies for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentPlan {
    package_root: PathBuf,
    mappings: Vec<DeploymentMapping>,
}

/// What [`DeploymentPlan::execute`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploySummary {
    /// Number of files copied.
    pub files: usize,
    /// Total bytes copied.
    pub bytes: u64,
}

impl DeploymentPlan {
    /// Plan the copies for every discovered file, in component order.
    pub fn build(discovery: &Discovery, destination: &Path, id: &PackageId) -> Self {
        let package_root = destination.join(id.as_str());
        let mappings = discovery
            .categories()
            .flat_map(|(_, files)| files)
            .map(|file| DeploymentMapping {
                source: file.absolute.clone(),
                target: package_root.join(file.path.to_path_buf()),
            })
            .collect();
        Self {
            package_root,
            mappings,
        }
    }

    /// `<destination>/<packageId>`.
    pub fn package_root(&self) -> &Path {
        &self.package_root
    }

    /// The planned copies.
    pub fn mappings(&self) -> &[DeploymentMapping] {
        &self.mappings
    }

    /// Number of planned copies.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// True when there is nothing to copy.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Perform the copies.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Io`] if a parent directory cannot be created or
    /// [`PackError::Copy`] if a copy fails. Nothing is rolled back.
    pub fn execute(&self) -> Result<DeploySummary> {
        info!(
            "Staging {} file(s) into {}",
            self.mappings.len(),
            self.package_root.display()
        );
        let mut summary = DeploySummary::default();
        for mapping in &self.mappings {
            if let Some(parent) = mapping.target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| PackError::io(parent, e))?;
            }
            let bytes = std::fs::copy(&mapping.source, &mapping.target).map_err(|source| PackError::Copy {
                from: mapping.source.clone(),
                to: mapping.target.clone(),
                source,
            })?;
            debug!("Copied {} ({bytes} bytes)", mapping.target.display());
            summary.files += 1;
            summary.bytes += bytes;
        }
        Ok(summary)
    }
}

/// Copy the index document to `<destination>/<index file name>`.
///
/// # Errors
///
/// Returns [`PackError::Copy`] if the copy fails, or [`PackError::Io`] if the
/// index path has no file name or the destination cannot be created.
pub fn publish_index(index: &Path, destination: &Path) -> Result<PathBuf> {
    let name = index.file_name().ok_or_else(|| {
        PackError::io(
            index,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "index path has no file name"),
        )
    })?;
    std::fs::create_dir_all(destination).map_err(|e| PackError::io(destination, e))?;
    let target = destination.join(name);
    std::fs::copy(index, &target).map_err(|source| PackError::Copy {
        from: index.to_path_buf(),
        to: target.clone(),
        source,
    })?;
    info!("Published index to {}", target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FileClassifier;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::create_dir_all(dir.path().join("admin/conf")).unwrap();
        fs::write(dir.path().join("bin/a.dll"), b"dll bytes").unwrap();
        fs::write(dir.path().join("bin/a.dcl"), b"dcl").unwrap();
        fs::write(dir.path().join("top.map"), b"map").unwrap();
        fs::write(dir.path().join("admin/conf/setup.ini"), b"[setup]").unwrap();
        dir
    }

    #[test]
    fn test_plan_covers_every_file_in_component_order() {
        let root = tree();
        let dest = TempDir::new().unwrap();
        let discovery = FileClassifier::default().discover(root.path());
        let plan = DeploymentPlan::build(&discovery, dest.path(), &PackageId::normalize("Foo App"));

        let targets: Vec<_> = plan
            .mappings()
            .iter()
            .map(|m| m.target.strip_prefix(dest.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            targets,
            [
                Path::new("foo-app/bin/a.dll"),
                Path::new("foo-app/bin/a.dcl"),
                Path::new("foo-app/top.map"),
                Path::new("foo-app/admin/conf/setup.ini"),
            ]
        );
        assert_eq!(plan.package_root(), dest.path().join("foo-app"));
    }

    #[test]
    fn test_execute_copies_and_overwrites() {
        let root = tree();
        let dest = TempDir::new().unwrap();
        let stale = dest.path().join("foo/bin/a.dll");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"stale").unwrap();

        let discovery = FileClassifier::default().discover(root.path());
        let plan = DeploymentPlan::build(&discovery, dest.path(), &PackageId::normalize("foo"));
        let summary = plan.execute().unwrap();

        assert_eq!(summary.files, 4);
        assert_eq!(fs::read(&stale).unwrap(), b"dll bytes");
        assert_eq!(
            fs::read(dest.path().join("foo/admin/conf/setup.ini")).unwrap(),
            b"[setup]"
        );
    }

    #[test]
    fn test_copy_failure_is_fatal() {
        let root = tree();
        let dest = TempDir::new().unwrap();
        let discovery = FileClassifier::default().discover(root.path());
        let plan = DeploymentPlan::build(&discovery, dest.path(), &PackageId::normalize("foo"));

        fs::remove_file(root.path().join("bin/a.dll")).unwrap();
        let err = plan.execute().unwrap_err();
        assert!(matches!(err, PackError::Copy { .. }));
    }

    #[test]
    fn test_publish_index() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("index.xml");
        fs::write(&index, b"<WideIndex/>").unwrap();
        let dest = dir.path().join("deploy");

        let target = publish_index(&index, &dest).unwrap();
        assert_eq!(target, dest.join("index.xml"));
        assert_eq!(fs::read(target).unwrap(), b"<WideIndex/>");
    }
}
