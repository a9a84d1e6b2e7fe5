//! Package record model: categories, ids, paths and components.

use crate::Platform;
use serde::{Deserialize, Serialize};

/// Discriminator written to `Package/@Type` for product packages, by
/// opposition to environment packages that share the same index.
pub const PACKAGE_TYPE: &str = "ewam";

/// Fixed file categories a distribution tree is split into.
///
/// The declaration order is the order components appear in a package.
/// It is part of the index format: keeping it stable keeps successive
/// index documents diffable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FileCategory {
    /// Executables and libraries (`*.exe`, `*.dll`) plus `*.dcl` companions.
    Binaries,
    /// Debug symbols (`*.pdb`).
    Symbols,
    /// Headers, sources and requirement files.
    Source,
    /// Linker maps at the top of the tree.
    Maps,
    /// The top-level `wnetconf.ini`.
    NetConf,
    /// Everything under `admin/`.
    Admin,
    /// Environment and launcher definitions (`*.jsenv`, `*.xenv`).
    Launchers,
    /// Binary set definitions (`*.jswam`, `*.xwam`).
    BinarySets,
    /// Reserved lock and marker files.
    Lockfiles,
}

impl FileCategory {
    /// All categories in component priority order.
    pub const ALL: [FileCategory; 9] = [
        Self::Binaries,
        Self::Symbols,
        Self::Source,
        Self::Maps,
        Self::NetConf,
        Self::Admin,
        Self::Launchers,
        Self::BinarySets,
        Self::Lockfiles,
    ];

    /// Name written to `Component/@Name`.
    pub fn component_name(&self) -> &'static str {
        match self {
            Self::Binaries => "Binaries",
            Self::Symbols => "Symbols",
            Self::Source => "Source",
            Self::Maps => "Maps",
            Self::NetConf => "wNetConf",
            Self::Admin => "Admin",
            Self::Launchers => "Launchers",
            Self::BinarySets => "BinariesSets",
            Self::Lockfiles => "TGVs",
        }
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.component_name())
    }
}

/// Package identifier: the user supplied unique id, lower-cased with
/// spaces replaced by hyphens.
///
/// The same value names the package in the index and the deployment
/// subdirectory.
///
/// # Example
///
/// ```
/// use widepack_schema::PackageId;
///
/// assert_eq!(PackageId::normalize("My Product").as_str(), "my-product");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(String);

impl PackageId {
    /// Normalize a raw unique id.
    ///
    /// Idempotent: normalizing an already normalized id returns it unchanged.
    pub fn normalize(raw: &str) -> Self {
        Self(raw.to_lowercase().replace(' ', "-"))
    }

    /// The normalized id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PackageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A file path relative to the distribution root.
///
/// Stored as text exactly as the filesystem produced it, separators
/// included, so an index built on Windows keeps its backslashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelativePath(String);

impl RelativePath {
    /// Wrap an already relative path.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] if the path is empty, absolute, or contains a
    /// `..` segment that would escape the root.
    pub fn new(path: impl Into<String>) -> Result<Self, PathError> {
        let path = path.into();
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        if path.starts_with(['/', '\\']) || path.as_bytes().get(1) == Some(&b':') {
            return Err(PathError::Absolute(path));
        }
        if path.split(['/', '\\']).any(|segment| segment == "..") {
            return Err(PathError::Escapes(path));
        }
        Ok(Self(path))
    }

    /// The path text as recorded in the index.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to a path usable with `Path::join`.
    pub fn to_path_buf(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(&self.0)
    }
}

impl std::fmt::Display for RelativePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised when building a [`RelativePath`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PathError {
    /// The stripped path is empty (the candidate was the root itself).
    #[error("Relative path is empty")]
    Empty,

    /// The path is rooted or carries a drive letter.
    #[error("Path is not relative: {0}")]
    Absolute(String),

    /// The path climbs out of the root.
    #[error("Path escapes the root folder: {0}")]
    Escapes(String),
}

/// One `File` element of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the distribution root.
    pub path: RelativePath,

    /// Target platform, only for introspected binaries with a known machine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    /// Product version, only for introspected binaries that carry one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl FileEntry {
    /// A path-only entry.
    pub fn path_only(path: RelativePath) -> Self {
        Self {
            path,
            platform: None,
            version: None,
        }
    }
}

/// A named group of files inside a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Category this component was built from.
    pub category: FileCategory,

    /// Files in discovery order.
    pub files: Vec<FileEntry>,
}

impl Component {
    /// Name written to `Component/@Name`.
    pub fn name(&self) -> &'static str {
        self.category.component_name()
    }
}

/// The scalar attributes of a package, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMeta {
    /// Normalized package id.
    pub id: PackageId,
    /// Product name.
    pub name: String,
    /// Product version, free-form.
    pub version: String,
    /// Human readable description.
    pub description: String,
}

/// One `Package` record of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Id, name, version and description.
    #[serde(flatten)]
    pub meta: PackageMeta,

    /// Non-empty components in [`FileCategory::ALL`] order.
    pub components: Vec<Component>,
}

impl PackageManifest {
    /// Create a manifest with no components.
    pub fn new(meta: PackageMeta) -> Self {
        Self {
            meta,
            components: Vec::new(),
        }
    }

    /// The constant `Type` discriminator.
    pub fn package_type(&self) -> &'static str {
        PACKAGE_TYPE
    }

    /// Push a component, dropping it if it has no files.
    ///
    /// Components must be pushed in priority order; the builder in
    /// `widepack-core` guarantees it.
    pub fn push_component(&mut self, component: Component) {
        if !component.files.is_empty() {
            self.components.push(component);
        }
    }

    /// Find the component for a category.
    pub fn component(&self, category: FileCategory) -> Option<&Component> {
        self.components.iter().find(|c| c.category == category)
    }

    /// Total number of file entries across components.
    pub fn file_count(&self) -> usize {
        self.components.iter().map(|c| c.files.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_id() {
        assert_eq!(PackageId::normalize("My Product").as_str(), "my-product");
        assert_eq!(PackageId::normalize("Foo App").as_str(), "foo-app");
        assert_eq!(PackageId::normalize("already-ok").as_str(), "already-ok");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["My Product", "  Two  Spaces ", "MiXeD-Case Id", ""] {
            let once = PackageId::normalize(raw);
            let twice = PackageId::normalize(once.as_str());
            assert_eq!(once, twice, "normalize not idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_component_names_follow_priority_order() {
        let names: Vec<_> = FileCategory::ALL.iter().map(FileCategory::component_name).collect();
        assert_eq!(
            names,
            [
                "Binaries",
                "Symbols",
                "Source",
                "Maps",
                "wNetConf",
                "Admin",
                "Launchers",
                "BinariesSets",
                "TGVs"
            ]
        );
    }

    #[test]
    fn test_relative_path_rejects_escapes() {
        assert!(RelativePath::new("bin/a.dll").is_ok());
        assert!(RelativePath::new(r"bin\a.dll").is_ok());
        assert_eq!(RelativePath::new(""), Err(PathError::Empty));
        assert!(matches!(RelativePath::new("/etc/passwd"), Err(PathError::Absolute(_))));
        assert!(matches!(RelativePath::new(r"C:\x.dll"), Err(PathError::Absolute(_))));
        assert!(matches!(RelativePath::new("../x.dll"), Err(PathError::Escapes(_))));
        assert!(matches!(RelativePath::new(r"a\..\..\x"), Err(PathError::Escapes(_))));
    }

    #[test]
    fn test_empty_components_are_dropped() {
        let mut manifest = PackageManifest::new(PackageMeta {
            id: PackageId::normalize("x"),
            name: "X".to_string(),
            version: "1".to_string(),
            description: String::new(),
        });
        manifest.push_component(Component {
            category: FileCategory::Binaries,
            files: vec![],
        });
        manifest.push_component(Component {
            category: FileCategory::Symbols,
            files: vec![FileEntry::path_only(RelativePath::new("a.pdb").unwrap())],
        });
        assert_eq!(manifest.components.len(), 1);
        assert!(manifest.component(FileCategory::Binaries).is_none());
        assert_eq!(manifest.file_count(), 1);
    }

    #[test]
    fn test_manifest_json_omits_absent_attributes() {
        let entry = FileEntry::path_only(RelativePath::new("a.dcl").unwrap());
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"path":"a.dcl"}"#);
    }
}
