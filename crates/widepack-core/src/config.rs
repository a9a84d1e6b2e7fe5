//! Run configuration.

use serde::{Deserialize, Serialize};

/// How path text is compared when stripping the root prefix and matching
/// file name patterns.
///
/// The default is case-sensitive on every platform. Trees living on a
/// case-insensitive filesystem (NTFS, default APFS) should opt into
/// [`PathCase::Insensitive`] so that `*.DLL` or a differently-cased root
/// still match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathCase {
    /// Compare bytes as-is.
    #[default]
    Sensitive,
    /// Compare lower-cased text.
    Insensitive,
}

impl PathCase {
    /// Compare two strings under this policy.
    pub fn same(self, a: &str, b: &str) -> bool {
        match self {
            Self::Sensitive => a == b,
            Self::Insensitive => a.to_lowercase() == b.to_lowercase(),
        }
    }

    /// Whether glob matching should be case sensitive.
    pub fn is_sensitive(self) -> bool {
        self == Self::Sensitive
    }
}

/// Switches for a packaging run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagerConfig {
    /// Path comparison policy.
    pub path_case: PathCase,
    /// Abort on the first binary that cannot be introspected instead of
    /// recording a diagnostic.
    pub strict: bool,
    /// Render the index and plan the deployment without writing anything.
    pub dry_run: bool,
    /// After staging, also copy the index document into the destination root.
    pub publish_index: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_case_comparison() {
        assert!(PathCase::Sensitive.same("/R/bin", "/R/bin"));
        assert!(!PathCase::Sensitive.same("/r/bin", "/R/bin"));
        assert!(PathCase::Insensitive.same("C:\\Wyde", "c:\\wyde"));
    }

    #[test]
    fn test_default_is_sensitive_and_lenient() {
        let config = PackagerConfig::default();
        assert_eq!(config.path_case, PathCase::Sensitive);
        assert!(!config.strict);
        assert!(!config.dry_run);
    }
}
