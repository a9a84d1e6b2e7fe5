//! Distribution tree classification.
//!
//! Splits the files under a root folder into the fixed [`FileCategory`]
//! set using one rule per category (plus the `.dcl` companion rule that
//! feeds Binaries). Each rule scans on its own: if a scan fails, that
//! rule's list stays empty, a diagnostic is recorded and the other rules
//! carry on.
//!
//! Walks are sorted by file name, so the same tree always yields the same
//! order and the index stays diffable between runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;
use widepack_schema::{FileCategory, RelativePath};

use crate::config::PathCase;
use crate::diagnostics::Diagnostics;

/// Where a rule looks for files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The whole tree.
    Recursive,
    /// Only the files directly under the root.
    TopLevel,
    /// The whole tree below a fixed subdirectory of the root.
    Subdirectory(&'static str),
}

/// How a rule matches file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamePattern {
    /// A glob on the file name (`*.dll`).
    Glob(&'static str),
    /// An exact file name.
    Exact(&'static str),
}

/// One classification rule.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyRule {
    /// Category the matches are filed under.
    pub category: FileCategory,
    /// Where to look.
    pub scope: Scope,
    /// Name patterns, applied in order.
    pub patterns: &'static [NamePattern],
    /// Whether matches should go through binary introspection.
    pub introspect: bool,
}

/// The fixed rule set, in scan order.
pub const RULES: &[ClassifyRule] = &[
    ClassifyRule {
        category: FileCategory::Binaries,
        scope: Scope::Recursive,
        patterns: &[NamePattern::Glob("*.exe"), NamePattern::Glob("*.dll")],
        introspect: true,
    },
    ClassifyRule {
        category: FileCategory::Binaries,
        scope: Scope::Recursive,
        patterns: &[NamePattern::Glob("*.dcl")],
        introspect: false,
    },
    ClassifyRule {
        category: FileCategory::Symbols,
        scope: Scope::Recursive,
        patterns: &[NamePattern::Glob("*.pdb")],
        introspect: false,
    },
    ClassifyRule {
        category: FileCategory::Source,
        scope: Scope::Recursive,
        patterns: &[
            NamePattern::Glob("*.h"),
            NamePattern::Glob("*.hpp"),
            NamePattern::Glob("*.cpp"),
            NamePattern::Glob("*.req"),
        ],
        introspect: false,
    },
    ClassifyRule {
        category: FileCategory::Maps,
        scope: Scope::TopLevel,
        patterns: &[NamePattern::Glob("*.map")],
        introspect: false,
    },
    ClassifyRule {
        category: FileCategory::NetConf,
        scope: Scope::TopLevel,
        patterns: &[NamePattern::Exact("wnetconf.ini")],
        introspect: false,
    },
    ClassifyRule {
        category: FileCategory::Admin,
        scope: Scope::Subdirectory("admin"),
        patterns: &[NamePattern::Glob("*")],
        introspect: false,
    },
    ClassifyRule {
        category: FileCategory::Launchers,
        scope: Scope::Recursive,
        patterns: &[NamePattern::Glob("*.jsenv"), NamePattern::Glob("*.xenv")],
        introspect: false,
    },
    ClassifyRule {
        category: FileCategory::BinarySets,
        scope: Scope::Recursive,
        patterns: &[NamePattern::Glob("*.jswam"), NamePattern::Glob("*.xwam")],
        introspect: false,
    },
    ClassifyRule {
        category: FileCategory::Lockfiles,
        scope: Scope::Recursive,
        patterns: &[
            NamePattern::Exact("#####AntiSharedFile.tmp"),
            NamePattern::Exact("W001001.TGV"),
            NamePattern::Exact("W003001.TGV"),
            NamePattern::Exact("W007001.TGV"),
        ],
        introspect: false,
    },
];

/// Why a rule's scan failed.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The directory the rule scans does not exist.
    #[error("Directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// Walking the tree failed part way.
    #[error("Walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// A rule pattern did not compile.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// The canonical root folder of a run.
#[derive(Debug, Clone)]
pub struct RootFolder {
    path: PathBuf,
    prefix: String,
}

impl RootFolder {
    /// Resolve the root folder.
    ///
    /// The path is canonicalized when it exists. A missing root is kept as an
    /// absolute path: every scan will then fail on its own and be reported
    /// as a diagnostic, exactly like any other unreadable scope.
    pub fn new(path: &Path) -> Self {
        let path = std::fs::canonicalize(path)
            .or_else(|_| std::path::absolute(path))
            .unwrap_or_else(|_| path.to_path_buf());
        let text = path.to_string_lossy();
        let prefix = text.trim_end_matches(std::path::is_separator).to_string();
        Self { path, prefix }
    }

    /// The canonical root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Strip the root prefix from a canonical path.
    ///
    /// Returns `None` when the candidate is not strictly under the root.
    pub fn relativize(&self, candidate: &Path, case: PathCase) -> Option<RelativePath> {
        let text = candidate.to_string_lossy();
        let rest = strip_root(&self.prefix, &text, case)?;
        RelativePath::new(rest).ok()
    }
}

/// Strip `root` plus one separator from the front of `candidate`.
pub fn strip_root<'a>(root: &str, candidate: &'a str, case: PathCase) -> Option<&'a str> {
    let head = candidate.get(..root.len())?;
    if !case.same(head, root) {
        return None;
    }
    let rest = candidate[root.len()..].strip_prefix(std::path::is_separator)?;
    (!rest.is_empty()).then_some(rest)
}

/// A file found by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Path relative to the root, as recorded in the index.
    pub path: RelativePath,
    /// Canonical absolute path, used to read and copy the file.
    pub absolute: PathBuf,
    /// Whether the file should be introspected as a binary.
    pub introspect: bool,
}

/// Result of classifying a tree.
#[derive(Debug, Clone)]
pub struct Discovery {
    files: BTreeMap<FileCategory, Vec<DiscoveredFile>>,
    diagnostics: Diagnostics,
}

impl Discovery {
    /// Files of one category, in scan order.
    pub fn files(&self, category: FileCategory) -> &[DiscoveredFile] {
        self.files.get(&category).map_or(&[], Vec::as_slice)
    }

    /// Non-empty categories in component priority order.
    pub fn categories(&self) -> impl Iterator<Item = (FileCategory, &[DiscoveredFile])> {
        FileCategory::ALL
            .into_iter()
            .map(|category| (category, self.files(category)))
            .filter(|(_, files)| !files.is_empty())
    }

    /// Total number of files across categories.
    pub fn len(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// True if no rule matched anything.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scan failures.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

/// Applies [`RULES`] to a root folder.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileClassifier {
    case: PathCase,
}

impl FileClassifier {
    /// Classifier using the given path comparison policy.
    pub fn new(case: PathCase) -> Self {
        Self { case }
    }

    /// Classify every file under `root`.
    pub fn discover(&self, root: &Path) -> Discovery {
        let root = RootFolder::new(root);
        info!("Classifying files under {}", root.path().display());

        let mut files: BTreeMap<FileCategory, Vec<DiscoveredFile>> = BTreeMap::new();
        let mut diagnostics = Diagnostics::default();

        for rule in RULES {
            match self.scan(&root, rule) {
                Ok(found) => {
                    debug!("{}: {} file(s)", rule.category, found.len());
                    files.entry(rule.category).or_default().extend(found);
                }
                Err(e) => diagnostics.category(rule.category, e),
            }
        }

        Discovery {
            files,
            diagnostics,
        }
    }

    /// Run one rule. Any failure discards the rule's partial results.
    fn scan(&self, root: &RootFolder, rule: &ClassifyRule) -> Result<Vec<DiscoveredFile>, ScanError> {
        let base = match rule.scope {
            Scope::Subdirectory(dir) => root.path().join(dir),
            Scope::Recursive | Scope::TopLevel => root.path().to_path_buf(),
        };
        if !base.is_dir() {
            return Err(ScanError::MissingDirectory(base));
        }

        let mut walk = WalkDir::new(&base).min_depth(1).sort_by_file_name();
        if rule.scope == Scope::TopLevel {
            walk = walk.max_depth(1);
        }
        let mut candidates = Vec::new();
        for entry in walk {
            let entry = entry?;
            if entry.path().is_file() {
                candidates.push(entry.into_path());
            }
        }

        let options = MatchOptions {
            case_sensitive: self.case.is_sensitive(),
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };

        let mut found = Vec::new();
        for pattern in rule.patterns {
            let matcher = Matcher::new(*pattern, self.case, options)?;
            for candidate in &candidates {
                let Some(name) = candidate.file_name() else {
                    continue;
                };
                if !matcher.matches(&name.to_string_lossy()) {
                    continue;
                }
                if let Some(file) = self.resolve(root, candidate, rule.introspect) {
                    found.push(file);
                }
            }
        }
        Ok(found)
    }

    fn resolve(&self, root: &RootFolder, candidate: &Path, introspect: bool) -> Option<DiscoveredFile> {
        let absolute = match std::fs::canonicalize(candidate) {
            Ok(path) => path,
            Err(e) => {
                debug!("Skipping {}: {e}", candidate.display());
                return None;
            }
        };
        let Some(path) = root.relativize(&absolute, self.case) else {
            debug!("Skipping {}: outside of {}", absolute.display(), root.path().display());
            return None;
        };
        Some(DiscoveredFile {
            path,
            absolute,
            introspect,
        })
    }
}

#[derive(Debug)]
enum Matcher {
    Glob(Pattern, MatchOptions),
    Exact(&'static str, PathCase),
}

impl Matcher {
    fn new(pattern: NamePattern, case: PathCase, options: MatchOptions) -> Result<Self, ScanError> {
        Ok(match pattern {
            NamePattern::Glob(glob) => Self::Glob(Pattern::new(glob)?, options),
            NamePattern::Exact(name) => Self::Exact(name, case),
        })
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Glob(pattern, options) => pattern.matches_with(name, *options),
            Self::Exact(expected, case) => case.same(name, expected),
        }
    }
}
