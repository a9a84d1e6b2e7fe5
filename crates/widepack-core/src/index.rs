//! The cumulative `<WideIndex>` document.
//!
//! Every run appends one `Package` as the last child of the root. Earlier
//! content, including records written by other tools, is streamed through
//! untouched apart from indentation.

use std::io::Write;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;
use tracing::{debug, info};
use widepack_schema::xml::{INDENT, PACKAGE_ELEMENT};
use widepack_schema::{INDEX_ROOT, PackageManifest, write_package};

use crate::error::{PackError, Result};

const UTF8_BOM: &[u8] = &[0xef, 0xbb, 0xbf];

/// Result of a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// Index file written (or that would be written on a dry run).
    pub path: PathBuf,
    /// Whether the index did not exist before.
    pub created: bool,
    /// Number of `Package` records after the merge.
    pub packages: usize,
}

enum RenderFailure {
    Xml(quick_xml::Error),
    RootMismatch(String),
    MissingRoot,
    UnclosedRoot,
}

impl From<quick_xml::Error> for RenderFailure {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e)
    }
}

impl From<std::io::Error> for RenderFailure {
    fn from(e: std::io::Error) -> Self {
        Self::Xml(e.into())
    }
}

impl RenderFailure {
    fn at(self, path: &Path) -> PackError {
        let path = path.to_path_buf();
        match self {
            Self::Xml(source) => PackError::Xml { path, source },
            Self::RootMismatch(found) => PackError::RootMismatch { path, found },
            Self::MissingRoot => PackError::MissingRoot { path },
            Self::UnclosedRoot => PackError::UnclosedRoot { path },
        }
    }
}

/// An index document on disk, loaded and validated.
#[derive(Debug, Clone)]
pub struct IndexDocument {
    path: PathBuf,
    existing: Option<Vec<u8>>,
}

impl IndexDocument {
    /// Load the index at `path`, or start a new one if it does not exist.
    ///
    /// The root element is checked here so that a wrong file is rejected
    /// before any scanning or copying happens.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Io`] if the file exists but cannot be read,
    /// [`PackError::RootMismatch`] or [`PackError::MissingRoot`] if it is
    /// not an index document, [`PackError::Xml`] if it is not well formed
    /// up to its root.
    pub fn load(path: &Path) -> Result<Self> {
        let existing = match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No index at {}, starting a new one", path.display());
                None
            }
            Err(e) => return Err(PackError::io(path, e)),
        };
        Self::from_bytes(path, existing)
    }

    /// Wrap already read content (`None` for a new document).
    ///
    /// # Errors
    ///
    /// Same validation as [`load`](Self::load).
    pub fn from_bytes(path: &Path, existing: Option<Vec<u8>>) -> Result<Self> {
        if let Some(bytes) = &existing {
            check_root(strip_bom(bytes)).map_err(|e| e.at(path))?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            existing,
        })
    }

    /// Index file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the document already exists on disk.
    pub fn exists(&self) -> bool {
        self.existing.is_some()
    }

    /// Render the merged document without touching the disk.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Xml`] if the existing content is malformed or
    /// [`PackError::UnclosedRoot`] if it ends before `</WideIndex>`.
    pub fn render(&self, manifest: &PackageManifest) -> Result<Vec<u8>> {
        let rendered = match &self.existing {
            Some(bytes) => append(strip_bom(bytes), manifest),
            None => fresh(manifest),
        };
        rendered.map_err(|e| e.at(&self.path))
    }

    /// Render the merged document and describe the outcome, without saving.
    ///
    /// # Errors
    ///
    /// Same as [`render`](Self::render).
    pub fn preview(&self, manifest: &PackageManifest) -> Result<(Vec<u8>, MergeOutcome)> {
        let bytes = self.render(manifest)?;
        let packages = count_packages(&bytes).map_err(|e| RenderFailure::Xml(e).at(&self.path))?;
        let outcome = MergeOutcome {
            path: self.path.clone(),
            created: !self.exists(),
            packages,
        };
        Ok((bytes, outcome))
    }

    /// Append `manifest` and atomically replace the file on disk.
    ///
    /// The document is written to a temporary file next to the target and
    /// renamed over it, so an interrupted run leaves the old index intact.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Xml`] if rendering fails or [`PackError::Io`] if
    /// the temporary file cannot be written or persisted.
    pub fn save(&self, manifest: &PackageManifest) -> Result<MergeOutcome> {
        let (bytes, outcome) = self.preview(manifest)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::Builder::new()
            .prefix(".widepack-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| PackError::io(dir, e))?;
        temp.write_all(&bytes)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| PackError::io(temp.path(), e))?;
        temp.persist(&self.path)
            .map_err(|e| PackError::io(&self.path, e.error))?;

        info!(
            "Wrote {} ({} package record(s))",
            self.path.display(),
            outcome.packages
        );
        Ok(outcome)
    }

    /// Load, merge and save in one step.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load) and [`save`](Self::save).
    pub fn merge(path: &Path, manifest: &PackageManifest) -> Result<MergeOutcome> {
        Self::load(path)?.save(manifest)
    }
}

/// Count the `Package` children of the root element.
///
/// # Errors
///
/// Returns an error if the document is not well formed.
pub fn count_packages(bytes: &[u8]) -> std::result::Result<usize, quick_xml::Error> {
    let mut reader = Reader::from_reader(strip_bom(bytes));
    let mut depth = 0usize;
    let mut count = 0;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 1 && e.name().as_ref() == PACKAGE_ELEMENT.as_bytes() {
                    count += 1;
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 1 && e.name().as_ref() == PACKAGE_ELEMENT.as_bytes() {
                    count += 1;
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(count)
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn check_root(bytes: &[u8]) -> std::result::Result<(), RenderFailure> {
    let mut reader = Reader::from_reader(bytes);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                let found = element_name(&e);
                return if found == INDEX_ROOT {
                    Ok(())
                } else {
                    Err(RenderFailure::RootMismatch(found))
                };
            }
            Event::Eof => return Err(RenderFailure::MissingRoot),
            _ => {}
        }
    }
}

fn new_writer() -> Writer<Vec<u8>> {
    Writer::new_with_indent(Vec::new(), INDENT.0, INDENT.1)
}

fn finish(writer: Writer<Vec<u8>>) -> Vec<u8> {
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    bytes
}

fn fresh(manifest: &PackageManifest) -> std::result::Result<Vec<u8>, RenderFailure> {
    let mut writer = new_writer();
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new(INDEX_ROOT)))?;
    write_package(&mut writer, manifest)?;
    writer.write_event(Event::End(BytesEnd::new(INDEX_ROOT)))?;
    Ok(finish(writer))
}

fn append(existing: &[u8], manifest: &PackageManifest) -> std::result::Result<Vec<u8>, RenderFailure> {
    let mut reader = Reader::from_reader(existing);
    reader.config_mut().trim_text(true);
    let mut writer = new_writer();
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 0 {
                    if seen_root || e.name().as_ref() != INDEX_ROOT.as_bytes() {
                        return Err(RenderFailure::RootMismatch(element_name(&e)));
                    }
                    seen_root = true;
                }
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    write_package(&mut writer, manifest)?;
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Empty(e) if depth == 0 => {
                if seen_root || e.name().as_ref() != INDEX_ROOT.as_bytes() {
                    return Err(RenderFailure::RootMismatch(element_name(&e)));
                }
                seen_root = true;
                let end = e.to_end().into_owned();
                writer.write_event(Event::Start(e))?;
                write_package(&mut writer, manifest)?;
                writer.write_event(Event::End(end))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    if !seen_root {
        return Err(RenderFailure::MissingRoot);
    }
    if depth != 0 {
        return Err(RenderFailure::UnclosedRoot);
    }
    Ok(finish(writer))
}
