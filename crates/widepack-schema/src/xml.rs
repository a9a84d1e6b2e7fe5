//! XML rendering of package records.
//!
//! The index is a plain XML document so that it stays readable in a diff.
//! Rendering is split from merging: this module only knows how to turn a
//! [`PackageManifest`] into element events, `widepack-core` decides where in
//! the document they go.

use crate::{Component, FileEntry, PackageManifest};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};

/// Name of the root element of an index document.
pub const INDEX_ROOT: &str = "WideIndex";

/// Element holding one package record.
pub const PACKAGE_ELEMENT: &str = "Package";

/// Element holding one component of a package.
pub const COMPONENT_ELEMENT: &str = "Component";

/// Element holding one file of a component.
pub const FILE_ELEMENT: &str = "File";

/// Indentation used for every document we write.
pub const INDENT: (u8, usize) = (b' ', 2);

/// Write a `Package` element with its components.
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub fn write_package<W: std::io::Write>(
    writer: &mut Writer<W>,
    manifest: &PackageManifest,
) -> Result<(), quick_xml::Error> {
    let meta = &manifest.meta;
    let mut start = BytesStart::new(PACKAGE_ELEMENT);
    start.push_attribute(("Type", manifest.package_type()));
    start.push_attribute(("Id", meta.id.as_str()));
    start.push_attribute(("Name", meta.name.as_str()));
    start.push_attribute(("Version", meta.version.as_str()));
    start.push_attribute(("Description", meta.description.as_str()));

    if manifest.components.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for component in &manifest.components {
        write_component(writer, component)?;
    }
    writer.write_event(Event::End(BytesEnd::new(PACKAGE_ELEMENT)))?;
    Ok(())
}

fn write_component<W: std::io::Write>(
    writer: &mut Writer<W>,
    component: &Component,
) -> Result<(), quick_xml::Error> {
    let mut start = BytesStart::new(COMPONENT_ELEMENT);
    start.push_attribute(("Name", component.name()));
    writer.write_event(Event::Start(start))?;
    for file in &component.files {
        writer.write_event(Event::Empty(file_element(file)))?;
    }
    writer.write_event(Event::End(BytesEnd::new(COMPONENT_ELEMENT)))?;
    Ok(())
}

fn file_element(file: &FileEntry) -> BytesStart<'_> {
    let mut element = BytesStart::new(FILE_ELEMENT);
    element.push_attribute(("Path", file.path.as_str()));
    if let Some(platform) = file.platform {
        element.push_attribute(("Platform", platform.as_str()));
    }
    if let Some(version) = &file.version {
        element.push_attribute(("Version", version.as_str()));
    }
    element
}
