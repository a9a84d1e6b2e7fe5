//! Binary introspection.
//!
//! Reads the target platform from the PE/COFF header and the product
//! version from the version resource. Both lookups are independent so a
//! DLL without a version resource still gets its platform.

pub mod header;
pub mod version;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use thiserror::Error;
use tracing::debug;
use widepack_schema::Platform;

pub use header::PeHeader;

/// Errors raised while inspecting one binary.
#[derive(Error, Debug)]
pub enum IntrospectError {
    /// The file could not be opened or read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file ends before a header field.
    #[error("File too short to contain a PE header ({needed} bytes needed at offset {offset:#x})")]
    TooShort {
        /// Offset of the field that could not be read.
        offset: u64,
        /// Size of that field.
        needed: usize,
    },

    /// The bytes at `e_lfanew` are not `PE\0\0`.
    #[error("Header signature not found (found {found:#010x})")]
    SignatureMismatch {
        /// Value read where the signature was expected.
        found: u32,
    },

    /// The machine code maps to no known platform.
    #[error("Unsupported machine code {0:#06x}")]
    UnsupportedMachine(u16),

    /// The image carries no usable version information.
    #[error("No version resource")]
    NoVersionResource,

    /// The resource section is truncated or inconsistent.
    #[error("Malformed version resource: {0}")]
    MalformedResource(String),
}

/// What introspection learned about a binary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryDescriptor {
    /// Target platform, absent for machine codes we do not tag.
    pub platform: Option<Platform>,
    /// Product version string.
    pub version: Option<String>,
}

/// Source of platform and version information for binaries.
///
/// The manifest builder only talks to this trait, so tests and other
/// platforms can plug in their own metadata source.
pub trait Introspector {
    /// Target platform of the binary, `None` when its machine code is not
    /// one we tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be read or is not a PE header.
    fn platform(&self, path: &Path) -> Result<Option<Platform>, IntrospectError>;

    /// Product version of the binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the file has no readable version information.
    fn version(&self, path: &Path) -> Result<String, IntrospectError>;

    /// Platform and version together, failing if either lookup fails.
    ///
    /// # Errors
    ///
    /// Returns the first error of [`platform`](Self::platform) or
    /// [`version`](Self::version).
    fn inspect(&self, path: &Path) -> Result<BinaryDescriptor, IntrospectError> {
        Ok(BinaryDescriptor {
            platform: self.platform(path)?,
            version: Some(self.version(path)?),
        })
    }
}

/// Introspector for Windows PE images, working on any host.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeIntrospector;

impl Introspector for PeIntrospector {
    fn platform(&self, path: &Path) -> Result<Option<Platform>, IntrospectError> {
        let header = {
            let mut reader = BufReader::new(File::open(path)?);
            PeHeader::read_from(&mut reader)?
        };
        match header.platform() {
            Ok(platform) => Ok(Some(platform)),
            Err(IntrospectError::UnsupportedMachine(machine)) => {
                debug!("{}: machine {machine:#06x} has no platform tag", path.display());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn version(&self, path: &Path) -> Result<String, IntrospectError> {
        let image = std::fs::read(path)?;
        version::product_version(&image)
    }
}
