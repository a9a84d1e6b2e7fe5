//! Target platforms recorded on binary entries.
//!
//! The platform is read from the COFF `Machine` field of a PE image. Only
//! the two machine codes eWAM ships for are mapped; everything else has no
//! platform and the `Platform` attribute is left off the file entry.
//!
//! # Example
//!
//! ```
//! use widepack_schema::Platform;
//!
//! assert_eq!(Platform::from_machine(0x8664), Some(Platform::X64));
//! assert_eq!(Platform::from_machine(0x01c0), None);
//! ```

/// COFF machine code for Intel 386 images.
pub const IMAGE_FILE_MACHINE_I386: u16 = 0x014c;

/// COFF machine code for AMD64 images.
pub const IMAGE_FILE_MACHINE_AMD64: u16 = 0x8664;

/// Platform tag attached to introspected binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// 32-bit Windows (`IMAGE_FILE_MACHINE_I386`)
    Win32,
    /// 64-bit Windows (`IMAGE_FILE_MACHINE_AMD64`)
    X64,
}

impl Platform {
    /// Map a COFF machine code to a platform, if it is one we tag.
    pub fn from_machine(machine: u16) -> Option<Self> {
        match machine {
            IMAGE_FILE_MACHINE_I386 => Some(Self::Win32),
            IMAGE_FILE_MACHINE_AMD64 => Some(Self::X64),
            _ => None,
        }
    }

    /// Value written to the `Platform` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win32 => "win32",
            Self::X64 => "x64",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_mapping_is_partial() {
        assert_eq!(Platform::from_machine(0x14c), Some(Platform::Win32));
        assert_eq!(Platform::from_machine(0x8664), Some(Platform::X64));
        assert_eq!(Platform::from_machine(0), None);
        assert_eq!(Platform::from_machine(0xaa64), None);
    }

    #[test]
    fn test_attribute_values() {
        assert_eq!(Platform::Win32.to_string(), "win32");
        assert_eq!(Platform::X64.as_str(), "x64");
    }
}
