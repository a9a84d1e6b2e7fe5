//! PE/COFF header reading.
//!
//! Layout of the part we read (all fields little-endian):
//!
//! ```text
//! 0x00  "MZ" DOS stub ...
//! 0x3C  u32  e_lfanew            offset of the PE signature
//! ...
//! e_lfanew + 0   u32  signature  "PE\0\0" = 0x0000_4550
//! e_lfanew + 4   u16  Machine
//! e_lfanew + 6   u16  NumberOfSections
//! e_lfanew + 8   u32  TimeDateStamp
//! e_lfanew + 12  u32  PointerToSymbolTable
//! e_lfanew + 16  u32  NumberOfSymbols
//! e_lfanew + 20  u16  SizeOfOptionalHeader
//! e_lfanew + 22  u16  Characteristics
//! e_lfanew + 24  optional header
//! ```

use std::io::{Read, Seek, SeekFrom};

use widepack_schema::Platform;

use super::IntrospectError;

/// Offset of the `e_lfanew` field in the DOS header.
pub const PE_POINTER_OFFSET: u64 = 0x3c;

/// `PE\0\0` read as a little-endian u32.
pub const PE_SIGNATURE: u32 = 0x0000_4550;

/// Size of the signature plus the COFF file header.
pub const COFF_HEADER_LEN: u64 = 4 + 20;

/// The fixed header fields of a PE image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeHeader {
    /// File offset of the `PE\0\0` signature.
    pub pe_offset: u32,
    /// COFF machine code.
    pub machine: u16,
    /// Number of entries in the section table.
    pub number_of_sections: u16,
    /// Size in bytes of the optional header.
    pub size_of_optional_header: u16,
}

impl PeHeader {
    /// Read the header from any seekable source.
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectError::TooShort`] if the source ends before a
    /// field, [`IntrospectError::SignatureMismatch`] if the signature is not
    /// `PE\0\0`, or [`IntrospectError::Io`] for other read failures.
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> Result<Self, IntrospectError> {
        reader.seek(SeekFrom::Start(PE_POINTER_OFFSET))?;
        let pe_offset = read_u32(reader, PE_POINTER_OFFSET)?;

        let base = u64::from(pe_offset);
        reader.seek(SeekFrom::Start(base))?;
        let signature = read_u32(reader, base)?;
        if signature != PE_SIGNATURE {
            return Err(IntrospectError::SignatureMismatch { found: signature });
        }

        let mut coff = [0u8; 20];
        read_exact(reader, &mut coff, base + 4)?;

        Ok(Self {
            pe_offset,
            machine: u16::from_le_bytes([coff[0], coff[1]]),
            number_of_sections: u16::from_le_bytes([coff[2], coff[3]]),
            size_of_optional_header: u16::from_le_bytes([coff[16], coff[17]]),
        })
    }

    /// Platform for this image's machine code.
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectError::UnsupportedMachine`] for machine codes
    /// other than i386 and AMD64.
    pub fn platform(&self) -> Result<Platform, IntrospectError> {
        Platform::from_machine(self.machine).ok_or(IntrospectError::UnsupportedMachine(self.machine))
    }

    /// File offset of the optional header.
    pub fn optional_header_offset(&self) -> usize {
        self.pe_offset as usize + COFF_HEADER_LEN as usize
    }

    /// File offset of the section table.
    pub fn section_table_offset(&self) -> usize {
        self.optional_header_offset() + usize::from(self.size_of_optional_header)
    }
}

fn read_u32<R: Read>(reader: &mut R, offset: u64) -> Result<u32, IntrospectError> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf, offset)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], offset: u64) -> Result<(), IntrospectError> {
    let needed = buf.len();
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => IntrospectError::TooShort { offset, needed },
        _ => IntrospectError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::PeImage;
    use std::io::Cursor;

    #[test]
    fn test_reads_machine_for_both_platforms() {
        for (machine, platform) in [(0x14c, Platform::Win32), (0x8664, Platform::X64)] {
            let image = PeImage::new(machine).build();
            let header = PeHeader::read_from(&mut Cursor::new(image)).unwrap();
            assert_eq!(header.machine, machine);
            assert_eq!(header.platform().unwrap(), platform);
        }
    }

    #[test]
    fn test_unknown_machine_is_typed() {
        let image = PeImage::new(0xaa64).build();
        let header = PeHeader::read_from(&mut Cursor::new(image)).unwrap();
        assert!(matches!(
            header.platform(),
            Err(IntrospectError::UnsupportedMachine(0xaa64))
        ));
    }

    #[test]
    fn test_file_too_short_for_pointer() {
        let err = PeHeader::read_from(&mut Cursor::new(vec![0u8; 0x20])).unwrap_err();
        assert!(matches!(err, IntrospectError::TooShort { offset: 0x3c, .. }));
    }

    #[test]
    fn test_pointer_past_end_of_file() {
        let mut image = vec![0u8; 0x40];
        image[0x3c..0x40].copy_from_slice(&0x1000u32.to_le_bytes());
        let err = PeHeader::read_from(&mut Cursor::new(image)).unwrap_err();
        assert!(matches!(err, IntrospectError::TooShort { offset: 0x1000, .. }));
    }

    #[test]
    fn test_signature_mismatch() {
        let mut image = PeImage::new(0x8664).build();
        image[0x80] = b'N';
        let err = PeHeader::read_from(&mut Cursor::new(image)).unwrap_err();
        assert!(matches!(err, IntrospectError::SignatureMismatch { .. }));
    }
}
