//! Product version extraction from the PE version resource.
//!
//! The version lives in the `RT_VERSION` resource as a `VS_VERSIONINFO`
//! tree: a fixed `VS_FIXEDFILEINFO` block followed by `StringFileInfo`
//! tables of UTF-16 key/value pairs. The string `ProductVersion` wins, then
//! `FileVersion`, then the fixed product version as `a.b.c.d`.

use std::io::Cursor;

use super::IntrospectError;
use super::header::PeHeader;

const MAGIC_PE32: u16 = 0x10b;
const MAGIC_PE32_PLUS: u16 = 0x20b;
const RESOURCE_DIRECTORY_INDEX: usize = 2;
const RT_VERSION: u32 = 16;
const SUBDIRECTORY_FLAG: u32 = 0x8000_0000;
const SECTION_HEADER_LEN: usize = 40;
const FIXED_FILE_INFO_SIGNATURE: u32 = 0xfeef_04bd;

/// Read the product version of a PE image held in memory.
///
/// # Errors
///
/// Returns [`IntrospectError::NoVersionResource`] if the image has no
/// version resource, [`IntrospectError::MalformedResource`] if the resource
/// tree is truncated or inconsistent, or a header error if the image is not
/// a PE file at all.
pub fn product_version(image: &[u8]) -> Result<String, IntrospectError> {
    let header = PeHeader::read_from(&mut Cursor::new(image))?;
    let view = Image::new(image, &header)?;
    let blob = view.version_blob()?;
    VersionInfo::parse(blob)?
        .preferred()
        .ok_or(IntrospectError::NoVersionResource)
}

#[derive(Debug, Clone, Copy)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_size: u32,
    raw_offset: u32,
}

/// Bounds-checked view over a PE image.
#[derive(Debug)]
struct Image<'a> {
    bytes: &'a [u8],
    sections: Vec<Section>,
    resource_rva: u32,
}

impl<'a> Image<'a> {
    fn new(bytes: &'a [u8], header: &PeHeader) -> Result<Self, IntrospectError> {
        let optional = header.optional_header_offset();
        let (count_at, directories_at) = match le_u16(bytes, optional)? {
            MAGIC_PE32 => (92, 96),
            MAGIC_PE32_PLUS => (108, 112),
            other => {
                return Err(IntrospectError::MalformedResource(format!(
                    "unknown optional header magic {other:#06x}"
                )));
            }
        };

        let directory_count = le_u32(bytes, optional + count_at)? as usize;
        if directory_count <= RESOURCE_DIRECTORY_INDEX {
            return Err(IntrospectError::NoVersionResource);
        }
        let entry = optional + directories_at + RESOURCE_DIRECTORY_INDEX * 8;
        if entry + 8 > header.section_table_offset() {
            return Err(IntrospectError::MalformedResource(
                "data directories overflow the optional header".to_string(),
            ));
        }
        let resource_rva = le_u32(bytes, entry)?;
        if resource_rva == 0 {
            return Err(IntrospectError::NoVersionResource);
        }

        let table = header.section_table_offset();
        let sections = (0..usize::from(header.number_of_sections))
            .map(|i| {
                let at = table + i * SECTION_HEADER_LEN;
                Ok(Section {
                    virtual_size: le_u32(bytes, at + 8)?,
                    virtual_address: le_u32(bytes, at + 12)?,
                    raw_size: le_u32(bytes, at + 16)?,
                    raw_offset: le_u32(bytes, at + 20)?,
                })
            })
            .collect::<Result<Vec<_>, IntrospectError>>()?;

        Ok(Self {
            bytes,
            sections,
            resource_rva,
        })
    }

    /// Translate a relative virtual address to a file offset.
    fn offset_of(&self, rva: u32) -> Result<usize, IntrospectError> {
        self.sections
            .iter()
            .find(|s| {
                let span = s.virtual_size.max(s.raw_size);
                rva >= s.virtual_address && rva - s.virtual_address < span
            })
            .map(|s| (rva - s.virtual_address) as usize + s.raw_offset as usize)
            .ok_or_else(|| {
                IntrospectError::MalformedResource(format!("RVA {rva:#x} is outside every section"))
            })
    }

    /// Walk type -> name -> language and return the first `RT_VERSION` blob.
    fn version_blob(&self) -> Result<&'a [u8], IntrospectError> {
        let base = self.offset_of(self.resource_rva)?;

        let names = subdirectory(self.directory_entry(base, Some(RT_VERSION))?)?;
        let languages = subdirectory(self.directory_entry(base + names, None)?)?;
        let data = self.directory_entry(base + languages, None)?;
        if data & SUBDIRECTORY_FLAG != 0 {
            return Err(IntrospectError::MalformedResource(
                "resource tree deeper than three levels".to_string(),
            ));
        }

        let entry = base + data as usize;
        let rva = le_u32(self.bytes, entry)?;
        let size = le_u32(self.bytes, entry + 4)? as usize;
        let start = self.offset_of(rva)?;
        slice(self.bytes, start, size)
    }

    /// Find an entry in the directory at `at`, by id or the first one.
    fn directory_entry(&self, at: usize, id: Option<u32>) -> Result<u32, IntrospectError> {
        let named = usize::from(le_u16(self.bytes, at + 12)?);
        let ids = usize::from(le_u16(self.bytes, at + 14)?);
        for i in 0..named + ids {
            let entry = at + 16 + i * 8;
            let name = le_u32(self.bytes, entry)?;
            let data = le_u32(self.bytes, entry + 4)?;
            match id {
                None => return Ok(data),
                Some(want) if name & SUBDIRECTORY_FLAG == 0 && name == want => return Ok(data),
                Some(_) => {}
            }
        }
        Err(IntrospectError::NoVersionResource)
    }
}

/// The parts of `VS_VERSIONINFO` we care about.
#[derive(Debug, Default, PartialEq, Eq)]
struct VersionInfo {
    fixed_product: Option<[u16; 4]>,
    product_version: Option<String>,
    file_version: Option<String>,
}

impl VersionInfo {
    fn parse(blob: &[u8]) -> Result<Self, IntrospectError> {
        let (root, _) = Block::parse(blob)?;
        if root.key != "VS_VERSION_INFO" {
            return Err(IntrospectError::MalformedResource(format!(
                "unexpected version block key {:?}",
                root.key
            )));
        }

        let mut info = Self::default();
        if root.value.len() >= 52 && le_u32(root.value, 0)? == FIXED_FILE_INFO_SIGNATURE {
            let ms = le_u32(root.value, 16)?;
            let ls = le_u32(root.value, 20)?;
            info.fixed_product = Some([
                (ms >> 16) as u16,
                (ms & 0xffff) as u16,
                (ls >> 16) as u16,
                (ls & 0xffff) as u16,
            ]);
        }

        for child in Block::children(root.children)? {
            if child.key != "StringFileInfo" {
                continue;
            }
            for table in Block::children(child.children)? {
                for entry in Block::children(table.children)? {
                    let value = utf16_text(entry.value);
                    let value = value.trim();
                    if value.is_empty() {
                        continue;
                    }
                    match entry.key.as_str() {
                        "ProductVersion" if info.product_version.is_none() => {
                            info.product_version = Some(value.to_string());
                        }
                        "FileVersion" if info.file_version.is_none() => {
                            info.file_version = Some(value.to_string());
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(info)
    }

    fn preferred(self) -> Option<String> {
        self.product_version.or(self.file_version).or_else(|| {
            self.fixed_product
                .map(|[a, b, c, d]| format!("{a}.{b}.{c}.{d}"))
        })
    }
}

/// One node of the `VS_VERSIONINFO` tree.
///
/// ```text
/// u16 wLength        whole block, children included
/// u16 wValueLength   in bytes, or in UTF-16 units when wType == 1
/// u16 wType          0 binary, 1 text
/// utf16 szKey        NUL terminated, then padding to 4 bytes
/// Value              then padding to 4 bytes
/// Children
/// ```
#[derive(Debug)]
struct Block<'a> {
    key: String,
    value: &'a [u8],
    children: &'a [u8],
}

impl<'a> Block<'a> {
    /// Parse the block at the start of `data`, returning it and the number
    /// of bytes to skip to reach its next sibling.
    fn parse(data: &'a [u8]) -> Result<(Self, usize), IntrospectError> {
        let length = usize::from(le_u16(data, 0)?);
        if length < 6 || length > data.len() {
            return Err(IntrospectError::MalformedResource(format!(
                "version block length {length} out of bounds"
            )));
        }
        let data = &data[..length];
        let value_length = usize::from(le_u16(data, 2)?);
        let is_text = le_u16(data, 4)? == 1;

        let mut units = Vec::new();
        let mut cursor = 6;
        loop {
            let unit = le_u16(data, cursor)?;
            cursor += 2;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        let key = String::from_utf16_lossy(&units);

        let value_start = align4(cursor).min(length);
        let value_bytes = if is_text { value_length * 2 } else { value_length };
        let value_end = (value_start + value_bytes).min(length);
        let children_start = align4(value_end).min(length);

        Ok((
            Self {
                key,
                value: &data[value_start..value_end],
                children: &data[children_start..],
            },
            align4(length),
        ))
    }

    fn children(mut data: &'a [u8]) -> Result<Vec<Self>, IntrospectError> {
        let mut blocks = Vec::new();
        while data.len() >= 6 {
            let (block, consumed) = Self::parse(data)?;
            blocks.push(block);
            if consumed >= data.len() {
                break;
            }
            data = &data[consumed..];
        }
        Ok(blocks)
    }
}

fn subdirectory(raw: u32) -> Result<usize, IntrospectError> {
    if raw & SUBDIRECTORY_FLAG == 0 {
        return Err(IntrospectError::MalformedResource(
            "expected a resource subdirectory".to_string(),
        ));
    }
    Ok((raw & !SUBDIRECTORY_FLAG) as usize)
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

fn slice(bytes: &[u8], at: usize, len: usize) -> Result<&[u8], IntrospectError> {
    at.checked_add(len)
        .and_then(|end| bytes.get(at..end))
        .ok_or_else(|| {
            IntrospectError::MalformedResource(format!(
                "{len} bytes at {at:#x} run past the end of the image"
            ))
        })
}

fn le_u16(bytes: &[u8], at: usize) -> Result<u16, IntrospectError> {
    let b = slice(bytes, at, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

fn le_u32(bytes: &[u8], at: usize) -> Result<u32, IntrospectError> {
    let b = slice(bytes, at, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::PeImage;

    #[test]
    fn test_product_version_string_wins() {
        let image = PeImage::new(0x8664)
            .product_version("1.2.3")
            .file_version("1.2.3.4567")
            .fixed_version([9, 9, 9, 9])
            .build();
        assert_eq!(product_version(&image).unwrap(), "1.2.3");
    }

    #[test]
    fn test_falls_back_to_file_version() {
        let image = PeImage::new(0x14c).file_version("6.1.0.12").build();
        assert_eq!(product_version(&image).unwrap(), "6.1.0.12");
    }

    #[test]
    fn test_falls_back_to_fixed_info() {
        let image = PeImage::new(0x14c).fixed_version([7, 0, 1, 42]).build();
        assert_eq!(product_version(&image).unwrap(), "7.0.1.42");
    }

    #[test]
    fn test_pe32_plus_optional_header() {
        let image = PeImage::new(0x8664).pe32_plus().product_version("2.0").build();
        assert_eq!(product_version(&image).unwrap(), "2.0");
    }

    #[test]
    fn test_image_without_resources() {
        let image = PeImage::new(0x8664).build();
        assert!(matches!(
            product_version(&image),
            Err(IntrospectError::NoVersionResource)
        ));
    }

    #[test]
    fn test_truncated_resource_is_malformed() {
        let mut image = PeImage::new(0x8664).product_version("1.0").build();
        image.truncate(image.len() - 40);
        assert!(matches!(
            product_version(&image),
            Err(IntrospectError::MalformedResource(_))
        ));
    }

    #[test]
    fn test_block_alignment() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(6), 8);
        assert_eq!(align4(8), 8);
        assert_eq!(align4(37), 40);
    }
}
