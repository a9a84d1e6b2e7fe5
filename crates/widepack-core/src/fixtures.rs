//! Synthetic PE images for tests.
//!
//! Produces the smallest image the introspector accepts: a DOS stub with
//! `e_lfanew`, a COFF header, an optional header with a resource data
//! directory and, when any version is set, one `.rsrc` section holding a
//! `VS_VERSIONINFO` tree.

use std::path::Path;

const PE_OFFSET: usize = 0x80;
const RAW_RESOURCE_OFFSET: usize = 0x200;
const RESOURCE_RVA: u32 = 0x1000;
const BLOB_OFFSET: usize = 0x58;

/// Builder for a minimal PE image.
#[derive(Debug, Clone)]
pub struct PeImage {
    machine: u16,
    pe32_plus: bool,
    product_version: Option<String>,
    file_version: Option<String>,
    fixed_version: Option<[u16; 4]>,
}

impl PeImage {
    /// An image for the given COFF machine code, without version resource.
    pub fn new(machine: u16) -> Self {
        Self {
            machine,
            pe32_plus: false,
            product_version: None,
            file_version: None,
            fixed_version: None,
        }
    }

    /// Use a PE32+ optional header instead of PE32.
    pub fn pe32_plus(mut self) -> Self {
        self.pe32_plus = true;
        self
    }

    /// Set the `ProductVersion` string.
    pub fn product_version(mut self, version: &str) -> Self {
        self.product_version = Some(version.to_string());
        self
    }

    /// Set the `FileVersion` string.
    pub fn file_version(mut self, version: &str) -> Self {
        self.file_version = Some(version.to_string());
        self
    }

    /// Set the fixed-info product version.
    pub fn fixed_version(mut self, version: [u16; 4]) -> Self {
        self.fixed_version = Some(version);
        self
    }

    fn has_resources(&self) -> bool {
        self.product_version.is_some() || self.file_version.is_some() || self.fixed_version.is_some()
    }

    /// Serialize the image.
    pub fn build(&self) -> Vec<u8> {
        let optional_size: usize = if self.pe32_plus { 240 } else { 224 };
        let sections: u16 = u16::from(self.has_resources());

        let mut image = vec![0u8; RAW_RESOURCE_OFFSET];
        image[0..2].copy_from_slice(b"MZ");
        put_u32(&mut image, 0x3c, PE_OFFSET as u32);

        image[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(b"PE\0\0");
        let coff = PE_OFFSET + 4;
        put_u16(&mut image, coff, self.machine);
        put_u16(&mut image, coff + 2, sections);
        put_u16(&mut image, coff + 16, optional_size as u16);
        put_u16(&mut image, coff + 18, 0x2102);

        let optional = coff + 20;
        let (magic, count_at, directories_at) = if self.pe32_plus {
            (0x20b, 108, 112)
        } else {
            (0x10b, 92, 96)
        };
        put_u16(&mut image, optional, magic);
        put_u32(&mut image, optional + count_at, 16);

        if !self.has_resources() {
            return image;
        }

        let resources = self.resource_section();
        let size = resources.len() as u32;
        put_u32(&mut image, optional + directories_at + 16, RESOURCE_RVA);
        put_u32(&mut image, optional + directories_at + 20, size);

        let section = optional + optional_size;
        image[section..section + 5].copy_from_slice(b".rsrc");
        put_u32(&mut image, section + 8, size);
        put_u32(&mut image, section + 12, RESOURCE_RVA);
        put_u32(&mut image, section + 16, size);
        put_u32(&mut image, section + 20, RAW_RESOURCE_OFFSET as u32);

        image.extend(resources);
        image
    }

    /// Serialize the image to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.build())
    }

    /// Type -> name -> language directories, one data entry, then the blob.
    fn resource_section(&self) -> Vec<u8> {
        let blob = self.version_blob();
        let mut rsrc = vec![0u8; BLOB_OFFSET];

        put_u16(&mut rsrc, 0x0e, 1);
        put_u32(&mut rsrc, 0x10, 16);
        put_u32(&mut rsrc, 0x14, 0x8000_0000 | 0x18);

        put_u16(&mut rsrc, 0x18 + 0x0e, 1);
        put_u32(&mut rsrc, 0x28, 1);
        put_u32(&mut rsrc, 0x2c, 0x8000_0000 | 0x30);

        put_u16(&mut rsrc, 0x30 + 0x0e, 1);
        put_u32(&mut rsrc, 0x40, 0x409);
        put_u32(&mut rsrc, 0x44, 0x48);

        put_u32(&mut rsrc, 0x48, RESOURCE_RVA + BLOB_OFFSET as u32);
        put_u32(&mut rsrc, 0x4c, blob.len() as u32);

        rsrc.extend(blob);
        rsrc
    }

    fn version_blob(&self) -> Vec<u8> {
        let [a, b, c, d] = self.fixed_version.unwrap_or_default();
        let ms = (u32::from(a) << 16) | u32::from(b);
        let ls = (u32::from(c) << 16) | u32::from(d);
        let mut fixed = Vec::with_capacity(52);
        for field in [0xfeef_04bd, 0x0001_0000, ms, ls, ms, ls, 0x3f, 0, 0x0004_0004, 2, 0, 0, 0] {
            fixed.extend_from_slice(&u32::to_le_bytes(field));
        }

        let strings: Vec<Vec<u8>> = [
            ("ProductVersion", &self.product_version),
            ("FileVersion", &self.file_version),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| text_block(key, v)))
        .collect();

        let children = if strings.is_empty() {
            Vec::new()
        } else {
            let table = block("040904b0", &[], 0, true, &strings);
            vec![block("StringFileInfo", &[], 0, true, &[table])]
        };
        block("VS_VERSION_INFO", &fixed, 52, false, &children)
    }
}

fn text_block(key: &str, value: &str) -> Vec<u8> {
    let units: Vec<u16> = value.encode_utf16().chain(std::iter::once(0)).collect();
    let bytes: Vec<u8> = units.iter().flat_map(|u| u.to_le_bytes()).collect();
    block(key, &bytes, units.len() as u16, true, &[])
}

fn block(key: &str, value: &[u8], value_length: u16, is_text: bool, children: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = vec![0u8; 6];
    put_u16(&mut buf, 2, value_length);
    put_u16(&mut buf, 4, u16::from(is_text));
    for unit in key.encode_utf16().chain(std::iter::once(0)) {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
    pad4(&mut buf);
    buf.extend_from_slice(value);
    for child in children {
        pad4(&mut buf);
        buf.extend_from_slice(child);
    }
    let length = buf.len() as u16;
    put_u16(&mut buf, 0, length);
    buf
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}
