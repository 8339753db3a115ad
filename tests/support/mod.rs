//! Builds small managed PE images with a chosen set of manifest resources.
#![allow(dead_code)]

use std::path::Path;

pub const OPTIONAL_HEADER: usize = 0x98;
const SECTION_TABLE: usize = OPTIONAL_HEADER + 0xE0;
const TEXT_RVA: u32 = 0x2000;
const TEXT_RAW: usize = 0x200;
const CLI_HEADER_LEN: usize = 72;
const METADATA_VERSION: &[u8; 12] = b"v4.0.30319\0\0";

const MODULE: u32 = 0x00;
const CUSTOM_ATTRIBUTE: u32 = 0x0C;
const MANIFEST_RESOURCE: u32 = 0x28;
const HAS_CUSTOM_ATTRIBUTE_MANIFEST_RESOURCE: u32 = 18;

#[derive(Debug, Clone)]
enum Data {
    Embedded(Vec<u8>),
    Linked,
}

#[derive(Debug, Clone, Default)]
pub struct AssemblyBuilder {
    resources: Vec<(String, Data)>,
    custom_attribute_rows: Vec<u32>,
    strong_named: bool,
}

impl AssemblyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn embedded(mut self, name: &str, bytes: &[u8]) -> Self {
        self.resources
            .push((name.to_string(), Data::Embedded(bytes.to_vec())));
        self
    }

    pub fn linked(mut self, name: &str) -> Self {
        self.resources.push((name.to_string(), Data::Linked));
        self
    }

    /// Attaches a custom attribute to the 1-based manifest resource `row`.
    pub fn custom_attribute_on_resource(mut self, row: u32) -> Self {
        self.custom_attribute_rows.push(row);
        self
    }

    /// Sets the strong-name flag and a certificate directory.
    pub fn strong_named(mut self) -> Self {
        self.strong_named = true;
        self
    }

    pub fn write(&self, path: &Path) {
        std::fs::write(path, self.build()).unwrap();
    }

    pub fn build(&self) -> Vec<u8> {
        let mut strings = vec![0u8];
        strings.extend_from_slice(b"Game.exe\0");
        let mut blob = Vec::new();
        let mut rows = Vec::new();
        for (name, data) in &self.resources {
            let name_index = strings.len() as u16;
            strings.extend_from_slice(name.as_bytes());
            strings.push(0);
            match data {
                Data::Embedded(bytes) => {
                    put_u32(&mut rows, blob.len() as u32);
                    put_u32(&mut rows, 1);
                    put_u16(&mut rows, name_index);
                    put_u16(&mut rows, 0);
                    put_u32(&mut blob, bytes.len() as u32);
                    blob.extend_from_slice(bytes);
                    pad(&mut blob, 8);
                }
                Data::Linked => {
                    put_u32(&mut rows, 0);
                    put_u32(&mut rows, 2);
                    put_u16(&mut rows, name_index);
                    // AssemblyRef row 1
                    put_u16(&mut rows, (1 << 2) | 1);
                }
            }
        }
        pad(&mut strings, 4);

        let metadata = self.metadata(&strings, &rows);
        let metadata_rva = TEXT_RVA + CLI_HEADER_LEN as u32;
        let mut text = vec![0u8; CLI_HEADER_LEN];
        text.extend_from_slice(&metadata);
        pad(&mut text, 8);
        let resources_rva = TEXT_RVA + text.len() as u32;
        text.extend_from_slice(&blob);

        let mut cli = Vec::new();
        put_u32(&mut cli, CLI_HEADER_LEN as u32);
        put_u16(&mut cli, 2);
        put_u16(&mut cli, 5);
        put_u32(&mut cli, metadata_rva);
        put_u32(&mut cli, metadata.len() as u32);
        put_u32(&mut cli, if self.strong_named { 0x09 } else { 0x01 });
        put_u32(&mut cli, 0);
        put_u32(&mut cli, if blob.is_empty() { 0 } else { resources_rva });
        put_u32(&mut cli, blob.len() as u32);
        text[..cli.len()].copy_from_slice(&cli);

        self.image(&text)
    }

    fn metadata(&self, strings: &[u8], resource_rows: &[u8]) -> Vec<u8> {
        let mut tables = Vec::new();
        put_u32(&mut tables, 0);
        tables.push(2);
        tables.push(0);
        tables.push(0);
        tables.push(1);
        let mut valid = (1u64 << MODULE) | (1u64 << MANIFEST_RESOURCE);
        if !self.custom_attribute_rows.is_empty() {
            valid |= 1u64 << CUSTOM_ATTRIBUTE;
        }
        put_u64(&mut tables, valid);
        put_u64(&mut tables, 0);
        put_u32(&mut tables, 1);
        if !self.custom_attribute_rows.is_empty() {
            put_u32(&mut tables, self.custom_attribute_rows.len() as u32);
        }
        put_u32(&mut tables, self.resources.len() as u32);

        // Module: generation, name, mvid, encId, encBaseId
        put_u16(&mut tables, 0);
        put_u16(&mut tables, 1);
        put_u16(&mut tables, 0);
        put_u16(&mut tables, 0);
        put_u16(&mut tables, 0);
        // CustomAttribute: parent, type, value
        for row in &self.custom_attribute_rows {
            put_u16(&mut tables, ((row << 5) | HAS_CUSTOM_ATTRIBUTE_MANIFEST_RESOURCE) as u16);
            put_u16(&mut tables, (1 << 3) | 3);
            put_u16(&mut tables, 0);
        }
        tables.extend_from_slice(resource_rows);
        pad(&mut tables, 4);

        let mut root = Vec::new();
        put_u32(&mut root, 0x424A_5342);
        put_u16(&mut root, 1);
        put_u16(&mut root, 1);
        put_u32(&mut root, 0);
        put_u32(&mut root, METADATA_VERSION.len() as u32);
        root.extend_from_slice(METADATA_VERSION);
        put_u16(&mut root, 0);
        put_u16(&mut root, 2);

        let headers_end = root.len() + (8 + 4) + (8 + 12);
        put_u32(&mut root, headers_end as u32);
        put_u32(&mut root, tables.len() as u32);
        root.extend_from_slice(b"#~\0\0");
        put_u32(&mut root, (headers_end + tables.len()) as u32);
        put_u32(&mut root, strings.len() as u32);
        root.extend_from_slice(b"#Strings\0\0\0\0");
        assert_eq!(root.len(), headers_end);

        root.extend_from_slice(&tables);
        root.extend_from_slice(strings);
        root
    }

    fn image(&self, text: &[u8]) -> Vec<u8> {
        let raw_size = text.len().div_ceil(0x200) * 0x200;
        let mut bytes = vec![0u8; TEXT_RAW + raw_size];
        bytes[..2].copy_from_slice(b"MZ");
        bytes[0x3c..0x40].copy_from_slice(&0x80u32.to_le_bytes());
        bytes[0x80..0x84].copy_from_slice(b"PE\0\0");

        let mut coff = Vec::new();
        put_u16(&mut coff, 0x14c);
        put_u16(&mut coff, 1);
        put_u32(&mut coff, 0);
        put_u32(&mut coff, 0);
        put_u32(&mut coff, 0);
        put_u16(&mut coff, 0xE0);
        put_u16(&mut coff, 0x0102);
        bytes[0x84..0x84 + coff.len()].copy_from_slice(&coff);

        let opt = OPTIONAL_HEADER;
        write_u16(&mut bytes, opt, 0x10b);
        write_u32(&mut bytes, opt + 28, 0x0040_0000);
        write_u32(&mut bytes, opt + 32, 0x2000);
        write_u32(&mut bytes, opt + 36, 0x200);
        write_u32(&mut bytes, opt + 56, TEXT_RVA + (text.len() as u32).div_ceil(0x2000) * 0x2000);
        write_u32(&mut bytes, opt + 60, 0x200);
        write_u32(&mut bytes, opt + 64, 0xDEAD_BEEF);
        write_u32(&mut bytes, opt + 92, 16);
        if self.strong_named {
            write_u32(&mut bytes, opt + 96 + 4 * 8, 0x1000);
            write_u32(&mut bytes, opt + 96 + 4 * 8 + 4, 0x10);
        }
        write_u32(&mut bytes, opt + 96 + 14 * 8, TEXT_RVA);
        write_u32(&mut bytes, opt + 96 + 14 * 8 + 4, CLI_HEADER_LEN as u32);

        let section = SECTION_TABLE;
        bytes[section..section + 8].copy_from_slice(b".text\0\0\0");
        write_u32(&mut bytes, section + 8, text.len() as u32);
        write_u32(&mut bytes, section + 12, TEXT_RVA);
        write_u32(&mut bytes, section + 16, raw_size as u32);
        write_u32(&mut bytes, section + 20, TEXT_RAW as u32);
        write_u32(&mut bytes, section + 36, 0x6000_0020);

        bytes[TEXT_RAW..TEXT_RAW + text.len()].copy_from_slice(text);
        bytes
    }
}

/// Flags word of the CLI header, which stays in the original `.text` section.
pub fn cli_flags(image: &[u8]) -> u32 {
    read_u32(image, TEXT_RAW + 16)
}

pub fn checksum(image: &[u8]) -> u32 {
    read_u32(image, OPTIONAL_HEADER + 64)
}

pub fn certificate_directory(image: &[u8]) -> (u32, u32) {
    let offset = OPTIONAL_HEADER + 96 + 4 * 8;
    (read_u32(image, offset), read_u32(image, offset + 4))
}

pub fn section_count(image: &[u8]) -> u16 {
    u16::from_le_bytes([image[0x86], image[0x87]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn write_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn pad(out: &mut Vec<u8>, alignment: usize) {
    out.resize(out.len().div_ceil(alignment) * alignment, 0);
}
