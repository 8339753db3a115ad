//! Minimal PE/COFF image access: headers, sections, RVA mapping and section appends.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::Error;

const DOS_SIGNATURE: &[u8; 2] = b"MZ";
const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";
const PE32_MAGIC: u16 = 0x10b;
const PE32_PLUS_MAGIC: u16 = 0x20b;
const SECTION_HEADER_SIZE: usize = 40;

pub(crate) const CERTIFICATE_DIRECTORY: usize = 4;
pub(crate) const CLI_HEADER_DIRECTORY: usize = 14;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DataDirectory {
    pub rva: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn read(bytes: &[u8], offset: usize) -> Result<Self, Error> {
        Ok(DataDirectory {
            rva: read_u32(bytes, offset)?,
            size: read_u32(bytes, offset + 4)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rva == 0
    }
}

#[derive(Debug, Clone)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_pointer: u32,
    raw_size: u32,
}

impl Section {
    // Loaders map max(virtual size, raw size) bytes of a section.
    fn extent(&self) -> u32 {
        self.virtual_size.max(self.raw_size)
    }

    fn contains(&self, rva: u32) -> bool {
        rva >= self.virtual_address && rva - self.virtual_address < self.extent()
    }
}

/// A PE32 or PE32+ image held in memory.
#[derive(Debug, Clone)]
pub(crate) struct PeImage {
    bytes: Vec<u8>,
    coff_offset: usize,
    optional_offset: usize,
    directories_offset: usize,
    directory_count: usize,
    section_table_offset: usize,
    section_alignment: u32,
    file_alignment: u32,
    size_of_headers: u32,
    sections: Vec<Section>,
}

impl PeImage {
    pub fn parse(bytes: Vec<u8>) -> Result<Self, Error> {
        if bytes.get(..2) != Some(DOS_SIGNATURE.as_slice()) {
            return Err(Error::invalid_image("missing MZ signature"));
        }
        let pe_offset = read_u32(&bytes, 0x3c)? as usize;
        if bytes.get(pe_offset..pe_offset + 4) != Some(PE_SIGNATURE.as_slice()) {
            return Err(Error::invalid_image("missing PE signature"));
        }

        let coff_offset = pe_offset + 4;
        let section_count = read_u16(&bytes, coff_offset + 2)? as usize;
        let optional_size = read_u16(&bytes, coff_offset + 16)? as usize;
        let optional_offset = coff_offset + 20;

        let (count_offset, directories_offset) = match read_u16(&bytes, optional_offset)? {
            PE32_MAGIC => (optional_offset + 92, optional_offset + 96),
            PE32_PLUS_MAGIC => (optional_offset + 108, optional_offset + 112),
            magic => {
                return Err(Error::UnsupportedImage(format!(
                    "optional header magic {:#x}",
                    magic
                )));
            }
        };
        let section_alignment = read_u32(&bytes, optional_offset + 32)?;
        let file_alignment = read_u32(&bytes, optional_offset + 36)?;
        let size_of_headers = read_u32(&bytes, optional_offset + 60)?;
        let directory_count = read_u32(&bytes, count_offset)? as usize;
        if section_alignment == 0 || file_alignment == 0 {
            return Err(Error::invalid_image("zero section or file alignment"));
        }

        let section_table_offset = optional_offset + optional_size;
        let mut sections = Vec::with_capacity(section_count);
        for index in 0..section_count {
            let header = section_table_offset + index * SECTION_HEADER_SIZE;
            sections.push(Section {
                virtual_size: read_u32(&bytes, header + 8)?,
                virtual_address: read_u32(&bytes, header + 12)?,
                raw_size: read_u32(&bytes, header + 16)?,
                raw_pointer: read_u32(&bytes, header + 20)?,
            });
        }

        Ok(PeImage {
            bytes,
            coff_offset,
            optional_offset,
            directories_offset,
            directory_count,
            section_table_offset,
            section_alignment,
            file_alignment,
            size_of_headers,
            sections,
        })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Returns the data directory at `index`, or an empty one when the image
    /// declares fewer directories.
    pub fn data_directory(&self, index: usize) -> Result<DataDirectory, Error> {
        if index >= self.directory_count {
            return Ok(DataDirectory::default());
        }
        DataDirectory::read(&self.bytes, self.directories_offset + index * 8)
    }

    pub fn set_data_directory(&mut self, index: usize, directory: DataDirectory) -> Result<(), Error> {
        if index >= self.directory_count {
            return Err(Error::invalid_image(format!("no data directory {}", index)));
        }
        let offset = self.directories_offset + index * 8;
        write_u32(&mut self.bytes, offset, directory.rva)?;
        write_u32(&mut self.bytes, offset + 4, directory.size)
    }

    pub fn clear_checksum(&mut self) -> Result<(), Error> {
        write_u32(&mut self.bytes, self.optional_offset + 64, 0)
    }

    pub fn rva_to_offset(&self, rva: u32) -> Result<usize, Error> {
        if rva < self.size_of_headers {
            return Ok(rva as usize);
        }
        let section = self
            .sections
            .iter()
            .find(|s| s.contains(rva))
            .ok_or_else(|| Error::invalid_image(format!("RVA {:#x} is not mapped", rva)))?;
        let delta = rva - section.virtual_address;
        if delta >= section.raw_size {
            return Err(Error::invalid_image(format!(
                "RVA {:#x} lies in uninitialized section data",
                rva
            )));
        }
        section
            .raw_pointer
            .checked_add(delta)
            .map(|offset| offset as usize)
            .ok_or_else(|| Error::invalid_image(format!("RVA {:#x} maps past 4 GiB", rva)))
    }

    pub fn slice(&self, rva: u32, len: usize) -> Result<&[u8], Error> {
        let start = self.rva_to_offset(rva)?;
        self.bytes
            .get(start..start.saturating_add(len))
            .ok_or_else(|| Error::invalid_image(format!("{} bytes at RVA {:#x} exceed the file", len, rva)))
    }

    pub fn write_u32_at(&mut self, rva: u32, value: u32) -> Result<(), Error> {
        let offset = self.rva_to_offset(rva)?;
        write_u32(&mut self.bytes, offset, value)
    }

    /// Appends a section holding `data` and returns its RVA.
    ///
    /// The new header must fit in the existing header area.
    pub fn append_section(
        &mut self,
        name: &[u8; 8],
        data: &[u8],
        characteristics: u32,
    ) -> Result<u32, Error> {
        let header = self.section_table_offset + self.sections.len() * SECTION_HEADER_SIZE;
        let header_end = header + SECTION_HEADER_SIZE;
        let first_raw = self
            .sections
            .iter()
            .filter(|s| s.raw_size > 0)
            .map(|s| s.raw_pointer as usize)
            .min()
            .unwrap_or(self.size_of_headers as usize);
        if header_end > self.size_of_headers as usize || header_end > first_raw {
            return Err(Error::UnsupportedImage(
                "no room for an additional section header".to_string(),
            ));
        }
        let slot = self
            .bytes
            .get(header..header_end)
            .ok_or_else(|| Error::invalid_image("section table runs past the end of the file"))?;
        if slot.iter().any(|b| *b != 0) {
            return Err(Error::UnsupportedImage(
                "section header slot is already in use".to_string(),
            ));
        }

        let image_end = self
            .sections
            .iter()
            .map(|s| s.virtual_address + s.extent())
            .max()
            .unwrap_or(self.size_of_headers);
        let virtual_address = align_up(image_end, self.section_alignment);
        let virtual_size = to_u32(data.len())?;
        let raw_pointer = align_up(to_u32(self.bytes.len())?, self.file_alignment);
        let raw_size = align_up(virtual_size, self.file_alignment);

        self.bytes.resize(raw_pointer as usize, 0);
        self.bytes.extend_from_slice(data);
        self.bytes.resize((raw_pointer + raw_size) as usize, 0);

        self.bytes[header..header + 8].copy_from_slice(name);
        write_u32(&mut self.bytes, header + 8, virtual_size)?;
        write_u32(&mut self.bytes, header + 12, virtual_address)?;
        write_u32(&mut self.bytes, header + 16, raw_size)?;
        write_u32(&mut self.bytes, header + 20, raw_pointer)?;
        write_u32(&mut self.bytes, header + 36, characteristics)?;

        let section_count = u16::try_from(self.sections.len() + 1)
            .map_err(|_| Error::UnsupportedImage("too many sections".to_string()))?;
        LittleEndian::write_u16(&mut self.bytes[self.coff_offset + 2..], section_count);
        let size_of_image = align_up(virtual_address + virtual_size, self.section_alignment);
        write_u32(&mut self.bytes, self.optional_offset + 56, size_of_image)?;

        self.sections.push(Section {
            virtual_address,
            virtual_size,
            raw_pointer,
            raw_size,
        });
        Ok(virtual_address)
    }
}

pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> Result<u16, Error> {
    bytes
        .get(offset..offset + 2)
        .map(LittleEndian::read_u16)
        .ok_or_else(|| Error::invalid_image(format!("truncated at offset {:#x}", offset)))
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, Error> {
    bytes
        .get(offset..offset + 4)
        .map(LittleEndian::read_u32)
        .ok_or_else(|| Error::invalid_image(format!("truncated at offset {:#x}", offset)))
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) -> Result<(), Error> {
    let slot = bytes
        .get_mut(offset..offset + 4)
        .ok_or_else(|| Error::invalid_image(format!("truncated at offset {:#x}", offset)))?;
    LittleEndian::write_u32(slot, value);
    Ok(())
}

pub(crate) fn align_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

pub(crate) fn to_u32(value: usize) -> Result<u32, Error> {
    u32::try_from(value).map_err(|_| Error::UnsupportedImage(format!("{} exceeds 32 bits", value)))
}
