//! Manifest resources of a managed (.NET) PE image.
//!
//! [`ManagedAssembly`] reads the `ManifestResource` table of an assembly and
//! writes a copy whose resources have been replaced, added or removed. The
//! new metadata and resource data are placed in an appended section; all
//! other bytes of the image are left as they were.

mod metadata;
mod pe;

use std::path::Path;

use tracing::debug;

use crate::error::Error;
use metadata::{
    CUSTOM_ATTRIBUTE, CodedIndex, MANIFEST_RESOURCE, MetadataRoot, STRINGS_STREAM, TableStream,
    append_string, push_cell, read_string,
};
use pe::{CERTIFICATE_DIRECTORY, CLI_HEADER_DIRECTORY, DataDirectory, PeImage, read_u32, to_u32};

const CLI_HEADER_LEN: usize = 72;
const CLI_METADATA_OFFSET: u32 = 8;
const CLI_FLAGS_OFFSET: u32 = 16;
const CLI_RESOURCES_OFFSET: u32 = 24;
const CLI_FLAG_STRONG_NAME_SIGNED: u32 = 0x08;

const RESOURCE_SECTION_NAME: &[u8; 8] = b".locres\0";
// IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ
const RESOURCE_SECTION_CHARACTERISTICS: u32 = 0x4000_0040;

const STRINGS_HEAP_LIMIT: usize = 0x1_0000;

/// `ManifestResourceAttributes.Public`.
pub const RESOURCE_PUBLIC: u32 = 0x1;
/// `ManifestResourceAttributes.Private`.
pub const RESOURCE_PRIVATE: u32 = 0x2;

/// Where the bytes of a manifest resource live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceData {
    /// Stored in the image's CLI resources blob.
    Embedded(Vec<u8>),
    /// Stored in another file or assembly; kept verbatim.
    Linked { offset: u32, implementation: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestResource {
    pub name: String,
    pub flags: u32,
    pub data: ResourceData,
}

impl ManifestResource {
    /// A public resource embedded in the image.
    pub fn embedded(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        ManifestResource {
            name: name.into(),
            flags: RESOURCE_PUBLIC,
            data: ResourceData::Embedded(bytes),
        }
    }

    /// The resource's bytes, or `None` when it is linked.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.data {
            ResourceData::Embedded(bytes) => Some(bytes),
            ResourceData::Linked { .. } => None,
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.data, ResourceData::Embedded(_))
    }
}

#[derive(Debug, Clone)]
struct Slot {
    resource: ManifestResource,
    // Index of the name in the original `#Strings` heap; `None` for pushed resources.
    name_index: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
struct CliHeader {
    rva: u32,
    metadata: DataDirectory,
    flags: u32,
}

/// An assembly loaded for manifest resource editing.
///
/// Resources are addressed by slot index. Removing a resource vacates its
/// slot; the next push fills the earliest vacated slot so that the rows of
/// untouched resources keep their position.
#[derive(Debug, Clone)]
pub struct ManagedAssembly {
    image: PeImage,
    cli: CliHeader,
    root: MetadataRoot,
    tables: TableStream,
    slots: Vec<Option<Slot>>,
}

impl ManagedAssembly {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading assembly");
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, Error> {
        let image = PeImage::parse(bytes)?;
        let cli_directory = image.data_directory(CLI_HEADER_DIRECTORY)?;
        if cli_directory.is_empty() {
            return Err(Error::invalid_image("image has no CLI header"));
        }
        let header = image.slice(cli_directory.rva, CLI_HEADER_LEN)?;
        let cli = CliHeader {
            rva: cli_directory.rva,
            metadata: DataDirectory::read(header, CLI_METADATA_OFFSET as usize)?,
            flags: read_u32(header, CLI_FLAGS_OFFSET as usize)?,
        };
        let resources_directory = DataDirectory::read(header, CLI_RESOURCES_OFFSET as usize)?;

        let root = MetadataRoot::parse(image.slice(cli.metadata.rva, cli.metadata.size as usize)?)?;
        let tables = TableStream::parse(
            &root
                .table_stream()
                .ok_or_else(|| Error::invalid_image("metadata has no table stream"))?
                .data,
        )?;
        let strings = root
            .stream(STRINGS_STREAM)
            .map(|s| s.data.as_slice())
            .unwrap_or_default();
        let blob = if resources_directory.is_empty() {
            &[][..]
        } else {
            image.slice(resources_directory.rva, resources_directory.size as usize)?
        };

        let mut slots = Vec::with_capacity(tables.rows(MANIFEST_RESOURCE) as usize);
        for row in 0..tables.rows(MANIFEST_RESOURCE) {
            let offset = tables.cell(MANIFEST_RESOURCE, row, 0)?;
            let flags = tables.cell(MANIFEST_RESOURCE, row, 1)?;
            let name_index = tables.cell(MANIFEST_RESOURCE, row, 2)?;
            let implementation = tables.cell(MANIFEST_RESOURCE, row, 3)?;
            let name = read_string(strings, name_index)?;

            let data = if CodedIndex::Implementation.decode(implementation).1 == 0 {
                ResourceData::Embedded(embedded_bytes(blob, offset, &name)?)
            } else {
                ResourceData::Linked {
                    offset,
                    implementation,
                }
            };
            slots.push(Some(Slot {
                resource: ManifestResource { name, flags, data },
                name_index: Some(name_index),
            }));
        }
        debug!(resources = slots.len(), "read manifest resources");

        Ok(ManagedAssembly {
            image,
            cli,
            root,
            tables,
            slots,
        })
    }

    /// Live resources with their slot indices, in row order.
    pub fn resources(&self) -> impl Iterator<Item = (usize, &ManifestResource)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|s| (index, &s.resource)))
    }

    pub fn resource(&self, index: usize) -> Option<&ManifestResource> {
        self.slots
            .get(index)
            .and_then(|slot| slot.as_ref())
            .map(|s| &s.resource)
    }

    /// Slot indices of every resource matching `predicate`.
    pub fn find<F>(&self, predicate: F) -> Vec<usize>
    where
        F: Fn(&ManifestResource) -> bool,
    {
        self.resources()
            .filter(|(_, resource)| predicate(resource))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn remove(&mut self, index: usize) -> Option<ManifestResource> {
        self.slots
            .get_mut(index)
            .and_then(Option::take)
            .map(|slot| slot.resource)
    }

    /// Adds a resource and returns its slot index.
    pub fn push(&mut self, resource: ManifestResource) -> Result<usize, Error> {
        if self.resources().any(|(_, r)| r.name == resource.name) {
            return Err(Error::resource_error(
                format!("resource {} already exists", resource.name),
                None,
            ));
        }
        let slot = Some(Slot {
            resource,
            name_index: None,
        });
        match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = slot;
                Ok(index)
            }
            None => {
                self.slots.push(slot);
                Ok(self.slots.len() - 1)
            }
        }
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)?;
        debug!(path = %path.as_ref().display(), "wrote assembly");
        Ok(())
    }

    /// Serializes the assembly with the current resource set.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        self.check_custom_attribute_parents()?;

        let mut strings = self
            .root
            .stream(STRINGS_STREAM)
            .map(|s| s.data.clone())
            .unwrap_or_default();
        let mut blob = Vec::new();
        let mut rows = Vec::new();
        let mut row_count = 0u32;
        for slot in self.slots.iter().flatten() {
            let name_index = match slot.name_index {
                Some(index) => index,
                None => append_string(&mut strings, &slot.resource.name)?,
            };
            let (offset, implementation) = match &slot.resource.data {
                ResourceData::Embedded(bytes) => {
                    let offset = to_u32(blob.len())?;
                    blob.extend_from_slice(&to_u32(bytes.len())?.to_le_bytes());
                    blob.extend_from_slice(bytes);
                    blob.resize(blob.len().div_ceil(8) * 8, 0);
                    (offset, 0)
                }
                ResourceData::Linked {
                    offset,
                    implementation,
                } => (*offset, *implementation),
            };
            push_cell(&mut rows, offset, self.tables.column_size(MANIFEST_RESOURCE, 0));
            push_cell(&mut rows, slot.resource.flags, self.tables.column_size(MANIFEST_RESOURCE, 1));
            push_cell(&mut rows, name_index, self.tables.column_size(MANIFEST_RESOURCE, 2));
            push_cell(&mut rows, implementation, self.tables.column_size(MANIFEST_RESOURCE, 3));
            row_count += 1;
        }
        if !self.tables.has_large_strings() && strings.len() >= STRINGS_HEAP_LIMIT {
            return Err(Error::UnsupportedImage(
                "resource names overflow the small #Strings heap".to_string(),
            ));
        }

        let table_stream = self.tables.rebuild(MANIFEST_RESOURCE, row_count, &rows)?;
        let mut root = self.root.clone();
        let table_stream_name = root
            .table_stream()
            .map(|s| s.name.clone())
            .ok_or_else(|| Error::invalid_image("metadata has no table stream"))?;
        root.set_stream(&table_stream_name, table_stream);
        root.set_stream(STRINGS_STREAM, strings);
        let metadata = root.to_bytes()?;

        let mut section = metadata;
        let metadata_size = to_u32(section.len())?;
        section.resize(section.len().div_ceil(8) * 8, 0);
        let resources_offset = to_u32(section.len())?;
        section.extend_from_slice(&blob);

        let mut image = self.image.clone();
        let section_rva =
            image.append_section(RESOURCE_SECTION_NAME, &section, RESOURCE_SECTION_CHARACTERISTICS)?;
        debug!(
            rva = section_rva,
            size = section.len(),
            rows = row_count,
            "appended resource section"
        );

        let cli = self.cli.rva;
        image.write_u32_at(cli + CLI_METADATA_OFFSET, section_rva)?;
        image.write_u32_at(cli + CLI_METADATA_OFFSET + 4, metadata_size)?;
        let resources_rva = if blob.is_empty() {
            0
        } else {
            section_rva + resources_offset
        };
        image.write_u32_at(cli + CLI_RESOURCES_OFFSET, resources_rva)?;
        image.write_u32_at(cli + CLI_RESOURCES_OFFSET + 4, to_u32(blob.len())?)?;
        image.write_u32_at(cli + CLI_FLAGS_OFFSET, self.cli.flags & !CLI_FLAG_STRONG_NAME_SIGNED)?;

        image.clear_checksum()?;
        if !image.data_directory(CERTIFICATE_DIRECTORY)?.is_empty() {
            image.set_data_directory(CERTIFICATE_DIRECTORY, DataDirectory::default())?;
        }
        Ok(image.into_bytes())
    }

    // Dropping a vacated row shifts every later row up by one, which would
    // retarget custom attributes attached to those rows.
    fn check_custom_attribute_parents(&self) -> Result<(), Error> {
        let Some(first_vacant) = self.slots.iter().position(Option::is_none) else {
            return Ok(());
        };
        let Some(tag) = CodedIndex::HasCustomAttribute.tag_of(MANIFEST_RESOURCE) else {
            return Ok(());
        };
        for row in 0..self.tables.rows(CUSTOM_ATTRIBUTE) {
            let parent = self.tables.cell(CUSTOM_ATTRIBUTE, row, 0)?;
            let (parent_tag, parent_row) = CodedIndex::HasCustomAttribute.decode(parent);
            if parent_tag == tag && parent_row as usize > first_vacant {
                return Err(Error::UnsupportedImage(format!(
                    "removing resource row {} would shift a row with custom attributes",
                    first_vacant + 1
                )));
            }
        }
        Ok(())
    }
}

fn embedded_bytes(blob: &[u8], offset: u32, name: &str) -> Result<Vec<u8>, Error> {
    let start = offset as usize;
    let len = read_u32(blob, start)
        .map_err(|_| Error::invalid_image(format!("resource {} lies outside the resources blob", name)))?
        as usize;
    blob.get(start + 4..start + 4 + len)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| Error::invalid_image(format!("resource {} is truncated", name)))
}
