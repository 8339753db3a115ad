//! ECMA-335 metadata: the root header, its streams, and the physical layout
//! of the compressed table stream (Partition II, 22 and 24).

use std::io::Cursor;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};

use super::pe::to_u32;
use crate::error::Error;

const METADATA_SIGNATURE: u32 = 0x424A_5342;

pub(crate) const STRINGS_STREAM: &str = "#Strings";
const TABLE_STREAMS: [&str; 2] = ["#~", "#-"];

// Table numbers.
const MODULE: usize = 0x00;
const TYPE_REF: usize = 0x01;
const TYPE_DEF: usize = 0x02;
const FIELD: usize = 0x04;
const METHOD_DEF: usize = 0x06;
const PARAM: usize = 0x08;
const INTERFACE_IMPL: usize = 0x09;
const MEMBER_REF: usize = 0x0A;
pub(crate) const CUSTOM_ATTRIBUTE: usize = 0x0C;
const DECL_SECURITY: usize = 0x0E;
const STAND_ALONE_SIG: usize = 0x11;
const EVENT: usize = 0x14;
const PROPERTY: usize = 0x17;
const MODULE_REF: usize = 0x1A;
const TYPE_SPEC: usize = 0x1B;
const ASSEMBLY: usize = 0x20;
const ASSEMBLY_REF: usize = 0x23;
const FILE: usize = 0x26;
const EXPORTED_TYPE: usize = 0x27;
pub(crate) const MANIFEST_RESOURCE: usize = 0x28;
const GENERIC_PARAM: usize = 0x2A;
const METHOD_SPEC: usize = 0x2B;
const GENERIC_PARAM_CONSTRAINT: usize = 0x2C;
const TABLE_COUNT: usize = 0x2D;

// HeapSizes flags.
const LARGE_STRINGS: u8 = 0x01;
const LARGE_GUID: u8 = 0x02;
const LARGE_BLOB: u8 = 0x04;
const EXTRA_DATA: u8 = 0x40;

const TABLE_HEADER_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodedIndex {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl CodedIndex {
    fn tag_bits(self) -> u32 {
        match self {
            CodedIndex::HasCustomAttribute => 5,
            CodedIndex::MemberRefParent | CodedIndex::CustomAttributeType => 3,
            CodedIndex::TypeDefOrRef
            | CodedIndex::HasConstant
            | CodedIndex::HasDeclSecurity
            | CodedIndex::Implementation
            | CodedIndex::ResolutionScope => 2,
            CodedIndex::HasFieldMarshal
            | CodedIndex::HasSemantics
            | CodedIndex::MethodDefOrRef
            | CodedIndex::MemberForwarded
            | CodedIndex::TypeOrMethodDef => 1,
        }
    }

    /// Tables addressed by this coded index, in tag order.
    fn tables(self) -> &'static [usize] {
        match self {
            CodedIndex::TypeDefOrRef => &[TYPE_DEF, TYPE_REF, TYPE_SPEC],
            CodedIndex::HasConstant => &[FIELD, PARAM, PROPERTY],
            CodedIndex::HasCustomAttribute => &[
                METHOD_DEF,
                FIELD,
                TYPE_REF,
                TYPE_DEF,
                PARAM,
                INTERFACE_IMPL,
                MEMBER_REF,
                MODULE,
                DECL_SECURITY,
                PROPERTY,
                EVENT,
                STAND_ALONE_SIG,
                MODULE_REF,
                TYPE_SPEC,
                ASSEMBLY,
                ASSEMBLY_REF,
                FILE,
                EXPORTED_TYPE,
                MANIFEST_RESOURCE,
                GENERIC_PARAM,
                GENERIC_PARAM_CONSTRAINT,
                METHOD_SPEC,
            ],
            CodedIndex::HasFieldMarshal => &[FIELD, PARAM],
            CodedIndex::HasDeclSecurity => &[TYPE_DEF, METHOD_DEF, ASSEMBLY],
            CodedIndex::MemberRefParent => &[TYPE_DEF, TYPE_REF, MODULE_REF, METHOD_DEF, TYPE_SPEC],
            CodedIndex::HasSemantics => &[EVENT, PROPERTY],
            CodedIndex::MethodDefOrRef => &[METHOD_DEF, MEMBER_REF],
            CodedIndex::MemberForwarded => &[FIELD, METHOD_DEF],
            CodedIndex::Implementation => &[FILE, ASSEMBLY_REF, EXPORTED_TYPE],
            // Tags 0, 1 and 4 are unused.
            CodedIndex::CustomAttributeType => &[METHOD_DEF, MEMBER_REF],
            CodedIndex::ResolutionScope => &[MODULE, MODULE_REF, ASSEMBLY_REF, TYPE_REF],
            CodedIndex::TypeOrMethodDef => &[TYPE_DEF, METHOD_DEF],
        }
    }

    fn size(self, rows: &[u32; 64]) -> usize {
        let max_rows = self.tables().iter().map(|t| rows[*t]).max().unwrap_or(0);
        if max_rows < (1u32 << (16 - self.tag_bits())) {
            2
        } else {
            4
        }
    }

    /// Splits a coded value into `(tag, row)`; row 0 is the null reference.
    pub fn decode(self, value: u32) -> (u32, u32) {
        let bits = self.tag_bits();
        (value & ((1 << bits) - 1), value >> bits)
    }

    /// Tag of `table` within this coded index.
    pub fn tag_of(self, table: usize) -> Option<u32> {
        self.tables()
            .iter()
            .position(|t| *t == table)
            .map(|p| p as u32)
    }
}

#[derive(Debug, Clone, Copy)]
enum Column {
    U16,
    U32,
    Str,
    Guid,
    Blob,
    Index(usize),
    Coded(CodedIndex),
}

use CodedIndex as C;
use Column::*;

fn schema(table: usize) -> &'static [Column] {
    match table {
        0x00 => &[U16, Str, Guid, Guid, Guid],
        0x01 => &[Coded(C::ResolutionScope), Str, Str],
        0x02 => &[U32, Str, Str, Coded(C::TypeDefOrRef), Index(FIELD), Index(METHOD_DEF)],
        0x03 => &[Index(FIELD)],
        0x04 => &[U16, Str, Blob],
        0x05 => &[Index(METHOD_DEF)],
        0x06 => &[U32, U16, U16, Str, Blob, Index(PARAM)],
        0x07 => &[Index(PARAM)],
        0x08 => &[U16, U16, Str],
        0x09 => &[Index(TYPE_DEF), Coded(C::TypeDefOrRef)],
        0x0A => &[Coded(C::MemberRefParent), Str, Blob],
        0x0B => &[U16, Coded(C::HasConstant), Blob],
        0x0C => &[Coded(C::HasCustomAttribute), Coded(C::CustomAttributeType), Blob],
        0x0D => &[Coded(C::HasFieldMarshal), Blob],
        0x0E => &[U16, Coded(C::HasDeclSecurity), Blob],
        0x0F => &[U16, U32, Index(TYPE_DEF)],
        0x10 => &[U32, Index(FIELD)],
        0x11 => &[Blob],
        0x12 => &[Index(TYPE_DEF), Index(EVENT)],
        0x13 => &[Index(EVENT)],
        0x14 => &[U16, Str, Coded(C::TypeDefOrRef)],
        0x15 => &[Index(TYPE_DEF), Index(PROPERTY)],
        0x16 => &[Index(PROPERTY)],
        0x17 => &[U16, Str, Blob],
        0x18 => &[U16, Index(METHOD_DEF), Coded(C::HasSemantics)],
        0x19 => &[Index(TYPE_DEF), Coded(C::MethodDefOrRef), Coded(C::MethodDefOrRef)],
        0x1A => &[Str],
        0x1B => &[Blob],
        0x1C => &[U16, Coded(C::MemberForwarded), Str, Index(MODULE_REF)],
        0x1D => &[U32, Index(FIELD)],
        0x1E => &[U32, U32],
        0x1F => &[U32],
        0x20 => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
        0x21 => &[U32],
        0x22 => &[U32, U32, U32],
        0x23 => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
        0x24 => &[U32, Index(ASSEMBLY_REF)],
        0x25 => &[U32, U32, U32, Index(ASSEMBLY_REF)],
        0x26 => &[U32, Str, Blob],
        0x27 => &[U32, U32, Str, Str, Coded(C::Implementation)],
        0x28 => &[U32, U32, Str, Coded(C::Implementation)],
        0x29 => &[Index(TYPE_DEF), Index(TYPE_DEF)],
        0x2A => &[U16, U16, Coded(C::TypeOrMethodDef), Str],
        0x2B => &[Coded(C::MethodDefOrRef), Blob],
        0x2C => &[Index(GENERIC_PARAM), Coded(C::TypeDefOrRef)],
        _ => &[],
    }
}

fn column_size(column: Column, heap_sizes: u8, rows: &[u32; 64]) -> usize {
    let heap = |flag: u8| if heap_sizes & flag != 0 { 4 } else { 2 };
    match column {
        U16 => 2,
        U32 => 4,
        Str => heap(LARGE_STRINGS),
        Guid => heap(LARGE_GUID),
        Blob => heap(LARGE_BLOB),
        Index(table) => {
            if rows[table] > 0xFFFF {
                4
            } else {
                2
            }
        }
        Coded(coded) => coded.size(rows),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TableLayout {
    offset: usize,
    row_size: usize,
    rows: u32,
}

impl TableLayout {
    fn end(&self) -> usize {
        self.offset + self.row_size * self.rows as usize
    }
}

fn compute_layout(heap_sizes: u8, rows: &[u32; 64]) -> Vec<TableLayout> {
    let mut offset = 0;
    (0..TABLE_COUNT)
        .map(|table| {
            let row_size = schema(table)
                .iter()
                .map(|c| column_size(*c, heap_sizes, rows))
                .sum();
            let layout = TableLayout {
                offset,
                row_size,
                rows: rows[table],
            };
            offset = layout.end();
            layout
        })
        .collect()
}

#[derive(Debug, Clone)]
pub(crate) struct Stream {
    pub name: String,
    pub data: Vec<u8>,
}

/// The metadata root with its streams copied out.
#[derive(Debug, Clone)]
pub(crate) struct MetadataRoot {
    // Signature through Flags, re-emitted verbatim.
    prefix: Vec<u8>,
    streams: Vec<Stream>,
}

impl MetadataRoot {
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let mut cur = Cursor::new(data);
        if cur.read_u32::<LittleEndian>()? != METADATA_SIGNATURE {
            return Err(Error::invalid_image("bad metadata signature"));
        }
        cur.set_position(12);
        let version_len = cur.read_u32::<LittleEndian>()? as usize;
        let prefix_len = 16 + version_len + 2;
        let prefix = data
            .get(..prefix_len)
            .ok_or_else(|| Error::invalid_image("truncated metadata root"))?
            .to_vec();

        cur.set_position(prefix_len as u64);
        let stream_count = cur.read_u16::<LittleEndian>()?;
        let mut streams = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            let offset = cur.read_u32::<LittleEndian>()? as usize;
            let size = cur.read_u32::<LittleEndian>()? as usize;
            let name = read_stream_name(&mut cur)?;
            let bytes = data.get(offset..offset + size).ok_or_else(|| {
                Error::invalid_image(format!("stream {} lies outside the metadata", name))
            })?;
            streams.push(Stream {
                name,
                data: bytes.to_vec(),
            });
        }

        Ok(MetadataRoot { prefix, streams })
    }

    pub fn stream(&self, name: &str) -> Option<&Stream> {
        self.streams.iter().find(|s| s.name == name)
    }

    pub fn table_stream(&self) -> Option<&Stream> {
        self.streams
            .iter()
            .find(|s| TABLE_STREAMS.contains(&s.name.as_str()))
    }

    /// Replaces the named stream's content, appending the stream if absent.
    pub fn set_stream(&mut self, name: &str, data: Vec<u8>) {
        match self.streams.iter_mut().find(|s| s.name == name) {
            Some(stream) => stream.data = data,
            None => self.streams.push(Stream {
                name: name.to_string(),
                data,
            }),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let header_len = self.prefix.len()
            + 2
            + self
                .streams
                .iter()
                .map(|s| 8 + padded_name_len(&s.name))
                .sum::<usize>();

        let mut out = Vec::with_capacity(header_len);
        out.extend_from_slice(&self.prefix);
        let count = u16::try_from(self.streams.len())
            .map_err(|_| Error::UnsupportedImage("too many metadata streams".to_string()))?;
        out.extend_from_slice(&count.to_le_bytes());

        let mut offset = align4(header_len);
        for stream in &self.streams {
            let size = align4(stream.data.len());
            out.extend_from_slice(&to_u32(offset)?.to_le_bytes());
            out.extend_from_slice(&to_u32(size)?.to_le_bytes());
            out.extend_from_slice(stream.name.as_bytes());
            out.resize(out.len() + padded_name_len(&stream.name) - stream.name.len(), 0);
            offset += size;
        }
        out.resize(align4(out.len()), 0);
        for stream in &self.streams {
            out.extend_from_slice(&stream.data);
            out.resize(align4(out.len()), 0);
        }
        Ok(out)
    }
}

fn read_stream_name(cur: &mut Cursor<&[u8]>) -> Result<String, Error> {
    let mut name = Vec::new();
    loop {
        match cur.read_u8()? {
            0 => break,
            byte => name.push(byte),
        }
    }
    let aligned = align4(cur.position() as usize);
    cur.set_position(aligned as u64);
    String::from_utf8(name).map_err(|_| Error::invalid_image("stream name is not UTF-8"))
}

// Name plus terminator, padded to four bytes.
fn padded_name_len(name: &str) -> usize {
    align4(name.len() + 1)
}

/// The `#~` table stream, kept as raw bytes plus its computed layout.
#[derive(Debug, Clone)]
pub(crate) struct TableStream {
    header: Vec<u8>,
    heap_sizes: u8,
    valid: u64,
    extra: Option<u32>,
    rows: [u32; 64],
    tables: Vec<u8>,
    layout: Vec<TableLayout>,
}

impl TableStream {
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let mut cur = Cursor::new(data);
        cur.set_position(6);
        let heap_sizes = cur.read_u8()?;
        cur.set_position(8);
        let valid = cur.read_u64::<LittleEndian>()?;
        let _sorted = cur.read_u64::<LittleEndian>()?;

        let mut rows = [0u32; 64];
        for (table, count) in rows.iter_mut().enumerate() {
            if valid & (1u64 << table) == 0 {
                continue;
            }
            if table >= TABLE_COUNT {
                return Err(Error::UnsupportedImage(format!(
                    "metadata table {:#04x}",
                    table
                )));
            }
            *count = cur.read_u32::<LittleEndian>()?;
        }
        let extra = if heap_sizes & EXTRA_DATA != 0 {
            Some(cur.read_u32::<LittleEndian>()?)
        } else {
            None
        };

        let start = cur.position() as usize;
        let layout = compute_layout(heap_sizes, &rows);
        let tables = data[start..].to_vec();
        let needed = layout.last().map(TableLayout::end).unwrap_or(0);
        if needed > tables.len() {
            return Err(Error::invalid_image(format!(
                "table stream holds {} bytes, layout needs {}",
                tables.len(),
                needed
            )));
        }

        Ok(TableStream {
            header: data[..TABLE_HEADER_LEN].to_vec(),
            heap_sizes,
            valid,
            extra,
            rows,
            tables,
            layout,
        })
    }

    pub fn rows(&self, table: usize) -> u32 {
        self.rows[table]
    }

    pub fn has_large_strings(&self) -> bool {
        self.heap_sizes & LARGE_STRINGS != 0
    }

    pub fn column_size(&self, table: usize, column: usize) -> usize {
        column_size(schema(table)[column], self.heap_sizes, &self.rows)
    }

    /// Reads one cell; `row` is zero-based.
    pub fn cell(&self, table: usize, row: u32, column: usize) -> Result<u32, Error> {
        let layout = &self.layout[table];
        if row >= layout.rows {
            return Err(Error::invalid_image(format!(
                "row {} of table {:#04x} out of range",
                row, table
            )));
        }
        let within: usize = (0..column).map(|c| self.column_size(table, c)).sum();
        let offset = layout.offset + layout.row_size * row as usize + within;
        let bytes = &self.tables[offset..];
        Ok(match self.column_size(table, column) {
            2 => LittleEndian::read_u16(bytes) as u32,
            _ => LittleEndian::read_u32(bytes),
        })
    }

    /// Re-emits the stream with `table` replaced by `row_count` rows of `table_bytes`.
    ///
    /// Fails if the new row count would change the width of any index column.
    pub fn rebuild(&self, table: usize, row_count: u32, table_bytes: &[u8]) -> Result<Vec<u8>, Error> {
        let mut rows = self.rows;
        rows[table] = row_count;
        let layout = compute_layout(self.heap_sizes, &rows);
        if layout
            .iter()
            .zip(&self.layout)
            .any(|(new, old)| new.row_size != old.row_size)
        {
            return Err(Error::UnsupportedImage(format!(
                "{} rows in table {:#04x} would widen metadata indices",
                row_count, table
            )));
        }
        if table_bytes.len() != layout[table].row_size * row_count as usize {
            return Err(Error::invalid_image(format!(
                "table {:#04x} bytes do not match {} rows",
                table, row_count
            )));
        }

        let valid = if row_count > 0 {
            self.valid | (1u64 << table)
        } else {
            self.valid
        };
        let mut out = self.header.clone();
        LittleEndian::write_u64(&mut out[8..16], valid);
        for (index, count) in rows.iter().enumerate() {
            if valid & (1u64 << index) != 0 {
                out.extend_from_slice(&count.to_le_bytes());
            }
        }
        if let Some(extra) = self.extra {
            out.extend_from_slice(&extra.to_le_bytes());
        }

        let old = &self.layout[table];
        out.extend_from_slice(&self.tables[..old.offset]);
        out.extend_from_slice(table_bytes);
        out.extend_from_slice(&self.tables[old.end()..]);
        out.resize(align4(out.len()), 0);
        Ok(out)
    }
}

/// Reads a null-terminated UTF-8 string from the `#Strings` heap.
pub(crate) fn read_string(heap: &[u8], index: u32) -> Result<String, Error> {
    let start = index as usize;
    let tail = heap
        .get(start..)
        .ok_or_else(|| Error::invalid_image(format!("string index {:#x} out of range", index)))?;
    let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
    String::from_utf8(tail[..end].to_vec())
        .map_err(|_| Error::invalid_image(format!("string {:#x} is not UTF-8", index)))
}

/// Appends a string to the `#Strings` heap and returns its index.
pub(crate) fn append_string(heap: &mut Vec<u8>, value: &str) -> Result<u32, Error> {
    if heap.is_empty() {
        heap.push(0);
    }
    let index = to_u32(heap.len())?;
    heap.extend_from_slice(value.as_bytes());
    heap.push(0);
    Ok(index)
}

pub(crate) fn push_cell(out: &mut Vec<u8>, value: u32, size: usize) {
    match size {
        2 => out.extend_from_slice(&(value as u16).to_le_bytes()),
        _ => out.extend_from_slice(&value.to_le_bytes()),
    }
}

fn align4(value: usize) -> usize {
    value.div_ceil(4) * 4
}
