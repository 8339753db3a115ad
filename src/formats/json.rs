//! Nested JSON localization documents, one file per group.
//!
//! Each document maps `section → (key → text)`. A directory of documents
//! holds one language.

use std::{
    fs,
    io::{BufWriter, Read, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::Error,
    naming::NamingOptions,
    reconciler::{Reconciler, SectionMap},
    types::{Entry, Identity, TextSide},
};

/// One group's JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct GroupDocument {
    pub sections: SectionMap,
}

impl GroupDocument {
    pub fn new(sections: SectionMap) -> Self {
        GroupDocument { sections }
    }

    /// Flattens the document into partial entries of `group`.
    pub fn entries<'a>(&'a self, group: &'a str, side: TextSide) -> impl Iterator<Item = Entry> + 'a {
        self.sections.iter().flat_map(move |(section, keys)| {
            keys.iter().map(move |(key, text)| {
                Entry::partial(Identity::new(group, section.as_str(), key.as_str()), side, text.as_str())
            })
        })
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a document file, decoding UTF-16 and dropping a byte order mark.
    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = fs::File::open(path)?;
        let mut decoder = encoding_rs_io::DecodeReaderBytesBuilder::new()
            .bom_override(true)
            .build(file);
        let mut decoded = String::new();
        decoder.read_to_string(&mut decoded)?;
        Self::parse(&decoded)
    }

    /// Parses embedded resource bytes, which may start with a UTF-8 BOM.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let (decoded, _) = encoding_rs::UTF_8.decode_with_bom_removal(bytes);
        Self::parse(&decoded)
    }

    /// Indented JSON without a byte order mark.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let mut writer = BufWriter::new(fs::File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Ingests every file of `dir` as a JSON document.
///
/// Files are visited in file name order; each file's group is derived from
/// its name. Returns the number of documents read.
pub fn read_dir<P: AsRef<Path>>(
    dir: P,
    side: TextSide,
    naming: &NamingOptions,
    reconciler: &mut Reconciler,
) -> Result<usize, Error> {
    let mut files = Vec::new();
    for item in fs::read_dir(dir.as_ref())? {
        let item = item?;
        if item.file_type()?.is_file() {
            files.push(item.path());
        }
    }
    files.sort();

    for path in &files {
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let group = naming.group_from_file_name(file_name);
        if group.is_empty() {
            warn!(file = %path.display(), "file name does not name a group");
        }
        let document = GroupDocument::read_from(path)?;
        debug!(file = %path.display(), group = %group, sections = document.sections.len(), "read JSON document");
        reconciler.extend(document.entries(&group, side));
    }
    Ok(files.len())
}

/// Writes one document per group of the reconciler's target texts.
///
/// Returns the written file names in group order.
pub fn write_dir<P: AsRef<Path>>(
    dir: P,
    language: &str,
    use_main_replacement: bool,
    naming: &NamingOptions,
    reconciler: &Reconciler,
) -> Result<Vec<String>, Error> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    for (group, sections) in reconciler.grouped() {
        let file_name = naming.json_file_name(language, &group, use_main_replacement);
        GroupDocument::new(sections).write_to(dir.join(&file_name))?;
        debug!(file = %file_name, "wrote JSON document");
        written.push(file_name);
    }
    Ok(written)
}

/// Serializes one group's sections the way they are embedded as resources.
pub fn document_bytes(sections: SectionMap) -> Result<Vec<u8>, Error> {
    GroupDocument::new(sections).to_bytes()
}
