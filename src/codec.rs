//! This module provides the [`Codec`] struct, which loads localization data
//! from any supported representation into one [`Reconciler`] and projects it
//! back out into another.
//!
//! A conversion is always one or more `load_*` calls followed by one `to_*`
//! call:
//!
//! ```rust,no_run
//! use terraloc::Codec;
//! let mut codec = Codec::new();
//! codec.load_json("en-US", "zh-Hans")?;
//! codec.to_po("zh-Hans.po")?;
//! Ok::<(), terraloc::Error>(())
//! ```
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use unic_langid::LanguageIdentifier;

use crate::{
    assembly::ManagedAssembly,
    error::Error,
    formats::{DumpSelection, PatchReport, asm, json, po},
    naming::NamingOptions,
    reconciler::Reconciler,
    types::{TextSide, is_blank},
};

/// Language read from an assembly when none is given.
pub const DEFAULT_SOURCE_LANGUAGE: &str = "en-US";

/// Holds the merged entries of one conversion.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    /// The merged collection.
    pub reconciler: Reconciler,
    /// Naming conventions for files and resources.
    pub naming: NamingOptions,
}

impl Codec {
    /// Creates a new, empty `Codec` with the default naming conventions.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_naming(mut self, naming: NamingOptions) -> Self {
        self.naming = naming;
        self
    }

    /// Reads the JSON directory `src_dir` as source text and, when it
    /// exists, `dst_dir` as target text.
    ///
    /// A blank `dst_dir` reads the source side only.
    pub fn load_json<S: AsRef<Path>, D: AsRef<Path>>(
        &mut self,
        src_dir: S,
        dst_dir: D,
    ) -> Result<(), Error> {
        let src_dir = src_dir.as_ref();
        let dst_dir = dst_dir.as_ref();
        check_dir_language(src_dir);

        let count = json::read_dir(src_dir, TextSide::Source, &self.naming, &mut self.reconciler)?;
        debug!(dir = %src_dir.display(), files = count, "loaded source documents");

        if is_blank(&dst_dir.to_string_lossy()) {
            return Ok(());
        }
        check_dir_language(dst_dir);
        if dst_dir.is_dir() {
            let count =
                json::read_dir(dst_dir, TextSide::Target, &self.naming, &mut self.reconciler)?;
            debug!(dir = %dst_dir.display(), files = count, "loaded target documents");
        } else {
            info!(dir = %dst_dir.display(), "target directory not found, reading source only");
        }
        Ok(())
    }

    /// Reads a PO catalog: `msgid` as source text and `msgstr` as target text.
    pub fn load_po<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        po::read_po(path, &mut self.reconciler)?;
        Ok(())
    }

    /// Dumps the localization resources of an assembly below `base_dir` and
    /// loads the dumped languages.
    ///
    /// `languages` defaults to `["en-US"]`. The first language is read as
    /// source text, the second (if any) as target text. With `dump_all`
    /// every language's resources are dumped, not only the listed ones.
    pub fn load_asm<P: AsRef<Path>, B: AsRef<Path>>(
        &mut self,
        path: P,
        dump_all: bool,
        languages: &[String],
        base_dir: B,
    ) -> Result<Vec<String>, Error> {
        let languages: Vec<String> = if languages.is_empty() {
            vec![DEFAULT_SOURCE_LANGUAGE.to_string()]
        } else {
            languages.to_vec()
        };
        let selection = if dump_all {
            DumpSelection::All
        } else {
            DumpSelection::Languages(languages.clone())
        };

        let assembly = ManagedAssembly::load(path)?;
        let base_dir = base_dir.as_ref();
        let dumped = asm::dump_resources(&assembly, base_dir, &selection, &self.naming)?;
        debug!(resources = dumped.len(), "dumped localization resources");

        let src_dir = base_dir.join(&languages[0]);
        let dst_dir = match languages.get(1) {
            Some(language) if !is_blank(language) => base_dir.join(language),
            _ => PathBuf::new(),
        };
        self.load_json(src_dir, dst_dir)?;
        Ok(dumped)
    }

    /// Writes one JSON document per group into `dir`. Returns the file names.
    pub fn to_json<P: AsRef<Path>>(
        &self,
        dir: P,
        language: &str,
        use_main_replacement: bool,
    ) -> Result<Vec<String>, Error> {
        if !is_blank(language) {
            check_language(language);
        }
        json::write_dir(dir, language, use_main_replacement, &self.naming, &self.reconciler)
    }

    /// Writes a PO catalog. Returns the number of messages written.
    pub fn to_po<P: AsRef<Path>>(&self, path: P) -> Result<usize, Error> {
        po::write_po(path, &self.reconciler)
    }

    /// Writes every group into a patched copy of the assembly at `path`.
    ///
    /// The copy is written next to the input with the patched suffix
    /// appended to its file stem. Groups that cannot be written are listed in
    /// the returned report. The main group is always written under the bare
    /// per-language resource name.
    pub fn to_asm<P: AsRef<Path>>(&self, path: P, language: &str) -> Result<(PathBuf, PatchReport), Error> {
        let path = path.as_ref();
        check_language(language);
        let mut assembly = ManagedAssembly::load(path)?;
        let report = asm::patch_resources(&mut assembly, language, &self.naming, &self.reconciler)?;
        let output = self.naming.patched_path(path);
        assembly.write(&output)?;
        Ok((output, report))
    }
}

// Games ship tags such as "zh-Hans" and sometimes private ones; only warn.
fn check_language(language: &str) {
    if language.parse::<LanguageIdentifier>().is_err() {
        warn!(language, "not a well-formed language tag");
    }
}

fn check_dir_language(dir: &Path) {
    if let Some(name) = dir.file_name().and_then(|s| s.to_str()) {
        check_language(name);
    }
}
