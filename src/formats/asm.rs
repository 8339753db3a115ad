//! Localization resources embedded in a managed game assembly.

use std::{fs, path::Path};

use tracing::{debug, warn};

use crate::{
    assembly::{ManagedAssembly, ManifestResource},
    error::Error,
    formats::json::document_bytes,
    naming::NamingOptions,
    reconciler::Reconciler,
};

/// Which localization resources to extract from an assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpSelection {
    All,
    Languages(Vec<String>),
}

impl DumpSelection {
    fn includes(&self, language: &str) -> bool {
        match self {
            DumpSelection::All => true,
            DumpSelection::Languages(languages) => languages.iter().any(|l| l == language),
        }
    }
}

/// Writes each selected localization resource to `{dir}/{lang}/{name}`.
///
/// Returns the names of the dumped resources.
pub fn dump_resources<P: AsRef<Path>>(
    assembly: &ManagedAssembly,
    dir: P,
    selection: &DumpSelection,
    naming: &NamingOptions,
) -> Result<Vec<String>, Error> {
    let mut dumped = Vec::new();
    for (_, resource) in assembly.resources() {
        let Some(parsed) = naming.parse_resource_name(&resource.name) else {
            continue;
        };
        if !selection.includes(&parsed.language) {
            continue;
        }
        let Some(bytes) = resource.bytes() else {
            warn!(resource = %resource.name, "skipping linked resource");
            continue;
        };
        let lang_dir = dir.as_ref().join(&parsed.language);
        fs::create_dir_all(&lang_dir)?;
        fs::write(lang_dir.join(&resource.name), bytes)?;
        debug!(resource = %resource.name, size = bytes.len(), "dumped resource");
        dumped.push(resource.name.clone());
    }
    Ok(dumped)
}

/// Outcome of writing groups into an assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Resources that existed and were replaced.
    pub replaced: Vec<String>,
    /// Resources that were added.
    pub inserted: Vec<String>,
    /// `(resource, reason)` for each group that could not be written.
    pub failed: Vec<(String, String)>,
}

impl PatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Name of the resource that receives `group` for `language`.
///
/// The main group always lands in the bare per-language resource, so a
/// language the assembly lacks is seeded as its default resource.
pub fn target_resource_name(language: &str, group: &str, naming: &NamingOptions) -> String {
    if naming.is_main(group) {
        naming.resource_name(language, None)
    } else {
        naming.resource_name(language, Some(group))
    }
}

/// Replaces or inserts one resource per group of the reconciler's target texts.
///
/// A group that cannot be written is recorded in the report and skipped.
pub fn patch_resources(
    assembly: &mut ManagedAssembly,
    language: &str,
    naming: &NamingOptions,
    reconciler: &Reconciler,
) -> Result<PatchReport, Error> {
    let mut report = PatchReport::default();
    for (group, sections) in reconciler.grouped() {
        let name = target_resource_name(language, &group, naming);
        let bytes = document_bytes(sections)?;
        match replace_resource(assembly, &name, bytes) {
            Ok(true) => {
                debug!(resource = %name, "replaced resource");
                report.replaced.push(name);
            }
            Ok(false) => {
                debug!(resource = %name, "inserted resource");
                report.inserted.push(name);
            }
            Err(e) => {
                warn!(resource = %name, error = %e, "failed to write resource");
                report.failed.push((name, e.to_string()));
            }
        }
    }
    Ok(report)
}

// Returns whether an existing resource was replaced.
fn replace_resource(assembly: &mut ManagedAssembly, name: &str, bytes: Vec<u8>) -> Result<bool, Error> {
    let matches = assembly.find(|r| r.name == name);
    let replaced = match matches.as_slice() {
        [] => false,
        [index] => {
            assembly.remove(*index);
            true
        }
        _ => {
            return Err(Error::resource_error(
                format!("{} resources are named {}", matches.len(), name),
                None,
            ));
        }
    };
    assembly.push(ManifestResource::embedded(name, bytes))?;
    Ok(replaced)
}
