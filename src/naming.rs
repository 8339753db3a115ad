//! Naming conventions shared by the JSON and assembly adapters.

use std::path::{Path, PathBuf};

/// Default namespace prefix of localization resources.
pub const DEFAULT_RESOURCE_PREFIX: &str = "Terraria.Localization.Content";

/// Default suffix appended to the stem of a patched assembly.
pub const DEFAULT_PATCHED_SUFFIX: &str = "_locpatched";

/// Group that denotes a language's default resource.
pub const DEFAULT_MAIN_GROUP: &str = "Main";

/// Naming conventions for localization files and resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingOptions {
    /// Dotted namespace every localization resource name starts with.
    pub resource_prefix: String,
    /// Appended to the file stem of a patched assembly.
    pub patched_suffix: String,
    /// Group written as the bare per-language file or resource.
    pub main_group: String,
}

impl Default for NamingOptions {
    fn default() -> Self {
        NamingOptions {
            resource_prefix: DEFAULT_RESOURCE_PREFIX.to_string(),
            patched_suffix: DEFAULT_PATCHED_SUFFIX.to_string(),
            main_group: DEFAULT_MAIN_GROUP.to_string(),
        }
    }
}

/// Language and group parsed out of a resource name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceName {
    pub language: String,
    /// `None` for the bare `{prefix}.{lang}.json` resource.
    pub group: Option<String>,
}

impl NamingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.resource_prefix = prefix.into();
        self
    }

    pub fn with_patched_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.patched_suffix = suffix.into();
        self
    }

    pub fn with_main_group(mut self, group: impl Into<String>) -> Self {
        self.main_group = group.into();
        self
    }

    pub fn is_main(&self, group: &str) -> bool {
        group == self.main_group
    }

    fn prefix_segments(&self) -> usize {
        self.resource_prefix.split('.').count()
    }

    /// Derives the group a JSON file belongs to from its file name.
    ///
    /// `{prefix}.{lang}.{group}.json` yields `group`, `{prefix}.{lang}.json`
    /// yields the main group. Other names fall back to the second-to-last
    /// segment when there are more than three, or to the first segment.
    pub fn group_from_file_name(&self, file_name: &str) -> String {
        let parts: Vec<&str> = file_name.split('.').collect();
        let prefix = self.prefix_segments();
        if parts.len() == prefix + 3 {
            parts[prefix + 1].to_string()
        } else if parts.len() == prefix + 2 {
            self.main_group.clone()
        } else if parts.len() > 3 {
            parts[parts.len() - 2].to_string()
        } else if parts.len() > 1 {
            parts[0].to_string()
        } else {
            String::new()
        }
    }

    /// File name of the JSON document holding `group` for `language`.
    ///
    /// A blank language produces `{group}.json`.
    pub fn json_file_name(&self, language: &str, group: &str, use_main_replacement: bool) -> String {
        if language.trim().is_empty() {
            format!("{}.json", group)
        } else if use_main_replacement && self.is_main(group) {
            self.resource_name(language, None)
        } else {
            self.resource_name(language, Some(group))
        }
    }

    /// `{prefix}.{lang}.json` or `{prefix}.{lang}.{group}.json`.
    pub fn resource_name(&self, language: &str, group: Option<&str>) -> String {
        match group {
            Some(group) => format!("{}.{}.{}.json", self.resource_prefix, language, group),
            None => format!("{}.{}.json", self.resource_prefix, language),
        }
    }

    /// Parses a localization resource name; `None` if it lies outside the prefix.
    pub fn parse_resource_name(&self, name: &str) -> Option<ResourceName> {
        let rest = name
            .strip_prefix(self.resource_prefix.as_str())?
            .strip_prefix('.')?;
        let rest = rest.strip_suffix(".json").unwrap_or(rest);
        let (language, group) = match rest.split_once('.') {
            Some((language, group)) => (language, Some(group.to_string())),
            None => (rest, None),
        };
        if language.is_empty() {
            return None;
        }
        Some(ResourceName {
            language: language.to_string(),
            group: group.filter(|g| !g.is_empty()),
        })
    }

    /// Sibling path the patched assembly is written to.
    pub fn patched_path(&self, path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let file_name = match path.extension().and_then(|s| s.to_str()) {
            Some(ext) => format!("{}{}.{}", stem, self.patched_suffix, ext),
            None => format!("{}{}", stem, self.patched_suffix),
        };
        path.with_file_name(file_name)
    }
}
