//! Core, format-agnostic types for terraloc.
//! Readers decode into these; writers serialize these.

use std::fmt::Display;

use crate::error::Error;

/// Composite identity of a translation unit.
///
/// `(group, section, key)` is unique across a merged collection and is the
/// only thing used to match records coming from different inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    /// Logical file or category (e.g. "Items", "NPCs", "Main").
    pub group: String,

    /// Named sub-group within the file.
    pub section: String,

    /// Leaf identifier within the section. May be an ordinal.
    pub key: String,
}

impl Identity {
    pub fn new(
        group: impl Into<String>,
        section: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Identity {
            group: group.into(),
            section: section.into(),
            key: key.into(),
        }
    }

    /// Flattens the identity into a `group.section.key` context string.
    pub fn context(&self) -> String {
        format!("{}.{}.{}", self.group, self.section, self.key)
    }

    /// Parses a `group.section.key` context string.
    ///
    /// The first two dots delimit group and section; the key keeps any
    /// remaining dots.
    pub fn from_context(context: &str) -> Result<Self, Error> {
        let mut parts = context.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(group), Some(section), Some(key)) => Ok(Identity::new(group, section, key)),
            _ => Err(Error::InvalidIdentity(context.to_string())),
        }
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.context())
    }
}

/// Which text field of an entry an input fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextSide {
    Source,
    Target,
}

/// A single translation entry.
///
/// Absent text is an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub identity: Identity,

    /// Text in the source language.
    pub source: String,

    /// Text in the target language.
    pub target: String,
}

impl Entry {
    /// Builds a partial entry carrying `text` on the given side only.
    pub fn partial(identity: Identity, side: TextSide, text: impl Into<String>) -> Self {
        let text = text.into();
        match side {
            TextSide::Source => Entry {
                identity,
                source: text,
                target: String::new(),
            },
            TextSide::Target => Entry {
                identity,
                source: String::new(),
                target: text,
            },
        }
    }

    pub fn has_source(&self) -> bool {
        !is_blank(&self.source)
    }

    pub fn has_target(&self) -> bool {
        !is_blank(&self.target)
    }
}

impl Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Entry {{ id: {}, source: {}, target: {} }}",
            self.identity, self.source, self.target
        )
    }
}

/// Empty or whitespace-only.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
