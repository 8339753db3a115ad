//! All supported localization formats for terraloc.
//!
//! This module exposes the adapters for each format and provides the
//! [`FormatType`] enum used to name them on the command line.

pub mod asm;
pub mod json;
pub mod po;

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

pub use asm::{DumpSelection, PatchReport};
pub use json::GroupDocument;

use crate::Error;

/// The representations localization data can be read from and written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatType {
    /// Resources embedded in a managed game assembly.
    Asm,
    /// A directory of nested JSON documents, one per group.
    Json,
    /// A gettext PO catalog.
    Po,
}

/// Implements [`std::fmt::Display`] for [`FormatType`].
///
/// # Example
/// ```rust
/// use terraloc::formats::FormatType;
/// assert_eq!(FormatType::Asm.to_string(), "asm");
/// assert_eq!(FormatType::Po.to_string(), "po");
/// ```
impl Display for FormatType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatType::Asm => write!(f, "asm"),
            FormatType::Json => write!(f, "json"),
            FormatType::Po => write!(f, "po"),
        }
    }
}

/// Implements [`std::str::FromStr`] for [`FormatType`].
///
/// Accepts `asm`, `json` and `po`, case-insensitively. Returns
/// [`crate::error::Error::UnknownFormat`] for anything else.
///
/// # Example
/// ```rust
/// use terraloc::formats::FormatType;
/// use std::str::FromStr;
/// assert_eq!(FormatType::from_str("JSON").unwrap(), FormatType::Json);
/// assert!(FormatType::from_str("xliff").is_err());
/// ```
impl FromStr for FormatType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "asm" => Ok(FormatType::Asm),
            "json" => Ok(FormatType::Json),
            "po" => Ok(FormatType::Po),
            other => Err(Error::UnknownFormat(other.to_string())),
        }
    }
}
