#![forbid(unsafe_code)]
//! Localization round-tripping for games built on .NET.
//!
//! Converts between nested JSON documents, gettext PO catalogs and the
//! localization resources embedded in a managed game assembly. Every input
//! is folded into one [`Reconciler`], keyed by `(group, section, key)`, which
//! merges source-language and target-language text.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use terraloc::Codec;
//!
//! // Translators work on PO; the game reads embedded JSON.
//! let mut codec = Codec::new();
//! codec.load_po("zh-Hans.po")?;
//! let (patched, report) = codec.to_asm("Terraria.exe", "zh-Hans")?;
//! println!("{} written, {} failed", patched.display(), report.failed.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Supported Formats
//!
//! - **JSON directory**: one `section → (key → text)` document per group
//! - **PO**: one message per entry, context `group.section.key`
//! - **Assembly**: one embedded JSON resource per group and language

pub mod assembly;
pub mod codec;
pub mod error;
pub mod formats;
pub mod naming;
pub mod reconciler;
pub mod types;

// Re-export most used types for easy consumption
pub use crate::{
    assembly::{ManagedAssembly, ManifestResource, ResourceData},
    codec::Codec,
    error::Error,
    formats::{DumpSelection, FormatType, PatchReport},
    naming::NamingOptions,
    reconciler::Reconciler,
    types::{Entry, Identity, TextSide},
};
