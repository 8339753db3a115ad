//! Gettext PO catalogs.
//!
//! Each message carries its identity as the context `group.section.key`
//! (also written as an extracted comment), the source text as `msgid` and
//! the target text as `msgstr`.

use std::path::Path;

use polib::{
    catalog::Catalog,
    message::Message,
    metadata::CatalogMetadata,
    po_file::{self, POParseOptions},
};
use tracing::{debug, warn};

use crate::{
    error::Error,
    reconciler::Reconciler,
    types::{Entry, Identity, is_blank},
};

const CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

/// Ingests every singular message of the catalog at `path`.
///
/// Returns the number of messages read.
pub fn read_po<P: AsRef<Path>>(path: P, reconciler: &mut Reconciler) -> Result<usize, Error> {
    let options = POParseOptions {
        message_body_only: true,
        translated_only: false,
        unsafe_utf8_decode: false,
    };
    let catalog = po_file::parse_with_option(path.as_ref(), &options)
        .map_err(|e| Error::PoParse(e.to_string()))?;

    let mut count = 0;
    for message in catalog.messages() {
        if message.msgctxt().is_empty() {
            warn!(msgid = message.msgid(), "skipping message without context");
            continue;
        }
        let identity = Identity::from_context(message.msgctxt())?;
        let Ok(msgstr) = message.msgstr() else {
            warn!(context = message.msgctxt(), "skipping plural message");
            continue;
        };
        reconciler.ingest(Entry {
            identity,
            source: message.msgid().to_string(),
            target: msgstr.to_string(),
        });
        count += 1;
    }
    debug!(path = %path.as_ref().display(), messages = count, "read PO catalog");
    Ok(count)
}

/// Builds the catalog for every entry that has source text.
pub fn build_catalog(reconciler: &Reconciler) -> Catalog {
    let mut metadata = CatalogMetadata::new();
    metadata.mime_version = "1.0".to_string();
    metadata.content_type = CONTENT_TYPE.to_string();
    metadata.content_transfer_encoding = "8bit".to_string();

    let mut catalog = Catalog::new(metadata);
    for entry in reconciler.po_ordered() {
        let context = entry.identity.context();
        let message = Message::build_singular()
            .with_comments(context.clone())
            .with_msgctxt(context)
            .with_msgid(entry.source.clone())
            .with_msgstr(entry.target.clone())
            .done();
        catalog.append_or_update(message);
    }
    catalog
}

/// Writes the catalog to `path`; returns the number of messages written.
pub fn write_po<P: AsRef<Path>>(path: P, reconciler: &Reconciler) -> Result<usize, Error> {
    let catalog = build_catalog(reconciler);
    let count = catalog.count();
    po_file::write(&catalog, path.as_ref())?;
    debug!(
        path = %path.as_ref().display(),
        messages = count,
        untranslated = reconciler.po_ordered().iter().filter(|e| is_blank(&e.target)).count(),
        "wrote PO catalog"
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextSide;

    #[test]
    fn test_build_catalog_encodes_identity() {
        let mut reconciler = Reconciler::new();
        reconciler.ingest(Entry::partial(
            Identity::new("Weapons", "Items", "1"),
            TextSide::Source,
            "Sword",
        ));
        reconciler.ingest(Entry::partial(
            Identity::new("Weapons", "Items", "1"),
            TextSide::Target,
            "剑",
        ));

        let catalog = build_catalog(&reconciler);
        assert_eq!(catalog.count(), 1);
        let message = catalog.messages().next().unwrap();
        assert_eq!(message.msgctxt(), "Weapons.Items.1");
        assert_eq!(message.msgid(), "Sword");
        assert_eq!(message.msgstr().unwrap(), "剑");
        assert_eq!(message.comments(), "Weapons.Items.1");
    }

    #[test]
    fn test_build_catalog_skips_blank_source() {
        let mut reconciler = Reconciler::new();
        reconciler.ingest(Entry::partial(
            Identity::new("Main", "UI", "Cancel"),
            TextSide::Target,
            "取消",
        ));
        assert_eq!(build_catalog(&reconciler).count(), 0);
    }

    #[test]
    fn test_catalog_content_type() {
        let catalog = build_catalog(&Reconciler::new());
        assert_eq!(catalog.metadata.content_type, CONTENT_TYPE);
    }
}
