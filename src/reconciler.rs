//! Key reconciliation between source-language and target-language inputs.
//!
//! Readers feed partial entries into a [`Reconciler`]; writers consume its
//! grouped or PO-ordered projections.

use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::types::{Entry, Identity, is_blank};

/// `section → (key → text)`, the shape of one group's JSON document.
pub type SectionMap = IndexMap<String, IndexMap<String, String>>;

/// Deduplicated, identity-keyed collection of entries.
///
/// Entries keep the order in which their identity was first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciler {
    entries: IndexMap<Identity, Entry>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a partial entry into the collection.
    ///
    /// Non-blank incoming text overwrites the stored field; blank incoming
    /// text never erases it. Unknown identities are appended.
    pub fn ingest(&mut self, partial: Entry) {
        match self.entries.get_mut(&partial.identity) {
            Some(existing) => {
                if !is_blank(&partial.source) {
                    existing.source = partial.source;
                }
                if !is_blank(&partial.target) {
                    existing.target = partial.target;
                }
            }
            None => {
                self.entries.insert(partial.identity.clone(), partial);
            }
        }
    }

    pub fn get(&self, identity: &Identity) -> Option<&Entry> {
        self.entries.get(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Partitions target texts by group, then section, then key.
    ///
    /// Groups and sections appear in first-seen order.
    pub fn grouped(&self) -> IndexMap<String, SectionMap> {
        let mut groups: IndexMap<String, SectionMap> = IndexMap::new();
        for entry in self.entries.values() {
            let id = &entry.identity;
            groups
                .entry(id.group.clone())
                .or_default()
                .entry(id.section.clone())
                .or_default()
                .insert(id.key.clone(), entry.target.clone());
        }
        groups
    }

    /// Entries representable in a PO catalog, in catalog order.
    ///
    /// Entries without source text are dropped since the source string is the
    /// PO message id.
    pub fn po_ordered(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.values().filter(|e| e.has_source()).collect();
        entries.sort_by(|a, b| po_order(&a.identity, &b.identity));
        entries
    }
}

impl Extend<Entry> for Reconciler {
    fn extend<T: IntoIterator<Item = Entry>>(&mut self, iter: T) {
        for entry in iter {
            self.ingest(entry);
        }
    }
}

impl FromIterator<Entry> for Reconciler {
    fn from_iter<T: IntoIterator<Item = Entry>>(iter: T) -> Self {
        let mut reconciler = Reconciler::new();
        reconciler.extend(iter);
        reconciler
    }
}

/// Orders identities by group, section and then key, comparing integer keys
/// numerically.
pub fn po_order(a: &Identity, b: &Identity) -> Ordering {
    a.group
        .cmp(&b.group)
        .then_with(|| a.section.cmp(&b.section))
        .then_with(|| key_sort_token(&a.key).cmp(&key_sort_token(&b.key)))
}

// Integer keys become zero-padded six-digit strings so they compare
// numerically among themselves.
fn key_sort_token(key: &str) -> String {
    match key.trim().parse::<i32>() {
        Ok(n) if n < 0 => format!("-{:06}", n.unsigned_abs()),
        Ok(n) => format!("{:06}", n),
        Err(_) => key.to_string(),
    }
}
