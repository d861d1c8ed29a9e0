// ABOUTME: Set reconciliation between the translated source catalog and the destination
// ABOUTME: Finds tables missing from the destination and orphans to trim

use std::collections::BTreeSet;

use crate::names::QualifiedTableName;

/// Symmetric difference of two catalogs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDiff {
    /// In the source but not the destination: tables to import.
    pub source_only: BTreeSet<QualifiedTableName>,
    /// In the destination but not the source: tables to trim.
    pub destination_only: BTreeSet<QualifiedTableName>,
}

impl CatalogDiff {
    pub fn is_empty(&self) -> bool {
        self.source_only.is_empty() && self.destination_only.is_empty()
    }

    /// Destination names the destination lacks.
    pub fn missing(&self) -> &BTreeSet<QualifiedTableName> {
        &self.source_only
    }

    /// Destination tables no longer represented in the source.
    pub fn orphans(&self) -> &BTreeSet<QualifiedTableName> {
        &self.destination_only
    }
}

/// Compare source names (already translated to destination names) with the
/// destination catalog. Both inputs are normalized, so this is a plain set
/// difference in each direction.
pub fn diff(
    source: &BTreeSet<QualifiedTableName>,
    destination: &BTreeSet<QualifiedTableName>,
) -> CatalogDiff {
    let source_only: BTreeSet<QualifiedTableName> =
        source.difference(destination).cloned().collect();
    let destination_only: BTreeSet<QualifiedTableName> =
        destination.difference(source).cloned().collect();

    tracing::debug!(
        "{} tables only in the source, {} only in the destination",
        source_only.len(),
        destination_only.len()
    );

    CatalogDiff {
        source_only,
        destination_only,
    }
}
