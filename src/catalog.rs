// ABOUTME: Per-run cache of catalog snapshots for the source and destination
// ABOUTME: Populated lazily on first access and never refreshed within a run

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap};

use crate::destination::DestinationDatabase;
use crate::metadata::MetadataIndex;
use crate::names::QualifiedTableName;
use crate::source::{SourceTable, SourceWarehouse};

/// Identifies one snapshot: a connection, optionally seen through the
/// metadata index's destination names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub connection: String,
    pub translated: bool,
}

impl SnapshotKey {
    pub fn new(connection: &str, translated: bool) -> Self {
        Self {
            connection: connection.to_string(),
            translated,
        }
    }
}

/// The set of qualified table names visible through one connection.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    tables: BTreeSet<QualifiedTableName>,
}

impl CatalogSnapshot {
    pub fn tables(&self) -> &BTreeSet<QualifiedTableName> {
        &self.tables
    }

    pub fn contains(&self, table: &QualifiedTableName) -> bool {
        self.tables.contains(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Memoizes catalog enumeration for the lifetime of one run.
///
/// A snapshot is taken the first time a connection is asked for and then
/// served from memory. Writes made during the same run (imports, drops) are
/// NOT reflected; a new run is needed to observe them. Construct one cache per
/// run and pass it by `&mut` to whatever needs catalog contents.
#[derive(Debug, Default)]
pub struct CatalogCache {
    exclude_schemas: Vec<String>,
    snapshots: HashMap<SnapshotKey, CatalogSnapshot>,
    source_tables: HashMap<String, Vec<SourceTable>>,
}

impl CatalogCache {
    pub fn new(exclude_schemas: &[String]) -> Self {
        Self {
            exclude_schemas: exclude_schemas.to_vec(),
            snapshots: HashMap::new(),
            source_tables: HashMap::new(),
        }
    }

    fn is_excluded(&self, table: &QualifiedTableName) -> bool {
        self.exclude_schemas.iter().any(|s| s == table.schema())
    }

    /// Source tables with their transferable fields, sorted by schema and table.
    pub async fn describe_source(&mut self, source: &dyn SourceWarehouse) -> Result<&[SourceTable]> {
        let key = source.connection_key().to_string();

        if self.source_tables.contains_key(&key) {
            tracing::debug!("cache hit for source tables of {}", key);
        } else {
            tracing::debug!("cache miss for source tables of {}", key);

            let mut tables = source
                .list_tables()
                .await
                .context("Failed to enumerate source tables")?;

            tables.retain(|table| {
                let keep = !self.is_excluded(&table.name);
                if !keep {
                    tracing::debug!(" - skipping: {}", table.name);
                }
                keep
            });
            tables.sort_by(|a, b| a.name.cmp(&b.name));

            tracing::info!("Discovered {} source tables", tables.len());
            self.source_tables.insert(key.clone(), tables);
        }

        Ok(self.source_tables[&key].as_slice())
    }

    /// Snapshot of the source catalog.
    ///
    /// With `translation`, each source table is replaced by its destination
    /// name from the metadata index; tables without a destination title are
    /// dropped, not renamed.
    pub async fn ensure_source(
        &mut self,
        source: &dyn SourceWarehouse,
        translation: Option<&MetadataIndex>,
    ) -> Result<&CatalogSnapshot> {
        let key = SnapshotKey::new(source.connection_key(), translation.is_some());

        if !self.snapshots.contains_key(&key) {
            let tables = self.describe_source(source).await?;

            let names: BTreeSet<QualifiedTableName> = match translation {
                Some(index) => tables
                    .iter()
                    .filter_map(|table| index.destination_for(&table.name))
                    .collect(),
                None => tables.iter().map(|table| table.name.clone()).collect(),
            };

            tracing::debug!(
                "cached {} source tables for {} (translated: {})",
                names.len(),
                key.connection,
                key.translated
            );

            self.snapshots.insert(
                key.clone(),
                CatalogSnapshot { tables: names },
            );
        }

        Ok(&self.snapshots[&key])
    }

    /// Snapshot of the destination catalog.
    pub async fn ensure_destination(
        &mut self,
        destination: &dyn DestinationDatabase,
    ) -> Result<&CatalogSnapshot> {
        let key = SnapshotKey::new(destination.connection_key(), false);

        if self.snapshots.contains_key(&key) {
            tracing::debug!("cache hit for {}", key.connection);
        } else {
            tracing::debug!("cache miss for {}", key.connection);

            let listed = destination
                .list_tables()
                .await
                .context("Failed to enumerate destination tables")?;

            let tables: BTreeSet<QualifiedTableName> = listed
                .into_iter()
                .filter(|table| !self.is_excluded(table))
                .collect();

            tracing::debug!("found {} destination tables", tables.len());

            self.snapshots.insert(
                key.clone(),
                CatalogSnapshot { tables },
            );
        }

        Ok(&self.snapshots[&key])
    }

    /// Whether a snapshot has already been taken for `key`.
    pub fn is_populated(&self, key: &SnapshotKey) -> bool {
        self.snapshots.contains_key(key)
    }
}
