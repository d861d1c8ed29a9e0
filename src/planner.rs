// ABOUTME: Sync planner deciding per table whether to import, skip or drop
// ABOUTME: Combines the metadata index, catalog cache and set reconciliation

use anyhow::{bail, Result};
use std::collections::BTreeSet;

use crate::catalog::CatalogCache;
use crate::change_detection::{ChangeDetectionTracker, ChangeWatermark};
use crate::destination::DestinationDatabase;
use crate::error::SyncError;
use crate::metadata::MetadataIndex;
use crate::names::QualifiedTableName;
use crate::reconcile;
use crate::source::{SourceTable, SourceWarehouse};
use crate::utils::sanitize_identifier;

/// Everything the transfer engine needs to copy one table.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportAction {
    pub source: QualifiedTableName,
    pub destination: QualifiedTableName,
    pub fields: Vec<String>,
    /// Promoted geometry type, e.g. `MULTIPOLYGON` or `NONE`.
    pub geometry: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    Import(ImportAction),
    /// The destination already has the table and the caller asked to keep it.
    SkipExisting(QualifiedTableName),
    /// The source table has no destination title.
    SkipUnmapped(QualifiedTableName),
    Drop(QualifiedTableName),
}

impl SyncAction {
    /// The table the action is about; destination name where one is known.
    pub fn table(&self) -> &QualifiedTableName {
        match self {
            SyncAction::Import(import) => &import.destination,
            SyncAction::SkipExisting(table)
            | SyncAction::SkipUnmapped(table)
            | SyncAction::Drop(table) => table,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanMode {
    /// Every source table, or the requested subset.
    FullImport,
    /// Only tables whose destination name is absent from the destination.
    MissingOnly,
    /// Explicit table names, qualified or not.
    TargetedUpdate(Vec<String>),
    /// Tables the change log reports since the watermark.
    ChangeDetectionUpdate(ChangeWatermark),
}

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub skip_if_exists: bool,
    /// Restrict import modes to these source tables.
    pub tables: Vec<String>,
}

/// Ordered actions plus what happened while resolving names.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub actions: Vec<SyncAction>,
    pub requested: usize,
    pub resolved: usize,
    pub warnings: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn imports(&self) -> impl Iterator<Item = &ImportAction> {
        self.actions.iter().filter_map(|action| match action {
            SyncAction::Import(import) => Some(import),
            _ => None,
        })
    }

    pub fn drops(&self) -> impl Iterator<Item = &QualifiedTableName> {
        self.actions.iter().filter_map(|action| match action {
            SyncAction::Drop(table) => Some(table),
            _ => None,
        })
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Result of matching requested names against the source catalog.
#[derive(Debug, Default)]
pub struct Resolution {
    pub resolved: Vec<SourceTable>,
    pub unresolved: Vec<String>,
    /// Names that resolved to a table an earlier name already resolved to.
    pub repeated: usize,
}

impl Resolution {
    /// Number of distinct requests: repeats of a resolved table count once.
    pub fn requested(&self) -> usize {
        self.resolved.len() + self.unresolved.len()
    }
}

/// Match requested table names against the source tables.
///
/// `catalog.schema.table` and `schema.table` must match exactly. A bare table
/// name matches in any schema, but only when exactly one schema has it.
/// Results keep request order; repeated names resolve once.
pub fn resolve_requested(tables: &[SourceTable], requested: &[String]) -> Resolution {
    let mut resolution = Resolution::default();
    let mut seen: BTreeSet<QualifiedTableName> = BTreeSet::new();

    for name in requested {
        let name = sanitize_identifier(name.trim());
        let name = name.as_str();

        let matches: Vec<&SourceTable> = if name.contains('.') {
            match QualifiedTableName::parse(name) {
                Ok(qualified) => tables.iter().filter(|t| t.name == qualified).collect(),
                Err(e) => {
                    tracing::warn!("{:#}", e);
                    Vec::new()
                }
            }
        } else {
            let lowered = name.to_lowercase();
            tables.iter().filter(|t| t.name.table() == lowered).collect()
        };

        match matches.as_slice() {
            [table] => {
                if seen.insert(table.name.clone()) {
                    resolution.resolved.push((*table).clone());
                } else {
                    resolution.repeated += 1;
                }
            }
            [] => resolution.unresolved.push(name.to_string()),
            many => {
                let schemas: Vec<&str> = many.iter().map(|t| t.name.schema()).collect();
                tracing::warn!(
                    "'{}' is ambiguous; it exists in schemas {}. Qualify it with a schema",
                    name,
                    schemas.join(", ")
                );
                resolution.unresolved.push(name.to_string());
            }
        }
    }

    resolution
}

/// Decides what to do with each table.
///
/// The planner only reads: catalogs come through the cache and names through
/// the metadata index. Nothing in the destination changes until the plan is
/// handed to the executor.
pub struct SyncPlanner<'a> {
    source: &'a dyn SourceWarehouse,
    destination: &'a dyn DestinationDatabase,
    metadata: &'a MetadataIndex,
    tracker: Option<&'a ChangeDetectionTracker>,
}

impl<'a> SyncPlanner<'a> {
    pub fn new(
        source: &'a dyn SourceWarehouse,
        destination: &'a dyn DestinationDatabase,
        metadata: &'a MetadataIndex,
    ) -> Self {
        Self {
            source,
            destination,
            metadata,
            tracker: None,
        }
    }

    /// Needed for `PlanMode::ChangeDetectionUpdate`.
    pub fn with_tracker(mut self, tracker: &'a ChangeDetectionTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub async fn plan(
        &self,
        cache: &mut CatalogCache,
        mode: PlanMode,
        options: &PlanOptions,
    ) -> Result<SyncPlan> {
        let mut plan = SyncPlan::default();

        let candidates = match mode {
            PlanMode::FullImport => {
                let tables = cache.describe_source(self.source).await?.to_vec();
                self.restrict(tables, options, &mut plan)
            }
            PlanMode::MissingOnly => {
                let tables = self.missing_sources(cache).await?;
                self.restrict(tables, options, &mut plan)
            }
            PlanMode::TargetedUpdate(names) => {
                let tables = cache.describe_source(self.source).await?.to_vec();
                self.targeted(&tables, &names, &mut plan)
            }
            PlanMode::ChangeDetectionUpdate(watermark) => {
                let Some(tracker) = self.tracker else {
                    bail!("Change detection planning needs a change detection tracker");
                };
                let changed = tracker
                    .tables_changed_since(self.source, &watermark)
                    .await?;
                let names: Vec<String> = changed.iter().map(ToString::to_string).collect();

                let tables = cache.describe_source(self.source).await?.to_vec();
                self.targeted(&tables, &names, &mut plan)
            }
        };

        if candidates.is_empty() {
            tracing::info!("No tables to plan");
            return Ok(plan);
        }

        let existing: BTreeSet<QualifiedTableName> = if options.skip_if_exists {
            cache
                .ensure_destination(self.destination)
                .await?
                .tables()
                .clone()
        } else {
            BTreeSet::new()
        };

        for table in candidates {
            let action = self.decide(table, options.skip_if_exists, &existing);
            tracing::debug!("Planned {:?}", action);
            plan.actions.push(action);
        }

        Ok(plan)
    }

    /// One `Drop` per destination table no longer represented in the source.
    pub async fn plan_trim(&self, cache: &mut CatalogCache) -> Result<SyncPlan> {
        let source = cache
            .ensure_source(self.source, Some(self.metadata))
            .await?
            .tables()
            .clone();
        let destination = cache.ensure_destination(self.destination).await?.tables();

        let diff = reconcile::diff(&source, destination);

        let mut plan = SyncPlan::default();
        if diff.orphans().is_empty() {
            tracing::info!("No orphaned destination tables to trim");
            return Ok(plan);
        }

        for table in diff.orphans() {
            tracing::info!("{} is no longer in the source", table);
            plan.actions.push(SyncAction::Drop(table.clone()));
        }

        Ok(plan)
    }

    fn decide(
        &self,
        table: SourceTable,
        skip_if_exists: bool,
        existing: &BTreeSet<QualifiedTableName>,
    ) -> SyncAction {
        let entry = self.metadata.get(&table.name);

        let Some((entry, destination)) =
            entry.and_then(|entry| entry.destination().map(|dest| (entry, dest)))
        else {
            tracing::info!(
                "Skipping: {}",
                SyncError::UnmappedTable(table.name.to_string())
            );
            return SyncAction::SkipUnmapped(table.name);
        };

        if skip_if_exists && existing.contains(&destination) {
            tracing::info!("Skipping {}: already in the destination", destination);
            return SyncAction::SkipExisting(destination);
        }

        SyncAction::Import(ImportAction {
            source: table.name,
            destination,
            fields: table.fields,
            geometry: entry.geometry.promoted().to_string(),
        })
    }

    /// Source tables whose destination name the destination lacks.
    async fn missing_sources(&self, cache: &mut CatalogCache) -> Result<Vec<SourceTable>> {
        let translated = cache
            .ensure_source(self.source, Some(self.metadata))
            .await?
            .tables()
            .clone();
        let destination = cache
            .ensure_destination(self.destination)
            .await?
            .tables()
            .clone();

        let diff = reconcile::diff(&translated, &destination);
        if diff.missing().is_empty() {
            tracing::info!("The destination has every mapped source table");
            return Ok(Vec::new());
        }

        let tables = cache.describe_source(self.source).await?;
        let missing: Vec<SourceTable> = tables
            .iter()
            .filter(|table| {
                self.metadata
                    .destination_for(&table.name)
                    .is_some_and(|destination| diff.missing().contains(&destination))
            })
            .cloned()
            .collect();

        tracing::info!("{} tables are missing from the destination", missing.len());
        Ok(missing)
    }

    fn restrict(
        &self,
        tables: Vec<SourceTable>,
        options: &PlanOptions,
        plan: &mut SyncPlan,
    ) -> Vec<SourceTable> {
        if options.tables.is_empty() {
            return tables;
        }
        self.targeted(&tables, &options.tables, plan)
    }

    fn targeted(
        &self,
        tables: &[SourceTable],
        requested: &[String],
        plan: &mut SyncPlan,
    ) -> Vec<SourceTable> {
        let resolution = resolve_requested(tables, requested);

        for name in &resolution.unresolved {
            plan.warn(SyncError::RequestedTableNotFound(name.clone()).to_string());
        }

        plan.requested = resolution.requested();
        plan.resolved = resolution.resolved.len();

        if plan.requested != plan.resolved {
            plan.warn(format!(
                "Requested {} tables but resolved {}; continuing with the resolved tables",
                plan.requested, plan.resolved
            ));
        }

        resolution.resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> SourceTable {
        SourceTable {
            name: QualifiedTableName::parse(name).unwrap(),
            fields: vec!["name".to_string()],
        }
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_resolves_qualified_and_bare_names() {
        let tables = vec![table("water.lakes"), table("location.address_points")];

        let resolution =
            resolve_requested(&tables, &names(&["SGID.WATER.Lakes", "address_points"]));
        assert_eq!(resolution.resolved, tables);
        assert!(resolution.unresolved.is_empty());
    }

    #[test]
    fn test_unknown_names_are_unresolved() {
        let tables = vec![table("water.lakes")];

        let resolution = resolve_requested(&tables, &names(&["lakes", "water.nope", "a.b.c.d"]));
        assert_eq!(resolution.resolved, vec![table("water.lakes")]);
        assert_eq!(resolution.unresolved, names(&["water.nope", "a.b.c.d"]));
    }

    #[test]
    fn test_bare_name_in_two_schemas_is_ambiguous() {
        let tables = vec![table("water.boundaries"), table("political.boundaries")];

        let resolution = resolve_requested(&tables, &names(&["boundaries"]));
        assert!(resolution.resolved.is_empty());
        assert_eq!(resolution.unresolved, names(&["boundaries"]));
    }

    #[test]
    fn test_repeated_names_resolve_once() {
        let tables = vec![table("water.lakes")];

        let resolution = resolve_requested(&tables, &names(&["lakes", "water.lakes"]));
        assert_eq!(resolution.resolved.len(), 1);
        assert_eq!(resolution.repeated, 1);
        assert_eq!(resolution.requested(), 1);
    }

    #[test]
    fn test_action_table_is_destination_name() {
        let import = SyncAction::Import(ImportAction {
            source: QualifiedTableName::new("bioscience", "wildlife_overlay_source"),
            destination: QualifiedTableName::new("bioscience", "wildlife_overlay"),
            fields: vec![],
            geometry: "MULTIPOLYGON".to_string(),
        });
        assert_eq!(import.table().table(), "wildlife_overlay");
        assert_eq!(
            SyncAction::Drop(QualifiedTableName::new("a", "b")).table(),
            &QualifiedTableName::new("a", "b")
        );
    }
}
