// ABOUTME: Import command: copy source tables into the destination
// ABOUTME: Either every mapped table or only those the destination lacks

use anyhow::Result;

use super::SyncContext;
use crate::catalog::CatalogCache;
use crate::executor::{RunSummary, SyncExecutor};
use crate::metadata::MetadataIndex;
use crate::planner::{PlanMode, PlanOptions, SyncPlanner};

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Only tables whose destination name is missing.
    pub missing: bool,
    pub skip_if_exists: bool,
    pub dry_run: bool,
    /// Restrict to these source tables.
    pub tables: Vec<String>,
}

pub async fn import(
    ctx: &SyncContext<'_>,
    cache: &mut CatalogCache,
    metadata: &MetadataIndex,
    options: &ImportOptions,
) -> Result<RunSummary> {
    if options.missing {
        tracing::info!("Importing tables missing from the destination");
    } else {
        tracing::info!("Importing tables from the source");
    }

    let planner = SyncPlanner::new(ctx.source, ctx.destination, metadata);
    let mode = if options.missing {
        PlanMode::MissingOnly
    } else {
        PlanMode::FullImport
    };

    let plan = planner
        .plan(
            cache,
            mode,
            &PlanOptions {
                skip_if_exists: options.skip_if_exists,
                tables: options.tables.clone(),
            },
        )
        .await?;

    let executor = SyncExecutor::new(
        ctx.source,
        ctx.destination,
        ctx.transfer,
        ctx.config,
        options.dry_run,
    );

    Ok(executor.execute(&plan).await)
}
