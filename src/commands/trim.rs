// ABOUTME: Trim command: drop destination tables no longer in the source
// ABOUTME: Every orphan is removed by a single DROP TABLE statement

use anyhow::Result;

use super::SyncContext;
use crate::catalog::CatalogCache;
use crate::executor::{RunSummary, SyncExecutor};
use crate::metadata::MetadataIndex;
use crate::planner::SyncPlanner;
use crate::utils::pluralize;

pub async fn trim(
    ctx: &SyncContext<'_>,
    cache: &mut CatalogCache,
    metadata: &MetadataIndex,
    dry_run: bool,
) -> Result<RunSummary> {
    tracing::info!("Trimming tables that do not exist in the source");

    let planner = SyncPlanner::new(ctx.source, ctx.destination, metadata);
    let plan = planner.plan_trim(cache).await?;

    let orphans = plan.drops().count();
    tracing::info!(
        "{} in the destination not in the source",
        pluralize(orphans, "table", "tables")
    );

    if plan.is_empty() {
        return Ok(RunSummary::default());
    }

    let executor = SyncExecutor::new(
        ctx.source,
        ctx.destination,
        ctx.transfer,
        ctx.config,
        dry_run,
    );

    Ok(executor.execute(&plan).await)
}
