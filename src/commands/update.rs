// ABOUTME: Update command: re-import named tables or tables the change log reports
// ABOUTME: Advances the change-detection watermark only after a clean run

use anyhow::{bail, Result};

use super::SyncContext;
use crate::catalog::CatalogCache;
use crate::change_detection::{self, ChangeDetectionTracker};
use crate::executor::{RunSummary, SyncExecutor};
use crate::metadata::MetadataIndex;
use crate::planner::{PlanMode, PlanOptions, SyncPlanner};

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub tables: Vec<String>,
    pub dry_run: bool,
    pub from_change_detection: bool,
}

pub async fn update(
    ctx: &SyncContext<'_>,
    cache: &mut CatalogCache,
    metadata: &MetadataIndex,
    tracker: Option<&ChangeDetectionTracker>,
    options: &UpdateOptions,
) -> Result<RunSummary> {
    let run_date = change_detection::today();
    let mut planner = SyncPlanner::new(ctx.source, ctx.destination, metadata);

    let mode = if options.from_change_detection {
        let Some(tracker) = tracker else {
            bail!("Updating from change detection needs a watermark store");
        };
        planner = planner.with_tracker(tracker);
        PlanMode::ChangeDetectionUpdate(tracker.read_watermark().await?)
    } else {
        if options.tables.is_empty() {
            tracing::info!("No tables to update");
            return Ok(RunSummary::default());
        }
        tracing::info!("Updating tables {}", options.tables.join(","));
        PlanMode::TargetedUpdate(options.tables.clone())
    };

    let plan = planner.plan(cache, mode, &PlanOptions::default()).await?;

    let executor = SyncExecutor::new(
        ctx.source,
        ctx.destination,
        ctx.transfer,
        ctx.config,
        options.dry_run,
    );
    let summary = executor.execute(&plan).await;

    if let Some(tracker) = tracker.filter(|_| options.from_change_detection) {
        if options.dry_run {
            tracing::info!("[dry run] leaving the watermark unchanged");
        } else if summary.is_success() {
            tracker.write_watermark(run_date).await?;
        } else {
            tracing::warn!("Leaving the watermark unchanged because tables failed");
        }
    }

    Ok(summary)
}
