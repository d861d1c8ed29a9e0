// ABOUTME: Scheduled run: trim, import missing tables, then update from change detection
// ABOUTME: Each step runs even if an earlier one failed; errors are aggregated

use anyhow::Result;
use std::time::Instant;

use super::{import, trim, update, ImportOptions, SyncContext, UpdateOptions};
use crate::catalog::CatalogCache;
use crate::change_detection::ChangeDetectionTracker;
use crate::executor::RunSummary;
use crate::metadata::MetadataIndex;
use crate::utils::format_elapsed;

fn record(step: &str, outcome: Result<RunSummary>, total: &mut RunSummary) {
    match outcome {
        Ok(summary) => {
            tracing::info!("{} completed in {}", step, format_elapsed(summary.duration));
            total.merge(summary);
        }
        Err(e) => {
            tracing::error!("{} failure: {:#}", step, e);
            total.failures.push(format!("{}: {:#}", step, e));
        }
    }
}

/// One unattended sync: the three steps share a single catalog cache, so
/// import planning sees the destination as it was before the trim.
pub async fn scheduled(
    ctx: &SyncContext<'_>,
    cache: &mut CatalogCache,
    metadata: &MetadataIndex,
    tracker: &ChangeDetectionTracker,
    dry_run: bool,
) -> Result<RunSummary> {
    let start = Instant::now();
    let mut total = RunSummary::default();

    let step = Instant::now();
    let outcome = trim(ctx, cache, metadata, dry_run).await;
    record("trim", with_elapsed(outcome, step), &mut total);

    let step = Instant::now();
    let options = ImportOptions {
        missing: true,
        dry_run,
        ..Default::default()
    };
    let outcome = import(ctx, cache, metadata, &options).await;
    record("import", with_elapsed(outcome, step), &mut total);

    let step = Instant::now();
    let options = UpdateOptions {
        from_change_detection: true,
        dry_run,
        ..Default::default()
    };
    let outcome = update(ctx, cache, metadata, Some(tracker), &options).await;
    record("update", with_elapsed(outcome, step), &mut total);

    total.duration = start.elapsed();

    if total.is_success() {
        tracing::info!("Successful run completed in {}", format_elapsed(total.duration));
    }

    Ok(total)
}

fn with_elapsed(outcome: Result<RunSummary>, step: Instant) -> Result<RunSummary> {
    outcome.map(|mut summary| {
        summary.duration = step.elapsed();
        summary
    })
}
