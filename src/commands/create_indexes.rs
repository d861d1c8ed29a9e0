// ABOUTME: Create-indexes command: build every configured destination index
// ABOUTME: Individual index failures are logged and do not fail the command

use anyhow::Result;
use std::time::Instant;

use super::SyncContext;
use crate::executor::RunSummary;
use crate::indexes::IndexBuilder;

pub async fn create_indexes(ctx: &SyncContext<'_>, dry_run: bool) -> Result<RunSummary> {
    let start = Instant::now();
    let builder = IndexBuilder::new(ctx.destination, &ctx.config.indexes, dry_run);

    let created = builder.create_all().await;
    let missed = ctx.config.indexes.len().saturating_sub(created);

    let mut summary = RunSummary::default();
    if missed > 0 {
        summary
            .warnings
            .push(format!("{} indexes could not be created", missed));
    }
    summary.duration = start.elapsed();

    Ok(summary)
}
