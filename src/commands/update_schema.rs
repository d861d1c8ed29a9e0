// ABOUTME: Update-schema command: align integer column widths with the source
// ABOUTME: Runs for the named tables or for every table in the metadata index

use anyhow::Result;
use std::time::Instant;

use super::SyncContext;
use crate::catalog::CatalogCache;
use crate::executor::RunSummary;
use crate::metadata::MetadataIndex;
use crate::planner::resolve_requested;
use crate::schema_align::SchemaAligner;

pub async fn update_schema(
    ctx: &SyncContext<'_>,
    cache: &mut CatalogCache,
    metadata: &MetadataIndex,
    tables: &[String],
    dry_run: bool,
) -> Result<RunSummary> {
    let start = Instant::now();
    let aligner = SchemaAligner::new(
        ctx.source,
        ctx.destination,
        &ctx.config.row_id_columns,
        dry_run,
    );

    if tables.is_empty() {
        tracing::info!("Updating schemas for every published table");
        let mut summary = aligner.align_all(metadata).await;
        summary.duration = start.elapsed();
        return Ok(summary);
    }

    let source_tables = cache.describe_source(ctx.source).await?;
    let resolution = resolve_requested(source_tables, tables);

    let mut summary = RunSummary::default();
    for name in resolution.unresolved {
        let message = crate::error::SyncError::RequestedTableNotFound(name).to_string();
        tracing::warn!("{}", message);
        summary.warnings.push(message);
    }

    for table in &resolution.resolved {
        let Some(destination) = metadata.destination_for(&table.name) else {
            tracing::info!("Skipping {}: no destination name", table.name);
            summary.skipped += 1;
            continue;
        };
        aligner
            .align_into(&table.name, &destination, &mut summary)
            .await;
    }

    summary.duration = start.elapsed();
    Ok(summary)
}
