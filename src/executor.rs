// ABOUTME: Executes a sync plan against the transfer engine and destination
// ABOUTME: Imports run one table at a time; drops are batched into one statement

use std::time::{Duration, Instant};

use crate::config::Config;
use crate::destination::DestinationDatabase;
use crate::error::SyncError;
use crate::indexes::IndexBuilder;
use crate::names::QualifiedTableName;
use crate::planner::{ImportAction, SyncAction, SyncPlan};
use crate::schema_align::SchemaAligner;
use crate::source::SourceWarehouse;
use crate::transfer::{TransferEngine, TransferRequest};
use crate::utils::format_elapsed;

/// Outcome of one run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub imported: usize,
    pub skipped: usize,
    pub dropped: usize,
    pub aligned: usize,
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
    pub duration: Duration,
}

impl RunSummary {
    /// True when no table failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold another run's counts and failures into this one.
    pub fn merge(&mut self, other: RunSummary) {
        self.imported += other.imported;
        self.skipped += other.skipped;
        self.dropped += other.dropped;
        self.aligned += other.aligned;
        self.failures.extend(other.failures);
        self.warnings.extend(other.warnings);
        self.duration += other.duration;
    }

    pub fn record_failure(&mut self, table: &QualifiedTableName, error: &anyhow::Error) {
        tracing::error!("{} failed: {:#}", table, error);
        self.failures.push(format!("{}: {:#}", table, error));
    }

    pub fn log(&self) {
        tracing::info!(
            "Imported {}, skipped {}, dropped {}, aligned {} in {}",
            self.imported,
            self.skipped,
            self.dropped,
            self.aligned,
            format_elapsed(self.duration)
        );

        if !self.is_success() {
            tracing::warn!("{} tables failed:", self.failures.len());
            for failure in &self.failures {
                tracing::warn!("  - {}", failure);
            }
        }
    }
}

/// Single statement dropping every table at once.
pub fn drop_statement(tables: &[QualifiedTableName]) -> String {
    let names: Vec<String> = tables.iter().map(QualifiedTableName::to_sql).collect();
    format!("DROP TABLE {};", names.join(", "))
}

/// Carries out plans.
///
/// Each table runs to completion (copy, schema alignment, indexes) before the
/// next starts. A failed copy is recorded and the run moves on; only fatal
/// conditions such as a lost connection stop it. In a dry run nothing is
/// written to the destination.
pub struct SyncExecutor<'a> {
    source: &'a dyn SourceWarehouse,
    destination: &'a dyn DestinationDatabase,
    transfer: &'a dyn TransferEngine,
    config: &'a Config,
    dry_run: bool,
}

impl<'a> SyncExecutor<'a> {
    pub fn new(
        source: &'a dyn SourceWarehouse,
        destination: &'a dyn DestinationDatabase,
        transfer: &'a dyn TransferEngine,
        config: &'a Config,
        dry_run: bool,
    ) -> Self {
        Self {
            source,
            destination,
            transfer,
            config,
            dry_run,
        }
    }

    pub async fn execute(&self, plan: &SyncPlan) -> RunSummary {
        let start = Instant::now();
        let mut summary = RunSummary {
            warnings: plan.warnings.clone(),
            ..Default::default()
        };

        let aligner = SchemaAligner::new(
            self.source,
            self.destination,
            &self.config.row_id_columns,
            self.dry_run,
        );
        let indexes = IndexBuilder::new(self.destination, &self.config.indexes, self.dry_run);

        let mut drops: Vec<QualifiedTableName> = Vec::new();

        for action in &plan.actions {
            match action {
                SyncAction::Import(import) => {
                    let fatal = self
                        .import(import, &aligner, &indexes, &mut summary)
                        .await;
                    if fatal {
                        tracing::error!("Stopping the run after a fatal error");
                        break;
                    }
                }
                SyncAction::SkipExisting(_) | SyncAction::SkipUnmapped(_) => {
                    summary.skipped += 1;
                }
                SyncAction::Drop(table) => drops.push(table.clone()),
            }
        }

        if !drops.is_empty() {
            self.drop_tables(&drops, &mut summary).await;
        }

        summary.duration = start.elapsed();
        summary
    }

    /// Returns true when the failure should stop the run.
    async fn import(
        &self,
        import: &ImportAction,
        aligner: &SchemaAligner<'_>,
        indexes: &IndexBuilder<'_>,
        summary: &mut RunSummary,
    ) -> bool {
        let request = TransferRequest::for_import(import, self.config);

        tracing::info!(
            "Inserting {} into {} as {}",
            import.source,
            import.destination,
            import.geometry
        );
        tracing::debug!("with {}", request.select_sql);

        if self.dry_run {
            tracing::info!("[dry run] skipping transfer of {}", import.destination);
            summary.imported += 1;
            return false;
        }

        match self.transfer.transfer(&request).await {
            Ok(report) => {
                tracing::info!(
                    "Copied {} in {}",
                    report.target,
                    format_elapsed(report.elapsed)
                );
                summary.imported += 1;
            }
            Err(e) => {
                summary.record_failure(&import.destination, &e);
                return e
                    .downcast_ref::<SyncError>()
                    .map(SyncError::is_fatal)
                    .unwrap_or(false);
            }
        }

        aligner
            .align_into(&import.source, &import.destination, summary)
            .await;
        indexes.create_for(&import.destination).await;

        false
    }

    async fn drop_tables(&self, tables: &[QualifiedTableName], summary: &mut RunSummary) {
        let sql = drop_statement(tables);

        if self.dry_run {
            tracing::info!("[dry run] {}", sql);
            summary.dropped += tables.len();
            return;
        }

        tracing::info!("Dropping {} tables", tables.len());
        tracing::debug!("{}", sql);

        match self.destination.execute(&sql).await {
            Ok(()) => summary.dropped += tables.len(),
            Err(e) => {
                tracing::error!("Failed to drop tables: {:#}", e);
                summary.failures.push(format!("{}: {:#}", sql, e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_statement_lists_every_table() {
        let sql = drop_statement(&[
            QualifiedTableName::new("location", "old_layer"),
            QualifiedTableName::new("water", "retired"),
        ]);
        assert_eq!(
            sql,
            "DROP TABLE \"location\".\"old_layer\", \"water\".\"retired\";"
        );
    }

    #[test]
    fn test_summary_merge() {
        let mut first = RunSummary {
            imported: 2,
            failures: vec!["water.lakes: boom".to_string()],
            ..Default::default()
        };
        first.merge(RunSummary {
            dropped: 1,
            skipped: 3,
            ..Default::default()
        });

        assert_eq!(first.imported, 2);
        assert_eq!(first.dropped, 1);
        assert_eq!(first.skipped, 3);
        assert!(!first.is_success());
        assert!(RunSummary::default().is_success());
    }
}
