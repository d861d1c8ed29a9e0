// ABOUTME: Integration tests for schema alignment, update-schema and scheduled runs
// ABOUTME: Drives the commands end to end against in-memory fakes

mod common;

use catalog_sync::catalog::CatalogCache;
use catalog_sync::change_detection::{self, ChangeDetectionTracker};
use catalog_sync::commands::{self, SyncContext};
use catalog_sync::config::Config;
use catalog_sync::metadata::MetadataIndex;
use catalog_sync::names::NameMapper;
use catalog_sync::schema_align::{AlignOutcome, SchemaAligner};
use catalog_sync::source::IntegerColumn;
use common::{
    name, row, table, FakeDestination, FakeSource, FakeTransfer, MemoryWatermarkStore, SharedStore,
};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const LAKES_ALTER: &str =
    "ALTER TABLE \"water\".\"lakes\" ALTER COLUMN \"depth\" TYPE smallint USING \"depth\"::smallint;";

fn config() -> Config {
    Config {
        indexes: Vec::new(),
        ..Config::default()
    }
}

fn integer(name: &str, data_type: &str) -> IntegerColumn {
    IntegerColumn {
        name: name.to_string(),
        data_type: data_type.to_string(),
    }
}

fn warehouse() -> FakeSource {
    let mut source = FakeSource::new(
        vec![
            table("water.lakes", &["name", "depth"]),
            table("water.rivers", &["name", "gnis_id"]),
            table("water.springs", &["name"]),
        ],
        vec![
            row("SGID.WATER.Lakes", Some("Utah Lakes"), "POLYGON"),
            row("SGID.WATER.Rivers", Some("Utah Rivers"), "POLYLINE"),
            row("SGID.WATER.Springs", Some("Utah Springs"), "POINT"),
            row("SGID.WATER.Retired", None, "POINT"),
        ],
    );
    source.integer_columns.insert(
        name("water.lakes"),
        vec![integer("objectid", "int"), integer("depth", "smallint")],
    );
    source
        .integer_columns
        .insert(name("water.rivers"), vec![integer("gnis_id", "int")]);
    source
}

fn destination(tables: &[&str]) -> FakeDestination {
    let mut destination = FakeDestination::with_tables(tables);
    destination.column_types.insert(
        name("water.lakes"),
        HashMap::from([
            ("objectid".to_string(), "integer".to_string()),
            ("depth".to_string(), "integer".to_string()),
        ]),
    );
    destination.column_types.insert(
        name("water.rivers"),
        HashMap::from([("gnis_id".to_string(), "numeric".to_string())]),
    );
    destination
}

async fn metadata(source: &FakeSource) -> MetadataIndex {
    MetadataIndex::build(source, &NameMapper::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_dry_run_alignment_reports_statement_without_running_it() {
    let config = config();
    let source = warehouse();
    let destination = destination(&[]);

    let aligner = SchemaAligner::new(&source, &destination, &config.row_id_columns, true);
    let outcome = aligner
        .align(&name("water.lakes"), &name("water.lakes"))
        .await
        .unwrap();

    assert_eq!(outcome, AlignOutcome::Altered(LAKES_ALTER.to_string()));
    assert!(destination.executed().is_empty());
}

#[tokio::test]
async fn test_table_without_integer_columns_is_skipped() {
    let config = config();
    let source = warehouse();
    let destination = destination(&[]);

    let aligner = SchemaAligner::new(&source, &destination, &config.row_id_columns, false);
    let outcome = aligner
        .align(&name("water.springs"), &name("water.springs"))
        .await
        .unwrap();

    assert_eq!(outcome, AlignOutcome::Skipped);
    assert!(destination.executed().is_empty());
}

#[tokio::test]
async fn test_align_all_covers_every_mapped_table() {
    let config = config();
    let source = warehouse();
    let destination = destination(&[]);
    let index = metadata(&source).await;

    let aligner = SchemaAligner::new(&source, &destination, &config.row_id_columns, false);
    let summary = aligner.align_all(&index).await;

    assert!(summary.is_success());
    assert_eq!(summary.aligned, 2);
    assert_eq!(
        destination.executed(),
        vec![
            LAKES_ALTER.to_string(),
            "ALTER TABLE \"water\".\"rivers\" ALTER COLUMN \"gnis_id\" TYPE integer USING \"gnis_id\"::integer;"
                .to_string(),
        ]
    );
}

#[tokio::test]
async fn test_update_schema_warns_on_unknown_table_and_aligns_the_rest() {
    let config = config();
    let source = warehouse();
    let destination = destination(&[]);
    let transfer = FakeTransfer::default();
    let ctx = SyncContext::new(&config, &source, &destination, &transfer);
    let index = metadata(&source).await;
    let mut cache = CatalogCache::new(&config.exclude_schemas);

    let tables = vec!["lakes".to_string(), "water.nope".to_string()];
    let summary = commands::update_schema(&ctx, &mut cache, &index, &tables, false)
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.aligned, 1);
    assert_eq!(summary.warnings.len(), 1);
    assert!(summary.warnings[0].contains("water.nope"));
    assert_eq!(destination.executed(), vec![LAKES_ALTER.to_string()]);
}

struct Scheduled {
    config: Config,
    source: FakeSource,
    destination: FakeDestination,
    transfer: FakeTransfer,
    store: Arc<MemoryWatermarkStore>,
}

impl Scheduled {
    fn new(transfer: FakeTransfer) -> Self {
        let mut source = warehouse();
        source.changed = vec!["SGID.WATER.Rivers".to_string()];

        Self {
            config: config(),
            source,
            destination: FakeDestination::with_tables(&[
                "water.lakes",
                "water.rivers",
                "location.old_layer",
            ]),
            transfer,
            store: Arc::new(MemoryWatermarkStore::with("2024-01-01")),
        }
    }

    async fn run(&self, dry_run: bool) -> catalog_sync::RunSummary {
        let ctx = SyncContext::new(&self.config, &self.source, &self.destination, &self.transfer);
        let index = metadata(&self.source).await;
        let mut cache = CatalogCache::new(&self.config.exclude_schemas);
        let tracker =
            ChangeDetectionTracker::new(Box::new(SharedStore(self.store.clone())), ctx.names.clone());

        commands::scheduled(&ctx, &mut cache, &index, &tracker, dry_run)
            .await
            .unwrap()
    }

    fn watermark(&self) -> Option<String> {
        self.store.contents.lock().unwrap().clone()
    }

    fn targets(&self) -> Vec<String> {
        self.transfer
            .requests()
            .iter()
            .map(|request| request.target.to_string())
            .collect()
    }
}

#[tokio::test]
async fn test_scheduled_run_keeps_going_after_a_failed_import() {
    let run = Scheduled::new(FakeTransfer::failing(&["water.springs"]));

    let summary = run.run(false).await;

    assert_eq!(
        run.destination.executed(),
        vec!["DROP TABLE \"location\".\"old_layer\";".to_string()]
    );
    assert_eq!(run.targets(), vec!["water.springs", "water.rivers"]);
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.imported, 1);
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].starts_with("water.springs"));
    assert!(!summary.is_success());

    // Only the update step decides the watermark, and it succeeded.
    assert_eq!(run.store.writes.load(Ordering::SeqCst), 1);
    assert_eq!(
        run.watermark(),
        Some(change_detection::today().format("%Y-%m-%d").to_string())
    );
}

#[tokio::test]
async fn test_scheduled_run_keeps_watermark_when_update_fails() {
    let run = Scheduled::new(FakeTransfer::failing(&["water.rivers"]));

    let summary = run.run(false).await;

    assert_eq!(run.targets(), vec!["water.springs", "water.rivers"]);
    assert_eq!(summary.imported, 1);
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].starts_with("water.rivers"));
    assert_eq!(run.store.writes.load(Ordering::SeqCst), 0);
    assert_eq!(run.watermark().as_deref(), Some("2024-01-01"));
}

#[tokio::test]
async fn test_scheduled_dry_run_changes_nothing() {
    let run = Scheduled::new(FakeTransfer::default());

    let summary = run.run(true).await;

    assert!(summary.is_success());
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.imported, 2);
    assert!(run.destination.executed().is_empty());
    assert!(run.targets().is_empty());
    assert_eq!(run.store.writes.load(Ordering::SeqCst), 0);
}
