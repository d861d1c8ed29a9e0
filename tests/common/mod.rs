// ABOUTME: In-memory fakes of the warehouse, destination, transfer engine and watermark store
// ABOUTME: Shared by the integration tests; each fake counts the calls made to it

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use catalog_sync::change_detection::WatermarkStore;
use catalog_sync::destination::DestinationDatabase;
use catalog_sync::error::SyncError;
use catalog_sync::metadata::MetadataRow;
use catalog_sync::names::QualifiedTableName;
use catalog_sync::source::{IntegerColumn, SourceTable, SourceWarehouse};
use catalog_sync::transfer::{TransferEngine, TransferReport, TransferRequest};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn name(value: &str) -> QualifiedTableName {
    QualifiedTableName::parse(value).unwrap()
}

pub fn table(value: &str, fields: &[&str]) -> SourceTable {
    SourceTable {
        name: name(value),
        fields: fields.iter().map(|f| f.to_string()).collect(),
    }
}

pub fn row(table: &str, title: Option<&str>, geometry: &str) -> MetadataRow {
    MetadataRow {
        table: table.to_string(),
        title: title.map(String::from),
        geometry_type: Some(geometry.to_string()),
    }
}

#[derive(Default)]
pub struct FakeSource {
    pub tables: Vec<SourceTable>,
    pub rows: Vec<MetadataRow>,
    pub changed: Vec<String>,
    pub integer_columns: HashMap<QualifiedTableName, Vec<IntegerColumn>>,
    pub list_calls: AtomicUsize,
    pub metadata_calls: AtomicUsize,
    pub changed_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(tables: Vec<SourceTable>, rows: Vec<MetadataRow>) -> Self {
        Self {
            tables,
            rows,
            ..Default::default()
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn changed_calls(&self) -> usize {
        self.changed_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceWarehouse for FakeSource {
    fn connection_key(&self) -> &str {
        "mssql://internal@warehouse:1433/SGID"
    }

    async fn list_tables(&self) -> Result<Vec<SourceTable>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables.clone())
    }

    async fn metadata_rows(&self) -> Result<Vec<MetadataRow>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.clone())
    }

    async fn changed_tables(&self, _since: NaiveDate) -> Result<Vec<String>> {
        self.changed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.changed.clone())
    }

    async fn integer_columns(
        &self,
        table: &QualifiedTableName,
        row_id_columns: &[String],
    ) -> Result<Vec<IntegerColumn>> {
        Ok(self
            .integer_columns
            .get(table)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|column| !row_id_columns.contains(&column.name))
            .collect())
    }
}

#[derive(Default)]
pub struct FakeDestination {
    pub tables: Mutex<Vec<QualifiedTableName>>,
    pub column_types: HashMap<QualifiedTableName, HashMap<String, String>>,
    pub executed: Mutex<Vec<String>>,
    pub list_calls: AtomicUsize,
    pub fail_execute: bool,
}

impl FakeDestination {
    pub fn with_tables(tables: &[&str]) -> Self {
        Self {
            tables: Mutex::new(tables.iter().map(|t| name(t)).collect()),
            ..Default::default()
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DestinationDatabase for FakeDestination {
    fn connection_key(&self) -> &str {
        "postgresql://postgres@opensgid:5432/opensgid"
    }

    async fn list_tables(&self) -> Result<Vec<QualifiedTableName>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables.lock().unwrap().clone())
    }

    async fn column_types(&self, table: &QualifiedTableName) -> Result<HashMap<String, String>> {
        Ok(self.column_types.get(table).cloned().unwrap_or_default())
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        if self.fail_execute {
            bail!("permission denied");
        }
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(())
    }
}

/// Records requests; fails for the listed destination tables.
#[derive(Default)]
pub struct FakeTransfer {
    pub requests: Mutex<Vec<TransferRequest>>,
    pub failing: Vec<QualifiedTableName>,
    pub unreachable: bool,
}

impl FakeTransfer {
    pub fn failing(tables: &[&str]) -> Self {
        Self {
            failing: tables.iter().map(|t| name(t)).collect(),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<TransferRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransferEngine for FakeTransfer {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReport> {
        self.requests.lock().unwrap().push(request.clone());

        if self.unreachable {
            return Err(SyncError::connectivity("destination", "connection reset").into());
        }

        if self.failing.contains(&request.target) {
            return Err(SyncError::TransferFailure {
                table: request.target.to_string(),
                reason: "ERROR 1: geometry type mismatch".to_string(),
            }
            .into());
        }

        Ok(TransferReport {
            target: request.target.clone(),
            elapsed: Duration::from_millis(5),
        })
    }
}

#[derive(Default)]
pub struct MemoryWatermarkStore {
    pub contents: Mutex<Option<String>>,
    pub writes: AtomicUsize,
}

impl MemoryWatermarkStore {
    pub fn with(contents: &str) -> Self {
        Self {
            contents: Mutex::new(Some(contents.to_string())),
            writes: AtomicUsize::new(0),
        }
    }
}

/// Lets a test keep a handle on the store it gives to a tracker.
pub struct SharedStore(pub std::sync::Arc<MemoryWatermarkStore>);

#[async_trait]
impl WatermarkStore for SharedStore {
    fn location(&self) -> String {
        "memory://.last_checked".to_string()
    }

    async fn read(&self) -> Result<Option<String>> {
        Ok(self.0.contents.lock().unwrap().clone())
    }

    async fn write(&self, contents: &str) -> Result<()> {
        self.0.writes.fetch_add(1, Ordering::SeqCst);
        *self.0.contents.lock().unwrap() = Some(contents.to_string());
        Ok(())
    }
}
