// ABOUTME: Source warehouse abstraction used by planning, schema alignment and change detection
// ABOUTME: Exports the SourceWarehouse trait and its SQL Server implementation

pub mod mssql;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::metadata::MetadataRow;
use crate::names::QualifiedTableName;

pub use mssql::MssqlWarehouse;

/// A source table and the columns the transfer engine should copy.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    pub name: QualifiedTableName,
    /// Lower-cased attribute columns; geometry columns are not listed.
    pub fields: Vec<String>,
}

/// An integer column as declared in a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegerColumn {
    pub name: String,
    pub data_type: String,
}

/// Read access to the internal spatial warehouse.
///
/// All queries share one set of connection parameters; `connection_key`
/// identifies that connection without exposing credentials.
#[async_trait]
pub trait SourceWarehouse: Send + Sync {
    fn connection_key(&self) -> &str;

    /// Every table in the warehouse, with its attribute columns.
    async fn list_tables(&self) -> Result<Vec<SourceTable>>;

    /// Rows of the published-items metadata table.
    async fn metadata_rows(&self) -> Result<Vec<MetadataRow>>;

    /// Raw identifiers from the change-log table modified on or after `since`.
    async fn changed_tables(&self, since: NaiveDate) -> Result<Vec<String>>;

    /// `smallint`/`int`/`bigint` columns of one table, row-id columns excluded.
    async fn integer_columns(
        &self,
        table: &QualifiedTableName,
        row_id_columns: &[String],
    ) -> Result<Vec<IntegerColumn>>;
}
