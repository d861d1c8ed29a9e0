// ABOUTME: Destination database abstraction for catalog listing and DDL
// ABOUTME: Exports the DestinationDatabase trait and its PostgreSQL implementation

pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::names::QualifiedTableName;

pub use postgres::PostgresDestination;

/// The public spatial database the catalog is synchronized into.
#[async_trait]
pub trait DestinationDatabase: Send + Sync {
    fn connection_key(&self) -> &str;

    /// Tables in the managed schemas.
    async fn list_tables(&self) -> Result<Vec<QualifiedTableName>>;

    /// Column name → declared data type for one table. Empty if the table is absent.
    async fn column_types(&self, table: &QualifiedTableName) -> Result<HashMap<String, String>>;

    /// Run one or more DDL statements.
    async fn execute(&self, sql: &str) -> Result<()>;
}
