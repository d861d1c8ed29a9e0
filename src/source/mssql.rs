// ABOUTME: SQL Server implementation of the source warehouse
// ABOUTME: Reads catalog, metadata, change-log and column types over TDS

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tiberius::{Client, Row};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{IntegerColumn, SourceTable, SourceWarehouse};
use crate::config::{Config, SourceConnection};
use crate::error::SyncError;
use crate::metadata::MetadataRow;
use crate::names::QualifiedTableName;
use crate::utils::quote_mssql_object;

const GEOMETRY_TYPES: &[&str] = &["geometry", "geography"];

/// Source warehouse backed by one SQL Server connection.
///
/// The TDS client needs `&mut` for every query, so it sits behind a mutex;
/// the sync engine is sequential and never contends for it.
pub struct MssqlWarehouse {
    client: Mutex<Client<Compat<TcpStream>>>,
    connection_key: String,
    metadata_table: String,
    change_log_table: String,
    exclude_fields: Vec<String>,
}

impl MssqlWarehouse {
    /// Connect to the warehouse. Failure is a fatal connectivity error.
    pub async fn connect(connection: &SourceConnection, config: &Config) -> Result<Self> {
        let connection_key = connection.connection_key();

        let tds = tiberius::Config::from_ado_string(&connection.ado_string())
            .context("Invalid source connection parameters")?;

        tracing::debug!("Connecting to source warehouse {}", connection_key);

        let tcp = TcpStream::connect(tds.get_addr())
            .await
            .map_err(|e| SyncError::connectivity(&connection_key, e))?;
        tcp.set_nodelay(true)
            .context("Failed to configure source socket")?;

        let client = Client::connect(tds, tcp.compat_write())
            .await
            .map_err(|e| SyncError::connectivity(&connection_key, e))?;

        Ok(Self {
            client: Mutex::new(client),
            connection_key,
            metadata_table: config.metadata_table.clone(),
            change_log_table: config.change_log_table.clone(),
            exclude_fields: config.exclude_fields.clone(),
        })
    }

    async fn query(&self, sql: &str, params: &[&dyn tiberius::ToSql]) -> Result<Vec<Row>> {
        tracing::debug!("executing {}", sql);

        let mut client = self.client.lock().await;
        let rows = client
            .query(sql, params)
            .await?
            .into_first_result()
            .await?;

        Ok(rows)
    }
}

fn text(row: &Row, index: usize) -> Option<String> {
    row.get::<&str, _>(index).map(str::to_string)
}

#[async_trait]
impl SourceWarehouse for MssqlWarehouse {
    fn connection_key(&self) -> &str {
        &self.connection_key
    }

    async fn list_tables(&self) -> Result<Vec<SourceTable>> {
        let rows = self
            .query(
                "SELECT c.TABLE_SCHEMA, c.TABLE_NAME, c.COLUMN_NAME, c.DATA_TYPE
                 FROM INFORMATION_SCHEMA.COLUMNS c
                 INNER JOIN INFORMATION_SCHEMA.TABLES t
                     ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
                 WHERE t.TABLE_TYPE = 'BASE TABLE'
                 ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION",
                &[],
            )
            .await
            .context("Failed to list source tables")?;

        let mut tables: Vec<SourceTable> = Vec::new();

        for row in &rows {
            let (Some(schema), Some(table), Some(column)) =
                (text(row, 0), text(row, 1), text(row, 2))
            else {
                continue;
            };
            let data_type = text(row, 3).unwrap_or_default().to_lowercase();
            let name = QualifiedTableName::new(&schema, &table);

            if tables.last().map(|t| &t.name) != Some(&name) {
                tables.push(SourceTable {
                    name: name.clone(),
                    fields: Vec::new(),
                });
            }

            let column = column.to_lowercase();
            if GEOMETRY_TYPES.contains(&data_type.as_str())
                || self.exclude_fields.contains(&column)
            {
                continue;
            }

            if let Some(current) = tables.last_mut() {
                current.fields.push(column);
            }
        }

        tracing::debug!("Found {} tables in the source", tables.len());

        Ok(tables)
    }

    async fn metadata_rows(&self) -> Result<Vec<MetadataRow>> {
        let sql = format!(
            "SELECT [TABLENAME], [AGOL_PUBLISHED_NAME], [GEOMETRY_TYPE] FROM {}",
            quote_mssql_object(&self.metadata_table)
        );

        let rows = self
            .query(&sql, &[])
            .await
            .with_context(|| format!("Failed to query {}", self.metadata_table))?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(MetadataRow {
                    table: text(row, 0)?,
                    title: text(row, 1),
                    geometry_type: text(row, 2),
                })
            })
            .collect())
    }

    async fn changed_tables(&self, since: NaiveDate) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT [TABLE_NAME] FROM {} WHERE [LAST_MODIFIED] >= @P1",
            quote_mssql_object(&self.change_log_table)
        );

        let rows = self
            .query(&sql, &[&since])
            .await
            .with_context(|| format!("Failed to query {}", self.change_log_table))?;

        Ok(rows.iter().filter_map(|row| text(row, 0)).collect())
    }

    async fn integer_columns(
        &self,
        table: &QualifiedTableName,
        row_id_columns: &[String],
    ) -> Result<Vec<IntegerColumn>> {
        let table_name = table.table().to_string();
        let schema_name = table.schema().to_string();

        let rows = self
            .query(
                "SELECT LOWER(COLUMN_NAME) AS column_name, DATA_TYPE
                 FROM INFORMATION_SCHEMA.COLUMNS
                 WHERE LOWER(TABLE_NAME) = @P1
                   AND LOWER(TABLE_SCHEMA) = @P2
                   AND DATA_TYPE IN ('smallint', 'int', 'bigint')
                 ORDER BY ORDINAL_POSITION",
                &[&table_name, &schema_name],
            )
            .await
            .with_context(|| format!("Failed to read integer columns for {}", table))?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(IntegerColumn {
                    name: text(row, 0)?,
                    data_type: text(row, 1)?.to_lowercase(),
                })
            })
            .filter(|column| !row_id_columns.contains(&column.name))
            .collect())
    }
}
