// ABOUTME: PostgreSQL implementation of the destination database
// ABOUTME: Lists managed tables, reads column types and executes DDL

use anyhow::{Context, Result};
use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::collections::HashMap;
use tokio_postgres::Client;

use super::DestinationDatabase;
use crate::config::DestinationConnection;
use crate::error::SyncError;
use crate::names::QualifiedTableName;

/// Connect to PostgreSQL, preferring TLS when the server offers it.
///
/// The connection task is spawned onto the runtime; errors after the
/// handshake are logged.
pub async fn connect(connection: &DestinationConnection) -> Result<Client> {
    let connection_key = connection.connection_key();

    let connector = TlsConnector::builder()
        .build()
        .context("Failed to build TLS connector")?;
    let tls = MakeTlsConnector::new(connector);

    tracing::debug!("Connecting to destination {}", connection_key);

    let (client, conn) = tokio_postgres::connect(&connection.conninfo(), tls)
        .await
        .map_err(|e| SyncError::connectivity(&connection_key, e))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::error!("Destination connection error: {}", e);
        }
    });

    Ok(client)
}

pub struct PostgresDestination {
    client: Client,
    connection_key: String,
    schemas: Vec<String>,
}

impl PostgresDestination {
    pub async fn connect(connection: &DestinationConnection, schemas: &[String]) -> Result<Self> {
        let client = connect(connection).await?;

        Ok(Self {
            client,
            connection_key: connection.connection_key(),
            schemas: schemas.to_vec(),
        })
    }
}

#[async_trait]
impl DestinationDatabase for PostgresDestination {
    fn connection_key(&self) -> &str {
        &self.connection_key
    }

    async fn list_tables(&self) -> Result<Vec<QualifiedTableName>> {
        let rows = self
            .client
            .query(
                "SELECT table_schema, table_name
                 FROM information_schema.tables
                 WHERE table_schema = ANY($1)
                   AND table_type = 'BASE TABLE'
                 ORDER BY table_schema, table_name",
                &[&self.schemas],
            )
            .await
            .context("Failed to list destination tables")?;

        Ok(rows
            .iter()
            .map(|row| {
                let schema: String = row.get(0);
                let table: String = row.get(1);
                QualifiedTableName::new(&schema, &table)
            })
            .collect())
    }

    async fn column_types(&self, table: &QualifiedTableName) -> Result<HashMap<String, String>> {
        let rows = self
            .client
            .query(
                "SELECT column_name, data_type
                 FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2",
                &[&table.schema(), &table.table()],
            )
            .await
            .with_context(|| format!("Failed to get columns for {}", table))?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                let data_type: String = row.get(1);
                (name.to_lowercase(), data_type.to_lowercase())
            })
            .collect())
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        tracing::debug!("  executing {}", sql);

        self.client
            .batch_execute(sql)
            .await
            .with_context(|| format!("Failed to execute: {}", sql))?;

        Ok(())
    }
}
